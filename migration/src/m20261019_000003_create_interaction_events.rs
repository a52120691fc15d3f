use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(InteractionEvents::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(InteractionEvents::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(InteractionEvents::Event).string().not_null())
          .col(ColumnDef::new(InteractionEvents::Data).text().not_null())
          .col(
            ColumnDef::new(InteractionEvents::CreatedAt)
              .date_time()
              .not_null(),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_interaction_events_event")
          .table(InteractionEvents::Table)
          .col(InteractionEvents::Event)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(InteractionEvents::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum InteractionEvents {
  Table,
  Id,
  Event,
  Data,
  CreatedAt,
}
