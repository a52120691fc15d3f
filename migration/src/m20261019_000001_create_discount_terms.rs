use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(DiscountTerms::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(DiscountTerms::Code)
              .string()
              .not_null()
              .primary_key(),
          )
          .col(ColumnDef::new(DiscountTerms::DiscountType).string().not_null())
          .col(ColumnDef::new(DiscountTerms::Value).double().not_null())
          .col(ColumnDef::new(DiscountTerms::MinOrder).double().null())
          .col(ColumnDef::new(DiscountTerms::MaxAmount).double().null())
          .col(ColumnDef::new(DiscountTerms::ExpiresAt).date_time().null())
          .col(ColumnDef::new(DiscountTerms::Description).string().null())
          .col(
            ColumnDef::new(DiscountTerms::IsActive)
              .boolean()
              .not_null()
              .default(true),
          )
          .col(ColumnDef::new(DiscountTerms::CreatedAt).date_time().not_null())
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(DiscountTerms::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum DiscountTerms {
  Table,
  Code,
  DiscountType,
  Value,
  MinOrder,
  MaxAmount,
  ExpiresAt,
  Description,
  IsActive,
  CreatedAt,
}
