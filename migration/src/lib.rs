pub use sea_orm_migration::prelude::*;

mod m20261019_000001_create_discount_terms;
mod m20261019_000002_create_session_entries;
mod m20261019_000003_create_interaction_events;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
  fn migrations() -> Vec<Box<dyn MigrationTrait>> {
    vec![
      Box::new(m20261019_000001_create_discount_terms::Migration),
      Box::new(m20261019_000002_create_session_entries::Migration),
      Box::new(m20261019_000003_create_interaction_events::Migration),
    ]
  }
}
