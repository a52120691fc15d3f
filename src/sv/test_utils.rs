//! Shared test utilities for database setup and fake collaborators

#[cfg(test)]
pub mod test_db {
  use sea_orm::{
    ConnectionTrait, Database, DatabaseConnection, DbBackend, Schema,
  };

  use crate::{entity::*, prelude::MigratorTrait};

  /// Creates an in-memory SQLite database with all required tables
  pub async fn setup() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    let schema = Schema::new(DbBackend::Sqlite);

    // Create discount_terms table
    let stmt = schema.create_table_from_entity(discount_terms::Entity);
    db.execute(db.get_database_backend().build(&stmt)).await.unwrap();

    // Create session_entries table
    let stmt = schema.create_table_from_entity(session_entry::Entity);
    db.execute(db.get_database_backend().build(&stmt)).await.unwrap();

    // Create interaction_events table
    let stmt = schema.create_table_from_entity(interaction_event::Entity);
    db.execute(db.get_database_backend().build(&stmt)).await.unwrap();

    db
  }

  /// Opens (or creates) a file database and runs the real migrations
  pub async fn setup_at(url: &str) -> DatabaseConnection {
    let db = Database::connect(url).await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    db
  }
}

#[cfg(test)]
pub mod fakes {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use async_trait::async_trait;
  use tokio::sync::mpsc;

  use crate::{
    entity::DiscountType,
    prelude::*,
    sv::{
      authority::Authority, session::SessionStore, telemetry::Sink,
      terms::DiscountTermsPayload,
    },
  };

  pub fn percentage(value: f64, min_order: Option<f64>) -> DiscountTermsPayload {
    DiscountTermsPayload {
      kind: DiscountType::Percentage,
      value,
      min_order,
      max_amount: None,
      expires_at: None,
      description: None,
    }
  }

  pub enum Answer {
    Terms(DiscountTermsPayload),
    Down,
  }

  /// Authority answering from a fixed table, counting every call.
  #[derive(Default)]
  pub struct StaticAuthority {
    answers: DashMap<String, Answer>,
    calls: AtomicUsize,
  }

  impl StaticAuthority {
    pub fn new() -> Self {
      Self::default()
    }

    pub fn with(self, code: &str, payload: DiscountTermsPayload) -> Self {
      self.answers.insert(code.to_string(), Answer::Terms(payload));
      self
    }

    pub fn down(self, code: &str) -> Self {
      self.answers.insert(code.to_string(), Answer::Down);
      self
    }

    pub fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }
  }

  #[async_trait]
  impl Authority for StaticAuthority {
    async fn fetch(&self, code: &str) -> Result<Option<DiscountTermsPayload>> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      match self.answers.get(code).as_deref() {
        Some(Answer::Terms(payload)) => Ok(Some(payload.clone())),
        None => Ok(None),
        Some(Answer::Down) => Err(Error::Network("connection refused".into())),
      }
    }
  }

  /// Session store whose writes always fail.
  #[derive(Default)]
  pub struct BrokenStore;

  #[async_trait]
  impl SessionStore for BrokenStore {
    async fn read(&self, _key: &str) -> Result<Option<String>> {
      Err(Error::Persistence("disk full".into()))
    }

    async fn write(&self, _: &str, _: &str, _: Duration) -> Result<()> {
      Err(Error::Persistence("disk full".into()))
    }

    async fn delete(&self, _key: &str) -> Result<()> {
      Err(Error::Persistence("disk full".into()))
    }

    async fn purge_expired(&self) -> Result<u64> {
      Ok(0)
    }
  }

  /// Sink forwarding every event to a channel.
  pub struct ChannelSink(pub mpsc::UnboundedSender<(String, json::Value)>);

  impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(String, json::Value)>) {
      let (tx, rx) = mpsc::unbounded_channel();
      (Self(tx), rx)
    }
  }

  #[async_trait]
  impl Sink for ChannelSink {
    async fn send(&self, event: &str, data: &json::Value) -> Result<()> {
      self
        .0
        .send((event.to_string(), data.clone()))
        .map_err(|e| Error::Internal(e.to_string()))
    }
  }

  /// Drains events recorded so far, letting spawned sends run first.
  pub async fn drain(
    rx: &mut mpsc::UnboundedReceiver<(String, json::Value)>,
  ) -> Vec<String> {
    for _ in 0..8 {
      tokio::task::yield_now().await;
    }
    let mut events = Vec::new();
    while let Ok((event, _)) = rx.try_recv() {
      events.push(event);
    }
    events
  }
}
