use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;

use crate::{entity::session_entry, prelude::*};

/// Durable per-visitor key/value storage (cookie or session backed).
#[async_trait]
pub trait SessionStore: Send + Sync {
  async fn read(&self, key: &str) -> Result<Option<String>>;

  async fn write(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

  async fn delete(&self, key: &str) -> Result<()>;

  /// Drops expired entries, returning how many were removed.
  async fn purge_expired(&self) -> Result<u64>;
}

fn expiry(ttl: Duration) -> DateTime {
  TimeDelta::from_std(ttl)
    .ok()
    .and_then(|ttl| now().checked_add_signed(ttl))
    .unwrap_or(DateTime::MAX)
}

#[derive(Default)]
pub struct MemoryStore {
  entries: DashMap<String, (String, DateTime)>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl SessionStore for MemoryStore {
  async fn read(&self, key: &str) -> Result<Option<String>> {
    let now = now();
    let value = self
      .entries
      .get(key)
      .filter(|entry| entry.value().1 > now)
      .map(|entry| entry.value().0.clone());
    Ok(value)
  }

  async fn write(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
    self.entries.insert(key.to_string(), (value.to_string(), expiry(ttl)));
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<()> {
    self.entries.remove(key);
    Ok(())
  }

  async fn purge_expired(&self) -> Result<u64> {
    let now = now();
    let before = self.entries.len();
    self.entries.retain(|_, (_, expires_at)| *expires_at > now);
    Ok((before - self.entries.len()) as u64)
  }
}

/// `session_entries` table backed store.
pub struct DbStore {
  db: DatabaseConnection,
}

impl DbStore {
  pub fn new(db: DatabaseConnection) -> Self {
    Self { db }
  }
}

fn persistence(err: sea_orm::DbErr) -> Error {
  Error::Persistence(err.to_string())
}

#[async_trait]
impl SessionStore for DbStore {
  async fn read(&self, key: &str) -> Result<Option<String>> {
    let entry = session_entry::Entity::find_by_id(key)
      .one(&self.db)
      .await
      .map_err(persistence)?;

    Ok(entry.filter(|e| e.expires_at > now()).map(|e| e.value))
  }

  async fn write(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
    let entry = session_entry::ActiveModel {
      key: Set(key.to_string()),
      value: Set(value.to_string()),
      expires_at: Set(expiry(ttl)),
    };

    session_entry::Entity::insert(entry)
      .on_conflict(
        OnConflict::column(session_entry::Column::Key)
          .update_columns([
            session_entry::Column::Value,
            session_entry::Column::ExpiresAt,
          ])
          .to_owned(),
      )
      .exec(&self.db)
      .await
      .map_err(persistence)?;

    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<()> {
    session_entry::Entity::delete_by_id(key)
      .exec(&self.db)
      .await
      .map_err(persistence)?;
    Ok(())
  }

  async fn purge_expired(&self) -> Result<u64> {
    let result = session_entry::Entity::delete_many()
      .filter(session_entry::Column::ExpiresAt.lte(now()))
      .exec(&self.db)
      .await
      .map_err(persistence)?;
    Ok(result.rows_affected)
  }
}
