use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
  prelude::*,
  sv::{
    presentation::Surface,
    session::{MemoryStore, SessionStore},
  },
};

/// Checks `code` against `^[A-Za-z0-9_-]+$`. Whitespace is not trimmed.
pub fn validate_code(code: &str) -> Result<&str, ValidationError> {
  if code.is_empty() {
    return Err(ValidationError::Empty);
  }
  if !code.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
  {
    return Err(ValidationError::InvalidFormat(code.to_string()));
  }
  Ok(code)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffiliateIdentity {
  pub code: String,
  pub source_url: Option<String>,
  pub established_at: DateTime,
}

/// Where a write ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
  Durable,
  /// The session store refused the write; kept for this process only
  MemoryOnly,
}

/// Persists the visitor's affiliate code and per-code dismissals.
pub struct IdentityStore {
  store: Arc<dyn SessionStore>,
  fallback: MemoryStore,
  ttl: Duration,
  warned: AtomicBool,
}

fn identity_key(visitor: &str) -> String {
  format!("{visitor}:identity")
}

fn dismissed_key(visitor: &str, code: &str) -> String {
  format!("{visitor}:dismissed:{code}")
}

impl IdentityStore {
  pub fn new(store: Arc<dyn SessionStore>, ttl: Duration) -> Self {
    Self { store, fallback: MemoryStore::new(), ttl, warned: AtomicBool::new(false) }
  }

  fn degrade(&self, err: &Error) {
    if !self.warned.swap(true, Ordering::Relaxed) {
      warn!("session store unavailable, keeping state in memory: {err}");
    } else {
      debug!("session store still unavailable: {err}");
    }
  }

  async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    let raw = match self.store.read(key).await {
      Ok(Some(raw)) => Some(raw),
      Ok(None) => self.fallback.read(key).await.ok().flatten(),
      Err(err) => {
        self.degrade(&err);
        self.fallback.read(key).await.ok().flatten()
      }
    }?;

    json::from_str(&raw)
      .map_err(|err| warn!("dropping unreadable session entry `{key}`: {err}"))
      .ok()
  }

  async fn write_json<T: Serialize>(
    &self,
    key: &str,
    value: &T,
  ) -> Result<Durability> {
    let raw = json::to_string(value)
      .map_err(|e| Error::Internal(format!("Failed to encode `{key}`: {e}")))?;

    match self.store.write(key, &raw, self.ttl).await {
      Ok(()) => {
        self.fallback.delete(key).await?;
        Ok(Durability::Durable)
      }
      Err(err) => {
        self.degrade(&err);
        self.fallback.write(key, &raw, self.ttl).await?;
        Ok(Durability::MemoryOnly)
      }
    }
  }

  async fn remove(&self, key: &str) {
    if let Err(err) = self.store.delete(key).await {
      self.degrade(&err);
    }
    let _ = self.fallback.delete(key).await;
  }

  pub async fn current(&self, visitor: &str) -> Option<AffiliateIdentity> {
    self.read_json(&identity_key(visitor)).await
  }

  pub async fn set_code(
    &self,
    visitor: &str,
    code: &str,
    source_url: Option<String>,
    now: DateTime,
  ) -> Result<(AffiliateIdentity, Durability)> {
    let code = validate_code(code)?;
    let identity = AffiliateIdentity {
      code: code.to_string(),
      source_url,
      established_at: now,
    };

    let durability = self.write_json(&identity_key(visitor), &identity).await?;
    debug!("visitor {visitor} now uses code `{code}` ({durability:?})");
    Ok((identity, durability))
  }

  /// Forgets the visitor's code and everything dismissed under it.
  pub async fn clear(&self, visitor: &str, code: &str) {
    self.remove(&identity_key(visitor)).await;
    self.forget_dismissed(visitor, code).await;
    debug!("visitor {visitor} cleared code `{code}`");
  }

  /// Drops the dismissals recorded under `code`, leaving the identity alone.
  pub async fn forget_dismissed(&self, visitor: &str, code: &str) {
    self.remove(&dismissed_key(visitor, code)).await;
  }

  /// Surfaces dismissed under `code`; the empty code scopes anonymous
  /// visitors.
  pub async fn dismissed(&self, visitor: &str, code: &str) -> HashSet<Surface> {
    self
      .read_json::<Vec<Surface>>(&dismissed_key(visitor, code))
      .await
      .map(|surfaces| surfaces.into_iter().collect())
      .unwrap_or_default()
  }

  pub async fn save_dismissed(
    &self,
    visitor: &str,
    code: &str,
    dismissed: &HashSet<Surface>,
  ) -> Result<Durability> {
    let mut surfaces: Vec<_> = dismissed.iter().copied().collect();
    surfaces.sort_by_key(|s| s.as_str());
    self.write_json(&dismissed_key(visitor, code), &surfaces).await
  }

  pub async fn purge_expired(&self) -> u64 {
    let purged = match self.store.purge_expired().await {
      Ok(count) => count,
      Err(err) => {
        self.degrade(&err);
        0
      }
    };
    purged + self.fallback.purge_expired().await.unwrap_or(0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sv::test_utils::fakes::BrokenStore;

  fn store() -> IdentityStore {
    IdentityStore::new(Arc::new(MemoryStore::new()), Duration::from_secs(60))
  }

  #[test]
  fn test_valid_codes() {
    let long = "A".repeat(500);
    let codes = ["SAVE10", "a", "under_score", "dash-ed", "MiX3d_-", long.as_str()];
    for code in codes {
      assert_eq!(validate_code(code), Ok(code));
    }
  }

  #[test]
  fn test_invalid_codes() {
    assert_eq!(validate_code(""), Err(ValidationError::Empty));
    for code in [
      "   ",
      " SAVE10 ",
      "SAVE10\n",
      "with space",
      "semi;colon",
      "ünïcode",
      "a.b",
      "<script>",
      "a/b",
    ] {
      assert!(
        matches!(validate_code(code), Err(ValidationError::InvalidFormat(_))),
        "{code:?} should be rejected"
      );
    }
  }

  #[tokio::test]
  async fn test_set_code_rejects_malformed() {
    let store = store();
    for code in ["no spaces", " SAVE10 ", ""] {
      let err = store.set_code("v", code, None, now()).await.unwrap_err();
      assert_eq!(err.category(), Category::Validation);
    }
    assert!(store.current("v").await.is_none());
  }

  #[tokio::test]
  async fn test_forget_dismissed_keeps_identity() {
    let store = store();
    store.set_code("v", "NEW", None, now()).await.unwrap();
    let dismissed = HashSet::from([Surface::Popup]);
    store.save_dismissed("v", "OLD", &dismissed).await.unwrap();

    store.forget_dismissed("v", "OLD").await;

    assert!(store.dismissed("v", "OLD").await.is_empty());
    assert_eq!(store.current("v").await.unwrap().code, "NEW");
  }

  #[tokio::test]
  async fn test_set_and_clear() {
    let store = store();
    let (identity, durability) = store
      .set_code("v", "SAVE10", Some("https://blog.example".into()), now())
      .await
      .unwrap();

    assert_eq!(durability, Durability::Durable);
    assert_eq!(store.current("v").await, Some(identity));
    assert!(store.current("other").await.is_none());

    let dismissed = HashSet::from([Surface::Banner]);
    store.save_dismissed("v", "SAVE10", &dismissed).await.unwrap();
    assert_eq!(store.dismissed("v", "SAVE10").await, dismissed);
    assert!(store.dismissed("v", "OTHER").await.is_empty());

    store.clear("v", "SAVE10").await;
    assert!(store.current("v").await.is_none());
    assert!(store.dismissed("v", "SAVE10").await.is_empty());
  }

  #[tokio::test]
  async fn test_broken_store_degrades_to_memory() {
    let store = IdentityStore::new(Arc::new(BrokenStore), Duration::from_secs(60));

    let (_, durability) =
      store.set_code("v", "SAVE10", None, now()).await.unwrap();
    assert_eq!(durability, Durability::MemoryOnly);

    let identity = store.current("v").await.unwrap();
    assert_eq!(identity.code, "SAVE10");

    let durability = store
      .save_dismissed("v", "SAVE10", &HashSet::from([Surface::Popup]))
      .await
      .unwrap();
    assert_eq!(durability, Durability::MemoryOnly);
    assert!(store.dismissed("v", "SAVE10").await.contains(&Surface::Popup));
  }
}
