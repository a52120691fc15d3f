use crate::{
  prelude::*,
  sv::{authority::Authority, terms::DiscountTerms},
};

struct CacheEntry {
  terms: DiscountTerms,
  fetched_at: Instant,
}

/// Maps affiliate codes to discount terms through an [`Authority`].
///
/// Successful lookups are memoised per code for `ttl`. Entries are swapped
/// whole, so overlapping callers only ever observe a complete entry.
pub struct Resolver {
  authority: Arc<dyn Authority>,
  ttl: Duration,
  cache: DashMap<String, Arc<CacheEntry>>,
}

impl Resolver {
  pub fn new(authority: Arc<dyn Authority>, ttl: Duration) -> Self {
    Self { authority, ttl, cache: DashMap::new() }
  }

  fn cached(&self, code: &str) -> Option<Arc<CacheEntry>> {
    let entry = self.cache.get(code)?.value().clone();
    (entry.fetched_at.elapsed() < self.ttl).then_some(entry)
  }

  /// Resolve with the failure reason kept, for callers that must tell
  /// the user why.
  pub async fn lookup(&self, code: &str) -> Result<DiscountTerms> {
    let now = now();

    if let Some(entry) = self.cached(code) {
      if entry.terms.is_expired(now) {
        self.invalidate(code);
        return Err(Rejection::Expired.into());
      }
      trace!("resolver cache hit for `{code}`");
      return Ok(entry.terms.clone());
    }

    let payload =
      self.authority.fetch(code).await?.ok_or(Rejection::NotFound)?;
    let terms = DiscountTerms::from_payload(code, payload)?;

    if terms.is_expired(now) {
      debug!("terms for `{code}` already expired");
      return Err(Rejection::Expired.into());
    }

    self.cache.insert(
      code.to_string(),
      Arc::new(CacheEntry { terms: terms.clone(), fetched_at: Instant::now() }),
    );

    Ok(terms)
  }

  /// Terms for `code`, or `None` whenever they cannot be resolved.
  /// Nothing is ever substituted for missing terms.
  pub async fn resolve(&self, code: &str) -> Option<DiscountTerms> {
    match self.lookup(code).await {
      Ok(terms) => Some(terms),
      Err(err) => {
        debug!("no discount for `{code}`: {err}");
        None
      }
    }
  }

  pub fn invalidate(&self, code: &str) {
    if self.cache.remove(code).is_some() {
      debug!("resolver cache entry for `{code}` invalidated");
    }
  }

  pub fn clear(&self) {
    let count = self.cache.len();
    self.cache.clear();
    info!("resolver cache cleared ({count} entries)");
  }

  /// Evicts stale and expired entries, returning how many were dropped.
  pub fn purge_expired(&self) -> usize {
    let now = now();
    let before = self.cache.len();
    self.cache.retain(|_, entry| {
      entry.fetched_at.elapsed() < self.ttl && !entry.terms.is_expired(now)
    });
    before - self.cache.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sv::test_utils::fakes::{self, StaticAuthority};

  fn resolver(authority: Arc<StaticAuthority>, ttl: Duration) -> Resolver {
    Resolver::new(authority, ttl)
  }

  #[tokio::test]
  async fn test_cache_hit_within_ttl() {
    let authority = Arc::new(
      StaticAuthority::new().with("SAVE10", fakes::percentage(10.0, Some(50.0))),
    );
    let resolver = resolver(authority.clone(), Duration::from_secs(300));

    let first = resolver.resolve("SAVE10").await.unwrap();
    let second = resolver.resolve("SAVE10").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.min_order, Some(5000));
    assert_eq!(authority.calls(), 1);
  }

  #[tokio::test]
  async fn test_clear_forces_requery() {
    let authority = Arc::new(
      StaticAuthority::new().with("SAVE10", fakes::percentage(10.0, None)),
    );
    let resolver = resolver(authority.clone(), Duration::from_secs(300));

    resolver.resolve("SAVE10").await.unwrap();
    resolver.clear();
    resolver.resolve("SAVE10").await.unwrap();
    resolver.invalidate("SAVE10");
    resolver.resolve("SAVE10").await.unwrap();

    assert_eq!(authority.calls(), 3);
  }

  #[tokio::test]
  async fn test_zero_ttl_never_caches() {
    let authority = Arc::new(
      StaticAuthority::new().with("SAVE10", fakes::percentage(10.0, None)),
    );
    let resolver = resolver(authority.clone(), Duration::ZERO);

    resolver.resolve("SAVE10").await.unwrap();
    resolver.resolve("SAVE10").await.unwrap();

    assert_eq!(authority.calls(), 2);
    assert_eq!(resolver.purge_expired(), 1);
  }

  #[tokio::test]
  async fn test_failures_are_absent_not_fabricated() {
    let authority = Arc::new(StaticAuthority::new().down("X"));
    let resolver = resolver(authority.clone(), Duration::from_secs(300));

    assert!(resolver.resolve("X").await.is_none());
    assert!(resolver.resolve("UNKNOWN").await.is_none());

    let err = resolver.lookup("X").await.unwrap_err();
    assert_eq!(err.category(), Category::Network);
    let err = resolver.lookup("UNKNOWN").await.unwrap_err();
    assert!(matches!(err, Error::Rejected(Rejection::NotFound)));

    // failures are not cached
    assert_eq!(authority.calls(), 4);
  }

  #[tokio::test]
  async fn test_expired_terms_are_rejected() {
    let mut payload = fakes::percentage(10.0, None);
    payload.expires_at = Some(Utc::now() - TimeDelta::hours(1));
    let authority = Arc::new(StaticAuthority::new().with("OLD", payload));
    let resolver = resolver(authority, Duration::from_secs(300));

    let err = resolver.lookup("OLD").await.unwrap_err();
    assert!(matches!(err, Error::Rejected(Rejection::Expired)));
    assert_eq!(resolver.purge_expired(), 0);
  }
}
