//! Pricing authorities: the systems of record for discount terms.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::{
  prelude::*,
  sv::{catalog::Catalog, terms::DiscountTermsPayload},
};

#[async_trait]
pub trait Authority: Send + Sync {
  /// `Ok(None)` when the authority does not know the code.
  /// Transport failures are `Error::Network`.
  async fn fetch(&self, code: &str) -> Result<Option<DiscountTermsPayload>>;
}

/// Remote authority speaking `GET {base}/resolve-discount?code=`.
#[derive(Clone)]
pub struct HttpAuthority {
  client: Client,
  base_url: String,
}

impl HttpAuthority {
  pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
    let client = Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| Error::Internal(format!("Failed to build client: {e}")))?;

    Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
  }

  fn parse(code: &str, body: json::Value) -> Result<Option<DiscountTermsPayload>> {
    if body.get("status").and_then(|s| s.as_str()) == Some("not_found") {
      return Ok(None);
    }

    json::from_value(body).map(Some).map_err(|e| {
      Error::Rejected(Rejection::Malformed(format!("`{code}`: {e}")))
    })
  }
}

#[async_trait]
impl Authority for HttpAuthority {
  async fn fetch(&self, code: &str) -> Result<Option<DiscountTermsPayload>> {
    let url = format!("{}/resolve-discount", self.base_url);

    let response = self
      .client
      .get(&url)
      .query(&[("code", code)])
      .send()
      .await
      .map_err(|e| Error::Network(format!("Request failed: {e}")))?;

    match response.status() {
      StatusCode::NOT_FOUND => return Ok(None),
      status if !status.is_success() => {
        return Err(Error::Network(format!("authority returned {status}")));
      }
      _ => {}
    }

    let body: json::Value = response
      .json()
      .await
      .map_err(|e| Error::Network(format!("Failed to read response: {e}")))?;

    Self::parse(code, body)
  }
}

/// Local authority over the `discount_terms` table.
#[derive(Clone)]
pub struct DbAuthority {
  db: DatabaseConnection,
}

impl DbAuthority {
  pub fn new(db: DatabaseConnection) -> Self {
    Self { db }
  }
}

#[async_trait]
impl Authority for DbAuthority {
  async fn fetch(&self, code: &str) -> Result<Option<DiscountTermsPayload>> {
    let model = Catalog::new(&self.db)
      .by_code(code)
      .await
      .map_err(|e| Error::Network(e.to_string()))?;

    Ok(model.filter(|m| m.is_active).map(DiscountTermsPayload::from))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    entity::DiscountType,
    sv::test_utils::{fakes, test_db},
  };

  #[test]
  fn test_parse_not_found_body() {
    let body = json::json!({ "status": "not_found" });
    assert!(HttpAuthority::parse("X", body).unwrap().is_none());
  }

  #[test]
  fn test_parse_terms_body() {
    let body = json::json!({ "type": "fixed", "value": 5, "description": null });
    let payload = HttpAuthority::parse("X", body).unwrap().unwrap();
    assert_eq!(payload.kind, DiscountType::Fixed);
    assert_eq!(payload.value, 5.0);
  }

  #[test]
  fn test_parse_garbage_is_malformed() {
    let body = json::json!({ "type": "bogus", "value": 5 });
    let err = HttpAuthority::parse("X", body).unwrap_err();
    assert!(matches!(err, Error::Rejected(Rejection::Malformed(_))));
  }

  #[tokio::test]
  async fn test_unreachable_authority_is_network_error() {
    // nothing listens on the discard port
    let authority =
      HttpAuthority::new("http://127.0.0.1:9", Duration::from_millis(500))
        .unwrap();
    let err = authority.fetch("SAVE10").await.unwrap_err();
    assert_eq!(err.category(), Category::Network);
  }

  #[tokio::test]
  async fn test_db_authority_skips_inactive() {
    let db = test_db::setup().await;
    let catalog = Catalog::new(&db);
    catalog.upsert("SAVE10", fakes::percentage(10.0, Some(50.0))).await.unwrap();
    catalog.upsert("OLD", fakes::percentage(5.0, None)).await.unwrap();
    catalog.deactivate("OLD").await.unwrap();

    let authority = DbAuthority::new(db.clone());
    let payload = authority.fetch("SAVE10").await.unwrap().unwrap();
    assert_eq!(payload.min_order, Some(50.0));

    assert!(authority.fetch("OLD").await.unwrap().is_none());
    assert!(authority.fetch("MISSING").await.unwrap().is_none());
  }
}
