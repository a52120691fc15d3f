use std::convert::Infallible;

use axum::{
  extract::FromRequestParts,
  http::{HeaderValue, header, request::Parts},
  response::{IntoResponse, Response},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::{prelude::*, state::AppState};

pub const COOKIE: &str = "aff_sid";

/// Visitor identified by the `aff_sid` cookie, minted on first contact.
#[derive(Debug, Clone)]
pub struct Visitor {
  pub id: String,
  fresh: bool,
}

fn from_cookies(parts: &Parts) -> Option<String> {
  parts
    .headers
    .get_all(header::COOKIE)
    .iter()
    .filter_map(|value| value.to_str().ok())
    .flat_map(|value| value.split(';'))
    .filter_map(|pair| pair.trim().split_once('='))
    .find(|(name, _)| *name == COOKIE)
    .and_then(|(_, id)| Uuid::parse_str(id).ok())
    .map(|id| id.to_string())
}

impl<S: Send + Sync> FromRequestParts<S> for Visitor {
  type Rejection = Infallible;

  async fn from_request_parts(
    parts: &mut Parts,
    _state: &S,
  ) -> Result<Self, Self::Rejection> {
    Ok(match from_cookies(parts) {
      Some(id) => Self { id, fresh: false },
      None => Self { id: Uuid::new_v4().to_string(), fresh: true },
    })
  }
}

impl Visitor {
  /// Wraps `body`, issuing the cookie when this visitor is new.
  pub fn reply(&self, app: &AppState, body: impl IntoResponse) -> Response {
    let mut response = body.into_response();
    if self.fresh {
      let cookie = format!(
        "{COOKIE}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
        self.id,
        app.config.session_ttl.as_secs()
      );
      match HeaderValue::from_str(&cookie) {
        Ok(value) => {
          response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(err) => error!("failed to issue visitor cookie: {err}"),
      }
    }
    response
  }
}

/// Bearer-token guard for `/admin` routes.
pub struct Admin;

fn mac(key: &str) -> Option<Hmac<Sha256>> {
  Hmac::<Sha256>::new_from_slice(key.as_bytes()).ok()
}

/// Compares `presented` with `token` in constant time.
pub fn token_matches(token: &str, presented: &str) -> bool {
  let (Some(mut expected), Some(mut actual)) = (mac(token), mac(token)) else {
    return false;
  };
  expected.update(token.as_bytes());
  actual.update(presented.as_bytes());
  actual.verify_slice(&expected.finalize().into_bytes()).is_ok()
}

impl FromRequestParts<Arc<AppState>> for Admin {
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    app: &Arc<AppState>,
  ) -> Result<Self, Self::Rejection> {
    let Some(token) = app.config.admin_token.as_deref() else {
      warn!("admin request refused, ADMIN_TOKEN is not set");
      return Err(Error::Unauthorized);
    };

    let presented = parts
      .headers
      .get(header::AUTHORIZATION)
      .and_then(|value| value.to_str().ok())
      .and_then(|value| value.strip_prefix("Bearer "))
      .ok_or(Error::Unauthorized)?;

    if token_matches(token, presented.trim()) {
      Ok(Admin)
    } else {
      warn!("admin request with a wrong token");
      Err(Error::Unauthorized)
    }
  }
}

#[cfg(test)]
mod tests {
  use axum::http::Request;

  use super::*;

  fn parts(cookie: Option<&str>) -> Parts {
    let mut builder = Request::builder().uri("/api/view");
    if let Some(cookie) = cookie {
      builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(()).unwrap().into_parts().0
  }

  #[test]
  fn test_cookie_lookup() {
    let id = Uuid::new_v4().to_string();
    let cookie = format!("theme=dark; {COOKIE}={id}; other=1");
    assert_eq!(from_cookies(&parts(Some(&cookie))), Some(id));

    assert_eq!(from_cookies(&parts(None)), None);
    assert_eq!(from_cookies(&parts(Some("aff_sid=not-a-uuid"))), None);
  }

  #[tokio::test]
  async fn test_new_visitor_is_fresh() {
    let mut parts = parts(None);
    let visitor = Visitor::from_request_parts(&mut parts, &()).await.unwrap();
    assert!(visitor.fresh);
    assert!(Uuid::parse_str(&visitor.id).is_ok());
  }

  #[test]
  fn test_token_matches() {
    assert!(token_matches("s3cret", "s3cret"));
    assert!(!token_matches("s3cret", "s3cre"));
    assert!(!token_matches("s3cret", ""));
  }
}
