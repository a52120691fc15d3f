use std::env;

use anyhow::Context;

use crate::prelude::*;

#[derive(Debug, Clone)]
pub struct Config {
  pub database_url: String,
  pub port: u16,
  /// Base URL of the remote pricing authority; the local table is used
  /// when unset
  pub authority_url: Option<String>,
  pub authority_timeout: Duration,
  pub telemetry_url: Option<String>,
  pub telemetry_disabled: bool,
  pub resolver_cache_ttl: Duration,
  pub session_ttl: Duration,
  pub success_auto_hide: Duration,
  pub visitor_idle: Duration,
  pub admin_token: Option<String>,
  pub currency_symbol: String,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      database_url: "sqlite:affiliate.db?mode=rwc".into(),
      port: 3000,
      authority_url: None,
      authority_timeout: Duration::from_secs(3),
      telemetry_url: None,
      telemetry_disabled: false,
      resolver_cache_ttl: Duration::from_secs(5 * 60),
      session_ttl: Duration::from_secs(30 * 24 * 3600),
      success_auto_hide: Duration::from_millis(5000),
      visitor_idle: Duration::from_secs(30 * 60),
      admin_token: None,
      currency_symbol: "$".into(),
    }
  }
}

impl Config {
  pub fn from_env() -> anyhow::Result<Self> {
    let defaults = Self::default();

    Ok(Self {
      database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
      port: match env::var("PORT") {
        Ok(port) => port.parse().context("PORT must be a port number")?,
        Err(_) => defaults.port,
      },
      authority_url: non_empty("AUTHORITY_URL"),
      authority_timeout: duration(
        "AUTHORITY_TIMEOUT",
        defaults.authority_timeout,
      )?,
      telemetry_url: non_empty("TELEMETRY_URL"),
      telemetry_disabled: env::var("TELEMETRY_DISABLED")
        .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
        .unwrap_or(false),
      resolver_cache_ttl: duration(
        "RESOLVER_CACHE_TTL",
        defaults.resolver_cache_ttl,
      )?,
      session_ttl: duration("SESSION_TTL", defaults.session_ttl)?,
      success_auto_hide: duration(
        "SUCCESS_AUTO_HIDE",
        defaults.success_auto_hide,
      )?,
      visitor_idle: duration("VISITOR_IDLE", defaults.visitor_idle)?,
      admin_token: non_empty("ADMIN_TOKEN"),
      currency_symbol: env::var("CURRENCY_SYMBOL")
        .unwrap_or(defaults.currency_symbol),
    })
  }
}

fn non_empty(key: &str) -> Option<String> {
  env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn duration(key: &str, default: Duration) -> anyhow::Result<Duration> {
  match non_empty(key) {
    Some(raw) => parse_duration(&raw).with_context(|| format!("invalid {key}")),
    None => Ok(default),
  }
}

fn parse_duration(raw: &str) -> anyhow::Result<Duration> {
  Ok(humantime::parse_duration(raw)?)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.resolver_cache_ttl, Duration::from_secs(300));
    assert_eq!(config.success_auto_hide, Duration::from_millis(5000));
    assert!(config.authority_url.is_none());
  }

  #[test]
  fn test_parse_duration() {
    assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
    assert_eq!(
      parse_duration("30days").unwrap(),
      Duration::from_secs(30 * 86_400)
    );
    assert!(parse_duration("soon").is_err());
  }
}
