use tokio::sync::Mutex;

use crate::{
  config::Config,
  prelude::*,
  sv::{
    self, Controller, Engine, IdentityStore, Resolver, Telemetry,
    authority::{Authority, DbAuthority, HttpAuthority},
    presentation::SharedController,
    session::DbStore,
    telemetry::{DbSink, HttpSink, NoopSink, Sink},
  },
};

pub struct AppState {
  pub db: DatabaseConnection,
  pub config: Config,
  pub engine: Arc<Engine>,
  pub visitors: DashMap<String, SharedController>,
}

pub struct Services<'a> {
  pub catalog: sv::Catalog<'a>,
}

impl AppState {
  pub async fn new(config: Config) -> anyhow::Result<Self> {
    let db = Database::connect(&config.database_url).await?;
    migration::Migrator::up(&db, None).await?;

    let authority: Arc<dyn Authority> = match &config.authority_url {
      Some(url) => {
        info!("resolving codes against {url}");
        Arc::new(HttpAuthority::new(url, config.authority_timeout)?)
      }
      None => {
        info!("resolving codes from the local discount_terms table");
        Arc::new(DbAuthority::new(db.clone()))
      }
    };

    let sink: Arc<dyn Sink> = match &config.telemetry_url {
      _ if config.telemetry_disabled => Arc::new(NoopSink),
      Some(url) => Arc::new(HttpSink::new(url, config.authority_timeout)?),
      None => Arc::new(DbSink::new(db.clone())),
    };

    let engine = Engine {
      identity: IdentityStore::new(
        Arc::new(DbStore::new(db.clone())),
        config.session_ttl,
      ),
      resolver: Resolver::new(authority, config.resolver_cache_ttl),
      telemetry: Telemetry::new(sink),
      auto_hide: config.success_auto_hide,
      currency: config.currency_symbol.clone(),
    };

    Ok(Self {
      db,
      config,
      engine: Arc::new(engine),
      visitors: DashMap::new(),
    })
  }

  pub fn sv(&self) -> Services<'_> {
    Services { catalog: sv::Catalog::new(&self.db) }
  }

  /// The visitor's controller, created on first contact.
  pub fn controller(&self, visitor: &str) -> SharedController {
    self
      .visitors
      .entry(visitor.to_string())
      .or_insert_with(|| {
        debug!("new controller for visitor {visitor}");
        Arc::new(Mutex::new(Controller::new(visitor, self.engine.clone())))
      })
      .clone()
  }

  /// Advances every live controller's timers.
  pub async fn tick(&self, now: DateTime) {
    let controllers: Vec<_> =
      self.visitors.iter().map(|entry| entry.value().clone()).collect();

    futures::future::join_all(
      controllers.iter().map(|ctrl| async move { ctrl.lock().await.tick(now) }),
    )
    .await;
  }

  /// Drops controllers idle for longer than `visitor_idle`. A busy
  /// controller is kept for the next round.
  pub fn gc_visitors(&self) -> usize {
    let idle = self.config.visitor_idle;
    let before = self.visitors.len();

    self.visitors.retain(|_, ctrl| match ctrl.try_lock() {
      Ok(ctrl) => ctrl.idle_for() < idle,
      Err(_) => true,
    });

    let dropped = before.saturating_sub(self.visitors.len());
    if dropped > 0 {
      debug!("dropped {dropped} idle visitors");
    }
    dropped
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sv::presentation::{self, Surface};

  async fn state() -> AppState {
    let config = Config {
      database_url: "sqlite::memory:".into(),
      telemetry_disabled: true,
      ..Config::default()
    };
    AppState::new(config).await.unwrap()
  }

  #[tokio::test]
  async fn test_local_authority_end_to_end() {
    let app = state().await;
    app
      .sv()
      .catalog
      .upsert("SAVE10", crate::sv::test_utils::fakes::percentage(10.0, None))
      .await
      .unwrap();

    let ctrl = app.controller("v1");
    presentation::submit(&ctrl, "SAVE10", None).await;
    assert_eq!(ctrl.lock().await.surface(), Surface::SuccessMessage);

    // same visitor, same controller
    assert!(Arc::ptr_eq(&ctrl, &app.controller("v1")));

    // session survives a fresh controller
    app.visitors.clear();
    let ctrl = app.controller("v1");
    presentation::open(&ctrl, None).await;
    assert_eq!(ctrl.lock().await.code(), Some("SAVE10"));
  }

  #[tokio::test]
  async fn test_gc_drops_idle_visitors() {
    let mut app = state().await;
    app.controller("v1");
    assert_eq!(app.gc_visitors(), 0);

    app.config.visitor_idle = Duration::ZERO;
    assert_eq!(app.gc_visitors(), 1);
    assert!(app.visitors.is_empty());
  }

  #[tokio::test]
  async fn test_tick_drives_auto_hide() {
    let app = state().await;
    app
      .sv()
      .catalog
      .upsert("SAVE10", crate::sv::test_utils::fakes::percentage(10.0, None))
      .await
      .unwrap();

    let ctrl = app.controller("v1");
    presentation::submit(&ctrl, "SAVE10", None).await;

    app.tick(now() + TimeDelta::seconds(10)).await;
    let ctrl = ctrl.lock().await;
    assert_eq!(ctrl.phase(), presentation::Phase::Hidden);
    assert_eq!(ctrl.live_timers(), 0);
  }
}
