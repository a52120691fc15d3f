use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::{self, MissedTickBehavior};

use crate::{plugins::Plugin, prelude::*, state::AppState};

/// Drives every controller's timers once per second.
pub struct Ticker;

#[async_trait]
impl Plugin for Ticker {
  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()> {
    let mut interval = time::interval(Duration::from_secs(1));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
      interval.tick().await;
      app.tick(now()).await;
    }
  }
}

pub struct GC;

#[async_trait]
impl Plugin for GC {
  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()> {
    let mut interval = time::interval(Duration::from_secs(60));
    loop {
      interval.tick().await;

      let visitors = app.gc_visitors();
      let cached = app.engine.resolver.purge_expired();
      let sessions = app.engine.identity.purge_expired().await;

      if visitors + cached > 0 || sessions > 0 {
        debug!(
          "gc: {visitors} visitors, {cached} cache entries, {sessions} sessions"
        );
      }
    }
  }
}
