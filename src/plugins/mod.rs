pub mod cron;
pub mod server;

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::state::AppState;

/// A long-running part of the service: the HTTP server, the ticker, the GC.
#[async_trait::async_trait]
pub trait Plugin: Send + Sync {
  fn name(&self) -> &'static str {
    std::any::type_name::<Self>()
  }

  /// Runs until the plugin is done. Most plugins never return.
  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct App {
  plugins: Vec<Box<dyn Plugin>>,
}

impl App {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register<P: Plugin + 'static>(mut self, plugin: P) -> Self {
    self.plugins.push(Box::new(plugin));
    self
  }

  /// Spawns every plugin. Each task yields the plugin's name once it stops.
  pub fn run(self, app: Arc<AppState>) -> JoinSet<&'static str> {
    let mut tasks = JoinSet::new();

    for plugin in self.plugins {
      let app = app.clone();
      let name = plugin.name();
      tracing::info!("init `{name}`");

      tasks.spawn(async move {
        match plugin.start(app).await {
          Ok(()) => tracing::info!("`{name}` stopped"),
          Err(err) => tracing::error!("failed `{name}`: {err:#}"),
        }
        name
      });
    }

    tasks
  }
}
