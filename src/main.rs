mod config;
mod entity;
mod error;
mod plugins;
mod prelude;
mod state;
mod sv;
mod utils;

use tracing_subscriber::{
  EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::{
  config::Config,
  plugins::{App, cron, server},
  prelude::*,
  state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();

  tracing_subscriber::registry()
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
      "affiliate=debug,tower_http=debug,sea_orm=warn".into()
    }))
    .with(tracing_subscriber::fmt::layer())
    .init();

  let config = Config::from_env()?;

  info!("Starting Affiliate Service v{}", env!("CARGO_PKG_VERSION"));

  let app = Arc::new(AppState::new(config).await?);

  let mut plugins = App::new()
    .register(server::Plugin)
    .register(cron::Ticker)
    .register(cron::GC)
    .run(app);

  tokio::select! {
    res = tokio::signal::ctrl_c() => {
      res?;
      info!("shutting down");
    }
    Some(stopped) = plugins.join_next() => {
      error!("plugin {:?} exited, shutting down", stopped);
    }
  }

  plugins.shutdown().await;
  Ok(())
}
