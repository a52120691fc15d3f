//! Interaction log. Delivery is best effort: a send that fails is logged
//! and forgotten, and nothing waits for it.

use async_trait::async_trait;
use reqwest::Client;

use crate::{entity::interaction_event, prelude::*};

#[async_trait]
pub trait Sink: Send + Sync {
  async fn send(&self, event: &str, data: &json::Value) -> Result<()>;
}

/// Posts `{event, data}` to a collector; any 2xx counts as delivered.
pub struct HttpSink {
  client: Client,
  url: String,
}

impl HttpSink {
  pub fn new(url: &str, timeout: Duration) -> Result<Self> {
    let client = Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| Error::Internal(format!("Failed to build client: {e}")))?;
    Ok(Self { client, url: url.to_string() })
  }
}

#[async_trait]
impl Sink for HttpSink {
  async fn send(&self, event: &str, data: &json::Value) -> Result<()> {
    let response = self
      .client
      .post(&self.url)
      .json(&json::json!({ "event": event, "data": data }))
      .send()
      .await
      .map_err(|e| Error::Network(format!("Request failed: {e}")))?;

    if response.status().is_success() {
      Ok(())
    } else {
      Err(Error::Network(format!("collector returned {}", response.status())))
    }
  }
}

/// Stores events in `interaction_events`.
pub struct DbSink {
  db: DatabaseConnection,
}

impl DbSink {
  pub fn new(db: DatabaseConnection) -> Self {
    Self { db }
  }
}

#[async_trait]
impl Sink for DbSink {
  async fn send(&self, event: &str, data: &json::Value) -> Result<()> {
    interaction_event::ActiveModel {
      event: Set(event.to_string()),
      data: Set(data.to_string()),
      created_at: Set(now()),
      ..Default::default()
    }
    .insert(&self.db)
    .await?;
    Ok(())
  }
}

pub struct NoopSink;

#[async_trait]
impl Sink for NoopSink {
  async fn send(&self, _event: &str, _data: &json::Value) -> Result<()> {
    Ok(())
  }
}

#[derive(Clone)]
pub struct Telemetry {
  sink: Arc<dyn Sink>,
}

impl Telemetry {
  pub fn new(sink: Arc<dyn Sink>) -> Self {
    Self { sink }
  }

  pub fn record(&self, event: impl Into<String>, data: json::Value) {
    let event = event.into();
    let sink = self.sink.clone();
    trace!("event `{event}`: {data}");

    tokio::spawn(async move {
      if let Err(err) = sink.send(&event, &data).await {
        debug!("event `{event}` dropped: {err}");
      }
    });
  }

  /// Error channel. The raw text stays out of anything user-facing.
  pub fn record_error(&self, category: Category, detail: &str) {
    self.record(
      "error",
      json::json!({ "category": category.as_str(), "detail": detail }),
    );
  }
}
