//! HTTP webhook sink.

use super::{StateSink, StateUpdate};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// POSTs every update as JSON to a fixed URL.
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    topic: &'a str,
    active: bool,
    payload: &'a str,
    reason: &'a str,
    retain: bool,
}

impl WebhookSink {
    pub fn new(url: String, timeout_seconds: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl StateSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn publish(&self, update: &StateUpdate) -> Result<()> {
        let body = WebhookBody {
            topic: &update.topic,
            active: update.active,
            payload: update.payload(),
            reason: update.reason.as_str(),
            retain: update.retain,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to reach webhook {}", self.url))?;

        let status = response.status();
        response
            .error_for_status()
            .with_context(|| format!("Webhook {} rejected update", self.url))?;

        debug!("Webhook accepted update with status {}", status);
        Ok(())
    }
}
