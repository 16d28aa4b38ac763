//! Downstream destinations for meeting presence.
//!
//! The publisher hands every state change to a [`StateSink`]. A sink error
//! means the destination is unreachable; the publisher then backs off and
//! reconnects.

pub mod mqtt;
pub mod shell;
pub mod webhook;

pub use mqtt::{MqttEndpoint, MqttSettings, MqttSink};
pub use shell::ShellCommandSink;
pub use webhook::WebhookSink;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Why a state update is being published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishReason {
    /// The browser reported a change.
    Browser,
    /// The last browser connection went away.
    NoBrowsers,
    /// The sink came back and receives the current state again.
    Reconnect,
}

impl PublishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Browser => "browser",
            Self::NoBrowsers => "no_browsers",
            Self::Reconnect => "reconnect",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateUpdate {
    pub topic: String,
    pub active: bool,
    pub reason: PublishReason,
    pub retain: bool,
}

impl StateUpdate {
    /// Wire payload: `"true"` or `"false"`.
    pub fn payload(&self) -> &'static str {
        if self.active {
            "true"
        } else {
            "false"
        }
    }
}

#[async_trait]
pub trait StateSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn publish(&self, update: &StateUpdate) -> Result<()>;
}

/// Used when no destination is configured: state only shows up in the logs
/// and the status API.
pub struct LogSink;

#[async_trait]
impl StateSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn publish(&self, update: &StateUpdate) -> Result<()> {
        info!(
            topic = %update.topic,
            payload = update.payload(),
            reason = update.reason.as_str(),
            "Meeting state"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reason_as_str() {
        assert_eq!(PublishReason::Browser.as_str(), "browser");
        assert_eq!(PublishReason::NoBrowsers.as_str(), "no_browsers");
        assert_eq!(PublishReason::Reconnect.as_str(), "reconnect");
    }

    #[test]
    fn test_publish_reason_serialization() {
        let json = serde_json::to_string(&PublishReason::NoBrowsers).unwrap();
        assert_eq!(json, "\"no_browsers\"");
    }

    #[test]
    fn test_update_payload() {
        let mut update = StateUpdate {
            topic: "meet/call_active".to_string(),
            active: true,
            reason: PublishReason::Browser,
            retain: true,
        };
        assert_eq!(update.payload(), "true");
        update.active = false;
        assert_eq!(update.payload(), "false");
    }

    #[tokio::test]
    async fn test_log_sink_always_succeeds() {
        let update = StateUpdate {
            topic: "t".to_string(),
            active: false,
            reason: PublishReason::Reconnect,
            retain: false,
        };
        assert!(LogSink.publish(&update).await.is_ok());
    }
}
