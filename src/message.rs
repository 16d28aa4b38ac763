//! Messages exchanged between the browser extension and the host.

use serde::{Deserialize, Serialize};

/// Notification emitted by the watcher whenever the meeting signal flips.
///
/// Serializes to exactly `{"event":"meetingState","active":<bool>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingStateMessage {
    event: MeetingStateTag,
    pub active: bool,
}

impl MeetingStateMessage {
    pub fn new(active: bool) -> Self {
        Self {
            event: MeetingStateTag::MeetingState,
            active,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum MeetingStateTag {
    #[serde(rename = "meetingState")]
    MeetingState,
}

/// Event received by the host from a connected browser.
///
/// Anything that is not a meeting state update lands in `Other` and is
/// ignored by the publisher.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event")]
pub enum BrowserEvent {
    #[serde(rename = "meetingState")]
    MeetingState {
        #[serde(default, deserialize_with = "truthy")]
        active: bool,
    },
    #[serde(other)]
    Other,
}

/// Message written by the host back to the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event")]
pub enum HostMessage {
    /// A new host connection exists; the extension should re-send its state.
    #[serde(rename = "connected")]
    Connected { version: String },
}

impl HostMessage {
    pub fn connected() -> Self {
        Self::Connected {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Accept any JSON value for `active` and coerce it the way the extension's
/// runtime would: null, false, 0 and "" are false.
fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde_json::Value;

    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    })
}
