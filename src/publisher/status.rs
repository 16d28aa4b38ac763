//! Presence status types and shared state handle.

use crate::sink::PublishReason;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Current presence state, readable by API handlers.
#[derive(Debug, Clone, Serialize)]
pub struct PresenceStatus {
    /// Last state reported by the browser (or implied by its absence).
    pub active: Option<bool>,
    pub reason: Option<PublishReason>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Last state the sink accepted.
    pub published: Option<bool>,
    pub published_at: Option<DateTime<Utc>>,
    pub sink: String,
    pub sink_connected: bool,
    pub browser_connected: bool,
    pub last_error: Option<String>,
}

impl Default for PresenceStatus {
    fn default() -> Self {
        Self {
            active: None,
            reason: None,
            updated_at: None,
            published: None,
            published_at: None,
            sink: String::new(),
            sink_connected: true,
            browser_connected: false,
            last_error: None,
        }
    }
}

impl PresenceStatus {
    /// Whether the sink is behind the browser's latest state.
    pub fn is_pending(&self) -> bool {
        self.active.is_some() && self.active != self.published
    }

    /// Seconds since the last observed change.
    pub fn seconds_since_update(&self) -> Option<u64> {
        self.updated_at.map(|at| {
            let elapsed = Utc::now() - at;
            elapsed.num_seconds().max(0) as u64
        })
    }
}

/// Thread-safe handle for sharing presence state between the publisher and API handlers.
#[derive(Clone, Default)]
pub struct PresenceStatusHandle {
    inner: Arc<Mutex<PresenceStatus>>,
}

impl PresenceStatusHandle {
    pub async fn get(&self) -> PresenceStatus {
        self.inner.lock().await.clone()
    }

    pub async fn set_sink(&self, name: &str) {
        let mut state = self.inner.lock().await;
        state.sink = name.to_string();
    }

    pub async fn observe(&self, active: bool, reason: PublishReason) {
        let mut state = self.inner.lock().await;
        if state.active != Some(active) {
            state.updated_at = Some(Utc::now());
        }
        state.active = Some(active);
        state.reason = Some(reason);
    }

    pub async fn published(&self, active: bool) {
        let mut state = self.inner.lock().await;
        state.published = Some(active);
        state.published_at = Some(Utc::now());
        state.sink_connected = true;
        state.last_error = None;
    }

    pub async fn sink_failed(&self, error: String) {
        let mut state = self.inner.lock().await;
        state.sink_connected = false;
        state.last_error = Some(error);
    }

    pub async fn sink_connected(&self) {
        let mut state = self.inner.lock().await;
        state.sink_connected = true;
    }

    pub async fn set_browser_connected(&self, connected: bool) {
        let mut state = self.inner.lock().await;
        state.browser_connected = connected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_status_default() {
        let status = PresenceStatus::default();
        assert!(status.active.is_none());
        assert!(status.published.is_none());
        assert!(status.sink_connected);
        assert!(!status.browser_connected);
        assert!(!status.is_pending());
        assert!(status.seconds_since_update().is_none());
    }

    #[tokio::test]
    async fn test_observe_then_publish() {
        let handle = PresenceStatusHandle::default();
        handle.observe(true, PublishReason::Browser).await;

        let state = handle.get().await;
        assert_eq!(state.active, Some(true));
        assert_eq!(state.reason, Some(PublishReason::Browser));
        assert!(state.updated_at.is_some());
        assert!(state.is_pending());

        handle.published(true).await;
        let state = handle.get().await;
        assert_eq!(state.published, Some(true));
        assert!(!state.is_pending());
    }

    #[tokio::test]
    async fn test_observe_same_value_keeps_timestamp() {
        let handle = PresenceStatusHandle::default();
        handle.observe(false, PublishReason::Browser).await;
        let first = handle.get().await.updated_at;

        handle.observe(false, PublishReason::NoBrowsers).await;
        let state = handle.get().await;
        assert_eq!(state.updated_at, first);
        assert_eq!(state.reason, Some(PublishReason::NoBrowsers));
    }

    #[tokio::test]
    async fn test_sink_failure_and_recovery() {
        let handle = PresenceStatusHandle::default();
        handle.sink_failed("connection refused".to_string()).await;

        let state = handle.get().await;
        assert!(!state.sink_connected);
        assert_eq!(state.last_error, Some("connection refused".to_string()));

        handle.published(false).await;
        let state = handle.get().await;
        assert!(state.sink_connected);
        assert!(state.last_error.is_none());
    }

    #[test]
    fn test_status_serializes() {
        let status = PresenceStatus {
            active: Some(true),
            reason: Some(PublishReason::Reconnect),
            ..PresenceStatus::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["active"], true);
        assert_eq!(json["reason"], "reconnect");
        assert_eq!(json["sink_connected"], true);
    }
}
