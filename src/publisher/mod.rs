//! Meeting presence publisher.
//!
//! Receives `meetingState` events from the browser and forwards the state
//! to a [`StateSink`]. The sink only ever sees changes, except after a
//! reconnect, when the current state is re-sent so the destination catches
//! up with anything it missed while unreachable.

pub mod backoff;
pub mod status;

pub use backoff::Backoff;
pub use status::{PresenceStatus, PresenceStatusHandle};

use crate::message::BrowserEvent;
use crate::sink::{PublishReason, StateSink, StateUpdate};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct PublisherSettings {
    pub topic: String,
    pub retain: bool,
}

pub struct MeetingStatePublisher {
    sink: Box<dyn StateSink>,
    settings: PublisherSettings,
    status: PresenceStatusHandle,
    last_active: Option<bool>,
    published: Option<bool>,
    connected: bool,
}

impl MeetingStatePublisher {
    pub async fn new(
        sink: Box<dyn StateSink>,
        settings: PublisherSettings,
        status: PresenceStatusHandle,
    ) -> Self {
        status.set_sink(sink.name()).await;
        info!(
            "Meeting state publisher enabled (sink={}, topic={})",
            sink.name(),
            settings.topic
        );

        Self {
            sink,
            settings,
            status,
            last_active: None,
            published: None,
            connected: true,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn last_active(&self) -> Option<bool> {
        self.last_active
    }

    pub fn status(&self) -> &PresenceStatusHandle {
        &self.status
    }

    pub async fn on_browser_event(&mut self, event: &BrowserEvent) {
        match event {
            BrowserEvent::MeetingState { active } => {
                self.publish(*active, PublishReason::Browser).await
            }
            BrowserEvent::Other => debug!("Ignoring non meeting state event"),
        }
    }

    pub async fn on_all_browsers_disconnected(&mut self) {
        self.publish(false, PublishReason::NoBrowsers).await;
    }

    pub async fn publish(&mut self, active: bool, reason: PublishReason) {
        self.last_active = Some(active);
        self.status.observe(active, reason).await;

        if !self.connected {
            debug!("Sink not connected; deferring publish");
            return;
        }
        if self.published == Some(active) {
            return;
        }

        self.deliver(active, reason).await;
    }

    /// Try the sink again, re-sending the latest state.
    ///
    /// Returns whether the sink is connected afterwards.
    pub async fn reconnect(&mut self) -> bool {
        self.connected = true;
        match self.last_active {
            Some(active) => self.deliver(active, PublishReason::Reconnect).await,
            None => self.status.sink_connected().await,
        }
        self.connected
    }

    async fn deliver(&mut self, active: bool, reason: PublishReason) {
        let update = StateUpdate {
            topic: self.settings.topic.clone(),
            active,
            reason,
            retain: self.settings.retain,
        };

        match self.sink.publish(&update).await {
            Ok(()) => {
                self.published = Some(active);
                self.status.published(active).await;
                info!(
                    "Meeting state -> {} {} ({})",
                    update.topic,
                    update.payload(),
                    reason.as_str()
                );
            }
            Err(e) => {
                self.connected = false;
                warn!(
                    "Failed to publish meeting state to {} sink; will retry: {:#}",
                    self.sink.name(),
                    e
                );
                self.status.sink_failed(format!("{:#}", e)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingSink {
        updates: Arc<Mutex<Vec<StateUpdate>>>,
        failing: Arc<AtomicBool>,
    }

    impl RecordingSink {
        fn payloads(&self) -> Vec<(bool, PublishReason)> {
            self.updates
                .lock()
                .unwrap()
                .iter()
                .map(|u| (u.active, u.reason))
                .collect()
        }

        fn fail(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl StateSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn publish(&self, update: &StateUpdate) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                bail!("broker unavailable");
            }
            self.updates.lock().unwrap().push(update.clone());
            Ok(())
        }
    }

    async fn publisher() -> (RecordingSink, MeetingStatePublisher) {
        let sink = RecordingSink::default();
        let publisher = MeetingStatePublisher::new(
            Box::new(sink.clone()),
            PublisherSettings {
                topic: "meet/call_active".to_string(),
                retain: true,
            },
            PresenceStatusHandle::default(),
        )
        .await;
        (sink, publisher)
    }

    #[tokio::test]
    async fn test_publishes_browser_changes_once() {
        let (sink, mut publisher) = publisher().await;

        for active in [true, true, false, false, true] {
            publisher
                .on_browser_event(&BrowserEvent::MeetingState { active })
                .await;
        }

        assert_eq!(
            sink.payloads(),
            vec![
                (true, PublishReason::Browser),
                (false, PublishReason::Browser),
                (true, PublishReason::Browser),
            ]
        );
        let update = &sink.updates.lock().unwrap()[0];
        assert_eq!(update.topic, "meet/call_active");
        assert!(update.retain);
    }

    #[tokio::test]
    async fn test_ignores_other_events() {
        let (sink, mut publisher) = publisher().await;
        publisher.on_browser_event(&BrowserEvent::Other).await;

        assert!(sink.payloads().is_empty());
        assert_eq!(publisher.last_active(), None);
    }

    #[tokio::test]
    async fn test_all_browsers_disconnected_publishes_false() {
        let (sink, mut publisher) = publisher().await;
        publisher
            .on_browser_event(&BrowserEvent::MeetingState { active: true })
            .await;
        publisher.on_all_browsers_disconnected().await;

        assert_eq!(
            sink.payloads(),
            vec![
                (true, PublishReason::Browser),
                (false, PublishReason::NoBrowsers)
            ]
        );
    }

    #[tokio::test]
    async fn test_no_browsers_after_false_is_silent() {
        let (sink, mut publisher) = publisher().await;
        publisher
            .on_browser_event(&BrowserEvent::MeetingState { active: false })
            .await;
        publisher.on_all_browsers_disconnected().await;

        assert_eq!(sink.payloads(), vec![(false, PublishReason::Browser)]);
    }

    #[tokio::test]
    async fn test_failure_defers_until_reconnect() {
        let (sink, mut publisher) = publisher().await;
        sink.fail(true);

        publisher
            .on_browser_event(&BrowserEvent::MeetingState { active: true })
            .await;
        assert!(!publisher.is_connected());

        // Further changes while disconnected are only remembered.
        publisher
            .on_browser_event(&BrowserEvent::MeetingState { active: false })
            .await;
        publisher
            .on_browser_event(&BrowserEvent::MeetingState { active: true })
            .await;
        assert!(sink.payloads().is_empty());

        assert!(!publisher.reconnect().await);

        sink.fail(false);
        assert!(publisher.reconnect().await);
        assert_eq!(sink.payloads(), vec![(true, PublishReason::Reconnect)]);

        let status = publisher.status().get().await;
        assert!(status.sink_connected);
        assert_eq!(status.published, Some(true));
    }

    #[tokio::test]
    async fn test_reconnect_resends_even_if_unchanged() {
        let (sink, mut publisher) = publisher().await;
        publisher
            .on_browser_event(&BrowserEvent::MeetingState { active: true })
            .await;

        assert!(publisher.reconnect().await);
        assert_eq!(
            sink.payloads(),
            vec![
                (true, PublishReason::Browser),
                (true, PublishReason::Reconnect)
            ]
        );
    }

    #[tokio::test]
    async fn test_reconnect_without_state_sends_nothing() {
        let (sink, mut publisher) = publisher().await;
        assert!(publisher.reconnect().await);
        assert!(sink.payloads().is_empty());
    }

    #[tokio::test]
    async fn test_status_tracks_failure() {
        let (sink, mut publisher) = publisher().await;
        sink.fail(true);
        publisher
            .on_browser_event(&BrowserEvent::MeetingState { active: true })
            .await;

        let status = publisher.status().get().await;
        assert_eq!(status.sink, "recording");
        assert_eq!(status.active, Some(true));
        assert!(!status.sink_connected);
        assert!(status.is_pending());
        assert!(status
            .last_error
            .as_deref()
            .unwrap_or_default()
            .contains("broker unavailable"));
    }
}
