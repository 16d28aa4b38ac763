use crate::api::ApiServer;
use crate::config::{Config, ReconnectConfig};
use crate::framing::{self, FrameError, FrameReader};
use crate::message::{BrowserEvent, HostMessage};
use crate::publisher::{Backoff, MeetingStatePublisher, PresenceStatusHandle, PublisherSettings};
use anyhow::{Context, Result};
use std::io::Write;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Run the native messaging host: browser events arrive on stdin, replies
/// go to stdout, presence is published to the configured sink.
pub async fn run_service() -> Result<()> {
    info!("Starting meetstate bridge");

    let config = Config::load()?;

    let status = PresenceStatusHandle::default();
    let sink = config.publisher.build_sink()?;
    let publisher = MeetingStatePublisher::new(
        sink,
        PublisherSettings {
            topic: config.publisher.topic.clone(),
            retain: config.publisher.retain,
        },
        status.clone(),
    )
    .await;

    let shutdown = CancellationToken::new();
    if config.api.enabled {
        let api_server = ApiServer::new(status.clone(), &config.api);
        let token = shutdown.child_token();
        tokio::spawn(async move {
            if let Err(e) = api_server.start(token).await {
                error!("API server failed: {}", e);
            }
        });
    }

    let mut stdout = std::io::stdout();
    let result = run_bridge(publisher, &config.reconnect, tokio::io::stdin(), &mut stdout).await;

    shutdown.cancel();
    result
}

/// Pump browser events into the publisher until the input closes.
///
/// Greets the browser first so the extension re-sends its current state,
/// retries an unreachable sink with exponential backoff, and publishes
/// `false` once the browser is gone.
pub async fn run_bridge<R, W>(
    mut publisher: MeetingStatePublisher,
    reconnect: &ReconnectConfig,
    input: R,
    output: &mut W,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: Write,
{
    framing::write_frame(output, &HostMessage::connected())
        .context("Failed to greet the browser")?;
    publisher.status().set_browser_connected(true).await;

    let mut events = spawn_reader(input);
    let mut backoff = Backoff::new(reconnect.min_delay(), reconnect.max_delay());
    let mut retry_at: Option<Instant> = None;

    loop {
        if publisher.is_connected() {
            retry_at = None;
        } else if retry_at.is_none() {
            let delay = backoff.next_delay();
            info!("Retrying sink in {}s", delay.as_secs());
            let now = Instant::now();
            retry_at = Some(now.checked_add(delay).unwrap_or(now));
        }

        tokio::select! {
            event = events.recv() => match event {
                Some(event) => publisher.on_browser_event(&event).await,
                None => break,
            },
            _ = sleep_until(retry_at) => {
                retry_at = None;
                if publisher.reconnect().await {
                    info!("Sink reconnected");
                    backoff.reset();
                }
            }
        }
    }

    info!("Browser disconnected");
    publisher.status().set_browser_connected(false).await;
    publisher.on_all_browsers_disconnected().await;
    if !publisher.is_connected() {
        warn!("Sink unreachable at shutdown; final state was not delivered");
    }

    Ok(())
}

/// Read frames on a separate task so partially read frames survive the
/// retry timer firing.
fn spawn_reader<R>(input: R) -> mpsc::Receiver<BrowserEvent>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);

    tokio::spawn(async move {
        let mut reader = FrameReader::new(input);
        loop {
            match reader.next::<BrowserEvent>().await {
                Ok(Some(event)) => {
                    debug!("Browser event: {:?}", event);
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(FrameError::Json(e)) => warn!("Ignoring malformed browser message: {}", e),
                Err(e) => {
                    error!("Failed to read from browser: {}", e);
                    break;
                }
            }
        }
    });

    rx
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
