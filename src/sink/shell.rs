//! Shell command sink.
//!
//! Runs a command for every published update, in the spirit of a post-event
//! hook: the payload goes to stdin and the update is described through
//! environment variables.

use super::{StateSink, StateUpdate};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Environment variable names passed to the command.
pub mod sink_env {
    pub const TOPIC: &str = "MEETSTATE_TOPIC";
    pub const ACTIVE: &str = "MEETSTATE_ACTIVE";
    pub const REASON: &str = "MEETSTATE_REASON";
    pub const RETAIN: &str = "MEETSTATE_RETAIN";
}

/// - Pipes the payload (`true`/`false`) to stdin
/// - Kills the process on timeout
/// - Treats a non-zero exit as a failed delivery
pub struct ShellCommandSink {
    command: String,
    timeout: Duration,
}

impl ShellCommandSink {
    pub fn new(command: String, timeout_seconds: u64) -> Self {
        Self {
            command,
            timeout: Duration::from_secs(timeout_seconds),
        }
    }
}

#[async_trait]
impl StateSink for ShellCommandSink {
    fn name(&self) -> &'static str {
        "shell"
    }

    async fn publish(&self, update: &StateUpdate) -> Result<()> {
        debug!("Running state command: {}", self.command);

        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env(sink_env::TOPIC, &update.topic)
            .env(sink_env::ACTIVE, update.payload())
            .env(sink_env::REASON, update.reason.as_str())
            .env(sink_env::RETAIN, update.retain.to_string())
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("Failed to spawn state command")?;

        if let Some(mut stdin) = child.stdin.take() {
            // The command may exit without reading stdin.
            let _ = stdin.write_all(update.payload().as_bytes()).await;
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.context("Failed to wait for state command")?,
            Err(_) => bail!(
                "State command timed out after {}s",
                self.timeout.as_secs()
            ),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "State command exited with status {}: {}",
                output.status,
                stderr.trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            info!("State command stdout: {}", stdout.trim());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::PublishReason;

    fn update(active: bool) -> StateUpdate {
        StateUpdate {
            topic: "meet/call_active".to_string(),
            active,
            reason: PublishReason::Browser,
            retain: true,
        }
    }

    #[test]
    fn test_sink_env_constants() {
        assert_eq!(sink_env::TOPIC, "MEETSTATE_TOPIC");
        assert_eq!(sink_env::ACTIVE, "MEETSTATE_ACTIVE");
        assert_eq!(sink_env::REASON, "MEETSTATE_REASON");
        assert_eq!(sink_env::RETAIN, "MEETSTATE_RETAIN");
    }

    #[test]
    fn test_shell_command_sink_creation() {
        let sink = ShellCommandSink::new("echo hello".to_string(), 30);
        assert_eq!(sink.command, "echo hello");
        assert_eq!(sink.timeout, Duration::from_secs(30));
        assert_eq!(sink.name(), "shell");
    }

    #[tokio::test]
    async fn test_shell_command_sink_success() {
        let sink = ShellCommandSink::new("cat".to_string(), 10);
        assert!(sink.publish(&update(true)).await.is_ok());
    }

    #[tokio::test]
    async fn test_shell_command_sink_sees_env() {
        let sink = ShellCommandSink::new(
            r#"test "$MEETSTATE_ACTIVE" = false && test "$MEETSTATE_TOPIC" = meet/call_active && test "$MEETSTATE_REASON" = browser"#
                .to_string(),
            10,
        );
        assert!(sink.publish(&update(false)).await.is_ok());
    }

    #[tokio::test]
    async fn test_shell_command_sink_reads_payload() {
        let sink = ShellCommandSink::new(r#"read value; test "$value" = true"#.to_string(), 10);
        assert!(sink.publish(&update(true)).await.is_ok());
    }

    #[tokio::test]
    async fn test_shell_command_sink_nonzero_exit() {
        let sink = ShellCommandSink::new("exit 3".to_string(), 10);
        assert!(sink.publish(&update(true)).await.is_err());
    }

    #[tokio::test]
    async fn test_shell_command_sink_timeout() {
        let sink = ShellCommandSink::new("sleep 5".to_string(), 0);
        let err = sink.publish(&update(true)).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
