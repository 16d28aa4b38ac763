use crate::dom::Selector;
use crate::global;
use crate::publisher::backoff::{MAX_RETRY_DELAY, MIN_RETRY_DELAY};
use crate::sink::{
    LogSink, MqttEndpoint, MqttSettings, MqttSink, ShellCommandSink, StateSink, WebhookSink,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variables that override the config file.
pub mod config_env {
    pub const TOPIC: &str = "MEETSTATE_TOPIC";
    pub const WEBHOOK_URL: &str = "MEETSTATE_WEBHOOK_URL";
    pub const COMMAND: &str = "MEETSTATE_COMMAND";
    pub const MQTT_URL: &str = "MQTT_URL";
    pub const MQTT_USER: &str = "MQTT_USER";
    pub const MQTT_PASS: &str = "MQTT_PASS";
    /// Topic overrides, highest precedence first.
    pub const MQTT_TOPICS: [&str; 2] = ["MEET_MQTT_TOPIC", "MQTT_TOPIC"];
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub watcher: WatcherConfig,
    pub publisher: PublisherConfig,
    pub api: ApiConfig,
    pub reconnect: ReconnectConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Selector for the element that is only present during a call.
    /// Tied to the meeting page's markup; update it when that changes.
    pub marker_selector: String,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            marker_selector: r#"[jsname="CQylAd"]"#.to_string(),
        }
    }
}

impl WatcherConfig {
    pub fn selector(&self) -> Result<Selector> {
        Selector::parse(&self.marker_selector)
            .with_context(|| format!("Invalid marker selector {:?}", self.marker_selector))
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub topic: String,
    pub retain: bool,
    /// Broker address, e.g. `mqtt://broker:1883`. Takes precedence over
    /// `webhook_url` and `command`.
    pub mqtt_url: String,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub mqtt_keep_alive_seconds: u64,
    /// Shell command run for every update. Receives `true`/`false` on stdin.
    /// Env vars: MEETSTATE_TOPIC, MEETSTATE_ACTIVE, MEETSTATE_REASON, MEETSTATE_RETAIN
    pub command: String,
    pub command_timeout_seconds: u64,
    /// URL that receives every update as a JSON POST. Takes precedence over `command`.
    pub webhook_url: String,
    pub webhook_timeout_seconds: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            topic: "meet/call_active".to_string(),
            retain: true,
            mqtt_url: String::new(),
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            mqtt_keep_alive_seconds: 30,
            command: String::new(),
            command_timeout_seconds: 30,
            webhook_url: String::new(),
            webhook_timeout_seconds: 10,
        }
    }
}

impl PublisherConfig {
    pub fn mqtt_settings(&self) -> Result<Option<MqttSettings>> {
        if self.mqtt_url.trim().is_empty() {
            return Ok(None);
        }

        let mut endpoint = MqttEndpoint::parse(&self.mqtt_url)?;
        if !self.mqtt_user.is_empty() {
            endpoint.username = Some(self.mqtt_user.clone());
        }
        if !self.mqtt_pass.is_empty() {
            endpoint.password = Some(self.mqtt_pass.clone());
        }

        Ok(Some(MqttSettings {
            endpoint,
            keep_alive: Duration::from_secs(self.mqtt_keep_alive_seconds),
        }))
    }

    /// Pick the sink: MQTT, then webhook, then shell command, else log only.
    pub fn build_sink(&self) -> Result<Box<dyn StateSink>> {
        if let Some(settings) = self.mqtt_settings()? {
            return Ok(Box::new(MqttSink::connect(settings)));
        }
        if !self.webhook_url.trim().is_empty() {
            let sink = WebhookSink::new(self.webhook_url.trim().to_string(), self.webhook_timeout_seconds)?;
            return Ok(Box::new(sink));
        }
        if !self.command.trim().is_empty() {
            return Ok(Box::new(ShellCommandSink::new(
                self.command.clone(),
                self.command_timeout_seconds,
            )));
        }
        Ok(Box::new(LogSink))
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 3838,
        }
    }
}

impl ApiConfig {
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub min_delay_seconds: u64,
    pub max_delay_seconds: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            min_delay_seconds: 2,
            max_delay_seconds: 60,
        }
    }
}

impl ReconnectConfig {
    pub fn min_delay(&self) -> Duration {
        Duration::from_secs(self.min_delay_seconds).clamp(MIN_RETRY_DELAY, MAX_RETRY_DELAY)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_seconds).clamp(self.min_delay(), MAX_RETRY_DELAY)
    }

    /// Pull out-of-range delays back into bounds.
    fn normalize(&mut self) {
        let (min, max) = (self.min_delay().as_secs(), self.max_delay().as_secs());
        if (min, max) != (self.min_delay_seconds, self.max_delay_seconds) {
            warn!(
                "Reconnect delays {}s..{}s out of range; using {}s..{}s",
                self.min_delay_seconds, self.max_delay_seconds, min, max
            );
            self.min_delay_seconds = min;
            self.max_delay_seconds = max;
        }
    }
}

impl Config {
    /// Load the user config, creating it with defaults on first run, then
    /// apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        let mut config: Self = toml::from_str(&content).context("Failed to parse config file")?;
        config.reconnect.normalize();

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let topic = std::iter::once(config_env::TOPIC)
            .chain(config_env::MQTT_TOPICS)
            .find_map(|key| lookup(key));
        if let Some(topic) = topic {
            self.publisher.topic = topic;
        }
        if let Some(url) = lookup(config_env::MQTT_URL) {
            self.publisher.mqtt_url = url;
        }
        if let Some(user) = lookup(config_env::MQTT_USER) {
            self.publisher.mqtt_user = user;
        }
        if let Some(pass) = lookup(config_env::MQTT_PASS) {
            self.publisher.mqtt_pass = pass;
        }
        if let Some(url) = lookup(config_env::WEBHOOK_URL) {
            self.publisher.webhook_url = url;
        }
        if let Some(command) = lookup(config_env::COMMAND) {
            self.publisher.command = command;
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        global::config_file()
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}
