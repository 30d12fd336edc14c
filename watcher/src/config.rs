//! Configuration management for the balance watcher

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::types::{MinimumBalanceThresholds, ThresholdConfig};

/// Main configuration structure for the watcher
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Node API connection settings
    pub node: NodeConfig,

    /// Poll scheduling
    pub polling: PollingConfig,

    /// Minimum balances below which a warning fires, in base units
    pub thresholds: ThresholdConfig,

    /// Notification delivery settings
    pub notifications: NotificationConfig,
}

/// Node API connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Base URL of the node API; polling is disabled while unset
    pub api_endpoint: Option<String>,

    /// Token sent as `x-auth-token`
    pub api_token: Option<String>,

    /// Request timeout in seconds
    pub request_timeout_seconds: u64,
}

/// Poll scheduling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Whether polling starts active
    pub enabled: bool,

    /// Seconds between two polls
    pub interval_seconds: u64,
}

/// Notification delivery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// How long a balance-increase toast stays visible; `None` keeps it until dismissed
    pub toast_timeout_ms: Option<u64>,

    /// Maximum notifications retained by the store
    pub max_history: usize,

    /// Capacity of the toast broadcast channel
    pub channel_capacity: usize,

    /// Page linked from the low-balance warning
    pub funding_url: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            api_endpoint: None,
            api_token: None,
            request_timeout_seconds: 10,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 60,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            toast_timeout_ms: Some(5_000),
            max_history: 100,
            channel_capacity: 64,
            funding_url: None,
        }
    }
}

impl WatcherConfig {
    /// Load configuration from files and environment
    ///
    /// An explicit `path` replaces the `config/` lookup; environment variables
    /// prefixed with `HOPR_WATCHER__` are always layered on top.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        builder = match path {
            Some(path) => builder.add_source(File::with_name(path)),
            None => builder
                .add_source(File::with_name("config/default").required(false))
                .add_source(
                    File::with_name(&format!(
                        "config/{}",
                        std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into())
                    ))
                    .required(false),
                )
                .add_source(File::with_name("config/local").required(false)),
        };

        builder
            .add_source(Environment::with_prefix("HOPR_WATCHER").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(endpoint) = &self.node.api_endpoint {
            if Url::parse(endpoint).is_err() {
                return Err(ConfigError::Message(format!(
                    "Invalid node API endpoint: {}",
                    endpoint
                )));
            }
        }

        if self.polling.interval_seconds == 0 {
            return Err(ConfigError::Message(
                "polling.interval_seconds must be greater than 0".into(),
            ));
        }

        if self.node.request_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "node.request_timeout_seconds must be greater than 0".into(),
            ));
        }

        if self.notifications.max_history == 0 {
            return Err(ConfigError::Message(
                "notifications.max_history must be greater than 0".into(),
            ));
        }

        if self.notifications.channel_capacity == 0 {
            return Err(ConfigError::Message(
                "notifications.channel_capacity must be greater than 0".into(),
            ));
        }

        if let Some(url) = &self.notifications.funding_url {
            if Url::parse(url).is_err() {
                return Err(ConfigError::Message(format!("Invalid funding URL: {}", url)));
            }
        }

        self.thresholds
            .to_thresholds()
            .map_err(|e| ConfigError::Message(format!("Invalid threshold: {}", e)))?;

        Ok(())
    }

    /// Parsed minimum balances
    pub fn minimum_balances(&self) -> crate::Result<MinimumBalanceThresholds> {
        self.thresholds.to_thresholds()
    }

    /// Interval between polls
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.polling.interval_seconds)
    }

    /// Timeout applied to each node API request
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.node.request_timeout_seconds)
    }

    /// Lifetime of balance-increase toasts
    pub fn toast_timeout(&self) -> Option<Duration> {
        self.notifications.toast_timeout_ms.map(Duration::from_millis)
    }
}
