//! Configuration for the sync client.

use std::env;
use std::time::Duration;

/// Client configuration.
///
/// `Default` gives production-shaped values; tests shrink the intervals.
#[derive(Debug, Clone)]
pub struct Config {
    /// Websocket URL of the persistent channel
    pub channel_url: String,
    /// Base URL of the delta-sync and mutation endpoints
    pub api_url: String,
    /// Name of the global topic every client joins
    pub global_topic: String,
    /// First reconnect delay; doubles per attempt
    pub reconnect_base_delay: Duration,
    /// Upper bound on the reconnect delay
    pub reconnect_max_delay: Duration,
    /// Reconnect attempts before the failure becomes terminal
    pub max_reconnect_attempts: u32,
    /// Keepalive period while connected and visible
    pub heartbeat_interval: Duration,
    /// Periodic reconciliation interval while connected
    pub sync_interval: Duration,
    /// Lookback window for the first run without a persisted checkpoint
    pub first_run_lookback: Duration,
    /// Minimum spacing between activity-driven session refreshes
    pub refresh_throttle: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel_url: "ws://localhost:3000/channel".to_string(),
            api_url: "http://localhost:3000".to_string(),
            global_topic: "records".to_string(),
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
            max_reconnect_attempts: 8,
            heartbeat_interval: Duration::from_secs(30),
            sync_interval: Duration::from_secs(60),
            first_run_lookback: Duration::from_secs(24 * 60 * 60),
            refresh_throttle: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for everything but the endpoints.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let channel_url =
            env::var("TETHER_CHANNEL_URL").map_err(|_| ConfigError::MissingChannelUrl)?;
        let api_url = env::var("TETHER_API_URL").map_err(|_| ConfigError::MissingApiUrl)?;

        let max_reconnect_attempts = match env::var("TETHER_MAX_RECONNECT_ATTEMPTS") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidValue("TETHER_MAX_RECONNECT_ATTEMPTS"))?,
            Err(_) => defaults.max_reconnect_attempts,
        };

        let heartbeat_interval = match env::var("TETHER_HEARTBEAT_SECS") {
            Ok(raw) => Duration::from_secs(
                raw.parse()
                    .map_err(|_| ConfigError::InvalidValue("TETHER_HEARTBEAT_SECS"))?,
            ),
            Err(_) => defaults.heartbeat_interval,
        };

        let sync_interval = match env::var("TETHER_SYNC_INTERVAL_SECS") {
            Ok(raw) => Duration::from_secs(
                raw.parse()
                    .map_err(|_| ConfigError::InvalidValue("TETHER_SYNC_INTERVAL_SECS"))?,
            ),
            Err(_) => defaults.sync_interval,
        };

        Ok(Self {
            channel_url,
            api_url,
            max_reconnect_attempts,
            heartbeat_interval,
            sync_interval,
            ..defaults
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("TETHER_CHANNEL_URL environment variable is required")]
    MissingChannelUrl,

    #[error("TETHER_API_URL environment variable is required")]
    MissingApiUrl,

    #[error("Invalid value for {0}")]
    InvalidValue(&'static str),
}
