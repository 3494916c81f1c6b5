//! Watcher configuration.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Configuration for a watcher instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Chain RPC endpoint URL.
    pub endpoint: String,
    /// Head polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Failures tolerated per tick before escalation.
    pub max_attempts: u32,
    /// Directory for the persisted aggregate.
    pub data_dir: String,
    /// Logical name of the persisted state document.
    pub state_name: String,
    /// Cron expression for the scheduled reporting pass.
    pub report_cron: String,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://rpc.invalid/ws".into(),
            poll_interval_ms: 3000,
            max_attempts: 5,
            data_dir: "./data".into(),
            state_name: "poolwatch".into(),
            report_cron: "0 8 * * *".into(),
        }
    }
}

impl WatchConfig {
    /// Read overrides from the environment on top of the defaults.
    ///
    /// Recognized: `POOLWATCH_ENDPOINT`, `POOLWATCH_POLL_INTERVAL_MS`,
    /// `POOLWATCH_MAX_ATTEMPTS`, `POOLWATCH_DATA_DIR`,
    /// `POOLWATCH_STATE_NAME`, `POOLWATCH_REPORT_CRON`. Unparseable numbers
    /// fall back to the default with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("POOLWATCH_ENDPOINT") {
            config.endpoint = v;
        }
        if let Ok(v) = std::env::var("POOLWATCH_POLL_INTERVAL_MS") {
            match v.parse() {
                Ok(ms) => config.poll_interval_ms = ms,
                Err(_) => warn!(value = %v, "invalid POOLWATCH_POLL_INTERVAL_MS, using default"),
            }
        }
        if let Ok(v) = std::env::var("POOLWATCH_MAX_ATTEMPTS") {
            match v.parse() {
                Ok(n) => config.max_attempts = n,
                Err(_) => warn!(value = %v, "invalid POOLWATCH_MAX_ATTEMPTS, using default"),
            }
        }
        if let Ok(v) = std::env::var("POOLWATCH_DATA_DIR") {
            config.data_dir = v;
        }
        if let Ok(v) = std::env::var("POOLWATCH_STATE_NAME") {
            config.state_name = v;
        }
        if let Ok(v) = std::env::var("POOLWATCH_REPORT_CRON") {
            config.report_cron = v;
        }
        config
    }
}
