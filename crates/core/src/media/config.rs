//! Configuration for the media module.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for fetching and staging media.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Total fetch attempts per asset.
    #[serde(default = "default_fetch_attempts")]
    pub fetch_attempts: u32,

    /// Fixed delay between fetch attempts in milliseconds.
    #[serde(default = "default_fetch_retry_delay")]
    pub fetch_retry_delay_ms: u64,

    /// How long an upload input stays disabled after files are assigned.
    #[serde(default = "default_processing_window")]
    pub processing_window_ms: u64,

    /// Timeout of a single HTTP fetch in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

fn default_fetch_attempts() -> u32 {
    3
}

fn default_fetch_retry_delay() -> u64 {
    500
}

fn default_processing_window() -> u64 {
    1000
}

fn default_fetch_timeout() -> u64 {
    30
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            fetch_attempts: default_fetch_attempts(),
            fetch_retry_delay_ms: default_fetch_retry_delay(),
            processing_window_ms: default_processing_window(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

impl MediaConfig {
    pub fn fetch_retry_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_retry_delay_ms)
    }

    pub fn processing_window(&self) -> Duration {
        Duration::from_millis(self.processing_window_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
