//! Orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the job orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Delay between opening consecutive target surfaces (milliseconds).
    /// Gives the previous surface time to take focus and start loading.
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Close each surface once its target reaches a terminal state.
    /// When disabled, finished surfaces stay listed until an operator closes them.
    #[serde(default = "default_close_surfaces")]
    pub close_surfaces_on_completion: bool,

    /// Capacity of the job event broadcast channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_settle_delay() -> u64 {
    1000
}

fn default_close_surfaces() -> bool {
    true
}

fn default_event_buffer() -> usize {
    256
}

impl OrchestratorConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay(),
            close_surfaces_on_completion: default_close_surfaces(),
            event_buffer: default_event_buffer(),
        }
    }
}
