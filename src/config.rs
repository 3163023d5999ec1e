//! Timer service configuration
//!
//! All tunable parameters for a [`TimerService`](crate::service::TimerService).
//! Values can be built in code, or loaded from JSON.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::queue::MAX_QUEUE_CAPACITY;
use crate::timer::bounded_label;

/// Upper bound on registry slots.
pub const MAX_TIMER_SLOTS: usize = 1024;

/// Smallest stack accepted for the daemon thread.
const MIN_DAEMON_STACK: usize = 16 * 1024;

/// What a repeating timer does when the daemon wakes more than one period late.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatchUpPolicy {
    /// Skip the missed deadlines, fire once, resume from `now + period`.
    #[default]
    Coalesce,
    /// Fire once per missed deadline, back to back, keeping the original anchor.
    Burst,
}

/// Core timer service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerServiceConfig {
    // --- Command channel ---
    /// Capacity of the command queue between callers and the daemon
    pub command_queue_depth: usize,

    // --- Registry ---
    /// Number of timer slots
    pub max_timers: usize,

    // --- Daemon ---
    /// Missed-tick policy for repeating timers
    pub catch_up: CatchUpPolicy,
    /// Daemon thread name
    pub daemon_name: heapless::String<16>,
    /// Daemon thread stack size in bytes (platform default when `None`)
    pub daemon_stack_size: Option<usize>,
}

impl Default for TimerServiceConfig {
    fn default() -> Self {
        Self {
            command_queue_depth: 10,
            max_timers: 32,
            catch_up: CatchUpPolicy::Coalesce,
            daemon_name: bounded_label("sw-timer"),
            daemon_stack_size: None,
        }
    }
}

impl TimerServiceConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|_| Error::InvalidArgument("config is not valid JSON"))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range values instead of clamping them.
    pub fn validate(&self) -> Result<()> {
        if self.command_queue_depth == 0 || self.command_queue_depth > MAX_QUEUE_CAPACITY {
            return Err(Error::InvalidArgument("command_queue_depth out of range"));
        }
        if self.max_timers == 0 || self.max_timers > MAX_TIMER_SLOTS {
            return Err(Error::InvalidArgument("max_timers out of range"));
        }
        if self.daemon_stack_size.is_some_and(|s| s < MIN_DAEMON_STACK) {
            return Err(Error::InvalidArgument("daemon_stack_size too small"));
        }
        Ok(())
    }
}
