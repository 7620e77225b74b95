//! Engine configuration
//!
//! Defaults match the cadence the service has always run at: a three minute
//! pause between cycles, a one minute entry window, a thirty second claim
//! window and a one minute backoff between winner attempts.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Whether a participant who failed to confirm may be picked again within
/// the same cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepickPolicy {
    /// A failed participant stays in the pool and may be re-picked
    Allow,
    /// A failed participant is excluded from later picks in this cycle
    ExcludeFailed,
}

/// Timing and batching knobs for the lifecycle engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long entries are collected after the announcement
    pub entry_window: Duration,
    /// How long a picked participant has to confirm their claim
    pub claim_window: Duration,
    /// Pause between a failed confirmation and the next pick
    pub retry_backoff: Duration,
    /// Pause between one cycle closing and the next starting
    pub cycle_delay: Duration,
    /// Destinations dispatched concurrently per broadcast batch
    pub broadcast_batch: usize,
    /// Re-pick behavior for participants who failed to confirm
    pub repick_policy: RepickPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            entry_window: Duration::from_secs(60),
            claim_window: Duration::from_secs(30),
            retry_backoff: Duration::from_secs(60),
            cycle_delay: Duration::from_secs(180),
            broadcast_batch: 50,
            repick_policy: RepickPolicy::Allow,
        }
    }
}
