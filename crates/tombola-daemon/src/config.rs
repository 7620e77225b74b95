//! Daemon configuration file
//!
//! A small TOML file; every engine knob is optional and falls back to the
//! defaults in [`EngineConfig`]. Durations are whole seconds, which is as
//! fine-grained as the giveaway cadence ever needs.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tombola_core::{EngineConfig, RepickPolicy};

/// Top-level daemon configuration
#[derive(Debug, Deserialize)]
pub struct DaemonConfig {
    /// Path of the SQLite database file
    pub database: PathBuf,
    /// Base URL webhook deliveries are posted under
    pub webhook_base_url: String,
    /// Engine timing overrides
    #[serde(default)]
    pub engine: EngineSection,
}

/// The `[engine]` section
#[derive(Debug, Default, Deserialize)]
pub struct EngineSection {
    /// Seconds the entry window stays open
    pub entry_window_secs: Option<u64>,
    /// Seconds a picked winner has to confirm
    pub claim_window_secs: Option<u64>,
    /// Seconds between failed confirmation and the next pick
    pub retry_backoff_secs: Option<u64>,
    /// Seconds between cycles
    pub cycle_delay_secs: Option<u64>,
    /// Destinations per concurrent broadcast batch
    pub broadcast_batch: Option<usize>,
    /// Exclude participants who failed to confirm from re-picks
    pub exclude_failed_winners: Option<bool>,
}

impl DaemonConfig {
    /// Parse a TOML configuration document
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Resolve the engine configuration with defaults filled in
    pub fn engine_config(&self) -> EngineConfig {
        let defaults = EngineConfig::default();
        let secs = Duration::from_secs;
        EngineConfig {
            entry_window: self
                .engine
                .entry_window_secs
                .map(secs)
                .unwrap_or(defaults.entry_window),
            claim_window: self
                .engine
                .claim_window_secs
                .map(secs)
                .unwrap_or(defaults.claim_window),
            retry_backoff: self
                .engine
                .retry_backoff_secs
                .map(secs)
                .unwrap_or(defaults.retry_backoff),
            cycle_delay: self
                .engine
                .cycle_delay_secs
                .map(secs)
                .unwrap_or(defaults.cycle_delay),
            broadcast_batch: self.engine.broadcast_batch.unwrap_or(defaults.broadcast_batch),
            repick_policy: match self.engine.exclude_failed_winners {
                Some(true) => RepickPolicy::ExcludeFailed,
                Some(false) | None => defaults.repick_policy,
            },
        }
    }
}
