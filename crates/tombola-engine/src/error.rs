//! Error types for the engine

use thiserror::Error;
use tombola_core::CycleId;

/// Engine error types
///
/// Delivery failures never show up here: they are handled per destination
/// inside the broadcast and confirmation paths. What propagates is the
/// store, which the engine cannot make progress without.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A store operation failed
    #[error(transparent)]
    Store(#[from] tombola_store::StoreError),

    /// A cycle the engine was driving disappeared from the store
    #[error("cycle {0} vanished mid-drive")]
    CycleVanished(CycleId),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
