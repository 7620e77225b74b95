//! Core domain types for the Tombola giveaway engine
//!
//! This crate holds the vocabulary shared by the store and the lifecycle
//! engine: identifiers, the cycle state enum, correlation tokens used to
//! match inbound platform events to a running cycle, the persisted record
//! shapes, and the engine configuration.

pub mod config;
pub mod identifiers;
pub mod records;
pub mod state;
pub mod token;

pub use config::{EngineConfig, RepickPolicy};
pub use identifiers::{CycleId, DestinationId, GroupId, ParticipantId, PrizeId};
pub use records::{Cycle, DestinationRecord, Entry, PrizeToken};
pub use state::CycleState;
pub use token::{CorrelationToken, TokenError, TokenKind};
