//! Relational store for the Tombola giveaway engine
//!
//! Backed by SQLite through a single shared connection. Correctness under
//! concurrent registration does not rely on in-memory locks: every invariant
//! the engine depends on is a storage constraint.
//!
//! - at most one non-closed cycle (partial unique index on `cycles`)
//! - one entry per participant per cycle (composite primary key)
//! - a prize token claimed by at most one cycle (`cycles.prize_id` UNIQUE)
//!
//! Schema changes go through the ordered migration list in [`migrations`];
//! applied migrations are recorded in a metadata key-value table so running
//! the migrator again is a no-op.

mod database;
mod error;

pub mod cycles;
pub mod destinations;
pub mod entries;
pub mod migrations;
pub mod prizes;

pub use database::Database;
pub use error::{Result, StoreError};
