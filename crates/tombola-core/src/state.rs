//! The cycle state machine vocabulary
//!
//! States are persisted as small integers. `Closed` keeps the `-1` sentinel
//! so the partial unique index on non-closed cycles stays a single
//! `state != -1` predicate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The state a giveaway cycle is in
///
/// Exactly one cycle may be in a non-[`CycleState::Closed`] state at any
/// time; the store enforces this with a partial unique index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CycleState {
    /// The cycle was just created and the announcement broadcast is due
    Announcing,
    /// The entry window is open
    AwaitingEntries,
    /// A winner is being selected among the entries
    PickingWinner,
    /// A claim prompt is outstanding with one picked participant
    Confirming,
    /// A winner confirmed; the completion broadcast is due
    Finished,
    /// Terminal state, kept as history
    Closed,
}

impl CycleState {
    /// Persisted integer representation
    pub fn as_i64(self) -> i64 {
        match self {
            CycleState::Announcing => 0,
            CycleState::AwaitingEntries => 1,
            CycleState::PickingWinner => 2,
            CycleState::Confirming => 3,
            CycleState::Finished => 4,
            CycleState::Closed => -1,
        }
    }

    /// Decode the persisted integer representation
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(CycleState::Announcing),
            1 => Some(CycleState::AwaitingEntries),
            2 => Some(CycleState::PickingWinner),
            3 => Some(CycleState::Confirming),
            4 => Some(CycleState::Finished),
            -1 => Some(CycleState::Closed),
            _ => None,
        }
    }

    /// Whether the cycle accepts registration events in this state
    pub fn accepts_entries(self) -> bool {
        matches!(
            self,
            CycleState::AwaitingEntries | CycleState::PickingWinner
        )
    }

    /// Whether this is the terminal state
    pub fn is_closed(self) -> bool {
        matches!(self, CycleState::Closed)
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleState::Announcing => "announcing",
            CycleState::AwaitingEntries => "awaiting-entries",
            CycleState::PickingWinner => "picking-winner",
            CycleState::Confirming => "confirming",
            CycleState::Finished => "finished",
            CycleState::Closed => "closed",
        };
        f.write_str(name)
    }
}
