//! Persisted record shapes
//!
//! These mirror the rows the store keeps. Timestamps are unix seconds in
//! UTC, assigned by the store when the row is inserted.

use crate::identifiers::{CycleId, DestinationId, GroupId, ParticipantId, PrizeId};
use crate::state::CycleState;
use serde::{Deserialize, Serialize};

/// A donated prize token
///
/// The payload is the secret the winner receives. A token is claimed by at
/// most one cycle and is never deleted, even when its cycle closes without
/// a winner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeToken {
    /// Row id
    pub id: PrizeId,
    /// The secret handed to the winner
    pub payload: String,
    /// Optional message the donor attached
    pub message: Option<String>,
    /// Whether a cycle has claimed this token
    pub claimed: bool,
}

/// One giveaway cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cycle {
    /// Row id
    pub id: CycleId,
    /// The prize token this cycle gives away
    pub prize_id: PrizeId,
    /// The confirmed winner, once one exists
    pub winner: Option<ParticipantId>,
    /// Current lifecycle state
    pub state: CycleState,
    /// Unix seconds when the cycle was created
    pub created_at: i64,
}

/// A participant's registered interest in a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// The cycle entered
    pub cycle_id: CycleId,
    /// The group through which the participant can be reached
    pub group_id: GroupId,
    /// The participant who entered
    pub participant_id: ParticipantId,
    /// Unix seconds when the entry was created
    pub created_at: i64,
}

/// A broadcast destination with its delivery credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationRecord {
    /// Row id
    pub id: DestinationId,
    /// The subscribed group this destination belongs to
    pub group_id: GroupId,
    /// Platform delivery endpoint id
    pub delivery_id: String,
    /// Platform delivery endpoint token
    pub delivery_token: String,
}
