//! Inbound event handling
//!
//! Entry and confirmation events arrive from the platform adapter at any
//! time, interleaved with the engine loop. Both correlate to a cycle by the
//! opaque token baked into the message they came from, and both validate
//! against the *current* unfinished cycle: by the time an event is handled
//! the loop may have moved on, in which case the event is rejected with a
//! user-visible notice rather than queued.

use crate::error::Result;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tombola_core::{CorrelationToken, CycleId, GroupId, ParticipantId, TokenKind};
use tombola_store::{cycles, entries, Database};
use tracing::{debug, info};

/// Why an entry event was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// No cycle is running at all
    NoActiveCycle,
    /// The event references a cycle that is not the running one
    WrongCycle,
    /// The running cycle is past the point of accepting entries
    NotAcceptingEntries,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            RejectReason::NoActiveCycle => "there is no giveaway running",
            RejectReason::WrongCycle => "this giveaway has already ended",
            RejectReason::NotAcceptingEntries => "this giveaway is not accepting entries",
        };
        f.write_str(text)
    }
}

/// Outcome of an entry event, to be shown to the participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryResponse {
    /// A new entry was registered
    Accepted(CorrelationToken),
    /// The participant had already entered this cycle
    AlreadyEntered(CorrelationToken),
    /// The event was valid but stale or mistimed
    Rejected(RejectReason),
}

/// Outcome of a confirmation event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationResponse {
    /// The pending claim was completed by this event
    Confirmed,
    /// No matching claim was outstanding
    Stale,
}

/// The claim the engine is currently waiting on, if any
struct PendingClaim {
    cycle: CycleId,
    participant: ParticipantId,
    signal: oneshot::Sender<()>,
}

/// Entry point for events coming from the messaging platform
///
/// Cheap to clone; the platform adapter keeps one and calls it from its
/// event callbacks while the engine loop holds another to arm and disarm
/// the pending claim.
#[derive(Clone)]
pub struct EventGate {
    db: Database,
    pending: Arc<Mutex<Option<PendingClaim>>>,
}

impl EventGate {
    /// Create a gate over the shared database
    pub fn new(db: Database) -> Self {
        Self {
            db,
            pending: Arc::new(Mutex::new(None)),
        }
    }

    /// Handle a registration event
    ///
    /// `Ok(None)` means the token was not one of ours and the event should
    /// be ignored entirely. Anything else carries the response to show the
    /// participant. Duplicate protection is the storage constraint, so
    /// concurrent registrations of the same participant are safe.
    pub fn handle_entry(
        &self,
        token: &str,
        group: &GroupId,
        participant: &ParticipantId,
    ) -> Result<Option<EntryResponse>> {
        let Ok(token) = token.parse::<CorrelationToken>() else {
            debug!(token, "ignoring undecodable event token");
            return Ok(None);
        };
        if token.kind != TokenKind::Entry {
            return Ok(None);
        }

        let Some(cycle) = self.db.with(cycles::unfinished)? else {
            return Ok(Some(EntryResponse::Rejected(RejectReason::NoActiveCycle)));
        };
        if cycle.id != token.cycle {
            return Ok(Some(EntryResponse::Rejected(RejectReason::WrongCycle)));
        }
        if !cycle.state.accepts_entries() {
            return Ok(Some(EntryResponse::Rejected(
                RejectReason::NotAcceptingEntries,
            )));
        }

        let inserted = self
            .db
            .with(|conn| entries::register(conn, cycle.id, group, participant))?;
        if inserted {
            info!(cycle = %cycle.id, participant = %participant, "entry registered");
            Ok(Some(EntryResponse::Accepted(token)))
        } else {
            Ok(Some(EntryResponse::AlreadyEntered(token)))
        }
    }

    /// Handle a claim confirmation event
    ///
    /// Completes the pending claim when the token and participant match the
    /// one the engine is waiting on; everything else is stale. `Ok(None)`
    /// again means "not our token".
    pub fn handle_confirmation(
        &self,
        token: &str,
        participant: &ParticipantId,
    ) -> Result<Option<ConfirmationResponse>> {
        let Ok(token) = token.parse::<CorrelationToken>() else {
            return Ok(None);
        };
        if token.kind != TokenKind::Claim {
            return Ok(None);
        }

        let mut slot = self.pending.lock().expect("pending claim lock");
        let matches = slot
            .as_ref()
            .map(|claim| claim.cycle == token.cycle && claim.participant == *participant)
            .unwrap_or(false);
        if !matches {
            return Ok(Some(ConfirmationResponse::Stale));
        }

        let claim = slot.take().expect("checked above");
        // The engine may have timed out and dropped the receiver already;
        // that race resolves as a stale confirmation.
        if claim.signal.send(()).is_ok() {
            info!(cycle = %token.cycle, participant = %participant, "winner confirmed");
            Ok(Some(ConfirmationResponse::Confirmed))
        } else {
            Ok(Some(ConfirmationResponse::Stale))
        }
    }

    /// Arm the gate for one claim attempt; the returned receiver resolves
    /// when a matching confirmation arrives
    pub(crate) fn arm(&self, cycle: CycleId, participant: ParticipantId) -> oneshot::Receiver<()> {
        let (signal, receiver) = oneshot::channel();
        let mut slot = self.pending.lock().expect("pending claim lock");
        *slot = Some(PendingClaim {
            cycle,
            participant,
            signal,
        });
        receiver
    }

    /// Drop the pending claim after a confirmation window ends
    pub(crate) fn disarm(&self) {
        let mut slot = self.pending.lock().expect("pending claim lock");
        *slot = None;
    }
}
