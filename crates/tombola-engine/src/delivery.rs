//! The delivery seam between the engine and the messaging platform
//!
//! The engine never talks to a network itself. It renders messages through
//! a [`Renderer`] and hands them to a [`Messenger`]; the platform adapter
//! decides what a destination and a receipt actually are.

use async_trait::async_trait;
use thiserror::Error;
use tombola_core::{CorrelationToken, Cycle, DestinationRecord, ParticipantId};

/// A message ready for delivery
///
/// Rendering specifics live outside the engine; all the engine guarantees
/// is that interactive messages carry a correlation token in `action` so
/// the resulting button press can be matched back to the cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    /// Display text
    pub text: String,
    /// Token to attach to the message's interactive button, if any
    pub action: Option<String>,
}

/// Proof that a message was delivered, sufficient to retract it later
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Platform-assigned id of the delivered message
    pub message_id: String,
}

/// A failed delivery to one destination
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The destination endpoint could not be reached
    #[error("destination unreachable: {0}")]
    Unreachable(String),

    /// The destination rejected our credentials; its record is stale
    #[error("destination revoked delivery credentials")]
    Revoked,
}

/// Asynchronous message delivery to one destination
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Deliver `message` to `destination`
    async fn send(
        &self,
        destination: &DestinationRecord,
        message: &RenderedMessage,
    ) -> std::result::Result<DeliveryReceipt, DeliveryError>;

    /// Remove a previously delivered message; best-effort
    async fn retract(
        &self,
        destination: &DestinationRecord,
        receipt: &DeliveryReceipt,
    ) -> std::result::Result<(), DeliveryError>;
}

/// Renders the three message shapes a cycle produces
pub trait Renderer: Send + Sync {
    /// The broadcast announcing a new cycle
    fn announcement(&self, cycle: &Cycle) -> RenderedMessage;
    /// The direct prompt asking a picked participant to claim
    fn claim_prompt(&self, cycle: &Cycle, participant: &ParticipantId) -> RenderedMessage;
    /// The broadcast naming the winner
    fn completion(&self, cycle: &Cycle, winner: &ParticipantId) -> RenderedMessage;
}

/// Plain-text renderer
///
/// Good enough for logs, tests and text-only transports; richer adapters
/// supply their own [`Renderer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TextRenderer;

impl Renderer for TextRenderer {
    fn announcement(&self, cycle: &Cycle) -> RenderedMessage {
        let token = CorrelationToken::entry(cycle.id);
        RenderedMessage {
            text: format!("New giveaway! Someone is giving out a game. [{token}]"),
            action: Some(token.to_string()),
        }
    }

    fn claim_prompt(&self, cycle: &Cycle, participant: &ParticipantId) -> RenderedMessage {
        let token = CorrelationToken::claim(cycle.id);
        RenderedMessage {
            text: format!("@{participant} you won! Press the button to claim your prize."),
            action: Some(token.to_string()),
        }
    }

    fn completion(&self, _cycle: &Cycle, winner: &ParticipantId) -> RenderedMessage {
        RenderedMessage {
            text: format!("Giveaway finished: @{winner} won."),
            action: None,
        }
    }
}
