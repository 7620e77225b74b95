//! Lifecycle engine for recurring giveaway cycles
//!
//! The engine is the only component with agency: one long-lived loop claims
//! a prize, announces it everywhere, collects entries, races a winner
//! through a confirmation window and closes the cycle, surviving restarts
//! by resuming whatever state the store last persisted.
//!
//! Inbound platform events (entry buttons, claim buttons) arrive through
//! [`EventGate`], decoupled from the loop; they validate against the
//! *current* cycle and rely on storage constraints for concurrent safety.

pub mod broadcast;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod events;
pub mod transport;

pub use broadcast::{Broadcaster, DeliveryResult};
pub use delivery::{
    DeliveryError, DeliveryReceipt, Messenger, RenderedMessage, Renderer, TextRenderer,
};
pub use engine::LifecycleEngine;
pub use error::{EngineError, Result};
pub use events::{ConfirmationResponse, EntryResponse, EventGate, RejectReason};
pub use transport::WebhookMessenger;
