//! Broadcast fan-out
//!
//! Delivers one message to every registered destination. Awaiting each send
//! individually would cost latency times the number of destinations, so the
//! registry is streamed in fixed-size batches and every send in a batch is
//! dispatched before any of them is awaited. Failures are per destination
//! and never abort the batch.

use crate::delivery::{DeliveryError, DeliveryReceipt, Messenger, RenderedMessage};
use crate::error::Result;
use futures::future::join_all;
use std::sync::Arc;
use tombola_core::{DestinationId, GroupId};
use tombola_store::{destinations, Database};
use tracing::{debug, warn};

/// Outcome of delivering one broadcast message to one destination
#[derive(Debug)]
pub struct DeliveryResult {
    /// The destination that was attempted
    pub destination: DestinationId,
    /// The group the destination serves
    pub group: GroupId,
    /// Per-destination outcome; failure here never fails the broadcast
    pub outcome: std::result::Result<DeliveryReceipt, DeliveryError>,
}

/// Fan-out dispatcher over the destination registry
#[derive(Clone)]
pub struct Broadcaster {
    db: Database,
    messenger: Arc<dyn Messenger>,
    batch_size: usize,
}

impl Broadcaster {
    /// Create a broadcaster reading destinations from `db` and delivering
    /// through `messenger`, `batch_size` destinations at a time
    pub fn new(db: Database, messenger: Arc<dyn Messenger>, batch_size: usize) -> Self {
        Self {
            db,
            messenger,
            batch_size: batch_size.max(1),
        }
    }

    /// Deliver `message` to every registered destination
    ///
    /// Returns one result per destination. An empty registry yields an
    /// empty list, which is a successful broadcast to nobody.
    pub async fn broadcast(&self, message: &RenderedMessage) -> Result<Vec<DeliveryResult>> {
        let mut results = Vec::new();
        let mut after = None;

        loop {
            let batch = self
                .db
                .with(|conn| destinations::page(conn, after, self.batch_size))?;
            if batch.is_empty() {
                break;
            }
            after = batch.last().map(|record| record.id);

            let sends = batch.into_iter().map(|record| {
                let messenger = Arc::clone(&self.messenger);
                async move {
                    let outcome = messenger.send(&record, message).await;
                    if let Err(err) = &outcome {
                        warn!(
                            destination = %record.id,
                            group = %record.group_id,
                            error = %err,
                            "broadcast delivery failed"
                        );
                    }
                    DeliveryResult {
                        destination: record.id,
                        group: record.group_id,
                        outcome,
                    }
                }
            });
            results.extend(join_all(sends).await);
        }

        debug!(
            delivered = results.iter().filter(|r| r.outcome.is_ok()).count(),
            failed = results.iter().filter(|r| r.outcome.is_err()).count(),
            "broadcast complete"
        );
        Ok(results)
    }
}
