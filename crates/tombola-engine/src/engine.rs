//! The lifecycle state machine
//!
//! One cycle moves through announcing → awaiting entries → picking a winner
//! (with a confirmation race per pick) → finished → closed. The machine is
//! an explicit loop: each state has a handler that does its work and
//! returns the next state, which is persisted before the next handler runs.
//! Because every transition is durable, a restart resumes exactly where the
//! last process stopped.

use crate::broadcast::Broadcaster;
use crate::delivery::{Messenger, Renderer};
use crate::error::{EngineError, Result};
use crate::events::EventGate;
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tombola_core::{Cycle, CycleState, EngineConfig, RepickPolicy};
use tombola_store::{cycles, destinations, entries, prizes, Database};
use tracing::{debug, error, info, warn};

/// The long-lived giveaway engine
///
/// Owns the scheduling loop and the per-state handlers. All collaborators
/// are injected at construction; the engine holds no global state.
pub struct LifecycleEngine {
    db: Database,
    messenger: Arc<dyn Messenger>,
    renderer: Arc<dyn Renderer>,
    config: EngineConfig,
    broadcaster: Broadcaster,
    gate: EventGate,
}

impl LifecycleEngine {
    /// Create an engine over the shared database and delivery seam
    pub fn new(
        db: Database,
        messenger: Arc<dyn Messenger>,
        renderer: Arc<dyn Renderer>,
        config: EngineConfig,
    ) -> Self {
        let broadcaster = Broadcaster::new(db.clone(), Arc::clone(&messenger), config.broadcast_batch);
        let gate = EventGate::new(db.clone());
        Self {
            db,
            messenger,
            renderer,
            config,
            broadcaster,
            gate,
        }
    }

    /// The gate the platform adapter feeds inbound events into
    pub fn gate(&self) -> EventGate {
        self.gate.clone()
    }

    /// Run the scheduling loop; never returns under normal operation
    ///
    /// Failed attempts are logged and retried after the inter-cycle delay;
    /// whatever state was persisted last is picked up by recovery on the
    /// next iteration.
    pub async fn run(&self) -> Result<()> {
        loop {
            if let Err(err) = self.run_once().await {
                error!(error = %err, "giveaway cycle failed; will retry after delay");
            }
            sleep(self.config.cycle_delay).await;
        }
    }

    /// Recover or start one cycle and drive it to closed
    ///
    /// A no-op when the prize pool is empty. Exposed for tests; production
    /// callers use [`LifecycleEngine::run`].
    pub async fn run_once(&self) -> Result<()> {
        let cycle = match self.db.with(cycles::unfinished)? {
            Some(cycle) => {
                info!(cycle = %cycle.id, state = %cycle.state, "resuming in-flight cycle");
                cycle
            }
            None => match self.create_cycle()? {
                Some(cycle) => cycle,
                None => {
                    info!("prize pool is empty, skipping this round");
                    return Ok(());
                }
            },
        };
        self.drive(cycle).await
    }

    /// Claim a prize and create the cycle record in one transaction
    ///
    /// Either both commit or neither does, so a failed creation never
    /// strands a claimed token. An empty pool is a normal `None`.
    fn create_cycle(&self) -> Result<Option<Cycle>> {
        let created = self.db.transaction(|tx| {
            let Some(prize) = prizes::claimable(tx)? else {
                return Ok(None);
            };
            let cycle = cycles::create(tx, prize.id)?;
            prizes::mark_claimed(tx, prize.id)?;
            Ok(Some(cycle))
        })?;

        if let Some(cycle) = &created {
            info!(cycle = %cycle.id, prize = %cycle.prize_id, "created giveaway cycle");
        }
        Ok(created)
    }

    /// Drive a cycle from its current state to closed
    async fn drive(&self, mut cycle: Cycle) -> Result<()> {
        while !cycle.state.is_closed() {
            let next = match cycle.state {
                CycleState::Announcing => self.announce(&cycle).await?,
                CycleState::AwaitingEntries => self.await_entries(&cycle).await?,
                // A crash mid-confirmation loses the outstanding prompt, so
                // resuming from Confirming goes back to picking.
                CycleState::PickingWinner | CycleState::Confirming => {
                    self.pick_winner(&cycle).await?
                }
                CycleState::Finished => self.finish(&cycle).await?,
                CycleState::Closed => unreachable!("loop exits on closed"),
            };
            self.db.with(|conn| cycles::set_state(conn, cycle.id, next))?;
            cycle = self
                .db
                .with(|conn| cycles::get(conn, cycle.id))?
                .ok_or(EngineError::CycleVanished(cycle.id))?;
        }
        info!(cycle = %cycle.id, winner = ?cycle.winner, "cycle closed");
        Ok(())
    }

    /// ANNOUNCING: broadcast the announcement to every destination
    async fn announce(&self, cycle: &Cycle) -> Result<CycleState> {
        let message = self.renderer.announcement(cycle);
        let results = self.broadcaster.broadcast(&message).await?;
        info!(cycle = %cycle.id, destinations = results.len(), "announced giveaway");
        Ok(CycleState::AwaitingEntries)
    }

    /// AWAITING_ENTRIES: hold the entry window open
    async fn await_entries(&self, cycle: &Cycle) -> Result<CycleState> {
        sleep(self.config.entry_window).await;
        let count = self.db.with(|conn| entries::count(conn, cycle.id))?;
        debug!(cycle = %cycle.id, entries = count, "entry window closed");
        Ok(CycleState::PickingWinner)
    }

    /// PICKING_WINNER: the winner-selection race
    ///
    /// Picks entries until one confirms or none are left. A missing
    /// destination is a data-consistency cleanup and retries immediately; a
    /// confirmation timeout waits out the backoff first.
    async fn pick_winner(&self, cycle: &Cycle) -> Result<CycleState> {
        let mut failed = Vec::new();

        loop {
            let entry = self.db.with(|conn| match self.config.repick_policy {
                RepickPolicy::Allow => entries::pick_random(conn, cycle.id),
                RepickPolicy::ExcludeFailed => {
                    entries::pick_random_excluding(conn, cycle.id, &failed)
                }
            })?;
            let Some(entry) = entry else {
                // The window is closed, so no new entries will arrive;
                // retrying would spin forever.
                info!(cycle = %cycle.id, "no eligible entries, closing without a winner");
                return Ok(CycleState::Closed);
            };

            let destination = self
                .db
                .with(|conn| destinations::get_by_group(conn, &entry.group_id))?;
            let Some(destination) = destination else {
                warn!(
                    cycle = %cycle.id,
                    group = %entry.group_id,
                    "destination gone since entry, removing stale entry"
                );
                self.db.with(|conn| entries::remove(conn, &entry))?;
                continue;
            };

            self.db
                .with(|conn| cycles::set_state(conn, cycle.id, CycleState::Confirming))?;

            let confirmation = self.gate.arm(cycle.id, entry.participant_id.clone());
            let prompt = self.renderer.claim_prompt(cycle, &entry.participant_id);
            let receipt = match self.messenger.send(&destination, &prompt).await {
                Ok(receipt) => Some(receipt),
                Err(err) => {
                    warn!(
                        cycle = %cycle.id,
                        destination = %destination.id,
                        error = %err,
                        "claim prompt delivery failed"
                    );
                    None
                }
            };

            let confirmed = match &receipt {
                Some(_) => timeout(self.config.claim_window, confirmation)
                    .await
                    .map(|signal| signal.is_ok())
                    .unwrap_or(false),
                None => false,
            };
            self.gate.disarm();

            if let Some(receipt) = receipt {
                if let Err(err) = self.messenger.retract(&destination, &receipt).await {
                    debug!(cycle = %cycle.id, error = %err, "claim prompt retraction failed");
                }
            }

            if confirmed {
                self.db
                    .with(|conn| cycles::set_winner(conn, cycle.id, &entry.participant_id))?;
                return Ok(CycleState::Finished);
            }

            info!(
                cycle = %cycle.id,
                participant = %entry.participant_id,
                "claim window expired without confirmation"
            );
            if self.config.repick_policy == RepickPolicy::ExcludeFailed {
                failed.push(entry.participant_id);
            }
            self.db
                .with(|conn| cycles::set_state(conn, cycle.id, CycleState::PickingWinner))?;
            sleep(self.config.retry_backoff).await;
        }
    }

    /// FINISHED: broadcast the completion naming the winner
    async fn finish(&self, cycle: &Cycle) -> Result<CycleState> {
        let Some(winner) = &cycle.winner else {
            // Only reachable if the winner column was cleared out from
            // under us; close rather than announce nobody.
            warn!(cycle = %cycle.id, "finished cycle has no winner recorded");
            return Ok(CycleState::Closed);
        };

        let message = self.renderer.completion(cycle, winner);
        self.broadcaster.broadcast(&message).await?;
        info!(cycle = %cycle.id, winner = %winner, "announced winner");
        Ok(CycleState::Closed)
    }
}
