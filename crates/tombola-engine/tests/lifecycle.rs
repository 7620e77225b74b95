//! End-to-end lifecycle tests over an in-memory store and a scripted
//! messenger. Windows are shrunk to milliseconds; the assertions only rely
//! on ordering, never on exact timing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tombola_core::{
    CycleState, DestinationRecord, EngineConfig, GroupId, ParticipantId, RepickPolicy,
};
use tombola_engine::{
    Broadcaster, ConfirmationResponse, DeliveryError, DeliveryReceipt, EntryResponse,
    EventGate, LifecycleEngine, Messenger, RejectReason, RenderedMessage, TextRenderer,
};
use tombola_store::{cycles, destinations, entries, prizes, Database};

#[derive(Debug, Clone)]
struct Sent {
    group: String,
    message: RenderedMessage,
}

struct FakeMessenger {
    sent: Mutex<Vec<Sent>>,
    observer: mpsc::UnboundedSender<Sent>,
    failing_groups: Mutex<HashSet<String>>,
    retractions: AtomicUsize,
    counter: AtomicUsize,
}

impl FakeMessenger {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Sent>) {
        let (observer, receiver) = mpsc::unbounded_channel();
        let messenger = Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            observer,
            failing_groups: Mutex::new(HashSet::new()),
            retractions: AtomicUsize::new(0),
            counter: AtomicUsize::new(0),
        });
        (messenger, receiver)
    }

    fn fail_group(&self, group: &str) {
        self.failing_groups.lock().unwrap().insert(group.to_string());
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn send(
        &self,
        destination: &DestinationRecord,
        message: &RenderedMessage,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let group = destination.group_id.as_str().to_string();
        if self.failing_groups.lock().unwrap().contains(&group) {
            return Err(DeliveryError::Unreachable("scripted failure".into()));
        }
        let record = Sent {
            group,
            message: message.clone(),
        };
        self.sent.lock().unwrap().push(record.clone());
        let _ = self.observer.send(record);
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(DeliveryReceipt {
            message_id: format!("msg-{id}"),
        })
    }

    async fn retract(
        &self,
        _destination: &DestinationRecord,
        _receipt: &DeliveryReceipt,
    ) -> Result<(), DeliveryError> {
        self.retractions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn fast_config() -> EngineConfig {
    EngineConfig {
        entry_window: Duration::from_millis(200),
        claim_window: Duration::from_millis(400),
        retry_backoff: Duration::from_millis(30),
        cycle_delay: Duration::from_millis(10),
        broadcast_batch: 2,
        repick_policy: RepickPolicy::Allow,
    }
}

fn database_with_prize() -> Database {
    let db = Database::in_memory().unwrap();
    db.migrate().unwrap();
    db.with(|conn| prizes::add(conn, "ABCD-1234", None).map(|_| ()))
        .unwrap();
    db
}

fn add_destination(db: &Database, group: &str) {
    db.with(|conn| {
        destinations::upsert(
            conn,
            &GroupId::new(group),
            &format!("hook-{group}"),
            "token",
        )
        .map(|_| ())
    })
    .unwrap();
}

fn engine(db: &Database, messenger: Arc<FakeMessenger>, config: EngineConfig) -> Arc<LifecycleEngine> {
    Arc::new(LifecycleEngine::new(
        db.clone(),
        messenger,
        Arc::new(TextRenderer),
        config,
    ))
}

async fn next_sent(receiver: &mut mpsc::UnboundedReceiver<Sent>) -> Sent {
    tokio::time::timeout(Duration::from_secs(5), receiver.recv())
        .await
        .expect("timed out waiting for a send")
        .expect("messenger dropped")
}

fn is_claim_prompt(sent: &Sent) -> bool {
    sent.message
        .action
        .as_deref()
        .map(|action| action.starts_with("CLAIM-"))
        .unwrap_or(false)
}

async fn next_claim_prompt(receiver: &mut mpsc::UnboundedReceiver<Sent>) -> Sent {
    loop {
        let sent = next_sent(receiver).await;
        if is_claim_prompt(&sent) {
            return sent;
        }
    }
}

/// Register an entry, waiting out the gap between the announcement being
/// delivered and the entry window opening in the store.
async fn enter_when_open(
    gate: &EventGate,
    token: &str,
    group: &GroupId,
    participant: &ParticipantId,
) -> EntryResponse {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let response = gate
            .handle_entry(token, group, participant)
            .unwrap()
            .expect("token belongs to this service");
        match response {
            EntryResponse::Rejected(RejectReason::NotAcceptingEntries)
                if tokio::time::Instant::now() < deadline =>
            {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            other => return other,
        }
    }
}

#[tokio::test]
async fn no_destinations_and_no_entries_closes_without_winner() {
    let db = database_with_prize();
    let (messenger, _receiver) = FakeMessenger::new();
    let engine = engine(&db, messenger.clone(), fast_config());

    engine.run_once().await.unwrap();

    let cycle = db
        .with(|conn| cycles::get(conn, tombola_core::CycleId(1)))
        .unwrap()
        .unwrap();
    assert_eq!(cycle.state, CycleState::Closed);
    assert!(cycle.winner.is_none());
    assert!(messenger.sent().is_empty());

    // The token stays claimed: it was given to this cycle, winner or not.
    let prize = db
        .with(|conn| prizes::get(conn, cycle.prize_id))
        .unwrap()
        .unwrap();
    assert!(prize.claimed);
    assert!(db.with(|conn| prizes::claimable(conn)).unwrap().is_none());
}

#[tokio::test]
async fn a_confirming_entrant_wins_the_cycle() {
    let db = database_with_prize();
    for group in ["g1", "g2", "g3"] {
        add_destination(&db, group);
    }
    let (messenger, mut receiver) = FakeMessenger::new();
    let engine = engine(&db, messenger.clone(), fast_config());
    let gate = engine.gate();

    let task = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.run_once().await }
    });

    // Three announcement deliveries, one per destination.
    let mut announce_token = None;
    for _ in 0..3 {
        let sent = next_sent(&mut receiver).await;
        announce_token = sent.message.action.clone();
    }
    let announce_token = announce_token.expect("announcement carries a token");
    assert!(announce_token.starts_with("GIVEAWAY-"));

    // Two participants enter during the window; a duplicate is reported.
    let alice = ParticipantId::new("alice");
    let bob = ParticipantId::new("bob");
    let entered = enter_when_open(&gate, &announce_token, &GroupId::new("g1"), &alice).await;
    assert!(matches!(entered, EntryResponse::Accepted(_)));
    let again = gate
        .handle_entry(&announce_token, &GroupId::new("g1"), &alice)
        .unwrap();
    assert!(matches!(again, Some(EntryResponse::AlreadyEntered(_))));
    let entered = enter_when_open(&gate, &announce_token, &GroupId::new("g2"), &bob).await;
    assert!(matches!(entered, EntryResponse::Accepted(_)));

    // One of the two is prompted; whoever it is confirms in time.
    let prompt = next_claim_prompt(&mut receiver).await;
    let token = prompt.message.action.unwrap();
    let winner = if prompt.message.text.contains("alice") {
        alice.clone()
    } else {
        bob.clone()
    };
    let response = gate.handle_confirmation(&token, &winner).unwrap();
    assert_eq!(response, Some(ConfirmationResponse::Confirmed));

    task.await.unwrap().unwrap();

    let cycle = db.with(|conn| cycles::get(conn, tombola_core::CycleId(1)))
        .unwrap()
        .unwrap();
    assert_eq!(cycle.state, CycleState::Closed);
    assert_eq!(cycle.winner, Some(winner));

    // Completion went to all three destinations.
    let completions = messenger
        .sent()
        .iter()
        .filter(|sent| sent.message.text.contains("finished"))
        .count();
    assert_eq!(completions, 3);
}

#[tokio::test]
async fn an_unconfirmed_winner_is_repicked_after_backoff() {
    let db = database_with_prize();
    add_destination(&db, "g1");
    let (messenger, mut receiver) = FakeMessenger::new();
    let mut config = fast_config();
    config.claim_window = Duration::from_millis(100);
    let engine = engine(&db, messenger.clone(), config);
    let gate = engine.gate();

    let task = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.run_once().await }
    });

    let announcement = next_sent(&mut receiver).await;
    let announce_token = announcement.message.action.unwrap();
    let alice = ParticipantId::new("alice");
    let entered = enter_when_open(&gate, &announce_token, &GroupId::new("g1"), &alice).await;
    assert!(matches!(entered, EntryResponse::Accepted(_)));

    // Ignore the first prompt; the claim window expires and the engine
    // picks again (the sole entrant may be re-picked under Allow).
    let first = next_claim_prompt(&mut receiver).await;
    let second = next_claim_prompt(&mut receiver).await;
    assert_eq!(first.message.action, second.message.action);

    let response = gate
        .handle_confirmation(&second.message.action.unwrap(), &alice)
        .unwrap();
    assert_eq!(response, Some(ConfirmationResponse::Confirmed));

    task.await.unwrap().unwrap();

    let cycle = db
        .with(|conn| cycles::get(conn, tombola_core::CycleId(1)))
        .unwrap()
        .unwrap();
    assert_eq!(cycle.winner, Some(alice));
    assert_eq!(cycle.state, CycleState::Closed);

    // Both prompts were retracted once their windows ended.
    assert!(messenger.retractions.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn a_stale_destination_prunes_the_entry_and_retries_immediately() {
    let db = database_with_prize();
    add_destination(&db, "g1");
    let (messenger, mut receiver) = FakeMessenger::new();
    let engine = engine(&db, messenger.clone(), fast_config());
    let gate = engine.gate();

    let task = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.run_once().await }
    });

    let announcement = next_sent(&mut receiver).await;
    let token = announcement.message.action.unwrap();

    // The entry's group has no destination record; by pick time it is
    // unreachable and must be pruned rather than waited on.
    let carol = ParticipantId::new("carol");
    let entered = enter_when_open(&gate, &token, &GroupId::new("vanished"), &carol).await;
    assert!(matches!(entered, EntryResponse::Accepted(_)));

    task.await.unwrap().unwrap();

    let cycle = db
        .with(|conn| cycles::get(conn, tombola_core::CycleId(1)))
        .unwrap()
        .unwrap();
    assert_eq!(cycle.state, CycleState::Closed);
    assert!(cycle.winner.is_none());
    assert_eq!(db.with(|conn| entries::count(conn, cycle.id)).unwrap(), 0);

    // No claim prompt was ever attempted.
    assert!(messenger.sent().iter().all(|sent| !is_claim_prompt(sent)));
}

#[tokio::test]
async fn restart_during_picking_resumes_without_reannouncing() {
    let db = database_with_prize();
    add_destination(&db, "g1");

    // Simulate a previous process that crashed after the entry window.
    let cycle = db
        .transaction(|tx| {
            let prize = prizes::claimable(tx)?.expect("seeded prize");
            let cycle = cycles::create(tx, prize.id)?;
            prizes::mark_claimed(tx, prize.id)?;
            Ok(cycle)
        })
        .unwrap();
    let dave = ParticipantId::new("dave");
    db.with(|conn| {
        entries::register(conn, cycle.id, &GroupId::new("g1"), &dave)?;
        cycles::set_state(conn, cycle.id, CycleState::PickingWinner)
    })
    .unwrap();

    let (messenger, mut receiver) = FakeMessenger::new();
    let engine = engine(&db, messenger.clone(), fast_config());
    let gate = engine.gate();

    let task = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.run_once().await }
    });

    // The first delivery after resume is the claim prompt: recovery
    // re-entered picking, not announcing.
    let prompt = next_sent(&mut receiver).await;
    assert!(is_claim_prompt(&prompt));

    gate.handle_confirmation(&prompt.message.action.unwrap(), &dave)
        .unwrap();
    task.await.unwrap().unwrap();

    let recovered = db
        .with(|conn| cycles::get(conn, cycle.id))
        .unwrap()
        .unwrap();
    assert_eq!(recovered.state, CycleState::Closed);
    assert_eq!(recovered.winner, Some(dave));

    let announcements = messenger
        .sent()
        .iter()
        .filter(|sent| {
            sent.message
                .action
                .as_deref()
                .map(|action| action.starts_with("GIVEAWAY-"))
                .unwrap_or(false)
        })
        .count();
    assert_eq!(announcements, 0);
}

#[tokio::test]
async fn stale_and_foreign_events_are_rejected_not_queued() {
    let db = Database::in_memory().unwrap();
    db.migrate().unwrap();
    let gate = EventGate::new(db.clone());
    let alice = ParticipantId::new("alice");
    let group = GroupId::new("g1");

    // Undecodable tokens are not ours at all.
    assert_eq!(gate.handle_entry("VOTE-12", &group, &alice).unwrap(), None);
    assert_eq!(gate.handle_confirmation("???", &alice).unwrap(), None);

    // A claim token pressed where an entry token belongs is ignored too.
    assert_eq!(gate.handle_entry("CLAIM-1", &group, &alice).unwrap(), None);

    // Valid token, but nothing is running.
    assert_eq!(
        gate.handle_entry("GIVEAWAY-1", &group, &alice).unwrap(),
        Some(EntryResponse::Rejected(RejectReason::NoActiveCycle))
    );

    let cycle = db
        .transaction(|tx| {
            let prize = prizes::add(tx, "KEY", None)?;
            cycles::create(tx, prize.id)
        })
        .unwrap();

    // The cycle exists but is still announcing.
    let token = tombola_core::CorrelationToken::entry(cycle.id).to_string();
    assert_eq!(
        gate.handle_entry(&token, &group, &alice).unwrap(),
        Some(EntryResponse::Rejected(RejectReason::NotAcceptingEntries))
    );

    // Wrong cycle id.
    db.with(|conn| cycles::set_state(conn, cycle.id, CycleState::AwaitingEntries))
        .unwrap();
    assert_eq!(
        gate.handle_entry("GIVEAWAY-ZZZ", &group, &alice).unwrap(),
        Some(EntryResponse::Rejected(RejectReason::WrongCycle))
    );

    // Confirmation with no pending claim armed.
    assert_eq!(
        gate.handle_confirmation("CLAIM-1", &alice).unwrap(),
        Some(ConfirmationResponse::Stale)
    );
}

#[tokio::test]
async fn broadcast_batches_and_isolates_failures() {
    let db = Database::in_memory().unwrap();
    db.migrate().unwrap();
    for group in ["g1", "g2", "g3", "g4", "g5"] {
        add_destination(&db, group);
    }

    let (messenger, _receiver) = FakeMessenger::new();
    messenger.fail_group("g2");

    let broadcaster = Broadcaster::new(db.clone(), messenger.clone(), 2);
    let message = RenderedMessage {
        text: "hello everyone".into(),
        action: None,
    };
    let results = broadcaster.broadcast(&message).await.unwrap();

    assert_eq!(results.len(), 5);
    assert_eq!(results.iter().filter(|r| r.outcome.is_ok()).count(), 4);
    let failed: Vec<_> = results
        .iter()
        .filter(|r| r.outcome.is_err())
        .map(|r| r.group.as_str().to_string())
        .collect();
    assert_eq!(failed, vec!["g2".to_string()]);

    // Every destination was attempted despite the failure mid-batch.
    assert_eq!(messenger.sent().len(), 4);
}
