//! Integration tests for pairing players through the matchmaker.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use zonecontrol_matchmaker::{MatchAssignment, Matchmaker, MatchmakingError};
use zonecontrol_session::{RegistryConfig, SessionRegistry};
use zonecontrol_transport::{Connection, ConnectionId, TransportError};

// =========================================================================
// Test connection: accepts every send, never receives.
// =========================================================================

struct SinkConnection {
    id: ConnectionId,
}

impl SinkConnection {
    fn new() -> Arc<Self> {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Arc::new(Self {
            id: ConnectionId::new(NEXT.fetch_add(1, Ordering::Relaxed)),
        })
    }
}

impl Connection for SinkConnection {
    type Error = TransportError;

    async fn send(&self, _data: &[u8]) -> Result<(), TransportError> {
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(None)
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

// =========================================================================
// Helpers
// =========================================================================

type Registry = SessionRegistry<SinkConnection>;

fn setup() -> (Arc<Registry>, Arc<Matchmaker<SinkConnection>>) {
    let registry = Arc::new(SessionRegistry::new(RegistryConfig::default()));
    let matchmaker = Arc::new(Matchmaker::new(Arc::clone(&registry)));
    (registry, matchmaker)
}

fn spawn_wait(
    mm: &Arc<Matchmaker<SinkConnection>>,
    name: &str,
    elemental: &str,
) -> JoinHandle<Result<MatchAssignment, MatchmakingError>> {
    let mm = Arc::clone(mm);
    let name = name.to_owned();
    let elemental = elemental.to_owned();
    tokio::spawn(async move { mm.wait_for_match(&name, &elemental).await })
}

/// Waits (bounded) until the queue holds `expected` entries.
async fn until_queued(mm: &Matchmaker<SinkConnection>, expected: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while mm.queue_len().await != expected {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("queue never reached the expected length");
}

// =========================================================================
// Pairing
// =========================================================================

#[tokio::test]
async fn test_two_players_share_match_and_join() {
    let (registry, mm) = setup();

    let alice = spawn_wait(&mm, "Alice", "fire");
    until_queued(&mm, 1).await;

    let bob = mm.wait_for_match("Bob", "water").await.unwrap();
    let alice = alice.await.unwrap().unwrap();

    assert_eq!(alice.match_id, bob.match_id);
    assert_ne!(alice.player_token, bob.player_token);
    assert_eq!(mm.queue_len().await, 0);

    let session = registry.get_session(&alice.match_id).await.unwrap();
    let seat_a = session
        .join(&alice.player_token, SinkConnection::new())
        .await
        .unwrap();
    assert_eq!(seat_a.name, "Alice");
    assert!(!session.both_connected().await);

    let seat_b = session
        .join(&bob.player_token, SinkConnection::new())
        .await
        .unwrap();
    assert_eq!(seat_b.name, "Bob");
    assert_eq!(seat_b.attribute, "water");
    assert!(session.both_connected().await);
}

#[tokio::test]
async fn test_arrivals_pair_in_fifo_order() {
    let (registry, mm) = setup();
    let names = ["P1", "P2", "P3", "P4", "P5"];

    // Queue length alternates 1, 0, 1, 0, 1 as players arrive, which also
    // pins the arrival order.
    let mut handles = Vec::new();
    for (i, name) in names.iter().enumerate() {
        handles.push(spawn_wait(&mm, name, "earth"));
        until_queued(&mm, if i % 2 == 0 { 1 } else { 0 }).await;
    }

    let last = handles.pop().unwrap();
    let mut assignments = Vec::new();
    for handle in handles {
        assignments.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(assignments[0].match_id, assignments[1].match_id);
    assert_eq!(assignments[2].match_id, assignments[3].match_id);
    assert_ne!(assignments[0].match_id, assignments[2].match_id);

    // Earlier arrival takes the first seat.
    for pair in assignments.chunks(2) {
        let session = registry.get_session(&pair[0].match_id).await.unwrap();
        let [a, b] = session.players();
        assert_eq!(a.token, pair[0].player_token);
        assert_eq!(b.token, pair[1].player_token);
    }
    let first = registry.get_session(&assignments[0].match_id).await.unwrap();
    assert_eq!(first.players()[0].name, "P1");
    assert_eq!(first.players()[1].name, "P2");

    // The odd one out is still waiting.
    assert_eq!(registry.len().await, 2);
    assert_eq!(mm.queue_len().await, 1);
    assert!(!last.is_finished());
    last.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_arrivals_all_pair_exactly_once() {
    let (registry, mm) = setup();

    let handles: Vec<_> = (0..100)
        .map(|i| spawn_wait(&mm, &format!("Player-{i}"), "air"))
        .collect();

    let mut per_match: HashMap<String, Vec<String>> = HashMap::new();
    for handle in handles {
        let assignment = handle.await.unwrap().unwrap();
        per_match
            .entry(assignment.match_id.to_string())
            .or_default()
            .push(assignment.player_token);
    }

    assert_eq!(per_match.len(), 50);
    for tokens in per_match.values() {
        assert_eq!(tokens.len(), 2);
        assert_ne!(tokens[0], tokens[1]);
    }
    assert_eq!(registry.len().await, 50);
    assert_eq!(mm.queue_len().await, 0);
}

// =========================================================================
// Cancellation
// =========================================================================

#[tokio::test]
async fn test_aborted_wait_is_never_matched() {
    let (registry, mm) = setup();

    let alice = spawn_wait(&mm, "Alice", "fire");
    until_queued(&mm, 1).await;
    alice.abort();
    assert!(alice.await.unwrap_err().is_cancelled());
    until_queued(&mm, 0).await;

    let bob = spawn_wait(&mm, "Bob", "water");
    until_queued(&mm, 1).await;

    assert!(registry.is_empty().await, "no match created with Alice");
    assert!(!bob.is_finished());

    let carol = mm.wait_for_match("Carol", "earth").await.unwrap();
    let bob = bob.await.unwrap().unwrap();
    assert_eq!(bob.match_id, carol.match_id);

    let session = registry.get_session(&carol.match_id).await.unwrap();
    let names: Vec<_> = session.players().iter().map(|p| p.name.clone()).collect();
    assert_eq!(names, ["Bob", "Carol"]);
}

#[tokio::test]
async fn test_timed_out_wait_leaves_queue_empty() {
    let (registry, mm) = setup();

    let result = tokio::time::timeout(
        Duration::from_millis(20),
        mm.wait_for_match("Alice", "fire"),
    )
    .await;

    assert!(result.is_err());
    assert_eq!(mm.queue_len().await, 0);
    assert!(registry.is_empty().await);
}

/// An arrival dropped while its match is still being created must leave the
/// waiting player queued, not strand them.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_arrival_dropped_mid_pairing_keeps_waiter_queued() {
    let (registry, mm) = setup();
    let busy = Arc::new(AtomicBool::new(true));

    // Keep the registry lock contended so arrivals often suspend while
    // creating their match.
    let contenders: Vec<_> = (0..3)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let busy = Arc::clone(&busy);
            tokio::spawn(async move {
                while busy.load(Ordering::Relaxed) {
                    registry.create_match("X", "air", "Y", "air").await;
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    for round in 0..200 {
        let alice = spawn_wait(&mm, &format!("Alice-{round}"), "fire");
        until_queued(&mm, 1).await;

        // A zero timeout polls the wait exactly once, then drops it.
        let bob = tokio::time::timeout(
            Duration::ZERO,
            mm.wait_for_match(&format!("Bob-{round}"), "water"),
        )
        .await;

        if bob.is_err() && !alice.is_finished() {
            until_queued(&mm, 1).await;
            let carol = mm
                .wait_for_match(&format!("Carol-{round}"), "earth")
                .await
                .unwrap();
            let alice = alice.await.unwrap().expect("Alice still paired");
            assert_eq!(alice.match_id, carol.match_id);
        } else {
            let alice = alice.await.unwrap().expect("Alice paired with Bob");
            assert_eq!(alice.match_id, bob.unwrap().unwrap().match_id);
        }
        assert_eq!(mm.queue_len().await, 0);
    }

    busy.store(false, Ordering::Relaxed);
    for contender in contenders {
        contender.await.unwrap();
    }
}

#[tokio::test]
async fn test_shutdown_releases_queued_player() {
    let (_registry, mm) = setup();

    let alice = spawn_wait(&mm, "Alice", "fire");
    until_queued(&mm, 1).await;

    mm.shutdown().await;

    let result = alice.await.unwrap();
    assert!(matches!(result, Err(MatchmakingError::Closed)));
    assert_eq!(mm.queue_len().await, 0);
}
