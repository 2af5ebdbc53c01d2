//! FIFO pairing of players waiting for an opponent.
//!
//! Every call to [`Matchmaker::wait_for_match`] goes through one of three
//! paths:
//!
//! ```text
//! arrive ──┬── someone waiting ──→ create match, wake them, return now
//!          └── queue empty ──────→ enqueue ──┬── later arrival pairs us → return
//!                                            └── caller gives up → dequeue
//! ```
//!
//! The rendezvous is a `tokio::sync::oneshot` per waiting entry: the
//! second arrival sends the first one its assignment. A caller "gives up"
//! by dropping the `wait_for_match` future (e.g. the client disconnected);
//! that drops the receiver, which the pairing scan sees through
//! [`oneshot::Sender::is_closed`].
//!
//! # Lock order
//!
//! The queue lock is held across `SessionRegistry::create_match`, which
//! takes the registry lock. Order is always matchmaker → registry →
//! session. No transport I/O ever happens under the queue lock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, oneshot};
use zonecontrol_protocol::MatchId;
use zonecontrol_session::SessionRegistry;
use zonecontrol_transport::Connection;

use crate::MatchmakingError;

/// What a matched player needs to join their session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchAssignment {
    pub match_id: MatchId,
    pub player_token: String,
}

/// A player parked in the queue.
struct WaitingEntry {
    id: u64,
    name: String,
    attribute: String,
    reply: oneshot::Sender<MatchAssignment>,
}

type Queue = Mutex<VecDeque<WaitingEntry>>;

/// Pairs waiting players two at a time, oldest first.
///
/// No rating, region, or compatibility rules: the attribute is handed to
/// the session untouched.
pub struct Matchmaker<C: Connection> {
    registry: Arc<SessionRegistry<C>>,
    waiting: Arc<Queue>,
    next_entry_id: AtomicU64,
}

impl<C: Connection> Matchmaker<C> {
    /// Creates a matchmaker that mints matches in `registry`.
    pub fn new(registry: Arc<SessionRegistry<C>>) -> Self {
        Self {
            registry,
            waiting: Arc::new(Mutex::new(VecDeque::new())),
            next_entry_id: AtomicU64::new(1),
        }
    }

    /// Waits until this player is paired and returns their assignment.
    ///
    /// Returns immediately if another player is already waiting. Dropping
    /// the returned future before it completes withdraws the player from
    /// the queue.
    ///
    /// # Errors
    /// [`MatchmakingError::Closed`] if the matchmaker shuts down (or is
    /// dropped) while this player is queued.
    pub async fn wait_for_match(
        &self,
        name: &str,
        attribute: &str,
    ) -> Result<MatchAssignment, MatchmakingError> {
        let (entry_id, reply) = {
            let mut waiting = self.waiting.lock().await;

            while let Some(front) = waiting.front() {
                if front.reply.is_closed() {
                    tracing::debug!(
                        name = %front.name,
                        "skipping abandoned matchmaking entry"
                    );
                    waiting.pop_front();
                    continue;
                }
                let other_name = front.name.clone();
                let other_attribute = front.attribute.clone();

                // The entry stays queued until the match exists. If this
                // future is dropped while waiting on the registry, the
                // waiting player keeps their place.
                let (match_id, token_other, token_self) = self
                    .registry
                    .create_match(&other_name, &other_attribute, name, attribute)
                    .await;

                // From here to the return nothing suspends. The queue lock
                // was held throughout, so the front is still the entry
                // that was matched.
                if let Some(other) = waiting.pop_front() {
                    let theirs = MatchAssignment {
                        match_id: match_id.clone(),
                        player_token: token_other,
                    };
                    // `send` fails only if the waiter dropped out while the
                    // match was being created. Their seat then stays empty
                    // and the session is left to the staleness sweep.
                    if other.reply.send(theirs).is_err() {
                        tracing::warn!(
                            %match_id,
                            name = %other_name,
                            "waiting player left while being matched; session orphaned"
                        );
                    }
                }

                tracing::info!(%match_id, first = %other_name, second = name, "players paired");
                return Ok(MatchAssignment {
                    match_id,
                    player_token: token_self,
                });
            }

            let (tx, rx) = oneshot::channel();
            let id = self.next_entry_id.fetch_add(1, Ordering::Relaxed);
            waiting.push_back(WaitingEntry {
                id,
                name: name.to_owned(),
                attribute: attribute.to_owned(),
                reply: tx,
            });
            tracing::debug!(name, queued = waiting.len(), "player queued");
            (id, rx)
        };

        let guard = QueueGuard {
            entry_id,
            waiting: Arc::downgrade(&self.waiting),
            armed: true,
        };
        let result = reply.await.map_err(|_| MatchmakingError::Closed);
        guard.disarm();
        result
    }

    /// Number of players currently queued (abandoned entries not yet
    /// skipped included).
    pub async fn queue_len(&self) -> usize {
        self.waiting.lock().await.len()
    }

    /// Empties the queue. Every queued caller gets
    /// [`MatchmakingError::Closed`].
    pub async fn shutdown(&self) {
        let drained = {
            let mut waiting = self.waiting.lock().await;
            std::mem::take(&mut *waiting)
        };
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "matchmaking queue closed");
        }
    }
}

/// Removes a queued entry if its `wait_for_match` future is dropped before
/// being paired.
struct QueueGuard {
    entry_id: u64,
    waiting: Weak<Queue>,
    armed: bool,
}

impl QueueGuard {
    /// The entry was already popped by whoever resolved it.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for QueueGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Some(waiting) = self.waiting.upgrade() else {
            return;
        };
        let entry_id = self.entry_id;

        // `Drop` can't await. Take the lock inline when it's free, otherwise
        // finish the removal on a task. Until then the pairing scan skips
        // the entry because its receiver is gone.
        if let Ok(mut queue) = waiting.try_lock() {
            queue.retain(|e| e.id != entry_id);
            return;
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                waiting.lock().await.retain(|e| e.id != entry_id);
            });
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
