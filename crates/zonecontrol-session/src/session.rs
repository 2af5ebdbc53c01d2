//! A single match: two player slots and the live connections bound to them.
//!
//! A `Session` is pure addressed delivery plus liveness bookkeeping. It
//! knows WHO may connect (the two slot tokens), WHICH connection currently
//! speaks for each token, and WHEN anything last happened. It never builds
//! or inspects message payloads: callers hand it any `Serialize` value and
//! it delivers the encoded bytes.
//!
//! # Locking
//!
//! The token → connection map sits behind the session's own mutex. Every
//! operation takes the lock for in-memory work only: sends clone the
//! `Arc`'d connection(s) they need, drop the guard, and only then await the
//! network. A slow peer therefore never stalls a `join` or `leave`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use zonecontrol_protocol::{Codec, JsonCodec, MatchId};
use zonecontrol_transport::{Connection, ConnectionId};

use crate::SessionError;

// ---------------------------------------------------------------------------
// PlayerSlot
// ---------------------------------------------------------------------------

/// One seat in a match. Immutable once minted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSlot {
    /// Secret credential for binding a connection to this seat.
    ///
    /// Hex text with 192 bits of randomness.
    pub token: String,

    /// Display name chosen by the player.
    pub name: String,

    /// Client-chosen tag (the elemental picked before queueing). Carried
    /// through for the game layer; never validated here.
    pub attribute: String,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Connection state for one two-player match.
///
/// Shared as `Arc<Session<C>>` between the registry and every connection
/// handler of the match.
pub struct Session<C: Connection> {
    match_id: MatchId,
    players: [PlayerSlot; 2],

    /// Live connections keyed by slot token. Only ever holds the two slot
    /// tokens, so its length is the connected count.
    connections: Mutex<HashMap<String, Arc<C>>>,

    /// Base for `last_activity_ms`. Uses Tokio's clock so paused-time tests
    /// can advance it.
    created_at: Instant,

    /// Milliseconds since `created_at` of the most recent activity.
    ///
    /// Atomic so the registry can judge staleness while holding only its
    /// own lock.
    last_activity_ms: AtomicU64,
}

impl<C: Connection> Session<C> {
    /// Creates a session with no connections bound yet.
    pub fn new(
        match_id: MatchId,
        player_a: PlayerSlot,
        player_b: PlayerSlot,
    ) -> Self {
        Self {
            match_id,
            players: [player_a, player_b],
            connections: Mutex::new(HashMap::new()),
            created_at: Instant::now(),
            last_activity_ms: AtomicU64::new(0),
        }
    }

    /// The match this session belongs to.
    pub fn match_id(&self) -> &MatchId {
        &self.match_id
    }

    /// Both seats, in creation order (`player_a`, `player_b`).
    pub fn players(&self) -> &[PlayerSlot; 2] {
        &self.players
    }

    /// Returns the seat owning `token`, if any.
    pub fn get_player_by_token(&self, token: &str) -> Option<&PlayerSlot> {
        self.players.iter().find(|p| p.token == token)
    }

    /// Returns the seat opposite the one owning `token`, if any.
    pub fn get_opponent_of(&self, token: &str) -> Option<&PlayerSlot> {
        let [a, b] = &self.players;
        if token == a.token {
            Some(b)
        } else if token == b.token {
            Some(a)
        } else {
            None
        }
    }

    // -- Connection lifecycle ---------------------------------------------

    /// Binds `conn` to the seat owning `token` and returns that seat.
    ///
    /// Joining again with the same token replaces the earlier binding; the
    /// newest connection wins. A replaced connection that is a different
    /// connection is closed (best-effort) once the lock is released, so a
    /// stale tab cannot keep reading a match it no longer speaks for.
    ///
    /// # Errors
    /// [`SessionError::InvalidToken`] if `token` owns neither seat.
    pub async fn join(
        &self,
        token: &str,
        conn: Arc<C>,
    ) -> Result<PlayerSlot, SessionError> {
        let player = self
            .get_player_by_token(token)
            .cloned()
            .ok_or(SessionError::InvalidToken)?;

        let new_id = conn.id();
        let displaced = {
            let mut conns = self.connections.lock().await;
            let displaced = conns.insert(token.to_owned(), conn);
            self.touch();
            displaced
        };

        if let Some(old) = displaced.filter(|old| old.id() != new_id) {
            tracing::debug!(
                match_id = %self.match_id,
                old = %old.id(),
                new = %new_id,
                "connection superseded by rejoin"
            );
            if let Err(e) = old.close().await {
                tracing::debug!(
                    match_id = %self.match_id,
                    error = %e,
                    "closing superseded connection failed"
                );
            }
        }

        Ok(player)
    }

    /// Unbinds whatever connection `token` has. Unknown or already-absent
    /// tokens are a no-op.
    pub async fn leave(&self, token: &str) {
        self.connections.lock().await.remove(token);
    }

    /// Unbinds `token` only while it is still bound to connection `id`.
    ///
    /// Returns `true` if a binding was removed. Connection handlers use this
    /// on teardown so a superseded connection going away does not unbind
    /// the connection that replaced it.
    pub async fn leave_connection(&self, token: &str, id: ConnectionId) -> bool {
        let mut conns = self.connections.lock().await;
        if conns.get(token).is_some_and(|c| c.id() == id) {
            conns.remove(token);
            true
        } else {
            false
        }
    }

    /// Number of seats with a live connection (0, 1 or 2).
    pub async fn connected_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// `true` once both seats have a live connection.
    pub async fn both_connected(&self) -> bool {
        self.connected_count().await == 2
    }

    // -- Delivery ---------------------------------------------------------

    /// Sends `msg` to the connection bound to `token`.
    ///
    /// Returns `Ok(false)` when nothing is bound to `token`. Counts as
    /// activity either way.
    ///
    /// # Errors
    /// Encoding failures and the connection's own send error.
    pub async fn send_to<M>(
        &self,
        token: &str,
        msg: &M,
    ) -> Result<bool, SessionError>
    where
        M: Serialize,
    {
        self.touch();

        let conn = self.connections.lock().await.get(token).cloned();
        let Some(conn) = conn else {
            return Ok(false);
        };

        let bytes = JsonCodec.encode(msg)?;
        conn.send(&bytes).await.map_err(SessionError::transport)?;
        Ok(true)
    }

    /// Sends `msg` to the opponent of `token`.
    ///
    /// `Ok(false)` if `token` owns no seat or the opponent isn't connected.
    pub async fn send_to_opponent<M>(
        &self,
        token: &str,
        msg: &M,
    ) -> Result<bool, SessionError>
    where
        M: Serialize,
    {
        let Some(opponent) = self.get_opponent_of(token) else {
            return Ok(false);
        };
        self.send_to(&opponent.token, msg).await
    }

    /// Sends `msg` to every bound connection and returns how many
    /// deliveries succeeded.
    ///
    /// A failing connection is logged and skipped; it never stops delivery
    /// to the other one.
    ///
    /// # Errors
    /// Only if `msg` cannot be encoded.
    pub async fn broadcast<M>(&self, msg: &M) -> Result<usize, SessionError>
    where
        M: Serialize,
    {
        self.touch();

        let conns: Vec<Arc<C>> =
            self.connections.lock().await.values().cloned().collect();
        if conns.is_empty() {
            return Ok(0);
        }

        let bytes = JsonCodec.encode(msg)?;
        let mut delivered = 0;
        for conn in conns {
            match conn.send(&bytes).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        match_id = %self.match_id,
                        conn = %conn.id(),
                        error = %e,
                        "broadcast to connection failed"
                    );
                }
            }
        }
        Ok(delivered)
    }

    // -- Liveness ---------------------------------------------------------

    /// When the session was last joined, sent to, or broadcast on.
    pub fn last_activity(&self) -> Instant {
        self.created_at
            + Duration::from_millis(
                self.last_activity_ms.load(Ordering::Relaxed),
            )
    }

    /// `true` if nothing has happened for longer than `ttl`.
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.last_activity().elapsed() > ttl
    }

    fn touch(&self) {
        let now = self.created_at.elapsed().as_millis() as u64;
        // `fetch_max` so racing touches can never move the clock backwards.
        self.last_activity_ms.fetch_max(now, Ordering::Relaxed);
    }
}

// =========================================================================
// Tests
// =========================================================================
