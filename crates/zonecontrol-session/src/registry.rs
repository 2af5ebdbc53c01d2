//! The session registry: every live match, keyed by match id.
//!
//! The registry is responsible for:
//! - Minting matches (match id + one secret token per seat)
//! - Handing sessions out to connection handlers
//! - Sweeping sessions that have gone idle
//! - Telling every connected player when the server shuts down
//!
//! # Concurrency note
//!
//! The map sits behind one `tokio::sync::Mutex`. Critical sections only
//! touch the map: anything that talks to a connection (listing connected
//! counts, the shutdown broadcast) first clones the `Arc<Session>`s it
//! needs, drops the guard, and then works on the snapshot. When both locks
//! are needed the order is always registry, then session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use zonecontrol_protocol::{MatchId, ServerMessage};
use zonecontrol_transport::Connection;

use crate::{PlayerSlot, Session, SessionError};

/// Random bytes in a match id (96 bits).
const MATCH_ID_BYTES: usize = 12;

/// Random bytes in a player token (192 bits).
const TOKEN_BYTES: usize = 24;

/// Text sent to every connected player by [`SessionRegistry::stop`].
const SHUTDOWN_NOTICE: &str = "Server is shutting down";

// ---------------------------------------------------------------------------
// RegistryConfig
// ---------------------------------------------------------------------------

/// Timing for the staleness sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// How often the background sweep runs. Default: 60 seconds.
    pub sweep_interval: Duration,

    /// How long a session may sit without activity before the sweep
    /// removes it. Default: 5 minutes.
    pub session_ttl: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            session_ttl: Duration::from_secs(300),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionInfo
// ---------------------------------------------------------------------------

/// Public part of a seat, for listings. Never includes the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerInfo {
    pub name: String,
    pub attribute: String,
}

/// Summary of one session, as returned by
/// [`SessionRegistry::list_sessions_info`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub match_id: MatchId,
    pub players: [PlayerInfo; 2],
    pub connected_count: usize,
    pub is_stale: bool,
}

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

type SessionMap<C> = HashMap<MatchId, Arc<Session<C>>>;

/// Owns every active [`Session`].
///
/// Constructed once at startup and shared as `Arc<SessionRegistry<C>>`
/// with the matchmaker and the connection handlers.
///
/// ```text
/// create_match() ──→ get_session() ──→ join()/send…() ──→ remove_session()
///                                            │
///                                            └── idle > ttl ──→ sweep
/// ```
pub struct SessionRegistry<C: Connection> {
    /// Shared with the sweep task.
    sessions: Arc<Mutex<SessionMap<C>>>,

    /// The running sweep task, if [`start`](Self::start) was called.
    sweeper: Mutex<Option<JoinHandle<()>>>,

    config: RegistryConfig,
}

impl<C: Connection> SessionRegistry<C> {
    /// Creates an empty registry. The sweep doesn't run until
    /// [`start`](Self::start).
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            sweeper: Mutex::new(None),
            config,
        }
    }

    /// The registry's timing configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // -- Lifecycle --------------------------------------------------------

    /// Launches the background sweep. Calling it again while the sweep is
    /// running does nothing.
    pub async fn start(&self) {
        let mut sweeper = self.sweeper.lock().await;
        if sweeper.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let sessions = Arc::clone(&self.sessions);
        let interval = self.config.sweep_interval.max(Duration::from_millis(1));
        let ttl = self.config.session_ttl;
        *sweeper = Some(tokio::spawn(sweep_loop(sessions, interval, ttl)));

        tracing::info!(?interval, ?ttl, "session sweep started");
    }

    /// Notifies every connected player that the server is going away, then
    /// cancels the sweep and waits for it to finish.
    ///
    /// Send failures are logged and ignored: the process is exiting anyway.
    pub async fn stop(&self) {
        self.notify_shutdown().await;

        let handle = self.sweeper.lock().await.take();
        if let Some(handle) = handle {
            handle.abort();
            match handle.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    tracing::warn!(error = %e, "session sweep task failed");
                }
            }
            tracing::info!("session sweep stopped");
        }
    }

    async fn notify_shutdown(&self) {
        let sessions = self.snapshot().await;
        let notice = ServerMessage::ServerShutdown {
            message: SHUTDOWN_NOTICE.to_owned(),
        };

        for session in &sessions {
            if let Err(e) = session.broadcast(&notice).await {
                tracing::debug!(
                    match_id = %session.match_id(),
                    error = %e,
                    "shutdown notice failed"
                );
            }
        }

        tracing::info!(
            sessions = sessions.len(),
            "sent shutdown notice"
        );
    }

    // -- Matches ----------------------------------------------------------

    /// Mints a new match for two players and returns
    /// `(match_id, token_a, token_b)`.
    ///
    /// Ids and tokens come from the thread-local CSPRNG; nothing is derived
    /// from counters or clocks.
    pub async fn create_match(
        &self,
        name_a: &str,
        attribute_a: &str,
        name_b: &str,
        attribute_b: &str,
    ) -> (MatchId, String, String) {
        let token_a = random_hex(TOKEN_BYTES);
        let token_b = random_hex(TOKEN_BYTES);
        let player_a = PlayerSlot {
            token: token_a.clone(),
            name: name_a.to_owned(),
            attribute: attribute_a.to_owned(),
        };
        let player_b = PlayerSlot {
            token: token_b.clone(),
            name: name_b.to_owned(),
            attribute: attribute_b.to_owned(),
        };

        let match_id = {
            let mut sessions = self.sessions.lock().await;
            let mut match_id = MatchId(random_hex(MATCH_ID_BYTES));
            while sessions.contains_key(&match_id) {
                match_id = MatchId(random_hex(MATCH_ID_BYTES));
            }
            let session = Session::new(match_id.clone(), player_a, player_b);
            sessions.insert(match_id.clone(), Arc::new(session));
            match_id
        };

        tracing::info!(%match_id, name_a, name_b, "match created");
        (match_id, token_a, token_b)
    }

    /// Looks up a session.
    pub async fn get_session(
        &self,
        match_id: &MatchId,
    ) -> Option<Arc<Session<C>>> {
        self.sessions.lock().await.get(match_id).cloned()
    }

    /// Like [`get_session`](Self::get_session), but a missing match is an
    /// error.
    ///
    /// # Errors
    /// [`SessionError::UnknownMatch`] if no session has this id.
    pub async fn require_session(
        &self,
        match_id: &MatchId,
    ) -> Result<Arc<Session<C>>, SessionError> {
        self.get_session(match_id)
            .await
            .ok_or_else(|| SessionError::UnknownMatch(match_id.clone()))
    }

    /// Removes a session and returns it, if it was present.
    pub async fn remove_session(
        &self,
        match_id: &MatchId,
    ) -> Option<Arc<Session<C>>> {
        let removed = self.sessions.lock().await.remove(match_id);
        if removed.is_some() {
            tracing::info!(%match_id, "session removed");
        }
        removed
    }

    /// Removes `session` if nobody is connected to it any more.
    ///
    /// The connection count is read under the registry lock, so a player
    /// rejoining concurrently either keeps the session alive or finds it
    /// gone afterwards through [`is_registered`](Self::is_registered).
    pub async fn remove_if_empty(&self, session: &Session<C>) -> bool {
        let match_id = session.match_id();
        let mut sessions = self.sessions.lock().await;
        match sessions.get(match_id) {
            Some(current) if std::ptr::eq(Arc::as_ptr(current), session) => {}
            _ => return false,
        }
        if session.connected_count().await > 0 {
            return false;
        }
        sessions.remove(match_id);
        tracing::info!(%match_id, "session removed");
        true
    }

    /// Whether `session` is still the one registered under its match id.
    pub async fn is_registered(&self, session: &Session<C>) -> bool {
        self.sessions
            .lock()
            .await
            .get(session.match_id())
            .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), session))
    }

    /// Summaries of every session, for admin and debugging views.
    ///
    /// The registry lock is held only to copy the session list; connected
    /// counts are read afterwards, one session lock at a time.
    pub async fn list_sessions_info(&self) -> Vec<SessionInfo> {
        let sessions = self.snapshot().await;
        let ttl = self.config.session_ttl;

        let mut infos = Vec::with_capacity(sessions.len());
        for session in sessions {
            let [a, b] = session.players();
            infos.push(SessionInfo {
                match_id: session.match_id().clone(),
                players: [
                    PlayerInfo {
                        name: a.name.clone(),
                        attribute: a.attribute.clone(),
                    },
                    PlayerInfo {
                        name: b.name.clone(),
                        attribute: b.attribute.clone(),
                    },
                ],
                connected_count: session.connected_count().await,
                is_stale: session.is_stale(ttl),
            });
        }
        infos
    }

    /// Runs one sweep right now and returns the ids it removed.
    ///
    /// The background loop calls the same routine every
    /// `sweep_interval`.
    pub async fn sweep_stale(&self) -> Vec<MatchId> {
        remove_stale(&self.sessions, self.config.session_ttl).await
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// `true` if there are no live sessions.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    async fn snapshot(&self) -> Vec<Arc<Session<C>>> {
        self.sessions.lock().await.values().cloned().collect()
    }
}

impl<C: Connection> Default for SessionRegistry<C> {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Sweep
// ---------------------------------------------------------------------------

async fn sweep_loop<C: Connection>(
    sessions: Arc<Mutex<SessionMap<C>>>,
    interval: Duration,
    ttl: Duration,
) {
    // First sweep one full interval after start, not immediately.
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        remove_stale(&sessions, ttl).await;
    }
}

/// Two lock acquisitions: collect the stale ids, then remove them.
///
/// The second pass re-checks staleness so a session that saw activity in
/// between survives.
async fn remove_stale<C: Connection>(
    sessions: &Mutex<SessionMap<C>>,
    ttl: Duration,
) -> Vec<MatchId> {
    let stale: Vec<MatchId> = sessions
        .lock()
        .await
        .iter()
        .filter(|(_, session)| session.is_stale(ttl))
        .map(|(match_id, _)| match_id.clone())
        .collect();

    if stale.is_empty() {
        return stale;
    }

    let mut removed = Vec::with_capacity(stale.len());
    {
        let mut sessions = sessions.lock().await;
        for match_id in stale {
            if sessions.get(&match_id).is_some_and(|s| s.is_stale(ttl)) {
                sessions.remove(&match_id);
                removed.push(match_id);
            }
        }
    }

    if !removed.is_empty() {
        tracing::info!(
            count = removed.len(),
            match_ids = ?removed,
            "removed stale sessions"
        );
    }
    removed
}

/// Returns `len` bytes from the thread-local CSPRNG as lowercase hex.
fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// =========================================================================
// Tests
// =========================================================================
