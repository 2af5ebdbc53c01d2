//! `GameManager`: the one object connection handlers talk to.
//!
//! It owns the session registry and the matchmaker and turns connection
//! events (joined, left, pinged) into calls on them. It keeps no state of
//! its own.

use std::sync::Arc;

use zonecontrol_matchmaker::{MatchAssignment, Matchmaker, MatchmakingError};
use zonecontrol_protocol::{MatchId, ServerMessage};
use zonecontrol_session::{
    RegistryConfig, Session, SessionError, SessionInfo, SessionRegistry,
};
use zonecontrol_transport::{Connection, ConnectionId};

/// Owns the registry and matchmaker and runs the player lifecycle.
pub struct GameManager<C: Connection> {
    registry: Arc<SessionRegistry<C>>,
    matchmaker: Matchmaker<C>,
}

impl<C: Connection> GameManager<C> {
    pub fn new(config: RegistryConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new(config));
        let matchmaker = Matchmaker::new(Arc::clone(&registry));
        Self {
            registry,
            matchmaker,
        }
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Arc<SessionRegistry<C>> {
        &self.registry
    }

    // -- Lifecycle --------------------------------------------------------

    /// Starts the staleness sweep.
    pub async fn start_sessions(&self) {
        self.registry.start().await;
    }

    /// Closes the matchmaking queue, tells every connected player the
    /// server is going down, and stops the sweep.
    pub async fn stop_sessions(&self) {
        self.matchmaker.shutdown().await;
        self.registry.stop().await;
    }

    // -- Queries ----------------------------------------------------------

    /// Queues a player and resolves once they are paired.
    pub async fn wait_for_match(
        &self,
        name: &str,
        elemental: &str,
    ) -> Result<MatchAssignment, MatchmakingError> {
        self.matchmaker.wait_for_match(name, elemental).await
    }

    pub async fn get_session(&self, match_id: &MatchId) -> Option<Arc<Session<C>>> {
        self.registry.get_session(match_id).await
    }

    /// Summaries of every live session.
    pub async fn sessions_info(&self) -> Vec<SessionInfo> {
        self.registry.list_sessions_info().await
    }

    /// Players currently waiting for an opponent.
    pub async fn queue_len(&self) -> usize {
        self.matchmaker.queue_len().await
    }

    // -- Player events ----------------------------------------------------

    /// Binds `conn` to the seat owning `token` in match `match_id`.
    ///
    /// Once both seats are connected each player gets `game_ready`
    /// describing their opponent.
    ///
    /// # Errors
    /// [`SessionError::UnknownMatch`] or [`SessionError::InvalidToken`];
    /// the caller reports them to the client and closes the connection.
    pub async fn on_player_joined(
        &self,
        match_id: &MatchId,
        token: &str,
        conn: Arc<C>,
    ) -> Result<Arc<Session<C>>, SessionError> {
        let session = self.registry.require_session(match_id).await?;
        self.bind(&session, token, conn).await?;
        Ok(session)
    }

    /// Seats `conn` in a session already looked up.
    ///
    /// The session may have been emptied and removed between the lookup and
    /// the join. The seat is then released again so the caller is rejected
    /// instead of playing in a session nobody can reach.
    async fn bind(
        &self,
        session: &Session<C>,
        token: &str,
        conn: Arc<C>,
    ) -> Result<(), SessionError> {
        let match_id = session.match_id();
        let conn_id = conn.id();
        let player = session.join(token, conn).await?;

        if !self.registry.is_registered(session).await {
            session.leave_connection(token, conn_id).await;
            tracing::debug!(%match_id, %conn_id, "joined a session that was just removed");
            return Err(SessionError::UnknownMatch(match_id.clone()));
        }
        tracing::info!(%match_id, player = %player.name, "player joined");

        if session.both_connected().await {
            notify_game_ready(session).await;
        }
        Ok(())
    }

    /// Tears down the binding of `token` to connection `conn_id`.
    ///
    /// Does nothing if the seat has since been taken over by a newer
    /// connection. Otherwise the opponent is told, and the session is
    /// removed once nobody is left in it.
    pub async fn on_player_left(
        &self,
        session: &Session<C>,
        token: &str,
        conn_id: ConnectionId,
    ) {
        let match_id = session.match_id();
        if !session.leave_connection(token, conn_id).await {
            tracing::debug!(%match_id, %conn_id, "superseded connection closed");
            return;
        }

        let name = session
            .get_player_by_token(token)
            .map_or("unknown", |p| p.name.as_str());
        tracing::info!(%match_id, player = name, "player left");

        if let Err(e) = session
            .send_to_opponent(token, &ServerMessage::OpponentDisconnected)
            .await
        {
            tracing::debug!(%match_id, error = %e, "opponent notice failed");
        }

        self.registry.remove_if_empty(session).await;
    }

    /// Relays a ping from `token` to their opponent.
    ///
    /// `Ok(false)` if the opponent isn't connected.
    pub async fn relay_ping(
        &self,
        session: &Session<C>,
        token: &str,
    ) -> Result<bool, SessionError> {
        session.send_to_opponent(token, &ServerMessage::Pinged).await
    }
}

/// Sends each seat a `game_ready` naming the other. Best-effort: a failed
/// send is logged and the other seat still gets theirs.
async fn notify_game_ready<C: Connection>(session: &Session<C>) {
    let [a, b] = session.players();
    for (me, them) in [(a, b), (b, a)] {
        let msg = ServerMessage::GameReady {
            match_id: session.match_id().clone(),
            you: me.name.clone(),
            opponent: them.name.clone(),
            opponent_elemental: them.attribute.clone(),
        };
        if let Err(e) = session.send_to(&me.token, &msg).await {
            tracing::warn!(
                match_id = %session.match_id(),
                player = %me.name,
                error = %e,
                "game_ready send failed"
            );
        }
    }
    tracing::info!(match_id = %session.match_id(), "game ready");
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use zonecontrol_transport::TransportError;

    struct Recorder {
        id: ConnectionId,
        frames: Mutex<Vec<serde_json::Value>>,
    }

    impl Recorder {
        fn new(id: u64) -> Arc<Self> {
            Arc::new(Self {
                id: ConnectionId::new(id),
                frames: Mutex::new(Vec::new()),
            })
        }

        fn types(&self) -> Vec<String> {
            self.frames
                .lock()
                .unwrap()
                .iter()
                .map(|f| f["type"].as_str().unwrap().to_owned())
                .collect()
        }

        fn last(&self) -> serde_json::Value {
            self.frames.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl Connection for Recorder {
        type Error = TransportError;

        async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
            let frame = serde_json::from_slice(data).unwrap();
            self.frames.lock().unwrap().push(frame);
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

    /// Alice (fire) and Bob (water) paired into one match.
    async fn paired() -> (GameManager<Recorder>, MatchId, String, String) {
        let manager = GameManager::new(RegistryConfig::default());
        let (match_id, alice, bob) = manager
            .registry()
            .create_match("Alice", "fire", "Bob", "water")
            .await;
        (manager, match_id, alice, bob)
    }

    #[tokio::test]
    async fn test_game_ready_sent_only_when_both_joined() {
        let (manager, match_id, alice, bob) = paired().await;
        let alice_conn = Recorder::new(1);
        let bob_conn = Recorder::new(2);

        manager
            .on_player_joined(&match_id, &alice, Arc::clone(&alice_conn))
            .await
            .unwrap();
        assert!(alice_conn.types().is_empty());

        manager
            .on_player_joined(&match_id, &bob, Arc::clone(&bob_conn))
            .await
            .unwrap();

        let to_alice = alice_conn.last();
        assert_eq!(to_alice["type"], "game_ready");
        assert_eq!(to_alice["you"], "Alice");
        assert_eq!(to_alice["opponent"], "Bob");
        assert_eq!(to_alice["opponent_elemental"], "water");

        let to_bob = bob_conn.last();
        assert_eq!(to_bob["you"], "Bob");
        assert_eq!(to_bob["opponent_elemental"], "fire");
        assert_eq!(to_bob["match_id"], match_id.as_str());
    }

    #[tokio::test]
    async fn test_join_unknown_match_returns_unknown_match() {
        let manager = GameManager::<Recorder>::new(RegistryConfig::default());
        let result = manager
            .on_player_joined(&MatchId::from("nope"), "t", Recorder::new(1))
            .await;
        assert!(matches!(result, Err(SessionError::UnknownMatch(_))));
    }

    #[tokio::test]
    async fn test_join_with_foreign_token_returns_invalid_token() {
        let (manager, match_id, _, _) = paired().await;
        let result = manager
            .on_player_joined(&match_id, "forged", Recorder::new(1))
            .await;
        assert!(matches!(result, Err(SessionError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_player_left_notifies_opponent_then_removes_empty_session() {
        let (manager, match_id, alice, bob) = paired().await;
        let alice_conn = Recorder::new(1);
        let bob_conn = Recorder::new(2);
        let session = manager
            .on_player_joined(&match_id, &alice, Arc::clone(&alice_conn))
            .await
            .unwrap();
        manager
            .on_player_joined(&match_id, &bob, Arc::clone(&bob_conn))
            .await
            .unwrap();

        manager.on_player_left(&session, &alice, alice_conn.id()).await;
        assert_eq!(bob_conn.last()["type"], "opponent_disconnected");
        assert!(manager.get_session(&match_id).await.is_some());

        manager.on_player_left(&session, &bob, bob_conn.id()).await;
        assert!(manager.get_session(&match_id).await.is_none());
        assert!(!alice_conn.types().contains(&"opponent_disconnected".into()));
    }

    #[tokio::test]
    async fn test_superseded_connection_leaving_changes_nothing() {
        let (manager, match_id, alice, bob) = paired().await;
        let first = Recorder::new(1);
        let second = Recorder::new(2);
        let bob_conn = Recorder::new(3);
        let session = manager
            .on_player_joined(&match_id, &alice, Arc::clone(&first))
            .await
            .unwrap();
        manager
            .on_player_joined(&match_id, &bob, Arc::clone(&bob_conn))
            .await
            .unwrap();
        manager
            .on_player_joined(&match_id, &alice, Arc::clone(&second))
            .await
            .unwrap();
        let frames_before = bob_conn.types().len();

        manager.on_player_left(&session, &alice, first.id()).await;

        assert_eq!(session.connected_count().await, 2);
        assert_eq!(bob_conn.types().len(), frames_before, "Bob not told");
    }

    #[tokio::test]
    async fn test_join_into_session_removed_after_lookup_is_rejected() {
        let (manager, match_id, alice, _) = paired().await;
        let session = manager.registry().require_session(&match_id).await.unwrap();
        manager.registry().remove_session(&match_id).await;

        let result = manager.bind(&session, &alice, Recorder::new(1)).await;

        assert!(matches!(result, Err(SessionError::UnknownMatch(_))));
        assert_eq!(session.connected_count().await, 0, "seat released again");
    }

    #[tokio::test]
    async fn test_rejoin_before_leave_finishes_keeps_session() {
        let (manager, match_id, alice, _) = paired().await;
        let first = Recorder::new(1);
        let session = manager
            .on_player_joined(&match_id, &alice, Arc::clone(&first))
            .await
            .unwrap();

        // The old seat is released and Alice is already back on a new
        // connection when the leave handler gets to the removal step.
        assert!(session.leave_connection(&alice, first.id()).await);
        manager
            .on_player_joined(&match_id, &alice, Recorder::new(2))
            .await
            .unwrap();
        manager.registry().remove_if_empty(&session).await;

        assert!(manager.get_session(&match_id).await.is_some());
        assert_eq!(session.connected_count().await, 1);
    }

    #[tokio::test]
    async fn test_relay_ping_reaches_only_opponent() {
        let (manager, match_id, alice, bob) = paired().await;
        let alice_conn = Recorder::new(1);
        let session = manager
            .on_player_joined(&match_id, &alice, Arc::clone(&alice_conn))
            .await
            .unwrap();

        assert!(!manager.relay_ping(&session, &alice).await.unwrap());

        let bob_conn = Recorder::new(2);
        manager
            .on_player_joined(&match_id, &bob, Arc::clone(&bob_conn))
            .await
            .unwrap();
        assert!(manager.relay_ping(&session, &alice).await.unwrap());

        assert_eq!(bob_conn.last()["type"], "pinged");
        assert_eq!(alice_conn.types(), ["game_ready"]);
    }

    #[tokio::test]
    async fn test_stop_sessions_closes_matchmaking() {
        let manager = Arc::new(GameManager::<Recorder>::new(
            RegistryConfig::default(),
        ));
        let waiter = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                manager.wait_for_match("Alice", "fire").await
            })
        };
        while manager.queue_len().await == 0 {
            tokio::task::yield_now().await;
        }

        manager.stop_sessions().await;

        assert!(matches!(
            waiter.await.unwrap(),
            Err(MatchmakingError::Closed)
        ));
    }
}
