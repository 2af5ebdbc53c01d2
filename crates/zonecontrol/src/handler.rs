//! Per-connection handler: hello, then either matchmaking or game play.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive the hello frame → pick a flow
//!   2. Matchmaking: report `queueing`, wait for a pair, send
//!      `match_found`, close
//!   3. Game: join the match, then relay pings until the client leaves

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use zonecontrol_protocol::{
    ClientHello, ClientMessage, Codec, JsonCodec, MatchId, ProtocolError,
    QueueStatus, ServerMessage,
};
use zonecontrol_session::{Session, SessionError};
use zonecontrol_transport::{Connection, ConnectionId, WebSocketConnection};

use crate::server::ServerState;
use crate::ZoneControlError;

type Conn = WebSocketConnection;

/// Sent to a queued player when matchmaking closes under them.
const SHUTDOWN_NOTICE: &str = "Server is shutting down";

/// Drop guard that releases a player's seat when the game handler exits.
///
/// Runs even if the handler task is aborted. `Drop` is synchronous, so
/// the async teardown is spawned as a fire-and-forget task.
struct SeatGuard {
    state: Arc<ServerState>,
    session: Arc<Session<Conn>>,
    token: String,
    conn_id: ConnectionId,
}

impl Drop for SeatGuard {
    fn drop(&mut self) {
        let state = Arc::clone(&self.state);
        let session = Arc::clone(&self.session);
        let token = std::mem::take(&mut self.token);
        let conn_id = self.conn_id;
        tokio::spawn(async move {
            state
                .manager
                .on_player_left(&session, &token, conn_id)
                .await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: Conn,
    state: Arc<ServerState>,
) -> Result<(), ZoneControlError> {
    let conn = Arc::new(conn);
    tracing::debug!(conn_id = %conn.id(), "handling new connection");

    match read_hello(&conn, state.handshake_timeout).await? {
        ClientHello::Matchmaking { name, elemental } => {
            run_matchmaking(&conn, &state, name, &elemental).await
        }
        ClientHello::Game { match_id, token } => {
            run_game(conn, state, match_id, token).await
        }
    }
}

/// Waits for the first frame and decodes it as a [`ClientHello`].
async fn read_hello(
    conn: &Conn,
    timeout: Duration,
) -> Result<ClientHello, ZoneControlError> {
    let data = match tokio::time::timeout(timeout, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage(
                "connection closed before hello".into(),
            )
            .into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            close_quietly(conn).await;
            return Err(
                ProtocolError::InvalidMessage("hello timed out".into()).into()
            );
        }
    };

    match JsonCodec.decode::<ClientHello>(&data) {
        Ok(hello) => Ok(hello),
        Err(e) => {
            reject(conn, "expected a matchmaking or game hello").await;
            Err(e.into())
        }
    }
}

// ---------------------------------------------------------------------------
// Matchmaking
// ---------------------------------------------------------------------------

async fn run_matchmaking(
    conn: &Conn,
    state: &ServerState,
    name: Option<String>,
    elemental: &str,
) -> Result<(), ZoneControlError> {
    let name = resolve_name(name);
    send_message(
        conn,
        &ServerMessage::Status {
            status: QueueStatus::Queueing,
            detail: "waiting for opponent".into(),
        },
    )
    .await?;

    // Any frame from the client, or the client going away, withdraws it
    // from the queue: dropping the wait future is the cancellation.
    let outcome = tokio::select! {
        result = state.manager.wait_for_match(&name, elemental) => Some(result),
        _ = conn.recv() => None,
    };

    match outcome {
        Some(Ok(assignment)) => {
            send_message(
                conn,
                &ServerMessage::MatchFound {
                    match_id: assignment.match_id,
                    player_token: assignment.player_token,
                },
            )
            .await?;
            close_quietly(conn).await;
            Ok(())
        }
        Some(Err(e)) => {
            let notice = ServerMessage::ServerShutdown {
                message: SHUTDOWN_NOTICE.into(),
            };
            if let Err(send_err) = send_message(conn, &notice).await {
                tracing::debug!(error = %send_err, "shutdown notice failed");
            }
            close_quietly(conn).await;
            Err(e.into())
        }
        None => {
            tracing::info!(player = %name, "left matchmaking queue");
            close_quietly(conn).await;
            Ok(())
        }
    }
}

/// Trims the requested name, or makes one up if it's missing or blank.
fn resolve_name(requested: Option<String>) -> String {
    match requested.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_owned(),
        _ => format!("Player-{:04}", rand::rng().random_range(0..10_000)),
    }
}

// ---------------------------------------------------------------------------
// Game
// ---------------------------------------------------------------------------

async fn run_game(
    conn: Arc<Conn>,
    state: Arc<ServerState>,
    match_id: MatchId,
    token: String,
) -> Result<(), ZoneControlError> {
    let conn_id = conn.id();
    let joined = state
        .manager
        .on_player_joined(&match_id, &token, Arc::clone(&conn))
        .await;

    let session = match joined {
        Ok(session) => session,
        Err(e @ (SessionError::UnknownMatch(_) | SessionError::InvalidToken)) => {
            tracing::warn!(%match_id, %conn_id, error = %e, "join rejected");
            reject(&conn, &e.to_string()).await;
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    let _guard = SeatGuard {
        state: Arc::clone(&state),
        session: Arc::clone(&session),
        token: token.clone(),
        conn_id,
    };

    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::debug!(%match_id, %conn_id, "connection closed cleanly");
                break;
            }
            Err(e) => {
                tracing::debug!(%match_id, %conn_id, error = %e, "recv error");
                break;
            }
        };

        match JsonCodec.decode::<ClientMessage>(&data) {
            Ok(ClientMessage::Ping) => {
                if let Err(e) = state.manager.relay_ping(&session, &token).await {
                    tracing::debug!(%match_id, error = %e, "ping relay failed");
                }
            }
            Err(e) => {
                tracing::debug!(%match_id, %conn_id, error = %e, "undecodable frame");
                let msg = ServerMessage::Error {
                    message: "invalid message".into(),
                };
                send_message(&conn, &msg).await?;
            }
        }
    }

    // _guard drops here → seat released, opponent notified.
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn send_message(
    conn: &Conn,
    msg: &ServerMessage,
) -> Result<(), ZoneControlError> {
    let bytes = JsonCodec.encode(msg)?;
    conn.send(&bytes).await?;
    Ok(())
}

/// Sends an `error` frame and closes. The client is going away either way,
/// so failures are only logged.
async fn reject(conn: &Conn, message: &str) {
    let msg = ServerMessage::Error {
        message: message.to_owned(),
    };
    if let Err(e) = send_message(conn, &msg).await {
        tracing::debug!(conn_id = %conn.id(), error = %e, "error frame not sent");
    }
    close_quietly(conn).await;
}

async fn close_quietly(conn: &Conn) {
    if let Err(e) = conn.close().await {
        tracing::debug!(conn_id = %conn.id(), error = %e, "close failed");
    }
}
