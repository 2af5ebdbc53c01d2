//! Error types for the session layer.

use zonecontrol_protocol::{MatchId, ProtocolError};

/// Errors surfaced by [`Session`](crate::Session) and
/// [`SessionRegistry`](crate::SessionRegistry).
///
/// None of these are fatal to the process; the orchestrator reports them to
/// the client (usually by closing its connection) and carries on.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The token doesn't belong to either seat of the session.
    /// The caller's fault: a stale, mistyped, or forged token.
    #[error("invalid session token")]
    InvalidToken,

    /// No session with this match id. It may never have existed, or the
    /// staleness sweep reclaimed it.
    #[error("match {0} not found")]
    UnknownMatch(MatchId),

    /// The message could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The connection rejected the send (usually the peer is gone).
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl SessionError {
    pub(crate) fn transport<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport(Box::new(e))
    }
}
