//! Unified error type for the ZoneControl server.

use zonecontrol_matchmaker::MatchmakingError;
use zonecontrol_protocol::ProtocolError;
use zonecontrol_session::SessionError;
use zonecontrol_transport::TransportError;

/// Top-level error that wraps every crate-specific error.
///
/// `#[from]` on each variant lets `?` convert sub-crate errors directly.
#[derive(Debug, thiserror::Error)]
pub enum ZoneControlError {
    /// Accepting, sending, or receiving failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Unknown match, bad token, or a failed session send.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The matchmaking queue closed under a waiting player.
    #[error(transparent)]
    Matchmaking(#[from] MatchmakingError),
}
