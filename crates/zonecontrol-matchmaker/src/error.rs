//! Error types for matchmaking.

/// Why a `wait_for_match` call ended without a match.
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    /// The matchmaker shut down (or was dropped) while the player was
    /// still queued.
    #[error("matchmaking closed before a match was found")]
    Closed,
}
