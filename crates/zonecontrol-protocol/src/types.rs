//! Wire types for ZoneControl.
//!
//! Everything in this module travels "on the wire" as JSON. The shapes are
//! what the browser client expects, so the serde attributes here are part of
//! the contract: every message is an object with a snake_case `type` tag.

use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Identifier of one match (one two-player session).
///
/// Opaque random text minted by the session registry. Newtype so a match
/// id can never be confused with a player token, which is also a `String`.
///
/// `#[serde(transparent)]` keeps it a plain JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub String);

impl MatchId {
    /// Borrows the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MatchId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// The first frame a client sends. It picks which flow the connection runs.
///
/// ```json
/// { "type": "matchmaking", "name": "Alice", "elemental": "fire" }
/// { "type": "game", "match_id": "…", "token": "…" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientHello {
    /// Queue for an opponent.
    Matchmaking {
        /// Display name. Missing or blank names get a generated one.
        #[serde(default)]
        name: Option<String>,
        /// The elemental the player picked. Passed through untouched.
        elemental: String,
    },

    /// Attach this connection to a match the player was assigned.
    Game {
        /// The match returned by `match_found`.
        match_id: MatchId,
        /// The player's secret token returned by `match_found`.
        token: String,
    },
}

/// In-game messages from a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Poke the opponent.
    Ping,
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// Where a matchmaking connection currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Waiting for an opponent.
    Queueing,
    /// Opponent found.
    Matched,
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Matchmaking progress.
    Status { status: QueueStatus, detail: String },

    /// Matchmaking succeeded. The client reconnects with these to play.
    MatchFound {
        match_id: MatchId,
        player_token: String,
    },

    /// Both players are connected; the game can begin.
    GameReady {
        match_id: MatchId,
        you: String,
        opponent: String,
        opponent_elemental: String,
    },

    /// The opponent sent a ping.
    Pinged,

    /// The opponent's connection went away.
    OpponentDisconnected,

    /// The server is going down.
    ServerShutdown { message: String },

    /// Something went wrong; the connection is usually closed right after.
    Error { message: String },
}

// =========================================================================
// Tests
// =========================================================================
