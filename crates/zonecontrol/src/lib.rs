//! # ZoneControl
//!
//! Matchmaking and live two-player sessions over WebSocket.
//!
//! Players connect and send a hello frame. A `matchmaking` hello queues
//! them until an opponent arrives and hands back a match id and a secret
//! seat token. A `game` hello with those joins the match; once both seats
//! are connected the players can talk to each other through the server.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use zonecontrol::prelude::*;
//!
//! # async fn demo() -> Result<(), ZoneControlError> {
//! let server = ZoneControlServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod manager;
mod server;

pub use config::ServerConfig;
pub use error::ZoneControlError;
pub use manager::GameManager;
pub use server::{ZoneControlServer, ZoneControlServerBuilder};

/// Re-exports for the common case.
pub mod prelude {
    pub use crate::{
        GameManager, ServerConfig, ZoneControlError, ZoneControlServer,
        ZoneControlServerBuilder,
    };
    pub use zonecontrol_matchmaker::{MatchAssignment, MatchmakingError};
    pub use zonecontrol_protocol::{
        ClientHello, ClientMessage, MatchId, QueueStatus, ServerMessage,
    };
    pub use zonecontrol_session::{
        PlayerInfo, RegistryConfig, SessionError, SessionInfo,
    };
}
