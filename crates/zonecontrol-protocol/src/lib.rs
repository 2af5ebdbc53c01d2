//! Wire protocol for ZoneControl.
//!
//! - **Types** ([`ClientHello`], [`ClientMessage`], [`ServerMessage`],
//!   [`MatchId`]): the JSON messages exchanged with browser clients.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how values become bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (frames) → Protocol (messages) → Session / Matchmaker
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ClientHello, ClientMessage, MatchId, QueueStatus, ServerMessage,
};
