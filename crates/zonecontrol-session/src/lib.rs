//! Match sessions for ZoneControl.
//!
//! This crate owns the lifetime of every live match:
//!
//! 1. **Sessions**: one [`Session`] per match: two fixed seats
//!    ([`PlayerSlot`]), the connections bound to them, and send primitives
//!    addressed by seat token.
//! 2. **Registry**: [`SessionRegistry`] mints matches, hands sessions out,
//!    sweeps idle ones, and announces shutdown.
//!
//! # How it fits in the stack
//!
//! ```text
//! Matchmaker / GameManager (above)  ← pair players, drive the game flow
//!     ↕
//! Session Layer (this crate)        ← who may connect, who is connected
//!     ↕
//! Transport + Protocol (below)      ← connections, wire messages
//! ```

mod error;
#[cfg(test)]
mod mock;
mod registry;
mod session;

pub use error::SessionError;
pub use registry::{PlayerInfo, RegistryConfig, SessionInfo, SessionRegistry};
pub use session::{PlayerSlot, Session};
