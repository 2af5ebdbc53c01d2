//! Matchmaking for ZoneControl.
//!
//! Players call [`Matchmaker::wait_for_match`] and are paired strictly in
//! arrival order: the 1st with the 2nd, the 3rd with the 4th, and so on.
//! Each pair gets a fresh session in the
//! [`SessionRegistry`](zonecontrol_session::SessionRegistry) and each player
//! gets a [`MatchAssignment`] to join it with.
//!
//! ```text
//! Alice ── wait_for_match ──┐ (queued)
//! Bob ──── wait_for_match ──┴─→ create_match ──→ Alice: {match, token_a}
//!                                              └→ Bob:   {match, token_b}
//! ```
//!
//! Dropping a pending `wait_for_match` future withdraws the player; no
//! match is ever created with someone who has left.

mod error;
mod matchmaker;

pub use error::MatchmakingError;
pub use matchmaker::{MatchAssignment, Matchmaker};
