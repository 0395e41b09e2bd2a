//! Matchmaking queue
//!
//! The queue pairs searching players by rating proximity. `engine` drives the
//! search loop, `tasks` tracks each player's timer group and `acceptance`
//! holds the consent handshakes for cross-range pairings.

pub mod acceptance;
pub mod engine;
pub mod tasks;

// Re-export commonly used types
pub use acceptance::{AcceptanceProgress, PendingAcceptance, RangeAcceptanceRegistry};
pub use engine::{CycleOutcome, QueueEngine};
pub use tasks::{GroupMember, SearchTaskGroup, SearchTaskRegistry};
