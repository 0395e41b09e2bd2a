//! Ranked Ladder - 1v1 matchmaking and rating service
//!
//! This crate provides queue-based matchmaking with rating-range search,
//! dual-confirmation result reporting, ELO ratings and tier placement for
//! head-to-head ladders.

pub mod active;
pub mod challenge;
pub mod config;
pub mod confirmation;
pub mod error;
pub mod metrics;
pub mod notify;
pub mod queue;
pub mod rating;
pub mod service;
pub mod stats;
pub mod store;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{LadderError, Result};
pub use types::*;

// Re-export key components
pub use queue::QueueEngine;
pub use rating::{EloRatingEngine, RatingEngine, Tier};
pub use store::{InMemoryLadderStore, LadderStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
