//! Rating system built on the classic two-player ELO algorithm
//!
//! This module provides the pure rating engine, tier band mapping, and
//! integration with the skillratings crate for rating math.

pub mod engine;
pub mod tier;

// Re-export commonly used types
pub use engine::{EloRatingEngine, ExtendedEloConfig, MockRatingEngine, RatingEngine, RatingUpdate};
pub use tier::{tier_transition, Tier};
