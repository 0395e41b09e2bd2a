//! Direct challenges

pub mod engine;

// Re-export commonly used types
pub use engine::ChallengeEngine;
