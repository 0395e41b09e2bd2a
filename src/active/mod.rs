//! Active match lifecycle
//!
//! Tracks paired matches from open to close, including the one-shot result
//! reminder and session teardown.

pub mod lifecycle;

// Re-export commonly used types
pub use lifecycle::ActiveMatchManager;
