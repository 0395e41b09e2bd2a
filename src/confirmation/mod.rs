//! Result confirmation

pub mod machine;

// Re-export commonly used types
pub use machine::{ConfirmationEngine, ConfirmationProgress};
