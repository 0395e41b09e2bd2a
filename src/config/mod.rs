//! Configuration management for the ranked-ladder service
//!
//! This module handles all configuration loading from environment variables,
//! validation, and default values for the ladder service.

pub mod app;

// Re-export commonly used types
pub use app::{validate_config, AppConfig, QueueSettings, RatingSettings, ServiceSettings};
