//! Main application configuration
//!
//! This module defines the primary configuration structures for the
//! ranked-ladder service, including environment variable loading and
//! validation. Queue timings are in milliseconds so the simulator can run
//! compressed-time profiles with the same code paths.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub queue: QueueSettings,
    pub rating: RatingSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for health check endpoint
    pub health_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
    /// Number of players shown on the leaderboard
    pub leaderboard_size: usize,
}

/// Matchmaking queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Interval between per-player opponent searches in milliseconds
    pub poll_interval_ms: u64,
    /// Rating tolerance before range expansion
    pub base_tolerance: u32,
    /// Rating tolerance after range expansion
    pub expanded_tolerance: u32,
    /// Time in queue before the search range expands, in milliseconds
    pub range_expand_after_ms: u64,
    /// Time in queue before a search is abandoned, in milliseconds
    pub queue_timeout_ms: u64,
    /// Time an open match waits before a reminder is sent, in milliseconds
    pub reminder_after_ms: u64,
}

/// Rating engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingSettings {
    /// Rating assigned to newly registered players
    pub initial_rating: i32,
    /// ELO K-factor
    pub k_factor: f64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "ranked-ladder".to_string(),
            log_level: "info".to_string(),
            health_port: 8080,
            shutdown_timeout_seconds: 30,
            leaderboard_size: 10,
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10_000,       // 10 seconds
            base_tolerance: 100,
            expanded_tolerance: 200,
            range_expand_after_ms: 300_000, // 5 minutes
            queue_timeout_ms: 1_800_000,    // 30 minutes
            reminder_after_ms: 720_000,     // 12 minutes
        }
    }
}

impl Default for RatingSettings {
    fn default() -> Self {
        Self {
            initial_rating: 1000,
            k_factor: 32.0,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.service.log_level = log_level;
        }
        if let Ok(port) = env::var("HEALTH_PORT") {
            config.service.health_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid HEALTH_PORT value: {}", port))?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            config.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }
        if let Ok(size) = env::var("LEADERBOARD_SIZE") {
            config.service.leaderboard_size = size
                .parse()
                .map_err(|_| anyhow!("Invalid LEADERBOARD_SIZE value: {}", size))?;
        }

        // Queue settings
        if let Ok(interval) = env::var("QUEUE_POLL_INTERVAL_MS") {
            config.queue.poll_interval_ms = interval
                .parse()
                .map_err(|_| anyhow!("Invalid QUEUE_POLL_INTERVAL_MS value: {}", interval))?;
        }
        if let Ok(tolerance) = env::var("QUEUE_BASE_TOLERANCE") {
            config.queue.base_tolerance = tolerance
                .parse()
                .map_err(|_| anyhow!("Invalid QUEUE_BASE_TOLERANCE value: {}", tolerance))?;
        }
        if let Ok(tolerance) = env::var("QUEUE_EXPANDED_TOLERANCE") {
            config.queue.expanded_tolerance = tolerance
                .parse()
                .map_err(|_| anyhow!("Invalid QUEUE_EXPANDED_TOLERANCE value: {}", tolerance))?;
        }
        if let Ok(delay) = env::var("QUEUE_RANGE_EXPAND_AFTER_MS") {
            config.queue.range_expand_after_ms = delay
                .parse()
                .map_err(|_| anyhow!("Invalid QUEUE_RANGE_EXPAND_AFTER_MS value: {}", delay))?;
        }
        if let Ok(timeout) = env::var("QUEUE_TIMEOUT_MS") {
            config.queue.queue_timeout_ms = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid QUEUE_TIMEOUT_MS value: {}", timeout))?;
        }
        if let Ok(delay) = env::var("MATCH_REMINDER_AFTER_MS") {
            config.queue.reminder_after_ms = delay
                .parse()
                .map_err(|_| anyhow!("Invalid MATCH_REMINDER_AFTER_MS value: {}", delay))?;
        }

        // Rating settings
        if let Ok(rating) = env::var("INITIAL_RATING") {
            config.rating.initial_rating = rating
                .parse()
                .map_err(|_| anyhow!("Invalid INITIAL_RATING value: {}", rating))?;
        }
        if let Ok(k_factor) = env::var("ELO_K_FACTOR") {
            config.rating.k_factor = k_factor
                .parse()
                .map_err(|_| anyhow!("Invalid ELO_K_FACTOR value: {}", k_factor))?;
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file; absent keys fall back to defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path.display(), e))?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path.display(), e))?;

        validate_config(&config)?;
        Ok(config)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }
}

impl QueueSettings {
    /// Get search poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Get range expansion delay as Duration
    pub fn range_expand_after(&self) -> Duration {
        Duration::from_millis(self.range_expand_after_ms)
    }

    /// Get queue timeout as Duration
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }

    /// Get match reminder delay as Duration
    pub fn reminder_after(&self) -> Duration {
        Duration::from_millis(self.reminder_after_ms)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    // Validate service settings
    if config.service.health_port == 0 {
        return Err(anyhow!("Health port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }
    if config.service.leaderboard_size == 0 {
        return Err(anyhow!("Leaderboard size must be greater than 0"));
    }

    // Validate queue settings
    if config.queue.poll_interval_ms == 0 {
        return Err(anyhow!("Queue poll interval must be greater than 0"));
    }
    if config.queue.base_tolerance == 0 {
        return Err(anyhow!("Base tolerance must be greater than 0"));
    }
    if config.queue.expanded_tolerance < config.queue.base_tolerance {
        return Err(anyhow!(
            "Expanded tolerance must be at least the base tolerance"
        ));
    }
    if config.queue.range_expand_after_ms == 0 {
        return Err(anyhow!("Range expansion delay must be greater than 0"));
    }
    if config.queue.queue_timeout_ms <= config.queue.range_expand_after_ms {
        return Err(anyhow!(
            "Queue timeout must be longer than the range expansion delay"
        ));
    }
    if config.queue.reminder_after_ms == 0 {
        return Err(anyhow!("Match reminder delay must be greater than 0"));
    }

    // Validate rating settings
    if config.rating.k_factor <= 0.0 {
        return Err(anyhow!("ELO K-factor must be positive"));
    }

    Ok(())
}
