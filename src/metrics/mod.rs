//! Metrics and monitoring for the ranked-ladder service
//!
//! This module provides metrics collection, health monitoring and the HTTP
//! endpoints that expose both. The collector is shared between the engines
//! (via the metered notifier), the background refresh tasks and the health
//! server; `AppState` owns the wiring.

pub mod collector;
pub mod health;

pub use collector::{
    LadderSnapshot, MatchMetrics, MeteredNotifier, MetricsCollector, MetricsTimer, QueueMetrics,
    ServiceMetrics,
};
pub use health::{HealthServer, HealthServerConfig};
