//! HTTP monitoring surface for the ladder service
//!
//! Serves liveness/readiness probes, the Prometheus exposition endpoint
//! and a human-readable stats page over Axum. The server can come up
//! before the ladder engines finish wiring; until an `AppState` is
//! attached every probe reports unavailable.

use crate::metrics::collector::MetricsCollector;
use crate::service::app::AppState;
use crate::service::health::{HealthCheck, HealthStatus};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Bind settings for the monitoring server
#[derive(Debug, Clone)]
pub struct HealthServerConfig {
    pub port: u16,
    pub host: String,
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// State handed to every endpoint handler
#[derive(Clone)]
struct MonitorState {
    metrics: Arc<MetricsCollector>,
    app: Option<Arc<AppState>>,
}

/// HTTP server exposing `/health`, `/ready`, `/alive`, `/metrics` and `/stats`
pub struct HealthServer {
    config: HealthServerConfig,
    state: MonitorState,
    shutdown_tx: broadcast::Sender<()>,
}

impl HealthServer {
    pub fn new(config: HealthServerConfig, metrics: Arc<MetricsCollector>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            state: MonitorState { metrics, app: None },
            shutdown_tx,
        }
    }

    /// Attach the assembled service so probes can inspect it
    pub fn with_app_state(mut self, app: Arc<AppState>) -> Self {
        self.state.app = Some(app);
        self
    }

    /// Bind and serve until `stop` is called
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid health server address")?;
        let listener = TcpListener::bind(addr).await?;
        info!("Health server listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Health server shutdown signal received");
            })
            .await?;

        info!("Health server stopped");
        Ok(())
    }

    /// Ask the serving task to drain and exit
    pub async fn stop(&self) -> Result<()> {
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Health server was not listening for shutdown: {}", e);
        }
        Ok(())
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/", get(index))
            .route("/health", get(health))
            .route("/ready", get(ready))
            .route("/alive", get(alive))
            .route("/metrics", get(metrics))
            .route("/stats", get(stats))
            .with_state(self.state.clone())
    }
}

/// Service banner and endpoint map
async fn index() -> impl IntoResponse {
    Json(json!({
        "service": "ranked-ladder",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/health", "/ready", "/alive", "/metrics", "/stats"],
    }))
}

fn status_payload(status: &str) -> Json<serde_json::Value> {
    Json(json!({
        "status": status,
        "service": "ranked-ladder",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Overall service health as JSON
async fn health(State(state): State<MonitorState>) -> impl IntoResponse {
    let Some(app) = &state.app else {
        return (StatusCode::SERVICE_UNAVAILABLE, status_payload("unhealthy"));
    };

    match HealthCheck::liveness_check(app.clone()).await {
        Ok(HealthStatus::Healthy) => (StatusCode::OK, status_payload("healthy")),
        Ok(HealthStatus::Degraded) => (StatusCode::OK, status_payload("degraded")),
        Ok(HealthStatus::Unhealthy) | Err(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, status_payload("unhealthy"))
        }
    }
}

/// Readiness probe, plain text
async fn ready(State(state): State<MonitorState>) -> impl IntoResponse {
    let Some(app) = &state.app else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Not ready");
    };

    match HealthCheck::readiness_check(app.clone()).await {
        Ok(HealthStatus::Healthy) => (StatusCode::OK, "Ready"),
        Ok(HealthStatus::Degraded) => (StatusCode::OK, "Degraded but ready"),
        Ok(HealthStatus::Unhealthy) => (StatusCode::SERVICE_UNAVAILABLE, "Not ready"),
        Err(e) => {
            error!("Readiness check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "Not ready")
        }
    }
}

/// Liveness probe, plain text
async fn alive(State(state): State<MonitorState>) -> impl IntoResponse {
    let live = match &state.app {
        Some(app) => matches!(
            HealthCheck::liveness_check(app.clone()).await,
            Ok(HealthStatus::Healthy)
        ),
        None => false,
    };

    if live {
        (StatusCode::OK, "Alive")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Not alive")
    }
}

/// Prometheus exposition of everything the collector registered
async fn metrics(State(state): State<MonitorState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let families = state.metrics.registry().gather();

    match encoder.encode_to_string(&families) {
        Ok(body) => {
            debug!("Serving {} metric families", families.len());
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, encoder.format_type().to_string())],
                body,
            )
        }
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain".to_string())],
                "metrics encoding failed".to_string(),
            )
        }
    }
}

/// Point-in-time ladder statistics for humans and dashboards
async fn stats(State(state): State<MonitorState>) -> impl IntoResponse {
    let report = match &state.app {
        Some(app) => HealthCheck::check(app.clone()).await,
        None => Err(anyhow::anyhow!("service not initialized")),
    };

    match report {
        Ok(health) => (
            StatusCode::OK,
            Json(json!({
                "service": {
                    "name": "ranked-ladder",
                    "version": env!("CARGO_PKG_VERSION"),
                    "status": health.status,
                    "uptime": health.stats.uptime_info,
                },
                "players": {
                    "registered": health.stats.players_registered,
                    "searching": health.stats.players_searching,
                },
                "matches": {
                    "active": health.stats.active_matches,
                    "pending_confirmations": health.stats.pending_confirmations,
                    "pending_challenges": health.stats.pending_challenges,
                },
                "components": health.checks,
                "timestamp": chrono::Utc::now(),
            })),
        ),
        Err(e) => {
            error!("Stats collection failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "service": {
                        "name": "ranked-ladder",
                        "version": env!("CARGO_PKG_VERSION"),
                        "status": "error",
                    },
                    "error": e.to_string(),
                    "timestamp": chrono::Utc::now(),
                })),
            )
        }
    }
}
