//! Metrics collection using Prometheus
//!
//! Gauges are set from periodic store snapshots (the service's stats
//! updater), operation counters are incremented at the service boundary, and
//! everything that happens inside background tasks is counted through the
//! `MeteredNotifier` decorator by notification kind.

use crate::notify::Notifier;
use crate::types::Notification;
use anyhow::Result;
use async_trait::async_trait;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the ladder service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Queue-related metrics
    queue_metrics: QueueMetrics,

    /// Match and confirmation metrics
    match_metrics: MatchMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,

    /// Core operation durations
    pub operation_duration: HistogramVec,

    /// Notifications delivered, by kind
    pub notifications_total: IntCounterVec,

    /// Notification deliveries that failed
    pub notification_failures_total: IntCounter,
}

/// Queue-related metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Players currently searching
    pub players_searching: IntGauge,

    /// Total enqueue operations accepted
    pub players_queued_total: IntCounter,

    /// Cross-range pairings currently awaiting consent
    pub pending_acceptances: IntGauge,

    /// Rating distribution observed at enqueue time
    pub rating_distribution: Histogram,
}

/// Match and confirmation metrics
#[derive(Clone)]
pub struct MatchMetrics {
    /// Registered players
    pub players_registered: IntGauge,

    /// Open matches
    pub active_matches: IntGauge,

    /// Proposed results awaiting sign-off
    pub pending_confirmations: IntGauge,

    /// Direct challenges awaiting a response
    pub pending_challenges: IntGauge,

    /// Finalized results by outcome
    pub matches_finalized_total: IntCounterVec,

    /// Proposed results vetoed before consensus
    pub results_denied_total: IntCounter,
}

/// Point-in-time service counts, polled from the store and engines
#[derive(Debug, Clone, Default)]
pub struct LadderSnapshot {
    pub players_registered: usize,
    pub players_searching: usize,
    pub active_matches: usize,
    pub pending_confirmations: usize,
    pub pending_acceptances: usize,
    pub pending_challenges: usize,
    pub uptime_seconds: u64,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let match_metrics = MatchMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            queue_metrics,
            match_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get service metrics
    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    /// Get queue metrics
    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    /// Get match metrics
    pub fn matches(&self) -> &MatchMetrics {
        &self.match_metrics
    }

    /// Set all snapshot gauges from polled counts
    pub fn update_from_snapshot(&self, snapshot: &LadderSnapshot) {
        self.service_metrics
            .uptime_seconds
            .set(snapshot.uptime_seconds as i64);
        self.queue_metrics
            .players_searching
            .set(snapshot.players_searching as i64);
        self.queue_metrics
            .pending_acceptances
            .set(snapshot.pending_acceptances as i64);
        self.match_metrics
            .players_registered
            .set(snapshot.players_registered as i64);
        self.match_metrics
            .active_matches
            .set(snapshot.active_matches as i64);
        self.match_metrics
            .pending_confirmations
            .set(snapshot.pending_confirmations as i64);
        self.match_metrics
            .pending_challenges
            .set(snapshot.pending_challenges as i64);
    }

    /// Record an accepted enqueue
    pub fn record_enqueue(&self, rating: i32) {
        self.queue_metrics.players_queued_total.inc();
        self.queue_metrics.rating_distribution.observe(rating as f64);
    }

    /// Record a finalized result; `draw` distinguishes the outcome label
    pub fn record_finalization(&self, draw: bool) {
        let outcome = if draw { "draw" } else { "decisive" };
        self.match_metrics
            .matches_finalized_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record a denied result proposal
    pub fn record_denial(&self) {
        self.match_metrics.results_denied_total.inc();
    }

    /// Record a core operation's duration
    pub fn record_operation(&self, operation: &str, duration: Duration) {
        self.service_metrics
            .operation_duration
            .with_label_values(&[operation])
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

/// Notifier decorator that counts deliveries by kind before delegating.
///
/// Background tasks (polls, expansions, timeouts, reminders) never touch the
/// collector directly; their observable effects all pass through here.
pub struct MeteredNotifier {
    inner: Arc<dyn Notifier>,
    collector: MetricsCollector,
}

impl MeteredNotifier {
    pub fn new(inner: Arc<dyn Notifier>, collector: MetricsCollector) -> Self {
        Self { inner, collector }
    }
}

#[async_trait]
impl Notifier for MeteredNotifier {
    async fn notify(
        &self,
        player_id: &str,
        notification: Notification,
    ) -> crate::error::Result<()> {
        let kind = notification.kind();
        let result = self.inner.notify(player_id, notification).await;
        self.collector
            .service()
            .notifications_total
            .with_label_values(&[kind])
            .inc();
        if result.is_err() {
            self.collector.service().notification_failures_total.inc();
        }
        result
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("ranked_ladder_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "ranked_ladder_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("ranked_ladder_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "ranked_ladder_operation_duration_seconds",
                "Core operation duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let notifications_total = IntCounterVec::new(
            Opts::new(
                "ranked_ladder_notifications_total",
                "Notifications delivered by kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(notifications_total.clone()))?;

        let notification_failures_total = IntCounter::new(
            "ranked_ladder_notification_failures_total",
            "Failed notification deliveries",
        )?;
        registry.register(Box::new(notification_failures_total.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            component_health,
            operation_duration,
            notifications_total,
            notification_failures_total,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let players_searching = IntGauge::new(
            "ranked_ladder_players_searching",
            "Players currently searching for a match",
        )?;
        registry.register(Box::new(players_searching.clone()))?;

        let players_queued_total = IntCounter::new(
            "ranked_ladder_players_queued_total",
            "Total enqueue operations accepted",
        )?;
        registry.register(Box::new(players_queued_total.clone()))?;

        let pending_acceptances = IntGauge::new(
            "ranked_ladder_pending_acceptances",
            "Cross-range pairings awaiting consent",
        )?;
        registry.register(Box::new(pending_acceptances.clone()))?;

        let rating_distribution = Histogram::with_opts(
            HistogramOpts::new(
                "ranked_ladder_rating_distribution",
                "Rating distribution at enqueue time",
            )
            .buckets(vec![
                800.0, 1000.0, 1200.0, 1400.0, 1600.0, 1800.0, 2000.0, 2400.0,
            ]),
        )?;
        registry.register(Box::new(rating_distribution.clone()))?;

        Ok(Self {
            players_searching,
            players_queued_total,
            pending_acceptances,
            rating_distribution,
        })
    }
}

impl MatchMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let players_registered = IntGauge::new(
            "ranked_ladder_players_registered",
            "Registered players on the ladder",
        )?;
        registry.register(Box::new(players_registered.clone()))?;

        let active_matches =
            IntGauge::new("ranked_ladder_active_matches", "Currently open matches")?;
        registry.register(Box::new(active_matches.clone()))?;

        let pending_confirmations = IntGauge::new(
            "ranked_ladder_pending_confirmations",
            "Proposed results awaiting sign-off",
        )?;
        registry.register(Box::new(pending_confirmations.clone()))?;

        let pending_challenges = IntGauge::new(
            "ranked_ladder_pending_challenges",
            "Direct challenges awaiting a response",
        )?;
        registry.register(Box::new(pending_challenges.clone()))?;

        let matches_finalized_total = IntCounterVec::new(
            Opts::new(
                "ranked_ladder_matches_finalized_total",
                "Finalized results by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(matches_finalized_total.clone()))?;

        let results_denied_total = IntCounter::new(
            "ranked_ladder_results_denied_total",
            "Result proposals vetoed before consensus",
        )?;
        registry.register(Box::new(results_denied_total.clone()))?;

        Ok(Self {
            players_registered,
            active_matches,
            pending_confirmations,
            pending_challenges,
            matches_finalized_total,
            results_denied_total,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}
