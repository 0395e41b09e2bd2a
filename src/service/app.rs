//! Main application state and service coordination
//!
//! This module contains the production AppState that assembles the store,
//! the engines and their collaborators, exposes the player-facing ladder
//! operations and runs the background maintenance tasks.

use crate::active::ActiveMatchManager;
use crate::challenge::ChallengeEngine;
use crate::config::{validate_config, AppConfig};
use crate::confirmation::{ConfirmationEngine, ConfirmationProgress};
use crate::error::Result as LadderResult;
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{HealthServer, LadderSnapshot, MeteredNotifier, MetricsCollector};
use crate::notify::{LocalSessionProvider, LoggingNotifier, LoggingTierSync, Notifier};
use crate::queue::{CycleOutcome, QueueEngine};
use crate::rating::{EloRatingEngine, ExtendedEloConfig};
use crate::stats::{LeaderboardEntry, StatsService};
use crate::store::{InMemoryLadderStore, LadderStore};
use crate::types::{ActiveMatch, Challenge, Decision, MatchConfirmation, Player, QueueEntry};
use crate::utils::current_timestamp;
use serde::{Deserialize, Serialize};
use skillratings::elo::EloConfig;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// What a dispatched player decision resolved to
#[derive(Debug)]
pub enum DecisionOutcome {
    /// Range acceptance recorded; where the pairing stands afterwards
    Queue(CycleOutcome),
    /// Challenge response; carries the opened match when accepted
    Challenge(Option<ActiveMatch>),
    /// Result sign-off recorded; whether it finalized the match
    Confirmation(ConfirmationProgress),
    /// The proposed result was vetoed and discarded
    ProposalDenied,
}

/// One searching player as reported by `queue_status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchState {
    pub player_id: String,
    pub rating: i32,
    pub range_expanded: bool,
    pub waited_secs: u64,
    pub current_tolerance: u32,
}

/// Point-in-time view of the matchmaking queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    pub searching: usize,
    pub entries: Vec<SearchState>,
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Ladder storage shared by every engine
    store: Arc<dyn LadderStore>,

    /// Metrics collector backing the health server and the metered notifier
    metrics: Arc<MetricsCollector>,

    /// Active match lifecycle (sessions, reminders)
    matches: Arc<ActiveMatchManager>,

    /// Matchmaking queue engine
    queue: Arc<QueueEngine>,

    /// Result confirmation engine
    confirmations: Arc<ConfirmationEngine>,

    /// Direct challenge engine
    challenges: Arc<ChallengeEngine>,

    /// Read-side statistics queries
    stats: StatsService,

    /// Health server handle, present while started
    health_server: Mutex<Option<Arc<HealthServer>>>,

    /// Background task handles
    background_tasks: Mutex<Vec<JoinHandle<()>>>,

    /// Service status
    is_running: Arc<RwLock<bool>>,

    /// Service start instant for uptime reporting
    started_at: Instant,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing ranked-ladder service");
        info!(
            "Configuration: service={}, health_port={}, poll_interval={}ms",
            config.service.name, config.service.health_port, config.queue.poll_interval_ms
        );

        validate_config(&config).map_err(|e| ServiceError::Configuration {
            message: e.to_string(),
        })?;

        let store: Arc<dyn LadderStore> = Arc::new(InMemoryLadderStore::new());

        let metrics = Arc::new(
            MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                message: format!("Failed to create metrics collector: {}", e),
            })?,
        );

        // Every notification the engines emit passes through the metered
        // wrapper, so background-task deliveries show up in the counters.
        let notifier: Arc<dyn Notifier> = Arc::new(MeteredNotifier::new(
            Arc::new(LoggingNotifier::new()),
            metrics.as_ref().clone(),
        ));

        let rating_config = ExtendedEloConfig {
            elo_config: EloConfig {
                k: config.rating.k_factor,
            },
            initial_rating: config.rating.initial_rating,
        };
        let ratings = Arc::new(EloRatingEngine::new(rating_config).map_err(|e| {
            ServiceError::Initialization {
                message: format!("Failed to initialize rating engine: {}", e),
            }
        })?);

        let matches = Arc::new(ActiveMatchManager::new(
            store.clone(),
            notifier.clone(),
            Arc::new(LocalSessionProvider::new()),
            config.queue.reminder_after(),
        ));

        let queue = Arc::new(QueueEngine::new(
            store.clone(),
            notifier.clone(),
            matches.clone(),
            config.queue.clone(),
        ));

        let confirmations = Arc::new(ConfirmationEngine::new(
            store.clone(),
            ratings,
            notifier.clone(),
            matches.clone(),
            Arc::new(LoggingTierSync::new()),
        ));

        let challenges = Arc::new(ChallengeEngine::new(store.clone(), notifier, queue.clone()));

        let stats = StatsService::new(store.clone());

        Ok(Self {
            config,
            store,
            metrics,
            matches,
            queue,
            confirmations,
            challenges,
            stats,
            health_server: Mutex::new(None),
            background_tasks: Mutex::new(Vec::new()),
            is_running: Arc::new(RwLock::new(false)),
            started_at: Instant::now(),
        })
    }

    /// Start the health server and background maintenance tasks
    pub async fn start(self: &Arc<Self>) -> Result<(), ServiceError> {
        info!("Starting ranked-ladder service");

        *self.is_running.write().await = true;

        self.start_health_server().await?;
        self.start_background_tasks();

        info!("✅ Ranked-ladder service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of ranked-ladder service");

        *self.is_running.write().await = false;

        // Abort per-player search schedules and pending reminders
        self.queue.shutdown();
        self.matches.shutdown();

        let server = match self.health_server.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(server) = server {
            if let Err(e) = server.stop().await {
                warn!("Failed to stop health server: {}", e);
            } else {
                info!("✅ Health server stopped");
            }
        }

        self.stop_background_tasks().await;

        let final_stats = self.snapshot().map_err(|e| ServiceError::BackgroundTask {
            message: format!("Failed to gather final statistics: {}", e),
        })?;
        info!("Final service statistics: {:?}", final_stats);
        info!("✅ Ranked-ladder service shutdown completed");

        Ok(())
    }

    // ---- player-facing operations ----

    /// Register a player; an existing registration is returned unchanged
    pub async fn register(&self, player_id: &str, display_name: &str) -> LadderResult<Player> {
        let timer = self.metrics.start_timer();
        let player = self.store.register_player(
            player_id,
            display_name,
            self.config.rating.initial_rating,
        )?;
        self.metrics.record_operation("register", timer.stop());

        info!(
            "Player '{}' registered at rating {}",
            player.id, player.rating
        );
        Ok(player)
    }

    /// Put a player into the matchmaking queue
    pub async fn enqueue(&self, player_id: &str) -> LadderResult<QueueEntry> {
        let timer = self.metrics.start_timer();
        let entry = self.queue.enqueue(player_id).await?;
        self.metrics.record_enqueue(entry.rating);
        self.metrics.record_operation("enqueue", timer.stop());
        Ok(entry)
    }

    /// Take a player out of the queue; `false` when they were not searching
    pub async fn dequeue(&self, player_id: &str) -> LadderResult<bool> {
        let timer = self.metrics.start_timer();
        let removed = self.queue.dequeue(player_id).await?;
        self.metrics.record_operation("dequeue", timer.stop());
        Ok(removed)
    }

    /// Issue a direct challenge to another player
    pub async fn challenge(
        &self,
        challenger_id: &str,
        challenged_id: &str,
    ) -> LadderResult<Challenge> {
        let timer = self.metrics.start_timer();
        let challenge = self
            .challenges
            .challenge(challenger_id, challenged_id)
            .await?;
        self.metrics.record_operation("challenge", timer.stop());
        Ok(challenge)
    }

    /// Report a match result, opening a confirmation for the opponent
    pub async fn report_result(
        &self,
        proposer_id: &str,
        opponent_id: &str,
        own_score: u32,
        opponent_score: u32,
    ) -> LadderResult<MatchConfirmation> {
        let timer = self.metrics.start_timer();
        let confirmation = self
            .confirmations
            .propose(proposer_id, opponent_id, own_score, opponent_score)
            .await?;
        self.metrics.record_operation("report_result", timer.stop());
        Ok(confirmation)
    }

    /// Dispatch a player's accept/decline response to a pending interaction.
    ///
    /// The decision arrives as a typed value; each variant routes to the
    /// engine owning that interaction.
    pub async fn decide(
        &self,
        decider_id: &str,
        decision: Decision,
        accept: bool,
    ) -> LadderResult<DecisionOutcome> {
        let timer = self.metrics.start_timer();

        let outcome = match decision {
            Decision::RangeAcceptance {
                player1_id,
                player2_id,
            } => {
                let cycle = self
                    .queue
                    .respond_range_acceptance(&player1_id, &player2_id, decider_id, accept)
                    .await?;
                DecisionOutcome::Queue(cycle)
            }
            Decision::ChallengeResponse { challenge_id } => {
                let opened = self
                    .challenges
                    .respond(&challenge_id, decider_id, accept)
                    .await?;
                DecisionOutcome::Challenge(opened)
            }
            Decision::ResultConfirmation { confirmation_id } => {
                if accept {
                    // Scores are immutable for the confirmation's lifetime,
                    // so reading them before the sign-off is race-free.
                    let proposal = self.store.confirmation(&confirmation_id)?;
                    let progress = self
                        .confirmations
                        .confirm(&confirmation_id, decider_id)
                        .await?;
                    if matches!(progress, ConfirmationProgress::Finalized) {
                        let draw = proposal.map_or(false, |c| c.score1 == c.score2);
                        self.metrics.record_finalization(draw);
                    }
                    DecisionOutcome::Confirmation(progress)
                } else {
                    self.confirmations
                        .deny(&confirmation_id, decider_id)
                        .await?;
                    self.metrics.record_denial();
                    DecisionOutcome::ProposalDenied
                }
            }
        };

        self.metrics.record_operation("decide", timer.stop());
        Ok(outcome)
    }

    // ---- read-side queries ----

    /// Leaderboard of the configured size
    pub fn leaderboard(&self) -> LadderResult<Vec<LeaderboardEntry>> {
        self.stats.leaderboard(self.config.service.leaderboard_size)
    }

    /// Current queue contents with per-player wait and tolerance
    pub fn queue_status(&self) -> LadderResult<QueueStatus> {
        let entries = self.queue.queue_snapshot()?;
        let states = entries.iter().map(|e| self.search_state_of(e)).collect();
        Ok(QueueStatus {
            searching: entries.len(),
            entries: states,
        })
    }

    /// Search state for one player; `None` when they are not queued
    pub fn search_state(&self, player_id: &str) -> LadderResult<Option<SearchState>> {
        Ok(self
            .store
            .queue_entry(player_id)?
            .map(|e| self.search_state_of(&e)))
    }

    fn search_state_of(&self, entry: &QueueEntry) -> SearchState {
        let waited_secs = (current_timestamp() - entry.search_started_at)
            .num_seconds()
            .max(0) as u64;
        let current_tolerance = if entry.range_expanded {
            self.config.queue.expanded_tolerance
        } else {
            self.config.queue.base_tolerance
        };
        SearchState {
            player_id: entry.player_id.clone(),
            rating: entry.rating,
            range_expanded: entry.range_expanded,
            waited_secs,
            current_tolerance,
        }
    }

    /// Current service counts for metrics and the stats endpoint
    pub fn snapshot(&self) -> LadderResult<LadderSnapshot> {
        gather_snapshot(
            self.store.as_ref(),
            &self.queue,
            &self.challenges,
            self.started_at,
        )
    }

    // ---- accessors ----

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Get the ladder store
    pub fn store(&self) -> Arc<dyn LadderStore> {
        self.store.clone()
    }

    /// Get the metrics collector
    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    /// Get the queue engine
    pub fn queue(&self) -> Arc<QueueEngine> {
        self.queue.clone()
    }

    /// Get the statistics queries
    pub fn stats(&self) -> &StatsService {
        &self.stats
    }

    #[cfg(test)]
    pub(crate) async fn set_running(&self, running: bool) {
        *self.is_running.write().await = running;
    }

    // ---- internals ----

    /// Start the health and metrics endpoints
    async fn start_health_server(self: &Arc<Self>) -> Result<(), ServiceError> {
        let port = self.config.service.health_port;
        info!("Starting health and metrics endpoints on port {}", port);

        let health_config = HealthServerConfig {
            port,
            host: "0.0.0.0".to_string(),
        };
        let server = Arc::new(
            HealthServer::new(health_config, self.metrics.clone())
                .with_app_state(Arc::clone(self)),
        );

        if let Ok(mut slot) = self.health_server.lock() {
            *slot = Some(server.clone());
        }

        let handle = tokio::spawn(async move {
            if let Err(e) = server.start().await {
                error!("Health server failed: {}", e);
            } else {
                info!("Health server task completed");
            }
        });
        if let Ok(mut tasks) = self.background_tasks.lock() {
            tasks.push(handle);
        }

        // Give the server a moment to bind
        tokio::time::sleep(Duration::from_millis(100)).await;

        info!("✅ Health server started on port {}", port);
        Ok(())
    }

    /// Start background maintenance tasks
    fn start_background_tasks(self: &Arc<Self>) {
        info!("Starting background maintenance tasks...");

        // Snapshot gauge refresh
        let snapshot_task = {
            let store = self.store.clone();
            let queue = self.queue.clone();
            let challenges = self.challenges.clone();
            let metrics = self.metrics.clone();
            let is_running = self.is_running.clone();
            let started_at = self.started_at;

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(30));
                info!("Snapshot metrics task started");

                while *is_running.read().await {
                    interval.tick().await;

                    match gather_snapshot(store.as_ref(), &queue, &challenges, started_at) {
                        Ok(snapshot) => {
                            debug!(
                                "Updating metrics - registered: {}, searching: {}, active: {}",
                                snapshot.players_registered,
                                snapshot.players_searching,
                                snapshot.active_matches
                            );
                            metrics.update_from_snapshot(&snapshot);
                        }
                        Err(e) => {
                            warn!("Failed to gather ladder snapshot for metrics: {}", e);
                        }
                    }
                }

                info!("Snapshot metrics task stopped");
            })
        };

        // Health gauge refresh
        let health_task = {
            let store = self.store.clone();
            let queue = self.queue.clone();
            let metrics = self.metrics.clone();
            let is_running = self.is_running.clone();
            let started_at = self.started_at;

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(60));
                info!("Health metrics task started");

                while *is_running.read().await {
                    interval.tick().await;

                    let uptime_seconds = started_at.elapsed().as_secs() as i64;
                    metrics.service().uptime_seconds.set(uptime_seconds);

                    let store_ok = store.player_count().is_ok();
                    let queue_ok = queue.searching_count().is_ok();
                    metrics.update_component_health("store", store_ok);
                    metrics.update_component_health("queue", queue_ok);
                    metrics.update_health_status(if store_ok && queue_ok { 2 } else { 0 });

                    debug!(
                        "Updated service health metrics - uptime: {}s",
                        uptime_seconds
                    );
                }

                info!("Health metrics task stopped");
            })
        };

        if let Ok(mut tasks) = self.background_tasks.lock() {
            tasks.push(snapshot_task);
            tasks.push(health_task);
        }

        info!("2 background maintenance tasks started successfully");
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&self) {
        let handles: Vec<JoinHandle<()>> = match self.background_tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(_) => Vec::new(),
        };

        let task_count = handles.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);
        for handle in handles {
            handle.abort();
        }

        // Give aborted tasks time to unwind
        tokio::time::sleep(Duration::from_millis(100)).await;

        info!("✅ All {} background tasks stopped", task_count);
    }
}

/// Assemble a snapshot from the store and the engines' live registries
fn gather_snapshot(
    store: &dyn LadderStore,
    queue: &QueueEngine,
    challenges: &ChallengeEngine,
    started_at: Instant,
) -> LadderResult<LadderSnapshot> {
    Ok(LadderSnapshot {
        players_registered: store.player_count()?,
        players_searching: store.queue_len()?,
        active_matches: store.active_match_count()?,
        pending_confirmations: store.confirmation_count()?,
        pending_acceptances: queue.pending_acceptance_count(),
        pending_challenges: challenges.pending_count(),
        uptime_seconds: started_at.elapsed().as_secs(),
    })
}
