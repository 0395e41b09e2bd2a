//! Matchmaking queue engine
//!
//! Pairs queued players by nearest rating with escalating tolerance. Each
//! queued player owns a task group (periodic poll, one-shot range expansion,
//! one-shot timeout) whose callbacks re-validate queue membership under the
//! pairing lock before acting. That lock serializes every search-and-claim
//! sequence across the whole queue, so two concurrent polls can never pair
//! the same player twice; a lost claim is just "no candidate this cycle".

use crate::active::ActiveMatchManager;
use crate::config::QueueSettings;
use crate::error::{LadderError, Result};
use crate::notify::{notify_or_log, Notifier};
use crate::queue::acceptance::{AcceptanceProgress, PendingAcceptance, RangeAcceptanceRegistry};
use crate::queue::tasks::{GroupMember, SearchTaskGroup, SearchTaskRegistry};
use crate::store::LadderStore;
use crate::types::{ActiveMatch, Notification, QueueEntry, SessionRef};
use crate::utils::{current_timestamp, rating_difference};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// What a single search pass (or acceptance response) did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The player is no longer queued; the search is over
    NotQueued,
    /// Nothing suitable this cycle (includes losing a claim race)
    NoCandidate,
    /// A cross-range candidate needs consent; waiting on one or both players
    AwaitingAcceptance,
    /// A match was finalized
    Paired,
}

// Decision taken under the pairing lock, delivered after it is released
enum Resolution {
    Direct {
        active: ActiveMatch,
        requester: QueueEntry,
        candidate: QueueEntry,
    },
    AcceptanceRequested {
        requester: QueueEntry,
        candidate: QueueEntry,
        gap: u32,
    },
    AcceptancePending,
    RaceLost,
}

// Post-lock work for an acceptance response
enum Followup {
    Waiting,
    Declined {
        entry: PendingAcceptance,
        declined_by: String,
    },
    Stale,
    Finalize(Resolution),
}

/// The matchmaking queue and its per-player search schedules
pub struct QueueEngine {
    store: Arc<dyn LadderStore>,
    notifier: Arc<dyn Notifier>,
    matches: Arc<ActiveMatchManager>,
    settings: QueueSettings,
    /// Serializes all queue mutations and search-and-claim sequences
    pairing: Mutex<()>,
    tasks: SearchTaskRegistry,
    acceptances: RangeAcceptanceRegistry,
}

impl QueueEngine {
    pub fn new(
        store: Arc<dyn LadderStore>,
        notifier: Arc<dyn Notifier>,
        matches: Arc<ActiveMatchManager>,
        settings: QueueSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            matches,
            settings,
            pairing: Mutex::new(()),
            tasks: SearchTaskRegistry::new(),
            acceptances: RangeAcceptanceRegistry::new(),
        }
    }

    /// Put a registered player into the queue and start their search tasks.
    ///
    /// Re-enqueueing while already searching refreshes the entry: the range
    /// resets to unexpanded, the search clock restarts and a fresh task group
    /// replaces the old one. Fails with `AlreadyInMatch` while the player has
    /// an open match.
    pub async fn enqueue(self: &Arc<Self>, player_id: &str) -> Result<QueueEntry> {
        let player = self
            .store
            .get_player(player_id)?
            .ok_or_else(|| LadderError::PlayerNotFound {
                player_id: player_id.to_string(),
            })?;

        let entry = {
            let _guard = self.pairing.lock().await;
            if self.store.active_match_for(player_id)?.is_some() {
                return Err(LadderError::AlreadyInMatch {
                    player_id: player_id.to_string(),
                }
                .into());
            }

            let refreshed = self.store.queue_entry(player_id)?.is_some();
            let entry = QueueEntry {
                player_id: player.id.clone(),
                display_name: player.display_name.clone(),
                rating: player.rating,
                search_started_at: current_timestamp(),
                range_expanded: false,
            };
            self.store.upsert_queue_entry(entry.clone())?;
            // the old group must die inside the lock so none of its units can
            // act on the refreshed entry
            self.tasks.cancel(player_id);
            if refreshed {
                debug!("Refreshed search for {}", player_id);
            }
            entry
        };

        self.spawn_search_tasks(player_id);
        info!(
            "{} queued at rating {} (tolerance {})",
            player_id, entry.rating, self.settings.base_tolerance
        );
        Ok(entry)
    }

    /// Remove a player from the queue and cancel their search; idempotent,
    /// false when the player was not queued
    pub async fn dequeue(&self, player_id: &str) -> Result<bool> {
        let removed = {
            let _guard = self.pairing.lock().await;
            if self.store.remove_queue_entry(player_id)? {
                self.tasks.cancel(player_id);
                self.acceptances.remove_involving(player_id)?;
                true
            } else {
                false
            }
        };
        if removed {
            info!("{} left the queue", player_id);
        }
        Ok(removed)
    }

    fn spawn_search_tasks(self: &Arc<Self>, player_id: &str) {
        let group_id = self.tasks.next_group_id();

        let engine = Arc::clone(self);
        let player = player_id.to_string();
        let poll = tokio::spawn(async move { engine.poll_loop(player, group_id).await });

        let engine = Arc::clone(self);
        let player = player_id.to_string();
        let expand = tokio::spawn(async move { engine.expand_once(player, group_id).await });

        let engine = Arc::clone(self);
        let player = player_id.to_string();
        let timeout = tokio::spawn(async move { engine.timeout_once(player, group_id).await });

        self.tasks.insert(
            player_id,
            SearchTaskGroup::new(group_id, poll, expand, timeout),
        );
    }

    async fn poll_loop(self: Arc<Self>, player_id: String, group_id: u64) {
        loop {
            tokio::time::sleep(self.settings.poll_interval()).await;
            match self.run_search_cycle(&player_id).await {
                Ok(CycleOutcome::Paired) | Ok(CycleOutcome::NotQueued) => break,
                Ok(_) => {}
                Err(e) => warn!("Search cycle failed for {}: {}", player_id, e),
            }
        }
        self.tasks.finish(&player_id, group_id, GroupMember::Poll);
    }

    async fn expand_once(self: Arc<Self>, player_id: String, group_id: u64) {
        tokio::time::sleep(self.settings.range_expand_after()).await;
        match self.handle_range_expansion(&player_id).await {
            Ok(CycleOutcome::Paired) => {
                self.tasks.finish(&player_id, group_id, GroupMember::Expand);
            }
            Ok(_) => {}
            Err(e) => warn!("Range expansion failed for {}: {}", player_id, e),
        }
    }

    async fn timeout_once(self: Arc<Self>, player_id: String, group_id: u64) {
        tokio::time::sleep(self.settings.queue_timeout()).await;
        if let Err(e) = self.handle_queue_timeout(&player_id).await {
            warn!("Queue timeout handling failed for {}: {}", player_id, e);
        }
        self.tasks.finish(&player_id, group_id, GroupMember::Timeout);
    }

    /// One search pass for a queued player. The whole find-resolve-claim
    /// sequence runs under the pairing lock; sessions and notifications are
    /// delivered after it is released.
    async fn run_search_cycle(&self, player_id: &str) -> Result<CycleOutcome> {
        let resolution = {
            let _guard = self.pairing.lock().await;
            let Some(entry) = self.store.queue_entry(player_id)? else {
                return Ok(CycleOutcome::NotQueued);
            };
            let tolerance = if entry.range_expanded {
                self.settings.expanded_tolerance
            } else {
                self.settings.base_tolerance
            };
            let Some(candidate) =
                self.store
                    .find_nearest_in_range(player_id, entry.rating, tolerance)?
            else {
                return Ok(CycleOutcome::NoCandidate);
            };
            self.resolve_candidate(entry, candidate)?
        };
        self.deliver(resolution).await
    }

    /// Expand a player's search range and immediately retry at the wider
    /// tolerance
    async fn handle_range_expansion(&self, player_id: &str) -> Result<CycleOutcome> {
        let resolution = {
            let _guard = self.pairing.lock().await;
            if !self.store.set_range_expanded(player_id)? {
                return Ok(CycleOutcome::NotQueued);
            }
            let Some(entry) = self.store.queue_entry(player_id)? else {
                return Ok(CycleOutcome::NotQueued);
            };
            debug!(
                "Expanded search range for {} to within {}",
                player_id, self.settings.expanded_tolerance
            );
            match self.store.find_nearest_in_range(
                player_id,
                entry.rating,
                self.settings.expanded_tolerance,
            )? {
                Some(candidate) => self.resolve_candidate(entry, candidate)?,
                None => return Ok(CycleOutcome::NoCandidate),
            }
        };
        self.deliver(resolution).await
    }

    /// Abandon a search that exhausted the queue timeout
    async fn handle_queue_timeout(&self, player_id: &str) -> Result<()> {
        let timed_out = {
            let _guard = self.pairing.lock().await;
            match self.store.queue_entry(player_id)? {
                Some(entry) => {
                    self.store.remove_queue_entry(player_id)?;
                    self.acceptances.remove_involving(player_id)?;
                    Some(entry)
                }
                None => None,
            }
        };

        if let Some(entry) = timed_out {
            let waited_secs = (current_timestamp() - entry.search_started_at)
                .num_seconds()
                .max(0) as u64;
            notify_or_log(
                self.notifier.as_ref(),
                player_id,
                Notification::QueueTimeout { waited_secs },
            )
            .await;
            info!("{} timed out of the queue after {}s", player_id, waited_secs);
        }
        Ok(())
    }

    // Decide what to do with a found candidate. Must run under the pairing
    // lock. A gap within the base tolerance, or one both players widened to,
    // pairs directly; anything wider needs both players' consent first.
    fn resolve_candidate(
        &self,
        requester: QueueEntry,
        candidate: QueueEntry,
    ) -> Result<Resolution> {
        let gap = rating_difference(requester.rating, candidate.rating);
        let within_base = gap <= self.settings.base_tolerance;
        let both_expanded = requester.range_expanded && candidate.range_expanded;

        if within_base || both_expanded {
            if !self
                .store
                .remove_queue_pair(&requester.player_id, &candidate.player_id)?
            {
                return Ok(Resolution::RaceLost);
            }
            let active = match self
                .matches
                .open(&requester.player_id, &candidate.player_id)
            {
                Ok(active) => active,
                Err(e) => {
                    // claimed players must not stay stranded off the queue
                    warn!("Requeueing pair after failed match open: {}", e);
                    self.store.upsert_queue_entry(requester)?;
                    self.store.upsert_queue_entry(candidate)?;
                    return Ok(Resolution::RaceLost);
                }
            };
            self.tasks.cancel(&candidate.player_id);
            self.acceptances.remove_involving(&requester.player_id)?;
            self.acceptances.remove_involving(&candidate.player_id)?;
            return Ok(Resolution::Direct {
                active,
                requester,
                candidate,
            });
        }

        if self
            .acceptances
            .insert_if_absent(&requester.player_id, &candidate.player_id)?
        {
            Ok(Resolution::AcceptanceRequested {
                requester,
                candidate,
                gap,
            })
        } else {
            Ok(Resolution::AcceptancePending)
        }
    }

    async fn deliver(&self, resolution: Resolution) -> Result<CycleOutcome> {
        match resolution {
            Resolution::Direct {
                active,
                requester,
                candidate,
            } => {
                let session_ref = self.matches.attach_session(&active).await;
                self.notify_match_found(&active, &requester, &candidate, session_ref)
                    .await;
                info!(
                    "Paired {} ({}) with {} ({})",
                    requester.player_id, requester.rating, candidate.player_id, candidate.rating
                );
                Ok(CycleOutcome::Paired)
            }
            Resolution::AcceptanceRequested {
                requester,
                candidate,
                gap,
            } => {
                notify_or_log(
                    self.notifier.as_ref(),
                    &requester.player_id,
                    Notification::RangeAcceptanceRequested {
                        opponent_id: candidate.player_id.clone(),
                        rating_difference: gap,
                    },
                )
                .await;
                notify_or_log(
                    self.notifier.as_ref(),
                    &candidate.player_id,
                    Notification::RangeAcceptanceRequested {
                        opponent_id: requester.player_id.clone(),
                        rating_difference: gap,
                    },
                )
                .await;
                info!(
                    "Requested range acceptance between {} and {} (gap {})",
                    requester.player_id, candidate.player_id, gap
                );
                Ok(CycleOutcome::AwaitingAcceptance)
            }
            Resolution::AcceptancePending => Ok(CycleOutcome::AwaitingAcceptance),
            Resolution::RaceLost => Ok(CycleOutcome::NoCandidate),
        }
    }

    async fn notify_match_found(
        &self,
        active: &ActiveMatch,
        requester: &QueueEntry,
        candidate: &QueueEntry,
        session_ref: Option<SessionRef>,
    ) {
        notify_or_log(
            self.notifier.as_ref(),
            &requester.player_id,
            Notification::MatchFound {
                match_id: active.match_id,
                opponent_id: candidate.player_id.clone(),
                opponent_rating: candidate.rating,
                session_ref: session_ref.clone(),
            },
        )
        .await;
        notify_or_log(
            self.notifier.as_ref(),
            &candidate.player_id,
            Notification::MatchFound {
                match_id: active.match_id,
                opponent_id: requester.player_id.clone(),
                opponent_rating: requester.rating,
                session_ref,
            },
        )
        .await;
    }

    /// Record one side of a pending range acceptance. Both accepts finalize
    /// the pairing; a decline leaves both players queued and searching.
    pub async fn respond_range_acceptance(
        &self,
        player1_id: &str,
        player2_id: &str,
        decider_id: &str,
        accept: bool,
    ) -> Result<CycleOutcome> {
        let followup = {
            let _guard = self.pairing.lock().await;
            let (entry, progress) =
                self.acceptances
                    .record(player1_id, player2_id, decider_id, accept)?;
            match progress {
                AcceptanceProgress::Waiting => Followup::Waiting,
                AcceptanceProgress::Declined { declined_by } => {
                    Followup::Declined { entry, declined_by }
                }
                AcceptanceProgress::BothAccepted => self.finalize_accepted_pair(entry)?,
            }
        };

        match followup {
            Followup::Waiting => Ok(CycleOutcome::AwaitingAcceptance),
            Followup::Declined { entry, declined_by } => {
                let other_id = if entry.requester_id == declined_by {
                    &entry.candidate_id
                } else {
                    &entry.requester_id
                };
                notify_or_log(
                    self.notifier.as_ref(),
                    other_id,
                    Notification::RangeAcceptanceDeclined {
                        opponent_id: declined_by.clone(),
                    },
                )
                .await;
                info!(
                    "{} declined the pairing with {}; both keep searching",
                    declined_by, other_id
                );
                Ok(CycleOutcome::NoCandidate)
            }
            Followup::Stale => Ok(CycleOutcome::NotQueued),
            Followup::Finalize(resolution) => self.deliver(resolution).await,
        }
    }

    // Claim and open a pairing both players consented to. Must run under the
    // pairing lock. Either player may have left the queue or been paired
    // elsewhere since consenting, which voids the acceptance.
    fn finalize_accepted_pair(&self, entry: PendingAcceptance) -> Result<Followup> {
        let (Some(requester), Some(candidate)) = (
            self.store.queue_entry(&entry.requester_id)?,
            self.store.queue_entry(&entry.candidate_id)?,
        ) else {
            info!(
                "Range acceptance between {} and {} went stale",
                entry.requester_id, entry.candidate_id
            );
            return Ok(Followup::Stale);
        };

        if !self
            .store
            .remove_queue_pair(&requester.player_id, &candidate.player_id)?
        {
            return Ok(Followup::Stale);
        }

        let active = match self
            .matches
            .open(&requester.player_id, &candidate.player_id)
        {
            Ok(active) => active,
            Err(e) => {
                warn!("Requeueing accepted pair after failed match open: {}", e);
                self.store.upsert_queue_entry(requester)?;
                self.store.upsert_queue_entry(candidate)?;
                return Ok(Followup::Stale);
            }
        };

        // the responder runs outside any search task, so cancelling both
        // groups cannot abort the code running here
        self.tasks.cancel(&requester.player_id);
        self.tasks.cancel(&candidate.player_id);
        self.acceptances.remove_involving(&requester.player_id)?;
        self.acceptances.remove_involving(&candidate.player_id)?;

        Ok(Followup::Finalize(Resolution::Direct {
            active,
            requester,
            candidate,
        }))
    }

    /// Open a match for two players pairing outside the queue (direct
    /// challenges). Runs under the pairing lock so queue membership cannot
    /// shift mid-check; fails while either player is still searching.
    pub async fn open_direct_match(
        &self,
        player1_id: &str,
        player2_id: &str,
    ) -> Result<(ActiveMatch, Option<SessionRef>)> {
        let active = {
            let _guard = self.pairing.lock().await;
            for player_id in [player1_id, player2_id] {
                if self.store.queue_entry(player_id)?.is_some() {
                    return Err(LadderError::AlreadyQueued {
                        player_id: player_id.to_string(),
                    }
                    .into());
                }
            }
            self.matches.open(player1_id, player2_id)?
        };
        let session_ref = self.matches.attach_session(&active).await;
        Ok((active, session_ref))
    }

    /// Current queue entries, oldest search first
    pub fn queue_snapshot(&self) -> Result<Vec<QueueEntry>> {
        self.store.queue_entries()
    }

    /// Number of players currently searching
    pub fn searching_count(&self) -> Result<usize> {
        self.store.queue_len()
    }

    /// Number of pairings awaiting consent
    pub fn pending_acceptance_count(&self) -> usize {
        self.acceptances.len()
    }

    /// Number of live per-player task groups
    pub fn live_task_groups(&self) -> usize {
        self.tasks.len()
    }

    /// Abort every live search task (service shutdown)
    pub fn shutdown(&self) {
        let cancelled = self.tasks.cancel_all();
        if cancelled > 0 {
            info!("Aborted {} search task groups", cancelled);
        }
    }
}
