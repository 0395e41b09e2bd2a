//! Match-result confirmation state machine
//!
//! A reported result is only provisional until both participants sign off.
//! Either side may deny before full consensus, which discards the proposal
//! even if the other side had already confirmed. The second confirmation
//! finalizes the result: ratings, counters, history and the match record are
//! committed in a single store transaction, then tiers, personal bests and
//! notifications follow as best-effort post-commit work.

use crate::active::ActiveMatchManager;
use crate::error::{LadderError, Result};
use crate::notify::{notify_or_log, sync_tier_or_log, Notifier, TierSync};
use crate::rating::{tier_transition, RatingEngine, Tier};
use crate::stats::current_win_streak;
use crate::store::LadderStore;
use crate::types::{
    ConfirmationId, MatchConfirmation, MatchRecord, Notification, Player, RecordKind,
};
use crate::utils::{current_timestamp, generate_confirmation_id};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a confirmation ended up after one participant's sign-off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationProgress {
    /// Waiting on the other participant
    PartiallyConfirmed,
    /// Both signed off; the result was committed
    Finalized,
}

/// Drives proposed results to consensus and applies finalized ones
pub struct ConfirmationEngine {
    store: Arc<dyn LadderStore>,
    ratings: Arc<dyn RatingEngine>,
    notifier: Arc<dyn Notifier>,
    matches: Arc<ActiveMatchManager>,
    tier_sync: Arc<dyn TierSync>,
}

impl ConfirmationEngine {
    pub fn new(
        store: Arc<dyn LadderStore>,
        ratings: Arc<dyn RatingEngine>,
        notifier: Arc<dyn Notifier>,
        matches: Arc<ActiveMatchManager>,
        tier_sync: Arc<dyn TierSync>,
    ) -> Self {
        Self {
            store,
            ratings,
            notifier,
            matches,
            tier_sync,
        }
    }

    /// Propose a result between two distinct registered players. Scores are
    /// stored exactly as reported with both confirm flags false; only one
    /// proposal may be pending per pair.
    pub async fn propose(
        &self,
        proposer_id: &str,
        opponent_id: &str,
        own_score: u32,
        opponent_score: u32,
    ) -> Result<MatchConfirmation> {
        if proposer_id == opponent_id {
            return Err(LadderError::SelfMatch {
                player_id: proposer_id.to_string(),
            }
            .into());
        }
        for player_id in [proposer_id, opponent_id] {
            if self.store.get_player(player_id)?.is_none() {
                return Err(LadderError::PlayerNotFound {
                    player_id: player_id.to_string(),
                }
                .into());
            }
        }

        let confirmation = MatchConfirmation {
            confirmation_id: generate_confirmation_id(),
            player1_id: proposer_id.to_string(),
            player2_id: opponent_id.to_string(),
            score1: own_score,
            score2: opponent_score,
            confirmed_by1: false,
            confirmed_by2: false,
            created_at: current_timestamp(),
        };
        self.store.insert_confirmation(confirmation.clone())?;

        notify_or_log(
            self.notifier.as_ref(),
            opponent_id,
            Notification::ResultProposed {
                confirmation_id: confirmation.confirmation_id,
                proposed_by: proposer_id.to_string(),
                score1: own_score,
                score2: opponent_score,
            },
        )
        .await;
        info!(
            "{} proposed result {}:{} against {}",
            proposer_id, own_score, opponent_score, opponent_id
        );
        Ok(confirmation)
    }

    /// Record one participant's sign-off. Idempotent per player; the call
    /// that completes the pair finalizes the result.
    pub async fn confirm(
        &self,
        confirmation_id: &ConfirmationId,
        player_id: &str,
    ) -> Result<ConfirmationProgress> {
        let outcome = self.store.confirm_result(confirmation_id, player_id)?;
        if !outcome.completed_now {
            debug!(
                "Confirmation {} waiting on the other participant",
                confirmation_id
            );
            return Ok(ConfirmationProgress::PartiallyConfirmed);
        }

        self.finalize(outcome.confirmation).await?;
        Ok(ConfirmationProgress::Finalized)
    }

    /// Discard a proposed result. Works regardless of prior partial
    /// confirmation; either party may veto before full consensus.
    pub async fn deny(&self, confirmation_id: &ConfirmationId, player_id: &str) -> Result<()> {
        let confirmation = self.store.confirmation(confirmation_id)?.ok_or_else(|| {
            LadderError::ConfirmationNotFound {
                confirmation_id: confirmation_id.to_string(),
            }
        })?;
        if !confirmation.involves(player_id) {
            return Err(LadderError::NotAParticipant {
                player_id: player_id.to_string(),
            }
            .into());
        }

        // only the call that actually deleted the row announces the denial
        if self.store.remove_confirmation(confirmation_id)? {
            let other_id = if confirmation.player1_id == player_id {
                &confirmation.player2_id
            } else {
                &confirmation.player1_id
            };
            notify_or_log(
                self.notifier.as_ref(),
                other_id,
                Notification::ResultDenied {
                    confirmation_id: *confirmation_id,
                    denied_by: player_id.to_string(),
                },
            )
            .await;
            info!("{} denied result confirmation {}", player_id, confirmation_id);
        }
        Ok(())
    }

    // Commit the consensus result and run the post-commit follow-through.
    // Ratings, counters, history, the match record and the confirmation
    // delete all land in one store transaction.
    async fn finalize(&self, confirmation: MatchConfirmation) -> Result<()> {
        let committed = self.store.commit_finalized_result(
            &confirmation.confirmation_id,
            &|rating1, rating2, outcome| {
                let update = self.ratings.apply_result(rating1, rating2, outcome);
                (update.new_rating_a, update.new_rating_b)
            },
        )?;

        if let Some(closed) = &committed.closed_match {
            self.matches.finish_closed(closed).await;
        }

        let record = &committed.record;
        self.settle_player(
            &committed.player1,
            committed.old_rating1,
            &committed.player2.id,
            record.score1,
            record.score2,
            record,
        )
        .await;
        self.settle_player(
            &committed.player2,
            committed.old_rating2,
            &committed.player1.id,
            record.score2,
            record.score1,
            record,
        )
        .await;

        info!(
            "Finalized {} vs {} at {}:{} ({} -> {}, {} -> {})",
            committed.player1.id,
            committed.player2.id,
            record.score1,
            record.score2,
            committed.old_rating1,
            committed.player1.rating,
            committed.old_rating2,
            committed.player2.rating
        );
        Ok(())
    }

    // Per-player follow-through after a committed result. Everything here is
    // best-effort; the transaction is already durable.
    async fn settle_player(
        &self,
        player: &Player,
        old_rating: i32,
        opponent_id: &str,
        own_score: u32,
        opponent_score: u32,
        record: &MatchRecord,
    ) {
        notify_or_log(
            self.notifier.as_ref(),
            &player.id,
            Notification::ResultFinalized {
                opponent_id: opponent_id.to_string(),
                own_score,
                opponent_score,
                old_rating,
                new_rating: player.rating,
            },
        )
        .await;

        if let Some((previous, current)) = tier_transition(old_rating, player.rating) {
            info!(
                "{} moved from {} to {} at rating {}",
                player.id, previous, current, player.rating
            );
            notify_or_log(
                self.notifier.as_ref(),
                &player.id,
                Notification::TierChanged {
                    previous,
                    current,
                    rating: player.rating,
                },
            )
            .await;
        }
        sync_tier_or_log(
            self.tier_sync.as_ref(),
            &player.id,
            Tier::from_rating(player.rating),
            player.rating,
        )
        .await;

        // a rating best can only follow a gain
        if player.rating > old_rating {
            self.save_record(&player.id, RecordKind::Rating, player.rating, record)
                .await;
        }
        if record.winner_id.as_deref() == Some(player.id.as_str()) {
            match current_win_streak(self.store.as_ref(), &player.id) {
                Ok(streak) => {
                    self.save_record(&player.id, RecordKind::WinStreak, streak as i32, record)
                        .await;
                }
                Err(e) => warn!("Failed to compute win streak for {}: {}", player.id, e),
            }
        }
    }

    async fn save_record(
        &self,
        player_id: &str,
        kind: RecordKind,
        value: i32,
        record: &MatchRecord,
    ) {
        match self
            .store
            .check_and_save_record(player_id, kind, value, Some(record.match_id))
        {
            Ok(Some(saved)) => {
                info!("{} set a new {} record: {}", player_id, kind, saved.value);
                notify_or_log(
                    self.notifier.as_ref(),
                    player_id,
                    Notification::NewPersonalBest {
                        kind,
                        value: saved.value,
                    },
                )
                .await;
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to save {} record for {}: {}", kind, player_id, e),
        }
    }
}
