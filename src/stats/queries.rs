//! Ladder statistics
//!
//! Read-side queries over the store: leaderboard pages, player profiles,
//! head-to-head tallies and rating history. Everything here is derived from
//! the players table and the append-only ledgers; nothing is mutated.

use crate::error::{LadderError, Result};
use crate::rating::Tier;
use crate::store::LadderStore;
use crate::types::{EloHistoryRecord, MatchRecord, Player, RecordKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How far back ledger scans look for streaks and head-to-head tallies
const LEDGER_SCAN_LIMIT: usize = 100;

/// Rating history entries included in a profile
const RECENT_HISTORY_LIMIT: usize = 10;

/// One leaderboard row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// 1-based position; tied ratings share a rank
    pub rank: usize,
    pub player: Player,
    pub tier: Tier,
}

/// Aggregated view of one player's standing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub player: Player,
    pub tier: Tier,
    /// 1-based ladder position (strictly higher ratings + 1)
    pub rank: usize,
    /// Share of completed matches won, in percent with one decimal
    pub win_rate_percent: f64,
    /// Consecutive wins at the head of the match ledger
    pub current_win_streak: u32,
    /// Longest recorded win streak
    pub best_win_streak: u32,
    /// Average reported score, one decimal; absent before the first match
    pub average_score: Option<f64>,
    /// Highest rating ever recorded, never below the current one
    pub best_rating: i32,
    pub recent_history: Vec<EloHistoryRecord>,
}

/// Win/loss/draw tally between two players
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadToHead {
    pub player1_id: String,
    pub player2_id: String,
    pub player1_wins: u32,
    pub player2_wins: u32,
    pub draws: u32,
}

/// Consecutive wins at the head of a player's match ledger. A draw or a loss
/// breaks the streak.
pub fn current_win_streak(store: &dyn LadderStore, player_id: &str) -> Result<u32> {
    let records = store.match_records_for(player_id, LEDGER_SCAN_LIMIT)?;
    let mut streak = 0;
    for record in records {
        match record.winner_id.as_deref() {
            Some(winner) if winner == player_id => streak += 1,
            _ => break,
        }
    }
    Ok(streak)
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Read-side statistics over the ladder store
pub struct StatsService {
    store: Arc<dyn LadderStore>,
}

impl StatsService {
    pub fn new(store: Arc<dyn LadderStore>) -> Self {
        Self { store }
    }

    /// Top players by rating. Ties share a rank; the next distinct rating
    /// resumes at its positional index.
    pub fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let players = self.store.top_players(limit)?;
        let mut entries: Vec<LeaderboardEntry> = Vec::with_capacity(players.len());
        for (index, player) in players.into_iter().enumerate() {
            let rank = match entries.last() {
                Some(previous) if previous.player.rating == player.rating => previous.rank,
                _ => index + 1,
            };
            let tier = Tier::from_rating(player.rating);
            entries.push(LeaderboardEntry { rank, player, tier });
        }
        Ok(entries)
    }

    /// Full profile for a registered player
    pub fn profile(&self, player_id: &str) -> Result<PlayerProfile> {
        let player = self
            .store
            .get_player(player_id)?
            .ok_or_else(|| LadderError::PlayerNotFound {
                player_id: player_id.to_string(),
            })?;
        let rank =
            self.store
                .rank_of(player_id)?
                .ok_or_else(|| LadderError::PlayerNotFound {
                    player_id: player_id.to_string(),
                })?;

        let completed = player.wins + player.losses + player.draws;
        let win_rate_percent = if completed == 0 {
            0.0
        } else {
            round_one_decimal(player.wins as f64 * 100.0 / completed as f64)
        };

        let records = self.store.match_records_for(player_id, LEDGER_SCAN_LIMIT)?;
        let average_score = if records.is_empty() {
            None
        } else {
            let total: u32 = records
                .iter()
                .filter_map(|record| record.score_of(player_id))
                .sum();
            Some(round_one_decimal(total as f64 / records.len() as f64))
        };

        let best_rating = self
            .store
            .best_record(player_id, RecordKind::Rating)?
            .map_or(player.rating, |best| best.max(player.rating));
        let best_win_streak = self
            .store
            .best_record(player_id, RecordKind::WinStreak)?
            .map_or(0, |best| best.max(0) as u32);

        Ok(PlayerProfile {
            tier: Tier::from_rating(player.rating),
            rank,
            win_rate_percent,
            current_win_streak: current_win_streak(self.store.as_ref(), player_id)?,
            best_win_streak,
            average_score,
            best_rating,
            recent_history: self.store.rating_history(player_id, RECENT_HISTORY_LIMIT)?,
            player,
        })
    }

    /// Win/loss/draw tally between two players, symmetric in its arguments
    pub fn head_to_head(&self, player1_id: &str, player2_id: &str) -> Result<HeadToHead> {
        let records = self.store.match_records_for(player1_id, LEDGER_SCAN_LIMIT)?;
        let mut tally = HeadToHead {
            player1_id: player1_id.to_string(),
            player2_id: player2_id.to_string(),
            player1_wins: 0,
            player2_wins: 0,
            draws: 0,
        };
        for record in records.iter().filter(|r| r.involves(player2_id)) {
            match record.winner_id.as_deref() {
                Some(winner) if winner == player1_id => tally.player1_wins += 1,
                Some(winner) if winner == player2_id => tally.player2_wins += 1,
                Some(_) => {}
                None => tally.draws += 1,
            }
        }
        Ok(tally)
    }

    /// Rating history for a player, newest first
    pub fn rating_history(&self, player_id: &str, limit: usize) -> Result<Vec<EloHistoryRecord>> {
        self.store.rating_history(player_id, limit)
    }

    /// Completed matches involving a player, newest first
    pub fn recent_matches(&self, player_id: &str, limit: usize) -> Result<Vec<MatchRecord>> {
        self.store.match_records_for(player_id, limit)
    }
}
