//! In-memory implementation of the ladder store
//!
//! A single `RwLock` guards all tables together, which is what makes the
//! composite operations (pair claiming, reminder check-and-set, result
//! finalization) atomic with respect to each other.

use crate::error::LadderError;
use crate::store::{CommittedResult, ConfirmOutcome, LadderStore};
use crate::types::{
    ActiveMatch, ConfirmationId, EloHistoryRecord, MatchConfirmation, MatchId, MatchOutcome,
    MatchRecord, Player, PlayerRecord, QueueEntry, RecordKind, SessionRef,
};
use crate::utils::{current_timestamp, generate_match_id, rating_difference};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

#[derive(Debug, Default)]
struct Tables {
    players: HashMap<String, Player>,
    queue: HashMap<String, QueueEntry>,
    matches: HashMap<MatchId, ActiveMatch>,
    confirmations: HashMap<ConfirmationId, MatchConfirmation>,
    history: Vec<EloHistoryRecord>,
    match_records: Vec<MatchRecord>,
    records: Vec<PlayerRecord>,
}

/// In-memory ladder store backed by one lock over all tables
pub struct InMemoryLadderStore {
    tables: RwLock<Tables>,
}

impl InMemoryLadderStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    fn read_tables(&self) -> crate::error::Result<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| {
            LadderError::InternalError {
                message: "Failed to acquire store read lock".to_string(),
            }
            .into()
        })
    }

    fn write_tables(&self) -> crate::error::Result<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| {
            LadderError::InternalError {
                message: "Failed to acquire store write lock".to_string(),
            }
            .into()
        })
    }
}

impl Default for InMemoryLadderStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LadderStore for InMemoryLadderStore {
    fn register_player(
        &self,
        player_id: &str,
        display_name: &str,
        initial_rating: i32,
    ) -> crate::error::Result<Player> {
        let mut tables = self.write_tables()?;

        if let Some(existing) = tables.players.get(player_id) {
            return Ok(existing.clone());
        }

        let player = Player {
            id: player_id.to_string(),
            display_name: display_name.to_string(),
            rating: initial_rating,
            wins: 0,
            losses: 0,
            draws: 0,
            registered_at: current_timestamp(),
        };
        tables.players.insert(player_id.to_string(), player.clone());

        debug!(
            "Registered player {} ({}) at rating {}",
            player_id, display_name, initial_rating
        );
        Ok(player)
    }

    fn get_player(&self, player_id: &str) -> crate::error::Result<Option<Player>> {
        let tables = self.read_tables()?;
        Ok(tables.players.get(player_id).cloned())
    }

    fn player_count(&self) -> crate::error::Result<usize> {
        let tables = self.read_tables()?;
        Ok(tables.players.len())
    }

    fn top_players(&self, limit: usize) -> crate::error::Result<Vec<Player>> {
        let tables = self.read_tables()?;
        let mut players: Vec<Player> = tables.players.values().cloned().collect();
        players.sort_by(|a, b| b.rating.cmp(&a.rating).then_with(|| a.id.cmp(&b.id)));
        players.truncate(limit);
        Ok(players)
    }

    fn rank_of(&self, player_id: &str) -> crate::error::Result<Option<usize>> {
        let tables = self.read_tables()?;
        let Some(player) = tables.players.get(player_id) else {
            return Ok(None);
        };
        let higher = tables
            .players
            .values()
            .filter(|other| other.rating > player.rating)
            .count();
        Ok(Some(higher + 1))
    }

    fn upsert_queue_entry(&self, entry: QueueEntry) -> crate::error::Result<()> {
        let mut tables = self.write_tables()?;
        tables.queue.insert(entry.player_id.clone(), entry);
        Ok(())
    }

    fn queue_entry(&self, player_id: &str) -> crate::error::Result<Option<QueueEntry>> {
        let tables = self.read_tables()?;
        Ok(tables.queue.get(player_id).cloned())
    }

    fn queue_entries(&self) -> crate::error::Result<Vec<QueueEntry>> {
        let tables = self.read_tables()?;
        let mut entries: Vec<QueueEntry> = tables.queue.values().cloned().collect();
        entries.sort_by(|a, b| {
            a.search_started_at
                .cmp(&b.search_started_at)
                .then_with(|| a.player_id.cmp(&b.player_id))
        });
        Ok(entries)
    }

    fn queue_len(&self) -> crate::error::Result<usize> {
        let tables = self.read_tables()?;
        Ok(tables.queue.len())
    }

    fn set_range_expanded(&self, player_id: &str) -> crate::error::Result<bool> {
        let mut tables = self.write_tables()?;
        match tables.queue.get_mut(player_id) {
            Some(entry) => {
                entry.range_expanded = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove_queue_entry(&self, player_id: &str) -> crate::error::Result<bool> {
        let mut tables = self.write_tables()?;
        Ok(tables.queue.remove(player_id).is_some())
    }

    fn find_nearest_in_range(
        &self,
        exclude_player_id: &str,
        rating_center: i32,
        delta: u32,
    ) -> crate::error::Result<Option<QueueEntry>> {
        let tables = self.read_tables()?;
        let candidate = tables
            .queue
            .values()
            .filter(|entry| {
                entry.player_id != exclude_player_id
                    && rating_difference(entry.rating, rating_center) <= delta
            })
            .min_by(|a, b| {
                rating_difference(a.rating, rating_center)
                    .cmp(&rating_difference(b.rating, rating_center))
                    .then_with(|| a.search_started_at.cmp(&b.search_started_at))
                    .then_with(|| a.player_id.cmp(&b.player_id))
            })
            .cloned();
        Ok(candidate)
    }

    fn remove_queue_pair(&self, player1_id: &str, player2_id: &str) -> crate::error::Result<bool> {
        let mut tables = self.write_tables()?;
        if !tables.queue.contains_key(player1_id) || !tables.queue.contains_key(player2_id) {
            return Ok(false);
        }
        tables.queue.remove(player1_id);
        tables.queue.remove(player2_id);
        Ok(true)
    }

    fn insert_active_match(&self, active: ActiveMatch) -> crate::error::Result<()> {
        let mut tables = self.write_tables()?;

        for participant in [&active.player1_id, &active.player2_id] {
            if tables.matches.values().any(|m| m.involves(participant)) {
                return Err(LadderError::AlreadyInMatch {
                    player_id: participant.clone(),
                }
                .into());
            }
        }

        debug!(
            "Opened match {} between {} and {}",
            active.match_id, active.player1_id, active.player2_id
        );
        tables.matches.insert(active.match_id, active);
        Ok(())
    }

    fn active_match(&self, match_id: &MatchId) -> crate::error::Result<Option<ActiveMatch>> {
        let tables = self.read_tables()?;
        Ok(tables.matches.get(match_id).cloned())
    }

    fn active_match_for(&self, player_id: &str) -> crate::error::Result<Option<ActiveMatch>> {
        let tables = self.read_tables()?;
        Ok(tables
            .matches
            .values()
            .find(|m| m.involves(player_id))
            .cloned())
    }

    fn active_match_count(&self) -> crate::error::Result<usize> {
        let tables = self.read_tables()?;
        Ok(tables.matches.len())
    }

    fn set_session_ref(
        &self,
        match_id: &MatchId,
        session_ref: SessionRef,
    ) -> crate::error::Result<bool> {
        let mut tables = self.write_tables()?;
        match tables.matches.get_mut(match_id) {
            Some(active) => {
                active.session_ref = Some(session_ref);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn mark_reminder_sent(&self, match_id: &MatchId) -> crate::error::Result<bool> {
        let mut tables = self.write_tables()?;
        match tables.matches.get_mut(match_id) {
            Some(active) if !active.reminder_sent => {
                active.reminder_sent = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn remove_active_match(
        &self,
        match_id: &MatchId,
    ) -> crate::error::Result<Option<ActiveMatch>> {
        let mut tables = self.write_tables()?;
        Ok(tables.matches.remove(match_id))
    }

    fn insert_confirmation(&self, confirmation: MatchConfirmation) -> crate::error::Result<()> {
        let mut tables = self.write_tables()?;

        let duplicate = tables.confirmations.values().any(|existing| {
            existing.involves(&confirmation.player1_id) && existing.involves(&confirmation.player2_id)
        });
        if duplicate {
            return Err(LadderError::ConfirmationPending {
                player1_id: confirmation.player1_id.clone(),
                player2_id: confirmation.player2_id.clone(),
            }
            .into());
        }

        tables
            .confirmations
            .insert(confirmation.confirmation_id, confirmation);
        Ok(())
    }

    fn confirmation(
        &self,
        confirmation_id: &ConfirmationId,
    ) -> crate::error::Result<Option<MatchConfirmation>> {
        let tables = self.read_tables()?;
        Ok(tables.confirmations.get(confirmation_id).cloned())
    }

    fn pending_confirmation_between(
        &self,
        player1_id: &str,
        player2_id: &str,
    ) -> crate::error::Result<Option<MatchConfirmation>> {
        let tables = self.read_tables()?;
        Ok(tables
            .confirmations
            .values()
            .find(|c| c.involves(player1_id) && c.involves(player2_id))
            .cloned())
    }

    fn confirmation_count(&self) -> crate::error::Result<usize> {
        let tables = self.read_tables()?;
        Ok(tables.confirmations.len())
    }

    fn confirm_result(
        &self,
        confirmation_id: &ConfirmationId,
        player_id: &str,
    ) -> crate::error::Result<ConfirmOutcome> {
        let mut tables = self.write_tables()?;

        let confirmation = tables.confirmations.get_mut(confirmation_id).ok_or_else(|| {
            LadderError::ConfirmationNotFound {
                confirmation_id: confirmation_id.to_string(),
            }
        })?;

        let was_complete = confirmation.confirmed_by1 && confirmation.confirmed_by2;
        if confirmation.player1_id == player_id {
            confirmation.confirmed_by1 = true;
        } else if confirmation.player2_id == player_id {
            confirmation.confirmed_by2 = true;
        } else {
            return Err(LadderError::NotAParticipant {
                player_id: player_id.to_string(),
            }
            .into());
        }
        let now_complete = confirmation.confirmed_by1 && confirmation.confirmed_by2;

        Ok(ConfirmOutcome {
            confirmation: confirmation.clone(),
            completed_now: now_complete && !was_complete,
        })
    }

    fn remove_confirmation(&self, confirmation_id: &ConfirmationId) -> crate::error::Result<bool> {
        let mut tables = self.write_tables()?;
        Ok(tables.confirmations.remove(confirmation_id).is_some())
    }

    fn commit_finalized_result(
        &self,
        confirmation_id: &ConfirmationId,
        apply_ratings: &dyn Fn(i32, i32, MatchOutcome) -> (i32, i32),
    ) -> crate::error::Result<CommittedResult> {
        let mut tables = self.write_tables()?;

        let confirmation = tables
            .confirmations
            .get(confirmation_id)
            .cloned()
            .ok_or_else(|| LadderError::ConfirmationNotFound {
                confirmation_id: confirmation_id.to_string(),
            })?;

        if !(confirmation.confirmed_by1 && confirmation.confirmed_by2) {
            return Err(LadderError::InternalError {
                message: format!(
                    "Confirmation {} committed before both players confirmed",
                    confirmation_id
                ),
            }
            .into());
        }

        let missing_player = |player_id: &str| LadderError::InternalError {
            message: format!("Player {} missing during finalization", player_id),
        };
        let old_rating1 = tables
            .players
            .get(&confirmation.player1_id)
            .map(|p| p.rating)
            .ok_or_else(|| missing_player(&confirmation.player1_id))?;
        let old_rating2 = tables
            .players
            .get(&confirmation.player2_id)
            .map(|p| p.rating)
            .ok_or_else(|| missing_player(&confirmation.player2_id))?;

        let outcome = confirmation.outcome();
        let (new_rating1, new_rating2) = apply_ratings(old_rating1, old_rating2, outcome);
        let now = current_timestamp();

        let closed_match = tables
            .matches
            .values()
            .find(|m| m.involves(&confirmation.player1_id) && m.involves(&confirmation.player2_id))
            .cloned();
        let match_id = closed_match
            .as_ref()
            .map(|m| m.match_id)
            .unwrap_or_else(generate_match_id);
        if let Some(active) = &closed_match {
            tables.matches.remove(&active.match_id);
        }

        let player1 = {
            let player = tables
                .players
                .get_mut(&confirmation.player1_id)
                .ok_or_else(|| missing_player(&confirmation.player1_id))?;
            player.rating = new_rating1;
            match outcome {
                MatchOutcome::AWins => player.wins += 1,
                MatchOutcome::BWins => player.losses += 1,
                MatchOutcome::Draw => player.draws += 1,
            }
            player.clone()
        };
        let player2 = {
            let player = tables
                .players
                .get_mut(&confirmation.player2_id)
                .ok_or_else(|| missing_player(&confirmation.player2_id))?;
            player.rating = new_rating2;
            match outcome {
                MatchOutcome::AWins => player.losses += 1,
                MatchOutcome::BWins => player.wins += 1,
                MatchOutcome::Draw => player.draws += 1,
            }
            player.clone()
        };

        tables.history.push(EloHistoryRecord {
            player_id: confirmation.player1_id.clone(),
            rating: new_rating1,
            related_match_id: Some(match_id),
            timestamp: now,
        });
        tables.history.push(EloHistoryRecord {
            player_id: confirmation.player2_id.clone(),
            rating: new_rating2,
            related_match_id: Some(match_id),
            timestamp: now,
        });

        let winner_id = match outcome {
            MatchOutcome::AWins => Some(confirmation.player1_id.clone()),
            MatchOutcome::BWins => Some(confirmation.player2_id.clone()),
            MatchOutcome::Draw => None,
        };
        let record = MatchRecord {
            match_id,
            player1_id: confirmation.player1_id.clone(),
            player2_id: confirmation.player2_id.clone(),
            score1: confirmation.score1,
            score2: confirmation.score2,
            winner_id,
            finished_at: now,
        };
        tables.match_records.push(record.clone());

        tables.confirmations.remove(confirmation_id);

        debug!(
            "Finalized match {}: {} {} -> {}, {} {} -> {}",
            match_id,
            confirmation.player1_id,
            old_rating1,
            new_rating1,
            confirmation.player2_id,
            old_rating2,
            new_rating2
        );

        Ok(CommittedResult {
            player1,
            player2,
            old_rating1,
            old_rating2,
            closed_match,
            record,
        })
    }

    fn rating_history(
        &self,
        player_id: &str,
        limit: usize,
    ) -> crate::error::Result<Vec<EloHistoryRecord>> {
        let tables = self.read_tables()?;
        let mut records: Vec<EloHistoryRecord> = tables
            .history
            .iter()
            .filter(|r| r.player_id == player_id)
            .cloned()
            .collect();
        // appended in chronological order
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }

    fn match_records_for(
        &self,
        player_id: &str,
        limit: usize,
    ) -> crate::error::Result<Vec<MatchRecord>> {
        let tables = self.read_tables()?;
        let mut records: Vec<MatchRecord> = tables
            .match_records
            .iter()
            .filter(|r| r.involves(player_id))
            .cloned()
            .collect();
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }

    fn check_and_save_record(
        &self,
        player_id: &str,
        kind: RecordKind,
        value: i32,
        related_match_id: Option<MatchId>,
    ) -> crate::error::Result<Option<PlayerRecord>> {
        let mut tables = self.write_tables()?;

        let current_best = tables
            .records
            .iter()
            .filter(|r| r.player_id == player_id && r.kind == kind)
            .map(|r| r.value)
            .max();
        if let Some(best) = current_best {
            if value <= best {
                return Ok(None);
            }
        }

        let record = PlayerRecord {
            player_id: player_id.to_string(),
            kind,
            value,
            related_match_id,
            set_at: current_timestamp(),
        };
        tables.records.push(record.clone());

        debug!("New {} record for {}: {}", kind, player_id, value);
        Ok(Some(record))
    }

    fn best_record(
        &self,
        player_id: &str,
        kind: RecordKind,
    ) -> crate::error::Result<Option<i32>> {
        let tables = self.read_tables()?;
        Ok(tables
            .records
            .iter()
            .filter(|r| r.player_id == player_id && r.kind == kind)
            .map(|r| r.value)
            .max())
    }
}
