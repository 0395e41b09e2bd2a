//! Persistence interface for the ladder's entities
//!
//! This module defines the storage seam the engines operate through, with an
//! in-memory reference implementation. Everything the concurrency contract
//! needs to be atomic (pair claiming, reminder check-and-set, result
//! finalization) is a single store operation, so an implementation backed by
//! a real database can map each one onto a transaction.

pub mod memory;

use crate::types::{
    ActiveMatch, ConfirmationId, EloHistoryRecord, MatchConfirmation, MatchId, MatchOutcome,
    MatchRecord, Player, PlayerRecord, QueueEntry, RecordKind, SessionRef,
};

pub use memory::InMemoryLadderStore;

/// Result of atomically setting one participant's confirm flag
#[derive(Debug, Clone)]
pub struct ConfirmOutcome {
    /// The confirmation row after the update
    pub confirmation: MatchConfirmation,
    /// True only for the call that completed the second flag; the caller that
    /// observes this triggers finalization exactly once
    pub completed_now: bool,
}

/// Everything a finalization transaction changed, returned for follow-up
/// effects (notifications, tier sync, personal bests)
#[derive(Debug, Clone)]
pub struct CommittedResult {
    /// Player 1 and 2 as updated by the transaction
    pub player1: Player,
    pub player2: Player,
    pub old_rating1: i32,
    pub old_rating2: i32,
    /// The active match the transaction closed, when the pair had one
    pub closed_match: Option<ActiveMatch>,
    /// Append-only record of the completed match
    pub record: MatchRecord,
}

/// Trait for ladder storage operations
///
/// All operations are individually atomic. Implementations must be safe to
/// call from concurrent tasks.
pub trait LadderStore: Send + Sync {
    // ---- players ----

    /// Create a player if absent, otherwise return the existing row unchanged
    fn register_player(
        &self,
        player_id: &str,
        display_name: &str,
        initial_rating: i32,
    ) -> crate::error::Result<Player>;

    /// Get a player by id
    fn get_player(&self, player_id: &str) -> crate::error::Result<Option<Player>>;

    /// Total number of registered players
    fn player_count(&self) -> crate::error::Result<usize>;

    /// Players ordered by descending rating
    fn top_players(&self, limit: usize) -> crate::error::Result<Vec<Player>>;

    /// 1-based position by descending rating: players with a strictly higher
    /// rating + 1, so tied ratings share a rank. `None` for unknown players.
    fn rank_of(&self, player_id: &str) -> crate::error::Result<Option<usize>>;

    // ---- queue ----

    /// Insert or replace a player's queue entry
    fn upsert_queue_entry(&self, entry: QueueEntry) -> crate::error::Result<()>;

    /// Get a player's queue entry, if currently searching
    fn queue_entry(&self, player_id: &str) -> crate::error::Result<Option<QueueEntry>>;

    /// All current queue entries, oldest search first
    fn queue_entries(&self) -> crate::error::Result<Vec<QueueEntry>>;

    /// Number of players currently searching
    fn queue_len(&self) -> crate::error::Result<usize>;

    /// Mark a queued player's range as expanded; false when not queued
    fn set_range_expanded(&self, player_id: &str) -> crate::error::Result<bool>;

    /// Remove a queue entry; false when not queued
    fn remove_queue_entry(&self, player_id: &str) -> crate::error::Result<bool>;

    /// The queued player (excluding `exclude_player_id`) whose rating snapshot
    /// lies within `delta` of `rating_center` and is nearest to it; ties broken
    /// by earliest `search_started_at`
    fn find_nearest_in_range(
        &self,
        exclude_player_id: &str,
        rating_center: i32,
        delta: u32,
    ) -> crate::error::Result<Option<QueueEntry>>;

    /// Atomically remove both players from the queue. Removes neither and
    /// returns false unless both are still queued; the claim step of pairing.
    fn remove_queue_pair(&self, player1_id: &str, player2_id: &str) -> crate::error::Result<bool>;

    // ---- active matches ----

    /// Insert a new active match; fails with `AlreadyInMatch` if either
    /// participant already has one
    fn insert_active_match(&self, active: ActiveMatch) -> crate::error::Result<()>;

    /// Get an active match by id
    fn active_match(&self, match_id: &MatchId) -> crate::error::Result<Option<ActiveMatch>>;

    /// The active match a player takes part in, if any
    fn active_match_for(&self, player_id: &str) -> crate::error::Result<Option<ActiveMatch>>;

    /// Number of currently open matches
    fn active_match_count(&self) -> crate::error::Result<usize>;

    /// Attach a provisioned session to an open match; false when the match
    /// already closed
    fn set_session_ref(
        &self,
        match_id: &MatchId,
        session_ref: SessionRef,
    ) -> crate::error::Result<bool>;

    /// Atomically flip the reminder flag. True only for the call that actually
    /// set it on a still-open match; guarantees at-most-once reminders.
    fn mark_reminder_sent(&self, match_id: &MatchId) -> crate::error::Result<bool>;

    /// Remove an active match, returning the removed row; `None` when absent
    fn remove_active_match(&self, match_id: &MatchId)
        -> crate::error::Result<Option<ActiveMatch>>;

    // ---- result confirmations ----

    /// Insert a proposed result
    fn insert_confirmation(&self, confirmation: MatchConfirmation) -> crate::error::Result<()>;

    /// Get a pending confirmation by id
    fn confirmation(
        &self,
        confirmation_id: &ConfirmationId,
    ) -> crate::error::Result<Option<MatchConfirmation>>;

    /// Pending confirmation between the unordered pair, if any
    fn pending_confirmation_between(
        &self,
        player1_id: &str,
        player2_id: &str,
    ) -> crate::error::Result<Option<MatchConfirmation>>;

    /// Number of pending confirmations
    fn confirmation_count(&self) -> crate::error::Result<usize>;

    /// Atomically set the caller's confirm flag. Setting an already-set flag
    /// is a no-op with `completed_now` false.
    fn confirm_result(
        &self,
        confirmation_id: &ConfirmationId,
        player_id: &str,
    ) -> crate::error::Result<ConfirmOutcome>;

    /// Remove a confirmation (deny path); false when absent
    fn remove_confirmation(&self, confirmation_id: &ConfirmationId) -> crate::error::Result<bool>;

    /// Apply a completed confirmation as one transaction: both ratings and
    /// win/loss/draw counters update, one history record per player is
    /// appended, a match record is appended, the confirmation is deleted, and
    /// the pair's active match (if any) is closed. `apply_ratings` receives
    /// both current ratings and the outcome and returns the new ratings; it
    /// runs inside the transaction so concurrent finalizations touching the
    /// same player cannot interleave.
    fn commit_finalized_result(
        &self,
        confirmation_id: &ConfirmationId,
        apply_ratings: &dyn Fn(i32, i32, MatchOutcome) -> (i32, i32),
    ) -> crate::error::Result<CommittedResult>;

    // ---- history, match ledger, personal bests ----

    /// Rating history for a player, newest first
    fn rating_history(
        &self,
        player_id: &str,
        limit: usize,
    ) -> crate::error::Result<Vec<EloHistoryRecord>>;

    /// Completed matches involving a player, newest first
    fn match_records_for(
        &self,
        player_id: &str,
        limit: usize,
    ) -> crate::error::Result<Vec<MatchRecord>>;

    /// Record a personal best when `value` exceeds the stored maximum for
    /// (player, kind); returns the new record row when one was written
    fn check_and_save_record(
        &self,
        player_id: &str,
        kind: RecordKind,
        value: i32,
        related_match_id: Option<MatchId>,
    ) -> crate::error::Result<Option<PlayerRecord>>;

    /// Highest recorded value for (player, kind)
    fn best_record(
        &self,
        player_id: &str,
        kind: RecordKind,
    ) -> crate::error::Result<Option<i32>>;
}
