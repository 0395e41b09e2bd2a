//! Pending range acceptances
//!
//! When an expanded search turns up an opponent outside someone's unexpanded
//! band, the pairing needs both players' consent before it becomes a match.
//! This registry tracks those pending decisions, keyed by the unordered pair,
//! while both players stay in the queue and keep searching.

use crate::error::{LadderError, Result};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// A pairing awaiting both players' consent
#[derive(Debug, Clone)]
pub struct PendingAcceptance {
    /// The searching player whose cycle found the candidate
    pub requester_id: String,
    pub candidate_id: String,
    pub accepted_by_requester: bool,
    pub accepted_by_candidate: bool,
    pub requested_at: DateTime<Utc>,
}

impl PendingAcceptance {
    pub fn involves(&self, player_id: &str) -> bool {
        self.requester_id == player_id || self.candidate_id == player_id
    }
}

/// How a recorded decision left the pending acceptance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptanceProgress {
    /// One side accepted, the other has not answered yet
    Waiting,
    /// Both sides accepted; the pairing may be finalized
    BothAccepted,
    /// One side declined; the pending acceptance is gone
    Declined { declined_by: String },
}

fn pair_key(player1_id: &str, player2_id: &str) -> (String, String) {
    if player1_id <= player2_id {
        (player1_id.to_string(), player2_id.to_string())
    } else {
        (player2_id.to_string(), player1_id.to_string())
    }
}

/// Registry of pending range acceptances keyed by unordered player pair
#[derive(Debug, Default)]
pub struct RangeAcceptanceRegistry {
    pending: std::sync::Mutex<HashMap<(String, String), PendingAcceptance>>,
}

impl RangeAcceptanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<(String, String), PendingAcceptance>>> {
        self.pending.lock().map_err(|_| {
            LadderError::InternalError {
                message: "Failed to acquire acceptance lock".to_string(),
            }
            .into()
        })
    }

    /// Track a new pending acceptance unless the pair already has one;
    /// true when newly inserted
    pub fn insert_if_absent(&self, requester_id: &str, candidate_id: &str) -> Result<bool> {
        let mut pending = self.lock()?;
        let key = pair_key(requester_id, candidate_id);
        if pending.contains_key(&key) {
            return Ok(false);
        }
        pending.insert(
            key,
            PendingAcceptance {
                requester_id: requester_id.to_string(),
                candidate_id: candidate_id.to_string(),
                accepted_by_requester: false,
                accepted_by_candidate: false,
                requested_at: current_timestamp(),
            },
        );
        Ok(true)
    }

    /// Record one player's decision. A decline removes the pending entry, as
    /// does the second accept; a first accept keeps it with the flag set.
    pub fn record(
        &self,
        player1_id: &str,
        player2_id: &str,
        decider_id: &str,
        accept: bool,
    ) -> Result<(PendingAcceptance, AcceptanceProgress)> {
        let mut pending = self.lock()?;
        let key = pair_key(player1_id, player2_id);
        let Some(entry) = pending.get_mut(&key) else {
            return Err(LadderError::AcceptanceNotFound {
                player1_id: player1_id.to_string(),
                player2_id: player2_id.to_string(),
            }
            .into());
        };

        if !entry.involves(decider_id) {
            return Err(LadderError::NotAParticipant {
                player_id: decider_id.to_string(),
            }
            .into());
        }

        if !accept {
            let entry = entry.clone();
            pending.remove(&key);
            return Ok((
                entry,
                AcceptanceProgress::Declined {
                    declined_by: decider_id.to_string(),
                },
            ));
        }

        if entry.requester_id == decider_id {
            entry.accepted_by_requester = true;
        } else {
            entry.accepted_by_candidate = true;
        }

        if entry.accepted_by_requester && entry.accepted_by_candidate {
            let entry = entry.clone();
            pending.remove(&key);
            Ok((entry, AcceptanceProgress::BothAccepted))
        } else {
            Ok((entry.clone(), AcceptanceProgress::Waiting))
        }
    }

    /// Drop every pending acceptance a player is part of; used when the
    /// player leaves the queue for any reason
    pub fn remove_involving(&self, player_id: &str) -> Result<Vec<PendingAcceptance>> {
        let mut pending = self.lock()?;
        let keys: Vec<(String, String)> = pending
            .iter()
            .filter(|(_, entry)| entry.involves(player_id))
            .map(|(key, _)| key.clone())
            .collect();
        let mut removed = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = pending.remove(&key) {
                removed.push(entry);
            }
        }
        Ok(removed)
    }

    /// Whether the pair has a pending acceptance
    pub fn contains_pair(&self, player1_id: &str, player2_id: &str) -> Result<bool> {
        let pending = self.lock()?;
        Ok(pending.contains_key(&pair_key(player1_id, player2_id)))
    }

    /// Number of pending acceptances
    pub fn len(&self) -> usize {
        self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
