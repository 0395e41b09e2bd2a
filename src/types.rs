//! Common types used throughout the ladder engine

use crate::rating::tier::Tier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for players
pub type PlayerId = String;

/// Unique identifier for active matches
pub type MatchId = Uuid;

/// Unique identifier for result confirmations
pub type ConfirmationId = Uuid;

/// Unique identifier for direct challenges
pub type ChallengeId = Uuid;

/// Opaque reference to an externally provisioned match session (room/channel)
pub type SessionRef = String;

/// Outcome of a finished match, seen from player A's side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchOutcome {
    AWins,
    BWins,
    Draw,
}

impl MatchOutcome {
    /// Flip the outcome to player B's perspective
    pub fn reversed(&self) -> Self {
        match self {
            MatchOutcome::AWins => MatchOutcome::BWins,
            MatchOutcome::BWins => MatchOutcome::AWins,
            MatchOutcome::Draw => MatchOutcome::Draw,
        }
    }
}

impl std::fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchOutcome::AWins => write!(f, "win for player 1"),
            MatchOutcome::BWins => write!(f, "win for player 2"),
            MatchOutcome::Draw => write!(f, "draw"),
        }
    }
}

/// A registered competitor on the ladder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub display_name: String,
    pub rating: i32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub registered_at: DateTime<Utc>,
}

impl Player {
    /// Total number of completed matches
    pub fn matches_played(&self) -> u32 {
        self.wins + self.losses + self.draws
    }

    /// Current tier band for this player's rating
    pub fn tier(&self) -> Tier {
        Tier::from_rating(self.rating)
    }
}

/// A player actively searching for an opponent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub player_id: PlayerId,
    pub display_name: String,
    /// Rating snapshot taken when the search (re)started
    pub rating: i32,
    pub search_started_at: DateTime<Utc>,
    pub range_expanded: bool,
}

/// A paired, in-progress contest awaiting a reported result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveMatch {
    pub match_id: MatchId,
    pub player1_id: PlayerId,
    pub player2_id: PlayerId,
    /// Absent when session provisioning failed; the match proceeds regardless
    pub session_ref: Option<SessionRef>,
    pub reminder_sent: bool,
    pub opened_at: DateTime<Utc>,
}

impl ActiveMatch {
    /// Check whether the given player takes part in this match
    pub fn involves(&self, player_id: &str) -> bool {
        self.player1_id == player_id || self.player2_id == player_id
    }

    /// The other participant, if `player_id` is one of the pair
    pub fn opponent_of(&self, player_id: &str) -> Option<&PlayerId> {
        if self.player1_id == player_id {
            Some(&self.player2_id)
        } else if self.player2_id == player_id {
            Some(&self.player1_id)
        } else {
            None
        }
    }
}

/// Observable state of a pending result confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationState {
    Proposed,
    PartiallyConfirmed,
}

/// A proposed match result awaiting both participants' sign-off
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfirmation {
    pub confirmation_id: ConfirmationId,
    pub player1_id: PlayerId,
    pub player2_id: PlayerId,
    pub score1: u32,
    pub score2: u32,
    pub confirmed_by1: bool,
    pub confirmed_by2: bool,
    pub created_at: DateTime<Utc>,
}

impl MatchConfirmation {
    /// Current non-terminal state; terminal states delete the record
    pub fn state(&self) -> ConfirmationState {
        if self.confirmed_by1 || self.confirmed_by2 {
            ConfirmationState::PartiallyConfirmed
        } else {
            ConfirmationState::Proposed
        }
    }

    /// Outcome implied by the reported scores, from player 1's side
    pub fn outcome(&self) -> MatchOutcome {
        match self.score1.cmp(&self.score2) {
            std::cmp::Ordering::Greater => MatchOutcome::AWins,
            std::cmp::Ordering::Less => MatchOutcome::BWins,
            std::cmp::Ordering::Equal => MatchOutcome::Draw,
        }
    }

    pub fn involves(&self, player_id: &str) -> bool {
        self.player1_id == player_id || self.player2_id == player_id
    }
}

/// Append-only rating ledger entry, one per player per finalized match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EloHistoryRecord {
    pub player_id: PlayerId,
    pub rating: i32,
    pub related_match_id: Option<MatchId>,
    pub timestamp: DateTime<Utc>,
}

/// Append-only record of a completed match with its reported scores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: MatchId,
    pub player1_id: PlayerId,
    pub player2_id: PlayerId,
    pub score1: u32,
    pub score2: u32,
    /// Absent for draws
    pub winner_id: Option<PlayerId>,
    pub finished_at: DateTime<Utc>,
}

impl MatchRecord {
    pub fn involves(&self, player_id: &str) -> bool {
        self.player1_id == player_id || self.player2_id == player_id
    }

    /// Score this player reported, if a participant
    pub fn score_of(&self, player_id: &str) -> Option<u32> {
        if self.player1_id == player_id {
            Some(self.score1)
        } else if self.player2_id == player_id {
            Some(self.score2)
        } else {
            None
        }
    }
}

/// Kind of personal best tracked for a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Rating,
    WinStreak,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Rating => write!(f, "rating"),
            RecordKind::WinStreak => write!(f, "win streak"),
        }
    }
}

/// Append-only personal best, written only when the previous maximum is exceeded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub player_id: PlayerId,
    pub kind: RecordKind,
    pub value: i32,
    pub related_match_id: Option<MatchId>,
    pub set_at: DateTime<Utc>,
}

/// A pending interaction requiring a player's accept/decline response.
///
/// Decided once at the presentation boundary and passed into the core as a
/// typed value; the engines never parse composite string keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Decision {
    /// Mutual acceptance of a pairing whose rating gap exceeds one side's range
    RangeAcceptance {
        player1_id: PlayerId,
        player2_id: PlayerId,
    },
    /// Response to a direct challenge
    ChallengeResponse { challenge_id: ChallengeId },
    /// Sign-off on a proposed match result
    ResultConfirmation { confirmation_id: ConfirmationId },
}

/// Typed notification payloads delivered through the `Notifier` collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Notification {
    MatchFound {
        match_id: MatchId,
        opponent_id: PlayerId,
        opponent_rating: i32,
        session_ref: Option<SessionRef>,
    },
    RangeAcceptanceRequested {
        opponent_id: PlayerId,
        rating_difference: u32,
    },
    RangeAcceptanceDeclined {
        opponent_id: PlayerId,
    },
    ResultProposed {
        confirmation_id: ConfirmationId,
        proposed_by: PlayerId,
        score1: u32,
        score2: u32,
    },
    ResultFinalized {
        opponent_id: PlayerId,
        own_score: u32,
        opponent_score: u32,
        old_rating: i32,
        new_rating: i32,
    },
    ResultDenied {
        confirmation_id: ConfirmationId,
        denied_by: PlayerId,
    },
    QueueTimeout {
        waited_secs: u64,
    },
    MatchReminder {
        match_id: MatchId,
        opponent_id: PlayerId,
    },
    OpponentCancelled {
        match_id: MatchId,
        opponent_id: PlayerId,
    },
    TierChanged {
        previous: Tier,
        current: Tier,
        rating: i32,
    },
    NewPersonalBest {
        kind: RecordKind,
        value: i32,
    },
    ChallengeReceived {
        challenge_id: ChallengeId,
        challenger_id: PlayerId,
        challenger_rating: i32,
    },
    ChallengeDeclined {
        challenge_id: ChallengeId,
        opponent_id: PlayerId,
    },
}

impl Notification {
    /// Short label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::MatchFound { .. } => "match_found",
            Notification::RangeAcceptanceRequested { .. } => "range_acceptance_requested",
            Notification::RangeAcceptanceDeclined { .. } => "range_acceptance_declined",
            Notification::ResultProposed { .. } => "result_proposed",
            Notification::ResultFinalized { .. } => "result_finalized",
            Notification::ResultDenied { .. } => "result_denied",
            Notification::QueueTimeout { .. } => "queue_timeout",
            Notification::MatchReminder { .. } => "match_reminder",
            Notification::OpponentCancelled { .. } => "opponent_cancelled",
            Notification::TierChanged { .. } => "tier_changed",
            Notification::NewPersonalBest { .. } => "new_personal_best",
            Notification::ChallengeReceived { .. } => "challenge_received",
            Notification::ChallengeDeclined { .. } => "challenge_declined",
        }
    }
}

/// A direct challenge awaiting the challenged player's response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge_id: ChallengeId,
    pub challenger_id: PlayerId,
    pub challenged_id: PlayerId,
    pub created_at: DateTime<Utc>,
}

impl Challenge {
    pub fn involves(&self, player_id: &str) -> bool {
        self.challenger_id == player_id || self.challenged_id == player_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_outcome_reversal() {
        assert_eq!(MatchOutcome::AWins.reversed(), MatchOutcome::BWins);
        assert_eq!(MatchOutcome::BWins.reversed(), MatchOutcome::AWins);
        assert_eq!(MatchOutcome::Draw.reversed(), MatchOutcome::Draw);
    }

    #[test]
    fn test_confirmation_state_and_outcome() {
        let mut confirmation = MatchConfirmation {
            confirmation_id: Uuid::new_v4(),
            player1_id: "alice".to_string(),
            player2_id: "bob".to_string(),
            score1: 3,
            score2: 1,
            confirmed_by1: false,
            confirmed_by2: false,
            created_at: chrono::Utc::now(),
        };

        assert_eq!(confirmation.state(), ConfirmationState::Proposed);
        assert_eq!(confirmation.outcome(), MatchOutcome::AWins);

        confirmation.confirmed_by1 = true;
        assert_eq!(confirmation.state(), ConfirmationState::PartiallyConfirmed);

        confirmation.score1 = 1;
        assert_eq!(confirmation.outcome(), MatchOutcome::Draw);
        confirmation.score2 = 4;
        assert_eq!(confirmation.outcome(), MatchOutcome::BWins);
    }

    #[test]
    fn test_active_match_opponent_lookup() {
        let active = ActiveMatch {
            match_id: Uuid::new_v4(),
            player1_id: "alice".to_string(),
            player2_id: "bob".to_string(),
            session_ref: None,
            reminder_sent: false,
            opened_at: chrono::Utc::now(),
        };

        assert!(active.involves("alice"));
        assert!(!active.involves("carol"));
        assert_eq!(active.opponent_of("alice"), Some(&"bob".to_string()));
        assert_eq!(active.opponent_of("bob"), Some(&"alice".to_string()));
        assert_eq!(active.opponent_of("carol"), None);
    }

    #[test]
    fn test_decision_serialization_is_tagged() {
        let decision = Decision::RangeAcceptance {
            player1_id: "alice".to_string(),
            player2_id: "bob".to_string(),
        };

        let json = serde_json::to_string(&decision).unwrap();
        assert!(json.contains("\"type\":\"RangeAcceptance\""));

        let parsed: Decision = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, decision);
    }
}
