//! Error types for the ladder engine
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific ladder scenarios
#[derive(Debug, thiserror::Error)]
pub enum LadderError {
    #[error("Player not found: {player_id}")]
    PlayerNotFound { player_id: String },

    #[error("Player {player_id} already has an active match")]
    AlreadyInMatch { player_id: String },

    #[error("Player {player_id} is already searching for a match")]
    AlreadyQueued { player_id: String },

    #[error("Player {player_id} cannot challenge themselves")]
    SelfChallenge { player_id: String },

    #[error("Player {player_id} cannot report a result against themselves")]
    SelfMatch { player_id: String },

    #[error("Player {player_id} is not a participant in this decision")]
    NotAParticipant { player_id: String },

    #[error("Confirmation not found: {confirmation_id}")]
    ConfirmationNotFound { confirmation_id: String },

    #[error("A result between {player1_id} and {player2_id} is already awaiting confirmation")]
    ConfirmationPending {
        player1_id: String,
        player2_id: String,
    },

    #[error("No range acceptance is pending between {player1_id} and {player2_id}")]
    AcceptanceNotFound {
        player1_id: String,
        player2_id: String,
    },

    #[error("Player {player_id} has no active match")]
    NoActiveMatch { player_id: String },

    #[error("Challenge not found: {challenge_id}")]
    ChallengeNotFound { challenge_id: String },

    #[error("A challenge between {player1_id} and {player2_id} is already pending")]
    ChallengePending {
        player1_id: String,
        player2_id: String,
    },

    #[error("Active match not found: {match_id}")]
    MatchNotFound { match_id: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}
