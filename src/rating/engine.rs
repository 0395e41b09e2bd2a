//! ELO rating engine
//!
//! This module defines the interface for rating updates and the classic
//! two-player ELO implementation backed by the skillratings crate. The
//! engine is pure: it performs no I/O and has no side effects; callers
//! persist the returned ratings and append history records.

use crate::types::MatchOutcome;
use serde::{Deserialize, Serialize};
use skillratings::elo::{elo, expected_score, EloConfig, EloRating};
use skillratings::Outcomes;

/// New integer ratings produced by one finalized match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingUpdate {
    pub new_rating_a: i32,
    pub new_rating_b: i32,
}

/// Trait for applying match results to a pair of ratings
pub trait RatingEngine: Send + Sync {
    /// Apply a match outcome to two ratings
    ///
    /// # Arguments
    /// * `rating_a` - current rating of player A
    /// * `rating_b` - current rating of player B
    /// * `outcome` - result from player A's perspective
    ///
    /// # Returns
    /// Updated integer ratings for both players
    fn apply_result(&self, rating_a: i32, rating_b: i32, outcome: MatchOutcome) -> RatingUpdate;

    /// Expected score for player A against player B, in [0, 1]
    fn expected_score(&self, rating_a: i32, rating_b: i32) -> f64;

    /// Rating assigned to newly registered players
    fn initial_rating(&self) -> i32;
}

/// Extended configuration for the ELO rating system
/// This wraps the skillratings EloConfig with additional parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendedEloConfig {
    /// Core ELO parameters (K-factor)
    pub elo_config: EloConfig,
    /// Initial rating for new players
    pub initial_rating: i32,
}

impl Default for ExtendedEloConfig {
    fn default() -> Self {
        Self {
            elo_config: EloConfig { k: 32.0 },
            initial_rating: 1000,
        }
    }
}

impl ExtendedEloConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.elo_config.k <= 0.0 {
            return Err(crate::error::LadderError::ConfigurationError {
                message: "K-factor must be positive".to_string(),
            }
            .into());
        }

        if self.initial_rating < 0 {
            return Err(crate::error::LadderError::ConfigurationError {
                message: "Initial rating must be non-negative".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// Classic ELO rating engine.
///
/// Expected score `E_A = 1 / (1 + 10^((r_B - r_A) / 400))`, update
/// `new = round(r + K * (actual - expected))` with K = 32. Results are
/// rounded to the nearest integer, ties away from zero (`f64::round`).
#[derive(Debug)]
pub struct EloRatingEngine {
    config: ExtendedEloConfig,
}

impl EloRatingEngine {
    /// Create a new ELO rating engine
    pub fn new(config: ExtendedEloConfig) -> crate::error::Result<Self> {
        config.validate()?;

        Ok(Self { config })
    }

    fn outcome_for_skillratings(outcome: MatchOutcome) -> Outcomes {
        match outcome {
            MatchOutcome::AWins => Outcomes::WIN,
            MatchOutcome::BWins => Outcomes::LOSS,
            MatchOutcome::Draw => Outcomes::DRAW,
        }
    }
}

impl Default for EloRatingEngine {
    fn default() -> Self {
        // The default configuration always validates
        Self {
            config: ExtendedEloConfig::default(),
        }
    }
}

impl RatingEngine for EloRatingEngine {
    fn apply_result(&self, rating_a: i32, rating_b: i32, outcome: MatchOutcome) -> RatingUpdate {
        let player_a = EloRating {
            rating: rating_a as f64,
        };
        let player_b = EloRating {
            rating: rating_b as f64,
        };

        let (new_a, new_b) = elo(
            &player_a,
            &player_b,
            &Self::outcome_for_skillratings(outcome),
            &self.config.elo_config,
        );

        RatingUpdate {
            new_rating_a: new_a.rating.round() as i32,
            new_rating_b: new_b.rating.round() as i32,
        }
    }

    fn expected_score(&self, rating_a: i32, rating_b: i32) -> f64 {
        let player_a = EloRating {
            rating: rating_a as f64,
        };
        let player_b = EloRating {
            rating: rating_b as f64,
        };

        let (expected_a, _expected_b) = expected_score(&player_a, &player_b);
        expected_a
    }

    fn initial_rating(&self) -> i32 {
        self.config.initial_rating
    }
}

/// Mock rating engine for testing
#[derive(Debug, Default)]
pub struct MockRatingEngine {
    apply_calls: std::sync::Mutex<Vec<(i32, i32, MatchOutcome)>>,
    fixed_update: std::sync::RwLock<Option<RatingUpdate>>,
}

impl MockRatingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a fixed update to return for all applications
    pub fn set_fixed_update(&self, update: RatingUpdate) {
        if let Ok(mut fixed) = self.fixed_update.write() {
            *fixed = Some(update);
        }
    }

    /// Get all apply calls made (for testing)
    pub fn get_apply_calls(&self) -> Vec<(i32, i32, MatchOutcome)> {
        self.apply_calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Clear recorded calls
    pub fn clear_calls(&self) {
        if let Ok(mut calls) = self.apply_calls.lock() {
            calls.clear();
        }
    }
}

impl RatingEngine for MockRatingEngine {
    fn apply_result(&self, rating_a: i32, rating_b: i32, outcome: MatchOutcome) -> RatingUpdate {
        if let Ok(mut calls) = self.apply_calls.lock() {
            calls.push((rating_a, rating_b, outcome));
        }

        if let Ok(fixed) = self.fixed_update.read() {
            if let Some(update) = fixed.as_ref() {
                return *update;
            }
        }

        // Default behavior: no rating change
        RatingUpdate {
            new_rating_a: rating_a,
            new_rating_b: rating_b,
        }
    }

    fn expected_score(&self, _rating_a: i32, _rating_b: i32) -> f64 {
        0.5
    }

    fn initial_rating(&self) -> i32 {
        1000
    }
}
