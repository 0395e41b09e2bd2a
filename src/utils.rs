//! Utility functions for the ladder engine

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique match ID
pub fn generate_match_id() -> Uuid {
    Uuid::new_v4()
}

/// Generate a new unique confirmation ID
pub fn generate_confirmation_id() -> Uuid {
    Uuid::new_v4()
}

/// Generate a new unique challenge ID
pub fn generate_challenge_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Calculate the absolute difference between two ratings
pub fn rating_difference(rating1: i32, rating2: i32) -> u32 {
    (rating1 - rating2).unsigned_abs()
}

/// Check if two ratings are within the given tolerance
pub fn ratings_within_tolerance(rating1: i32, rating2: i32, tolerance: u32) -> bool {
    rating_difference(rating1, rating2) <= tolerance
}
