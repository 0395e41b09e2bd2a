//! Ladder statistics

pub mod queries;

// Re-export commonly used types
pub use queries::{current_win_streak, HeadToHead, LeaderboardEntry, PlayerProfile, StatsService};
