//! Tier synchronization with an external presence system
//!
//! After a finalized result the players' tier bands are pushed out so
//! whatever sits in front of the ladder (roles, badges, flair) stays in step
//! with the ratings. Synchronization failures never fail finalization.

use crate::error::Result;
use crate::rating::Tier;
use async_trait::async_trait;
use tracing::{info, warn};

/// Trait for pushing a player's current tier to an external system
#[async_trait]
pub trait TierSync: Send + Sync {
    async fn sync_tier(&self, player_id: &str, tier: Tier, rating: i32) -> Result<()>;
}

/// Push a tier update and log instead of propagating on failure
pub async fn sync_tier_or_log(sync: &dyn TierSync, player_id: &str, tier: Tier, rating: i32) {
    if let Err(e) = sync.sync_tier(player_id, tier, rating).await {
        warn!("Failed to sync tier {} for {}: {}", tier, player_id, e);
    }
}

/// Tier sync that only logs, used by the standalone service and the simulator
#[derive(Debug, Default)]
pub struct LoggingTierSync;

impl LoggingTierSync {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TierSync for LoggingTierSync {
    async fn sync_tier(&self, player_id: &str, tier: Tier, rating: i32) -> Result<()> {
        info!("Tier sync: {} is now {} at {}", player_id, tier, rating);
        Ok(())
    }
}

/// Mock tier sync for testing
#[derive(Debug, Default)]
pub struct MockTierSync {
    synced: std::sync::Mutex<Vec<(String, Tier)>>,
}

impl MockTierSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// All tier updates pushed, in order (for testing)
    pub fn get_synced(&self) -> Vec<(String, Tier)> {
        self.synced
            .lock()
            .map(|synced| synced.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TierSync for MockTierSync {
    async fn sync_tier(&self, player_id: &str, tier: Tier, _rating: i32) -> Result<()> {
        if let Ok(mut synced) = self.synced.lock() {
            synced.push((player_id.to_string(), tier));
        }
        Ok(())
    }
}
