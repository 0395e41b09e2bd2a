//! Outbound player notifications
//!
//! Every user-visible event leaves the engine through the `Notifier` seam.
//! Delivery is best effort: callers treat failures as non-fatal and the
//! engines never roll back state because a notification did not go out.

use crate::error::Result;
use crate::types::Notification;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Trait for delivering notifications to players
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification to a single player
    async fn notify(&self, player_id: &str, notification: Notification) -> Result<()>;
}

/// Deliver a notification and log instead of propagating on failure
pub async fn notify_or_log(notifier: &dyn Notifier, player_id: &str, notification: Notification) {
    let kind = notification.kind();
    if let Err(e) = notifier.notify(player_id, notification).await {
        warn!("Failed to deliver {} notification to {}: {}", kind, player_id, e);
    }
}

/// Notifier that writes notifications to the log, used by the standalone
/// service and the simulator
#[derive(Debug, Default)]
pub struct LoggingNotifier;

impl LoggingNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, player_id: &str, notification: Notification) -> Result<()> {
        info!("Notify {}: {}", player_id, notification.kind());
        debug!("Notification payload for {}: {:?}", player_id, notification);
        Ok(())
    }
}

/// Mock notifier for testing
#[derive(Debug, Default)]
pub struct MockNotifier {
    delivered: std::sync::Mutex<Vec<(String, Notification)>>,
    failing: AtomicBool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent deliveries fail (for testing failure tolerance)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// All delivered notifications in order (for testing)
    pub fn get_notifications(&self) -> Vec<(String, Notification)> {
        self.delivered
            .lock()
            .map(|delivered| delivered.clone())
            .unwrap_or_default()
    }

    /// Notifications delivered to one player (for testing)
    pub fn notifications_for(&self, player_id: &str) -> Vec<Notification> {
        self.get_notifications()
            .into_iter()
            .filter(|(recipient, _)| recipient == player_id)
            .map(|(_, notification)| notification)
            .collect()
    }

    /// Notification kind labels delivered to one player (for testing)
    pub fn kinds_for(&self, player_id: &str) -> Vec<&'static str> {
        self.notifications_for(player_id)
            .iter()
            .map(|notification| notification.kind())
            .collect()
    }

    /// Clear delivered notifications (for testing)
    pub fn clear(&self) {
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.clear();
        }
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, player_id: &str, notification: Notification) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(crate::error::LadderError::InternalError {
                message: "Mock notifier configured to fail".to_string(),
            }
            .into());
        }
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push((player_id.to_string(), notification));
        }
        Ok(())
    }
}
