//! Active match lifecycle management
//!
//! Opens a match for a freshly paired couple, schedules the one-shot result
//! reminder and tears everything down again when the result arrives or a
//! participant walks away. The reminder uses the store's check-and-set flag,
//! so it fires at most once per match even if scheduling misbehaves.

use crate::error::{LadderError, Result};
use crate::notify::{notify_or_log, Notifier, SessionProvider};
use crate::store::LadderStore;
use crate::types::{ActiveMatch, MatchId, Notification, SessionRef};
use crate::utils::{current_timestamp, generate_match_id};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Manages open matches, their sessions and their reminder tasks
pub struct ActiveMatchManager {
    store: Arc<dyn LadderStore>,
    notifier: Arc<dyn Notifier>,
    sessions: Arc<dyn SessionProvider>,
    reminder_after: Duration,
    reminders: std::sync::Mutex<HashMap<MatchId, JoinHandle<()>>>,
}

impl ActiveMatchManager {
    pub fn new(
        store: Arc<dyn LadderStore>,
        notifier: Arc<dyn Notifier>,
        sessions: Arc<dyn SessionProvider>,
        reminder_after: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            sessions,
            reminder_after,
            reminders: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Open a match between two players and schedule its reminder.
    ///
    /// Fails with `AlreadyInMatch` if either player has an open match. The
    /// session is attached separately via `attach_session` so this stays
    /// synchronous and callers can run it inside the pairing lock.
    pub fn open(self: &Arc<Self>, player1_id: &str, player2_id: &str) -> Result<ActiveMatch> {
        let active = ActiveMatch {
            match_id: generate_match_id(),
            player1_id: player1_id.to_string(),
            player2_id: player2_id.to_string(),
            session_ref: None,
            reminder_sent: false,
            opened_at: current_timestamp(),
        };
        self.store.insert_active_match(active.clone())?;
        self.spawn_reminder(&active);

        info!(
            "Opened match {} between {} and {}",
            active.match_id, player1_id, player2_id
        );
        Ok(active)
    }

    fn spawn_reminder(self: &Arc<Self>, active: &ActiveMatch) {
        let manager = Arc::clone(self);
        let match_id = active.match_id;
        let player1_id = active.player1_id.clone();
        let player2_id = active.player2_id.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(manager.reminder_after).await;
            match manager.store.mark_reminder_sent(&match_id) {
                Ok(true) => {
                    debug!("Sending result reminder for match {}", match_id);
                    notify_or_log(
                        manager.notifier.as_ref(),
                        &player1_id,
                        Notification::MatchReminder {
                            match_id,
                            opponent_id: player2_id.clone(),
                        },
                    )
                    .await;
                    notify_or_log(
                        manager.notifier.as_ref(),
                        &player2_id,
                        Notification::MatchReminder {
                            match_id,
                            opponent_id: player1_id.clone(),
                        },
                    )
                    .await;
                }
                Ok(false) => {}
                Err(e) => warn!("Reminder check failed for match {}: {}", match_id, e),
            }
            manager.drop_reminder_handle(&match_id);
        });

        if let Ok(mut reminders) = self.reminders.lock() {
            if let Some(old) = reminders.insert(match_id, handle) {
                old.abort();
            }
        }
    }

    fn abort_reminder(&self, match_id: &MatchId) {
        if let Ok(mut reminders) = self.reminders.lock() {
            if let Some(handle) = reminders.remove(match_id) {
                handle.abort();
            }
        }
    }

    fn drop_reminder_handle(&self, match_id: &MatchId) {
        if let Ok(mut reminders) = self.reminders.lock() {
            reminders.remove(match_id);
        }
    }

    /// Provision and attach a session for an open match. Provisioning failure
    /// is tolerated; the match simply keeps no session ref.
    pub async fn attach_session(&self, active: &ActiveMatch) -> Option<SessionRef> {
        match self
            .sessions
            .create_session(&active.player1_id, &active.player2_id)
            .await
        {
            Ok(session_ref) => {
                match self.store.set_session_ref(&active.match_id, session_ref.clone()) {
                    Ok(true) => Some(session_ref),
                    Ok(false) => {
                        // match closed before the session came up
                        self.teardown_session(&session_ref).await;
                        None
                    }
                    Err(e) => {
                        warn!(
                            "Failed to record session for match {}: {}",
                            active.match_id, e
                        );
                        Some(session_ref)
                    }
                }
            }
            Err(e) => {
                warn!(
                    "Session creation failed for match {} ({} vs {}): {}",
                    active.match_id, active.player1_id, active.player2_id, e
                );
                None
            }
        }
    }

    async fn teardown_session(&self, session_ref: &SessionRef) {
        if let Err(e) = self.sessions.close_session(session_ref).await {
            warn!("Failed to close session {}: {}", session_ref, e);
        }
    }

    /// Close a match by id; idempotent, returns false when already gone
    pub async fn close(&self, match_id: &MatchId) -> Result<bool> {
        match self.store.remove_active_match(match_id)? {
            Some(closed) => {
                self.finish_closed(&closed).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Tear down the reminder and session of a match whose row is already
    /// removed (the finalization transaction deletes it itself)
    pub async fn finish_closed(&self, closed: &ActiveMatch) {
        self.abort_reminder(&closed.match_id);
        if let Some(session_ref) = &closed.session_ref {
            self.teardown_session(session_ref).await;
        }
        debug!("Closed match {}", closed.match_id);
    }

    /// Abort a match outside the normal result flow; the opponent is told
    pub async fn cancel(&self, player_id: &str) -> Result<ActiveMatch> {
        let active = self
            .store
            .active_match_for(player_id)?
            .ok_or_else(|| LadderError::NoActiveMatch {
                player_id: player_id.to_string(),
            })?;

        self.store.remove_active_match(&active.match_id)?;
        self.finish_closed(&active).await;

        if let Some(opponent_id) = active.opponent_of(player_id) {
            notify_or_log(
                self.notifier.as_ref(),
                opponent_id,
                Notification::OpponentCancelled {
                    match_id: active.match_id,
                    opponent_id: player_id.to_string(),
                },
            )
            .await;
        }

        info!("Match {} cancelled by {}", active.match_id, player_id);
        Ok(active)
    }

    /// The open match a player takes part in, if any
    pub fn active_match_of(&self, player_id: &str) -> Result<Option<ActiveMatch>> {
        self.store.active_match_for(player_id)
    }

    /// Abort all reminder tasks (service shutdown)
    pub fn shutdown(&self) {
        if let Ok(mut reminders) = self.reminders.lock() {
            for (_, handle) in reminders.drain() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{MockNotifier, MockSessionProvider};
    use crate::store::InMemoryLadderStore;

    fn create_test_manager(
        reminder_after: Duration,
    ) -> (
        Arc<ActiveMatchManager>,
        Arc<InMemoryLadderStore>,
        Arc<MockNotifier>,
        Arc<MockSessionProvider>,
    ) {
        let store = Arc::new(InMemoryLadderStore::new());
        let notifier = Arc::new(MockNotifier::new());
        let sessions = Arc::new(MockSessionProvider::new());
        let manager = Arc::new(ActiveMatchManager::new(
            store.clone(),
            notifier.clone(),
            sessions.clone(),
            reminder_after,
        ));
        (manager, store, notifier, sessions)
    }

    #[tokio::test]
    async fn test_open_then_double_booking_fails() {
        let (manager, store, _, _) = create_test_manager(Duration::from_secs(60));

        let active = manager.open("alice", "bob").unwrap();
        assert!(store.active_match(&active.match_id).unwrap().is_some());
        assert_eq!(
            manager.active_match_of("bob").unwrap().unwrap().match_id,
            active.match_id
        );

        assert!(manager.open("alice", "carol").is_err());
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_reminder_fires_exactly_once() {
        let (manager, _, notifier, _) = create_test_manager(Duration::from_millis(30));

        manager.open("alice", "bob").unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(notifier.kinds_for("alice"), vec!["match_reminder"]);
        assert_eq!(notifier.kinds_for("bob"), vec!["match_reminder"]);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(notifier.kinds_for("alice").len(), 1);
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_close_before_reminder_suppresses_it() {
        let (manager, _, notifier, _) = create_test_manager(Duration::from_millis(50));

        let active = manager.open("alice", "bob").unwrap();
        assert!(manager.close(&active.match_id).await.unwrap());
        // idempotent
        assert!(!manager.close(&active.match_id).await.unwrap());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(notifier.get_notifications().is_empty());
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_attach_session_patches_match() {
        let (manager, store, _, sessions) = create_test_manager(Duration::from_secs(60));

        let active = manager.open("alice", "bob").unwrap();
        let session_ref = manager.attach_session(&active).await;
        assert!(session_ref.is_some());
        assert_eq!(
            store.active_match(&active.match_id).unwrap().unwrap().session_ref,
            session_ref
        );
        assert_eq!(sessions.get_created().len(), 1);
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_attach_session_failure_is_tolerated() {
        let (manager, store, _, sessions) = create_test_manager(Duration::from_secs(60));
        sessions.set_failing(true);

        let active = manager.open("alice", "bob").unwrap();
        assert!(manager.attach_session(&active).await.is_none());
        // the match is still open, just without a session
        let stored = store.active_match(&active.match_id).unwrap().unwrap();
        assert!(stored.session_ref.is_none());
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_close_tears_down_session() {
        let (manager, _, _, sessions) = create_test_manager(Duration::from_secs(60));

        let active = manager.open("alice", "bob").unwrap();
        let session_ref = manager.attach_session(&active).await.unwrap();

        assert!(manager.close(&active.match_id).await.unwrap());
        assert_eq!(sessions.get_closed(), vec![session_ref]);
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_cancel_notifies_opponent_only() {
        let (manager, store, notifier, _) = create_test_manager(Duration::from_secs(60));

        let active = manager.open("alice", "bob").unwrap();
        let cancelled = manager.cancel("alice").await.unwrap();
        assert_eq!(cancelled.match_id, active.match_id);

        assert_eq!(notifier.kinds_for("bob"), vec!["opponent_cancelled"]);
        assert!(notifier.kinds_for("alice").is_empty());
        assert!(store.active_match(&active.match_id).unwrap().is_none());

        let missing = manager.cancel("alice").await;
        assert!(missing.is_err());
        manager.shutdown();
    }
}
