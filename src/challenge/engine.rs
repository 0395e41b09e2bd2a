//! Direct challenges
//!
//! A challenge is a queue-free path to an active match: one player invites a
//! specific opponent and only that opponent can accept or decline. Accepting
//! goes through the queue engine's pairing lock so the queue preconditions
//! hold at the moment the match opens, not just when the challenge was made.

use crate::error::{LadderError, Result};
use crate::notify::{notify_or_log, Notifier};
use crate::queue::QueueEngine;
use crate::store::LadderStore;
use crate::types::{ActiveMatch, Challenge, ChallengeId, Notification, Player};
use crate::utils::{current_timestamp, generate_challenge_id};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

/// Issues direct challenges and resolves their accept/decline decisions
pub struct ChallengeEngine {
    store: Arc<dyn LadderStore>,
    notifier: Arc<dyn Notifier>,
    queue: Arc<QueueEngine>,
    pending: Mutex<HashMap<ChallengeId, Challenge>>,
}

impl ChallengeEngine {
    pub fn new(
        store: Arc<dyn LadderStore>,
        notifier: Arc<dyn Notifier>,
        queue: Arc<QueueEngine>,
    ) -> Self {
        Self {
            store,
            notifier,
            queue,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<ChallengeId, Challenge>>> {
        self.pending.lock().map_err(|_| {
            LadderError::InternalError {
                message: "Failed to acquire challenge lock".to_string(),
            }
            .into()
        })
    }

    /// Issue a challenge to a specific opponent.
    ///
    /// Both players must be registered, idle (neither queued nor in a match)
    /// and distinct, and the pair must not already have a pending challenge.
    pub async fn challenge(
        &self,
        challenger_id: &str,
        challenged_id: &str,
    ) -> Result<Challenge> {
        if challenger_id == challenged_id {
            return Err(LadderError::SelfChallenge {
                player_id: challenger_id.to_string(),
            }
            .into());
        }
        let challenger = self.require_player(challenger_id)?;
        self.require_player(challenged_id)?;
        for player_id in [challenger_id, challenged_id] {
            if self.store.active_match_for(player_id)?.is_some() {
                return Err(LadderError::AlreadyInMatch {
                    player_id: player_id.to_string(),
                }
                .into());
            }
            if self.store.queue_entry(player_id)?.is_some() {
                return Err(LadderError::AlreadyQueued {
                    player_id: player_id.to_string(),
                }
                .into());
            }
        }

        let challenge = {
            let mut pending = self.lock()?;
            if pending
                .values()
                .any(|c| c.involves(challenger_id) && c.involves(challenged_id))
            {
                return Err(LadderError::ChallengePending {
                    player1_id: challenger_id.to_string(),
                    player2_id: challenged_id.to_string(),
                }
                .into());
            }
            let challenge = Challenge {
                challenge_id: generate_challenge_id(),
                challenger_id: challenger_id.to_string(),
                challenged_id: challenged_id.to_string(),
                created_at: current_timestamp(),
            };
            pending.insert(challenge.challenge_id, challenge.clone());
            challenge
        };

        notify_or_log(
            self.notifier.as_ref(),
            challenged_id,
            Notification::ChallengeReceived {
                challenge_id: challenge.challenge_id,
                challenger_id: challenger_id.to_string(),
                challenger_rating: challenger.rating,
            },
        )
        .await;
        info!("{} challenged {}", challenger_id, challenged_id);
        Ok(challenge)
    }

    /// Resolve a pending challenge. Only the challenged player may respond;
    /// any response consumes the challenge. Accepting re-checks the queue
    /// preconditions and opens the match.
    pub async fn respond(
        &self,
        challenge_id: &ChallengeId,
        responder_id: &str,
        accept: bool,
    ) -> Result<Option<ActiveMatch>> {
        let challenge = {
            let mut pending = self.lock()?;
            let challenge =
                pending
                    .get(challenge_id)
                    .ok_or_else(|| LadderError::ChallengeNotFound {
                        challenge_id: challenge_id.to_string(),
                    })?;
            if challenge.challenged_id != responder_id {
                return Err(LadderError::NotAParticipant {
                    player_id: responder_id.to_string(),
                }
                .into());
            }
            // remove under the lock so a concurrent response finds nothing
            pending.remove(challenge_id).ok_or_else(|| {
                LadderError::ChallengeNotFound {
                    challenge_id: challenge_id.to_string(),
                }
            })?
        };

        if !accept {
            notify_or_log(
                self.notifier.as_ref(),
                &challenge.challenger_id,
                Notification::ChallengeDeclined {
                    challenge_id: *challenge_id,
                    opponent_id: responder_id.to_string(),
                },
            )
            .await;
            info!(
                "{} declined the challenge from {}",
                responder_id, challenge.challenger_id
            );
            return Ok(None);
        }

        let challenger = self.require_player(&challenge.challenger_id)?;
        let challenged = self.require_player(&challenge.challenged_id)?;
        let (active, session_ref) = self
            .queue
            .open_direct_match(&challenge.challenger_id, &challenge.challenged_id)
            .await?;

        notify_or_log(
            self.notifier.as_ref(),
            &challenger.id,
            Notification::MatchFound {
                match_id: active.match_id,
                opponent_id: challenged.id.clone(),
                opponent_rating: challenged.rating,
                session_ref: session_ref.clone(),
            },
        )
        .await;
        notify_or_log(
            self.notifier.as_ref(),
            &challenged.id,
            Notification::MatchFound {
                match_id: active.match_id,
                opponent_id: challenger.id.clone(),
                opponent_rating: challenger.rating,
                session_ref,
            },
        )
        .await;
        info!(
            "{} accepted the challenge from {}",
            challenged.id, challenger.id
        );
        Ok(Some(active))
    }

    /// Number of challenges awaiting a response
    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn require_player(&self, player_id: &str) -> Result<Player> {
        self.store
            .get_player(player_id)?
            .ok_or_else(|| {
                LadderError::PlayerNotFound {
                    player_id: player_id.to_string(),
                }
                .into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::active::ActiveMatchManager;
    use crate::config::QueueSettings;
    use crate::notify::{MockNotifier, MockSessionProvider};
    use crate::store::InMemoryLadderStore;

    struct TestChallenge {
        engine: ChallengeEngine,
        queue: Arc<QueueEngine>,
        store: Arc<InMemoryLadderStore>,
        notifier: Arc<MockNotifier>,
        sessions: Arc<MockSessionProvider>,
    }

    fn create_test_challenge() -> TestChallenge {
        let store = Arc::new(InMemoryLadderStore::new());
        let notifier = Arc::new(MockNotifier::new());
        let sessions = Arc::new(MockSessionProvider::new());
        let settings = QueueSettings::default();
        let matches = Arc::new(ActiveMatchManager::new(
            store.clone(),
            notifier.clone(),
            sessions.clone(),
            settings.reminder_after(),
        ));
        let queue = Arc::new(QueueEngine::new(
            store.clone(),
            notifier.clone(),
            matches,
            settings,
        ));
        let engine = ChallengeEngine::new(store.clone(), notifier.clone(), queue.clone());
        TestChallenge {
            engine,
            queue,
            store,
            notifier,
            sessions,
        }
    }

    fn register(ctx: &TestChallenge, player_id: &str, rating: i32) {
        ctx.store
            .register_player(player_id, &format!("Player {}", player_id), rating)
            .unwrap();
    }

    #[tokio::test]
    async fn test_challenge_preconditions() {
        let ctx = create_test_challenge();
        register(&ctx, "alice", 1000);

        let result = ctx.engine.challenge("alice", "alice").await;
        assert!(matches!(
            result.unwrap_err().downcast_ref::<LadderError>(),
            Some(LadderError::SelfChallenge { .. })
        ));

        let result = ctx.engine.challenge("alice", "ghost").await;
        assert!(matches!(
            result.unwrap_err().downcast_ref::<LadderError>(),
            Some(LadderError::PlayerNotFound { .. })
        ));
        assert_eq!(ctx.engine.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_challenge_rejects_busy_players() {
        let ctx = create_test_challenge();
        register(&ctx, "alice", 1000);
        register(&ctx, "bob", 1000);

        ctx.queue.enqueue("alice").await.unwrap();
        let result = ctx.engine.challenge("alice", "bob").await;
        assert!(matches!(
            result.unwrap_err().downcast_ref::<LadderError>(),
            Some(LadderError::AlreadyQueued { .. })
        ));
        ctx.queue.dequeue("alice").await.unwrap();

        ctx.queue.open_direct_match("alice", "bob").await.unwrap();
        let result = ctx.engine.challenge("alice", "bob").await;
        assert!(matches!(
            result.unwrap_err().downcast_ref::<LadderError>(),
            Some(LadderError::AlreadyInMatch { .. })
        ));
        ctx.queue.shutdown();
    }

    #[tokio::test]
    async fn test_challenge_notifies_with_challenger_rating() {
        let ctx = create_test_challenge();
        register(&ctx, "alice", 1337);
        register(&ctx, "bob", 1000);

        let challenge = ctx.engine.challenge("alice", "bob").await.unwrap();

        let received = ctx
            .notifier
            .notifications_for("bob")
            .into_iter()
            .find_map(|n| match n {
                Notification::ChallengeReceived {
                    challenge_id,
                    challenger_id,
                    challenger_rating,
                } => Some((challenge_id, challenger_id, challenger_rating)),
                _ => None,
            });
        assert_eq!(
            received,
            Some((challenge.challenge_id, "alice".to_string(), 1337))
        );
        assert!(ctx.notifier.kinds_for("alice").is_empty());
    }

    #[tokio::test]
    async fn test_one_pending_challenge_per_pair() {
        let ctx = create_test_challenge();
        register(&ctx, "alice", 1000);
        register(&ctx, "bob", 1000);

        ctx.engine.challenge("alice", "bob").await.unwrap();
        let result = ctx.engine.challenge("bob", "alice").await;
        assert!(matches!(
            result.unwrap_err().downcast_ref::<LadderError>(),
            Some(LadderError::ChallengePending { .. })
        ));
        assert_eq!(ctx.engine.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_only_the_challenged_player_responds() {
        let ctx = create_test_challenge();
        register(&ctx, "alice", 1000);
        register(&ctx, "bob", 1000);
        register(&ctx, "carol", 1000);

        let challenge = ctx.engine.challenge("alice", "bob").await.unwrap();

        for outsider in ["alice", "carol"] {
            let result = ctx
                .engine
                .respond(&challenge.challenge_id, outsider, true)
                .await;
            assert!(matches!(
                result.unwrap_err().downcast_ref::<LadderError>(),
                Some(LadderError::NotAParticipant { .. })
            ));
        }
        assert_eq!(ctx.engine.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_decline_consumes_and_notifies_challenger() {
        let ctx = create_test_challenge();
        register(&ctx, "alice", 1000);
        register(&ctx, "bob", 1000);

        let challenge = ctx.engine.challenge("alice", "bob").await.unwrap();
        let opened = ctx
            .engine
            .respond(&challenge.challenge_id, "bob", false)
            .await
            .unwrap();
        assert!(opened.is_none());
        assert_eq!(ctx.engine.pending_count(), 0);
        assert!(ctx
            .notifier
            .kinds_for("alice")
            .contains(&"challenge_declined"));

        let result = ctx.engine.respond(&challenge.challenge_id, "bob", false).await;
        assert!(matches!(
            result.unwrap_err().downcast_ref::<LadderError>(),
            Some(LadderError::ChallengeNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_accept_opens_match_for_both() {
        let ctx = create_test_challenge();
        register(&ctx, "alice", 1200);
        register(&ctx, "bob", 1000);

        let challenge = ctx.engine.challenge("alice", "bob").await.unwrap();
        let active = ctx
            .engine
            .respond(&challenge.challenge_id, "bob", true)
            .await
            .unwrap()
            .unwrap();

        assert!(active.involves("alice") && active.involves("bob"));
        assert_eq!(ctx.store.active_match_count().unwrap(), 1);
        assert_eq!(ctx.sessions.get_created().len(), 1);
        assert!(ctx.notifier.kinds_for("alice").contains(&"match_found"));
        assert!(ctx.notifier.kinds_for("bob").contains(&"match_found"));
        ctx.queue.shutdown();
    }

    #[tokio::test]
    async fn test_accept_rechecks_queue_preconditions() {
        let ctx = create_test_challenge();
        register(&ctx, "alice", 1000);
        register(&ctx, "bob", 1300);

        let challenge = ctx.engine.challenge("alice", "bob").await.unwrap();
        // queueing is allowed while the challenge pends
        ctx.queue.enqueue("bob").await.unwrap();

        let result = ctx.engine.respond(&challenge.challenge_id, "bob", true).await;
        assert!(matches!(
            result.unwrap_err().downcast_ref::<LadderError>(),
            Some(LadderError::AlreadyQueued { .. })
        ));
        // any response consumes the challenge
        assert_eq!(ctx.engine.pending_count(), 0);
        assert_eq!(ctx.store.active_match_count().unwrap(), 0);
        ctx.queue.shutdown();
    }
}
