//! Test fixtures and helpers for integration testing

use ranked_ladder::active::ActiveMatchManager;
use ranked_ladder::challenge::ChallengeEngine;
use ranked_ladder::config::QueueSettings;
use ranked_ladder::confirmation::ConfirmationEngine;
use ranked_ladder::notify::{MockNotifier, MockSessionProvider, MockTierSync, Notifier};
use ranked_ladder::queue::QueueEngine;
use ranked_ladder::rating::EloRatingEngine;
use ranked_ladder::stats::StatsService;
use ranked_ladder::store::{InMemoryLadderStore, LadderStore};
use ranked_ladder::types::{ActiveMatch, Player};
use std::sync::Arc;
use std::time::Duration;

/// A fully wired ladder over mock collaborators, with every engine and the
/// mocks exposed so tests can drive flows and inspect side effects
pub struct LadderTestSystem {
    pub store: Arc<InMemoryLadderStore>,
    pub notifier: Arc<MockNotifier>,
    pub sessions: Arc<MockSessionProvider>,
    pub tiers: Arc<MockTierSync>,
    pub matches: Arc<ActiveMatchManager>,
    pub queue: Arc<QueueEngine>,
    pub confirmations: Arc<ConfirmationEngine>,
    pub challenges: Arc<ChallengeEngine>,
    pub stats: StatsService,
}

/// Queue timers tight enough for tests. Expansion and timeout sit far out so
/// tests stay deterministic and widen ranges through the store flag instead.
pub fn fast_queue_settings() -> QueueSettings {
    QueueSettings {
        poll_interval_ms: 20,
        base_tolerance: 100,
        expanded_tolerance: 200,
        range_expand_after_ms: 10_000,
        queue_timeout_ms: 60_000,
        reminder_after_ms: 60_000,
    }
}

/// Create a test system with the default fast queue settings
pub fn create_test_system() -> LadderTestSystem {
    create_test_system_with(fast_queue_settings())
}

/// Create a test system with custom queue settings
pub fn create_test_system_with(settings: QueueSettings) -> LadderTestSystem {
    let store = Arc::new(InMemoryLadderStore::new());
    let notifier = Arc::new(MockNotifier::new());
    let sessions = Arc::new(MockSessionProvider::new());
    let tiers = Arc::new(MockTierSync::new());

    let store_dyn: Arc<dyn LadderStore> = store.clone();
    let notifier_dyn: Arc<dyn Notifier> = notifier.clone();

    let matches = Arc::new(ActiveMatchManager::new(
        store_dyn.clone(),
        notifier_dyn.clone(),
        sessions.clone(),
        settings.reminder_after(),
    ));

    let queue = Arc::new(QueueEngine::new(
        store_dyn.clone(),
        notifier_dyn.clone(),
        matches.clone(),
        settings,
    ));

    let confirmations = Arc::new(ConfirmationEngine::new(
        store_dyn.clone(),
        Arc::new(EloRatingEngine::default()),
        notifier_dyn.clone(),
        matches.clone(),
        tiers.clone(),
    ));

    let challenges = Arc::new(ChallengeEngine::new(
        store_dyn.clone(),
        notifier_dyn,
        queue.clone(),
    ));

    let stats = StatsService::new(store_dyn);

    LadderTestSystem {
        store,
        notifier,
        sessions,
        tiers,
        matches,
        queue,
        confirmations,
        challenges,
        stats,
    }
}

impl LadderTestSystem {
    /// Register a player at a chosen rating
    pub fn register(&self, player_id: &str, rating: i32) -> Player {
        self.store
            .register_player(player_id, &format!("Player {}", player_id), rating)
            .expect("player registration failed")
    }

    /// Queue both players and wait for the engine to pair them
    pub async fn pair(&self, player1_id: &str, player2_id: &str) -> ActiveMatch {
        self.queue
            .enqueue(player1_id)
            .await
            .expect("first enqueue failed");
        self.queue
            .enqueue(player2_id)
            .await
            .expect("second enqueue failed");

        let store = self.store.clone();
        let searcher = player1_id.to_string();
        let found = wait_for(Duration::from_secs(2), || {
            matches!(store.active_match_for(&searcher), Ok(Some(_)))
        })
        .await;
        assert!(
            found,
            "players {} and {} did not pair in time",
            player1_id, player2_id
        );

        self.store
            .active_match_for(player1_id)
            .expect("store lookup failed")
            .expect("match vanished right after pairing")
    }
}

/// Poll a condition until it holds or the deadline passes
pub async fn wait_for<F>(deadline: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(deadline, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}
