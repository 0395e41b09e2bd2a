//! Integration tests for the ranked-ladder matchmaking service
//!
//! These tests validate the entire system working together, including:
//! - Complete queue-to-finalized-result workflows
//! - Range acceptance handshakes and direct challenges
//! - Side effects on sessions, notifications and tier sync
//! - Error handling and recovery

// Modules for organizing tests
mod fixtures;

#[path = "integration/match_lifecycle.rs"]
mod match_lifecycle;
#[path = "load/concurrent_queuing.rs"]
mod concurrent_queuing;

use std::time::Duration;

use ranked_ladder::confirmation::ConfirmationProgress;
use ranked_ladder::error::LadderError;
use ranked_ladder::queue::CycleOutcome;
use ranked_ladder::rating::Tier;
use ranked_ladder::store::LadderStore;

use fixtures::{create_test_system, create_test_system_with, fast_queue_settings, wait_for};

#[tokio::test]
async fn test_complete_ladder_workflow() {
    let system = create_test_system();

    // Step 1: two equally rated players register and search
    system.register("alice", 1000);
    system.register("bob", 1000);
    let active = system.pair("alice", "bob").await;

    // Pairing provisioned a session and told both players
    assert!(active.session_ref.is_some());
    assert_eq!(system.sessions.get_created().len(), 1);
    assert!(system.notifier.kinds_for("alice").contains(&"match_found"));
    assert!(system.notifier.kinds_for("bob").contains(&"match_found"));

    // Step 2: alice reports 3:1 and both sides sign off
    let confirmation = system
        .confirmations
        .propose("alice", "bob", 3, 1)
        .await
        .unwrap();
    assert!(system
        .notifier
        .kinds_for("bob")
        .contains(&"result_proposed"));

    let progress = system
        .confirmations
        .confirm(&confirmation.confirmation_id, "bob")
        .await
        .unwrap();
    assert_eq!(progress, ConfirmationProgress::PartiallyConfirmed);

    let progress = system
        .confirmations
        .confirm(&confirmation.confirmation_id, "alice")
        .await
        .unwrap();
    assert_eq!(progress, ConfirmationProgress::Finalized);

    // Step 3: ratings moved symmetrically and the counters advanced
    let alice = system.store.get_player("alice").unwrap().unwrap();
    let bob = system.store.get_player("bob").unwrap().unwrap();
    assert_eq!(alice.rating, 1016);
    assert_eq!(bob.rating, 984);
    assert_eq!((alice.wins, alice.losses, alice.draws), (1, 0, 0));
    assert_eq!((bob.wins, bob.losses, bob.draws), (0, 1, 0));

    // Step 4: the match is closed and its session torn down
    assert_eq!(system.store.active_match_count().unwrap(), 0);
    assert_eq!(system.sessions.get_closed().len(), 1);

    // Step 5: tiers were pushed out for both; bob dropped a band
    let synced = system.tiers.get_synced();
    assert!(synced
        .iter()
        .any(|(id, tier)| id == "alice" && *tier == Tier::Bronze));
    assert!(synced
        .iter()
        .any(|(id, tier)| id == "bob" && *tier == Tier::Iron));
    assert!(system.notifier.kinds_for("bob").contains(&"tier_changed"));

    // The winner picked up result and personal-best notifications
    assert!(system
        .notifier
        .kinds_for("alice")
        .contains(&"result_finalized"));
    assert!(system
        .notifier
        .kinds_for("alice")
        .contains(&"new_personal_best"));

    println!("✅ Complete ladder workflow test passed");
}

#[tokio::test]
async fn test_range_acceptance_workflow() {
    let system = create_test_system();
    system.register("gina", 1000);
    system.register("hank", 1150);

    system.queue.enqueue("gina").await.unwrap();
    system.queue.enqueue("hank").await.unwrap();

    // Widen one side by hand; the 150 gap now needs consent from both
    system.store.set_range_expanded("gina").unwrap();
    let requested = wait_for(Duration::from_secs(2), || {
        system.queue.pending_acceptance_count() > 0
    })
    .await;
    assert!(requested, "acceptance request should appear");
    assert!(system
        .notifier
        .kinds_for("gina")
        .contains(&"range_acceptance_requested"));
    assert!(system
        .notifier
        .kinds_for("hank")
        .contains(&"range_acceptance_requested"));

    // First accept waits, second accept pairs
    let outcome = system
        .queue
        .respond_range_acceptance("gina", "hank", "hank", true)
        .await
        .unwrap();
    assert!(matches!(outcome, CycleOutcome::AwaitingAcceptance));

    let outcome = system
        .queue
        .respond_range_acceptance("gina", "hank", "gina", true)
        .await
        .unwrap();
    assert!(matches!(outcome, CycleOutcome::Paired));

    assert_eq!(system.store.active_match_count().unwrap(), 1);
    assert_eq!(system.queue.searching_count().unwrap(), 0);

    println!("✅ Range acceptance workflow test passed");
}

#[tokio::test]
async fn test_challenge_workflow() {
    let system = create_test_system();
    system.register("carol", 1200);
    system.register("dave", 1180);

    let challenge = system.challenges.challenge("carol", "dave").await.unwrap();
    assert!(system
        .notifier
        .kinds_for("dave")
        .contains(&"challenge_received"));

    let active = system
        .challenges
        .respond(&challenge.challenge_id, "dave", true)
        .await
        .unwrap()
        .expect("accept should open a match");

    assert!(active.involves("carol") && active.involves("dave"));
    assert_eq!(system.challenges.pending_count(), 0);
    assert_eq!(system.store.active_match_count().unwrap(), 1);
    assert!(system.notifier.kinds_for("carol").contains(&"match_found"));

    println!("✅ Challenge workflow test passed");
}

#[tokio::test]
async fn test_queue_timeout_workflow() {
    let mut settings = fast_queue_settings();
    settings.range_expand_after_ms = 80;
    settings.queue_timeout_ms = 160;
    let system = create_test_system_with(settings);

    system.register("ivan", 1000);
    system.queue.enqueue("ivan").await.unwrap();
    assert_eq!(system.queue.searching_count().unwrap(), 1);

    // Nobody compatible ever arrives; expansion finds no one and the
    // timeout clears the search
    let timed_out = wait_for(Duration::from_secs(2), || {
        system.queue.searching_count().unwrap_or(1) == 0
    })
    .await;
    assert!(timed_out, "lone player should time out of the queue");
    assert!(system.notifier.kinds_for("ivan").contains(&"queue_timeout"));
    assert_eq!(system.store.active_match_count().unwrap(), 0);

    println!("✅ Queue timeout workflow test passed");
}

#[tokio::test]
async fn test_error_handling_and_recovery() {
    let system = create_test_system();

    // Queueing an unknown player fails cleanly
    let err = system.queue.enqueue("nobody").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LadderError>(),
        Some(LadderError::PlayerNotFound { .. })
    ));

    system.register("pat", 1000);
    system.register("quinn", 1010);

    // Self-challenges are rejected
    let err = system.challenges.challenge("pat", "pat").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LadderError>(),
        Some(LadderError::SelfChallenge { .. })
    ));

    // A paired player can neither requeue nor be challenged
    system.pair("pat", "quinn").await;
    let err = system.queue.enqueue("pat").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LadderError>(),
        Some(LadderError::AlreadyInMatch { .. })
    ));
    let err = system
        .challenges
        .challenge("quinn", "pat")
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LadderError>(),
        Some(LadderError::AlreadyInMatch { .. })
    ));

    // The system keeps serving fresh players afterwards
    system.register("rosa", 1000);
    system.queue.enqueue("rosa").await.unwrap();
    assert_eq!(system.queue.searching_count().unwrap(), 1);

    println!("✅ Error handling and recovery test passed");
}

#[tokio::test]
async fn test_leaderboard_and_player_stats() {
    let system = create_test_system();
    system.register("sana", 1500);
    system.register("timo", 1400);
    system.register("uma", 1400);
    system.register("vik", 1000);

    // One decisive result between the tied pair
    system.pair("timo", "uma").await;
    let confirmation = system
        .confirmations
        .propose("timo", "uma", 2, 0)
        .await
        .unwrap();
    system
        .confirmations
        .confirm(&confirmation.confirmation_id, "uma")
        .await
        .unwrap();
    system
        .confirmations
        .confirm(&confirmation.confirmation_id, "timo")
        .await
        .unwrap();

    // timo 1400 -> 1416, uma 1400 -> 1384
    let board = system.stats.leaderboard(10).unwrap();
    assert_eq!(board[0].player.id, "sana");
    assert_eq!(board[0].rank, 1);
    assert_eq!(board[1].player.id, "timo");
    assert_eq!(board[2].player.id, "uma");
    assert_eq!(board[3].player.id, "vik");

    let profile = system.stats.profile("timo").unwrap();
    assert_eq!(profile.player.rating, 1416);
    assert_eq!(profile.rank, 2);
    assert_eq!(profile.win_rate_percent, 100.0);
    assert_eq!(profile.current_win_streak, 1);
    assert_eq!(profile.best_rating, 1416);

    let h2h = system.stats.head_to_head("timo", "uma").unwrap();
    assert_eq!(h2h.player1_wins, 1);
    assert_eq!(h2h.player2_wins, 0);
    assert_eq!(h2h.draws, 0);

    println!("✅ Leaderboard and player stats test passed");
}
