//! Lifecycle tests for open matches
//!
//! The happy queue-to-finalized path lives in the top-level integration
//! tests; this module covers everything else that can happen to an open
//! match: denials, draws, cancellations, reminders and the personal-best
//! bookkeeping that rides along with a finalized result.

use std::time::Duration;

use ranked_ladder::confirmation::ConfirmationProgress;
use ranked_ladder::error::LadderError;
use ranked_ladder::rating::Tier;
use ranked_ladder::store::LadderStore;
use ranked_ladder::types::{Notification, RecordKind};

use crate::fixtures::{create_test_system, create_test_system_with, fast_queue_settings};

#[tokio::test]
async fn test_denied_result_leaves_match_open_for_redo() {
    let system = create_test_system();
    system.register("elena", 1000);
    system.register("felix", 1000);
    system.pair("elena", "felix").await;

    // elena's report is vetoed by felix
    let confirmation = system
        .confirmations
        .propose("elena", "felix", 3, 1)
        .await
        .unwrap();
    system
        .confirmations
        .deny(&confirmation.confirmation_id, "felix")
        .await
        .unwrap();

    // the proposer hears about the veto; nothing else moves
    assert!(system
        .notifier
        .kinds_for("elena")
        .contains(&"result_denied"));
    assert!(!system
        .notifier
        .kinds_for("felix")
        .contains(&"result_denied"));
    assert_eq!(system.store.confirmation_count().unwrap(), 0);
    assert_eq!(system.store.active_match_count().unwrap(), 1);
    let elena = system.store.get_player("elena").unwrap().unwrap();
    assert_eq!((elena.rating, elena.wins, elena.losses), (1000, 0, 0));

    // a corrected report goes through the usual consensus
    let redo = system
        .confirmations
        .propose("felix", "elena", 2, 1)
        .await
        .unwrap();
    assert_eq!(
        system
            .confirmations
            .confirm(&redo.confirmation_id, "elena")
            .await
            .unwrap(),
        ConfirmationProgress::PartiallyConfirmed
    );
    assert_eq!(
        system
            .confirmations
            .confirm(&redo.confirmation_id, "felix")
            .await
            .unwrap(),
        ConfirmationProgress::Finalized
    );

    let felix = system.store.get_player("felix").unwrap().unwrap();
    assert_eq!(felix.rating, 1016);
    assert_eq!(system.store.active_match_count().unwrap(), 0);

    println!("✅ Denied result redo test passed");
}

#[tokio::test]
async fn test_draw_leaves_equal_ratings_untouched() {
    let system = create_test_system();
    system.register("nina", 1000);
    system.register("omar", 1000);
    system.pair("nina", "omar").await;

    let confirmation = system
        .confirmations
        .propose("nina", "omar", 2, 2)
        .await
        .unwrap();
    system
        .confirmations
        .confirm(&confirmation.confirmation_id, "omar")
        .await
        .unwrap();
    system
        .confirmations
        .confirm(&confirmation.confirmation_id, "nina")
        .await
        .unwrap();

    for id in ["nina", "omar"] {
        let player = system.store.get_player(id).unwrap().unwrap();
        assert_eq!(player.rating, 1000, "{id} should hold at 1000");
        assert_eq!((player.wins, player.losses, player.draws), (0, 0, 1));
        assert!(system.notifier.kinds_for(id).contains(&"result_finalized"));
        // no winner, no gain: no records and no band movement
        assert!(!system.notifier.kinds_for(id).contains(&"new_personal_best"));
        assert!(!system.notifier.kinds_for(id).contains(&"tier_changed"));
    }

    // tier sync still runs for both even though nothing changed
    let synced = system.tiers.get_synced();
    assert!(synced.iter().any(|(id, _)| id == "nina"));
    assert!(synced.iter().any(|(id, _)| id == "omar"));
    assert_eq!(system.store.active_match_count().unwrap(), 0);

    println!("✅ Draw finalization test passed");
}

#[tokio::test]
async fn test_cancel_notifies_opponent_and_frees_players() {
    let system = create_test_system();
    system.register("willa", 1000);
    system.register("ximena", 1000);
    system.pair("willa", "ximena").await;
    assert_eq!(system.sessions.get_created().len(), 1);

    let cancelled = system.matches.cancel("willa").await.unwrap();
    assert!(cancelled.involves("ximena"));

    // only the opponent is told, and the session is torn down
    assert!(system
        .notifier
        .kinds_for("ximena")
        .contains(&"opponent_cancelled"));
    assert!(!system
        .notifier
        .kinds_for("willa")
        .contains(&"opponent_cancelled"));
    assert_eq!(system.store.active_match_count().unwrap(), 0);
    assert_eq!(system.sessions.get_closed().len(), 1);

    // a second cancel has nothing to act on
    let err = system.matches.cancel("willa").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LadderError>(),
        Some(LadderError::NoActiveMatch { .. })
    ));

    // the cancelling player is free to search again
    system.queue.enqueue("willa").await.unwrap();
    assert_eq!(system.queue.searching_count().unwrap(), 1);

    println!("✅ Cancel flow test passed");
}

#[tokio::test]
async fn test_match_reminder_fires_exactly_once() {
    let mut settings = fast_queue_settings();
    settings.reminder_after_ms = 50;
    let system = create_test_system_with(settings);

    system.register("yuri", 1000);
    system.register("zoe", 1000);
    system.pair("yuri", "zoe").await;

    // well past the reminder point, long enough to catch a double fire
    tokio::time::sleep(Duration::from_millis(200)).await;

    for id in ["yuri", "zoe"] {
        let reminders = system
            .notifier
            .kinds_for(id)
            .into_iter()
            .filter(|kind| *kind == "match_reminder")
            .count();
        assert_eq!(reminders, 1, "{id} should get exactly one reminder");
    }

    println!("✅ Match reminder test passed");
}

#[tokio::test]
async fn test_confirmation_is_idempotent_per_player() {
    let system = create_test_system();
    system.register("petra", 1000);
    system.register("ruben", 1000);
    system.pair("petra", "ruben").await;

    let confirmation = system
        .confirmations
        .propose("petra", "ruben", 3, 2)
        .await
        .unwrap();

    // repeated sign-off by one side never finalizes on its own
    for _ in 0..3 {
        let progress = system
            .confirmations
            .confirm(&confirmation.confirmation_id, "ruben")
            .await
            .unwrap();
        assert_eq!(progress, ConfirmationProgress::PartiallyConfirmed);
    }
    let petra = system.store.get_player("petra").unwrap().unwrap();
    assert_eq!(petra.rating, 1000);
    assert_eq!(system.store.active_match_count().unwrap(), 1);

    // an outsider cannot sign off at all
    system.register("sven", 1000);
    let err = system
        .confirmations
        .confirm(&confirmation.confirmation_id, "sven")
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LadderError>(),
        Some(LadderError::NotAParticipant { .. })
    ));

    let progress = system
        .confirmations
        .confirm(&confirmation.confirmation_id, "petra")
        .await
        .unwrap();
    assert_eq!(progress, ConfirmationProgress::Finalized);

    println!("✅ Confirmation idempotence test passed");
}

#[tokio::test]
async fn test_first_win_sets_rating_and_streak_records() {
    let system = create_test_system();
    system.register("astrid", 1000);
    system.register("boris", 1000);
    system.pair("astrid", "boris").await;

    let confirmation = system
        .confirmations
        .propose("astrid", "boris", 2, 0)
        .await
        .unwrap();
    system
        .confirmations
        .confirm(&confirmation.confirmation_id, "boris")
        .await
        .unwrap();
    system
        .confirmations
        .confirm(&confirmation.confirmation_id, "astrid")
        .await
        .unwrap();

    // the winner banks a rating best and a first streak
    let bests: Vec<(RecordKind, i32)> = system
        .notifier
        .notifications_for("astrid")
        .into_iter()
        .filter_map(|notification| match notification {
            Notification::NewPersonalBest { kind, value } => Some((kind, value)),
            _ => None,
        })
        .collect();
    assert!(bests.contains(&(RecordKind::Rating, 1016)));
    assert!(bests.contains(&(RecordKind::WinStreak, 1)));
    assert_eq!(bests.len(), 2);

    // the loser banks nothing and drops a band
    assert!(system
        .notifier
        .notifications_for("boris")
        .into_iter()
        .all(|notification| !matches!(notification, Notification::NewPersonalBest { .. })));
    let tier_change = system
        .notifier
        .notifications_for("boris")
        .into_iter()
        .find_map(|notification| match notification {
            Notification::TierChanged {
                previous,
                current,
                rating,
            } => Some((previous, current, rating)),
            _ => None,
        });
    assert_eq!(tier_change, Some((Tier::Bronze, Tier::Iron, 984)));
    assert!(!system.notifier.kinds_for("astrid").contains(&"tier_changed"));

    println!("✅ First win records test passed");
}
