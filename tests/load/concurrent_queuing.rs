//! High concurrency stress tests for queue and confirmation processing
//!
//! These tests hammer the shared store and the pairing lock from many
//! tasks at once and check that the accounting stays exact: nobody gets
//! double-booked, nothing leaks and every reported result settles.

use std::time::{Duration, Instant};

use futures::future::join_all;
use ranked_ladder::store::LadderStore;

use crate::fixtures::{create_test_system, wait_for};

#[tokio::test]
async fn test_100_concurrent_enqueues_pair_without_double_booking() {
    let system = create_test_system();
    let concurrent_requests = 100;

    // Clustered ratings so every searcher is compatible with every other
    for i in 0..concurrent_requests {
        system.register(&format!("load_{i}"), 1000 + (i as i32 % 50));
    }

    let start_time = Instant::now();
    let handles: Vec<_> = (0..concurrent_requests)
        .map(|i| {
            let queue = system.queue.clone();
            tokio::spawn(async move { queue.enqueue(&format!("load_{i}")).await })
        })
        .collect();
    let results = join_all(handles).await;

    let successful = results.iter().filter(|r| matches!(r, Ok(Ok(_)))).count();
    assert_eq!(
        successful, concurrent_requests,
        "every enqueue should succeed"
    );

    // Let the poll loops drain the queue completely
    let drained = wait_for(Duration::from_secs(10), || {
        system.queue.searching_count().unwrap_or(usize::MAX) == 0
    })
    .await;
    let duration = start_time.elapsed();
    assert!(drained, "all searchers should pair up");
    assert_eq!(
        system.store.active_match_count().unwrap(),
        concurrent_requests / 2
    );

    // 100 players across exactly 50 matches leaves no room for anyone
    // to sit in two matches at once
    for i in 0..concurrent_requests {
        let id = format!("load_{i}");
        assert!(
            system.store.active_match_for(&id).unwrap().is_some(),
            "{id} should be matched"
        );
    }

    let throughput = concurrent_requests as f64 / duration.as_secs_f64();
    println!(
        "✅ 100 concurrent enqueues test passed - Throughput: {:.1} requests/sec",
        throughput
    );
}

#[tokio::test]
async fn test_concurrent_duplicate_registrations_are_idempotent() {
    let system = create_test_system();
    let attempts: i32 = 25;

    // Every task races to create the same player with a different rating
    let handles: Vec<_> = (0..attempts)
        .map(|i| {
            let store = system.store.clone();
            tokio::spawn(async move { store.register_player("dup", &format!("Dup {i}"), 1000 + i) })
        })
        .collect();
    let results = join_all(handles).await;

    // Exactly one row wins and every caller gets that row back
    let mut ratings = Vec::new();
    for result in results {
        let player = result.unwrap().unwrap();
        assert_eq!(player.id, "dup");
        ratings.push(player.rating);
    }
    assert!(
        ratings.windows(2).all(|pair| pair[0] == pair[1]),
        "all callers should see the same row"
    );
    assert_eq!(system.store.player_count().unwrap(), 1);

    println!("✅ Duplicate registration race test passed");
}

#[tokio::test]
async fn test_rapid_enqueue_dequeue_churn_leaves_no_residue() {
    let system = create_test_system();
    let players = 10;
    let cycles = 20;

    // Ratings far enough apart that nobody can pair during the churn
    for i in 0..players {
        system.register(&format!("churn_{i}"), 1000 + (i as i32) * 1000);
    }

    let start_time = Instant::now();
    let handles: Vec<_> = (0..players)
        .map(|i| {
            let queue = system.queue.clone();
            tokio::spawn(async move {
                let id = format!("churn_{i}");
                for _ in 0..cycles {
                    queue.enqueue(&id).await?;
                    queue.dequeue(&id).await?;
                }
                anyhow::Ok(())
            })
        })
        .collect();
    for result in join_all(handles).await {
        result.unwrap().unwrap();
    }

    // No entries, no acceptances and no orphaned poll tasks remain
    assert_eq!(system.queue.searching_count().unwrap(), 0);
    assert_eq!(system.queue.pending_acceptance_count(), 0);
    let tasks_cleared =
        wait_for(Duration::from_secs(2), || system.queue.live_task_groups() == 0).await;
    assert!(tasks_cleared, "poll tasks should die with their entries");
    assert_eq!(system.store.active_match_count().unwrap(), 0);

    println!(
        "✅ Queue churn test passed - {} cycles in {:?}",
        players * cycles,
        start_time.elapsed()
    );
}

#[tokio::test]
async fn test_concurrent_result_settlement_conserves_ratings() {
    let system = create_test_system();
    let couples: usize = 10;

    // Isolated rating islands so couples only ever pair internally
    let mut initial_total = 0;
    for k in 0..couples {
        let rating = 1000 + (k as i32) * 500;
        system.register(&format!("blue_{k}"), rating);
        system.register(&format!("red_{k}"), rating);
        initial_total += 2 * rating;
    }

    let handles: Vec<_> = (0..couples)
        .flat_map(|k| {
            ["blue", "red"]
                .into_iter()
                .map(move |side| format!("{side}_{k}"))
        })
        .map(|id| {
            let queue = system.queue.clone();
            tokio::spawn(async move { queue.enqueue(&id).await })
        })
        .collect();
    let enqueued = join_all(handles)
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();
    assert_eq!(enqueued, couples * 2);

    let all_paired = wait_for(Duration::from_secs(10), || {
        system.queue.searching_count().unwrap_or(usize::MAX) == 0
    })
    .await;
    assert!(all_paired, "every couple should pair internally");
    assert_eq!(system.store.active_match_count().unwrap(), couples);

    // Settle every match from its own task, both sign-offs included
    let handles: Vec<_> = (0..couples)
        .map(|k| {
            let confirmations = system.confirmations.clone();
            tokio::spawn(async move {
                let blue = format!("blue_{k}");
                let red = format!("red_{k}");
                let confirmation = confirmations.propose(&blue, &red, 2, 1).await?;
                confirmations
                    .confirm(&confirmation.confirmation_id, &red)
                    .await?;
                confirmations
                    .confirm(&confirmation.confirmation_id, &blue)
                    .await?;
                anyhow::Ok(())
            })
        })
        .collect();
    for result in join_all(handles).await {
        result.unwrap().unwrap();
    }

    // Every match settled, every session closed and the rating mass
    // moved between players rather than growing
    assert_eq!(system.store.active_match_count().unwrap(), 0);
    assert_eq!(system.store.confirmation_count().unwrap(), 0);
    assert_eq!(system.sessions.get_closed().len(), couples);

    let mut final_total = 0;
    for k in 0..couples {
        let blue = system.store.get_player(&format!("blue_{k}")).unwrap().unwrap();
        let red = system.store.get_player(&format!("red_{k}")).unwrap().unwrap();
        assert!(
            blue.rating > red.rating,
            "couple {k} should have settled decisively"
        );
        assert_eq!((blue.wins, blue.losses), (1, 0));
        assert_eq!((red.wins, red.losses), (0, 1));
        final_total += blue.rating + red.rating;
    }
    assert_eq!(
        final_total, initial_total,
        "equal-rating results transfer points one for one"
    );

    println!(
        "✅ Concurrent settlement test passed - {} matches settled",
        couples
    );
}
