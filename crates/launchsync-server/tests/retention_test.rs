mod common;

use chrono::{Duration, Utc};
use common::{now, test_pool};
use launchsync_ledger::{mark_sent, was_sent, SentKey};
use launchsync_server::retention::{prune_sent_notifications, start_sent_retention_task};

#[tokio::test]
async fn prune_keeps_recent_keys() {
    let (_dir, pool) = test_pool();
    let old = SentKey::countdown("alpha", 1, 10);
    let recent = SentKey::countdown("bravo", 1, 10);
    {
        let conn = pool.get().unwrap();
        mark_sent(&conn, &old, now() - Duration::days(20)).unwrap();
        mark_sent(&conn, &recent, now() - Duration::days(1)).unwrap();
    }

    let pruned = prune_sent_notifications(&pool, now(), Duration::days(14))
        .await
        .expect("prune should succeed");
    assert_eq!(pruned, 1);

    let conn = pool.get().unwrap();
    assert!(!was_sent(&conn, &old).unwrap());
    assert!(was_sent(&conn, &recent).unwrap());
}

#[tokio::test]
async fn retention_task_prunes_in_background() {
    let (_dir, pool) = test_pool();
    let expired = SentKey::new("alpha", 1, "status:1>2");
    {
        let conn = pool.get().unwrap();
        mark_sent(&conn, &expired, Utc::now() - Duration::days(30)).unwrap();
    }

    let task_pool = pool.clone();
    tokio::spawn(async move {
        start_sent_retention_task(task_pool, 1, 14).await;
    });
    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;

    let conn = pool.get().unwrap();
    assert!(!was_sent(&conn, &expired).unwrap());
}
