//! Pool-lock behavior against a real redis. Requires Docker; ignored by
//! default. Run with: `cargo test -p jobrunner-core --test lock -- --ignored`

use chrono::Utc;
use jobrunner_core::{HaClient, PoolLock, QueueError};

mod common;

#[tokio::test]
#[ignore] // Requires Docker; run with: cargo test -- --ignored
async fn at_most_n_slots_are_ever_held() {
    let (url, _container) = common::start_redis().await;
    let client = HaClient::new("aggregators", &[url]).unwrap();
    let lock = PoolLock::new(&client, "jobchron-test", 2, 300);

    let first = lock.acquire().await.unwrap();
    let second = lock.acquire().await.unwrap();
    assert_ne!(first.key(), second.key());

    let err = lock.acquire().await.unwrap_err();
    assert!(matches!(err, QueueError::LockUnavailable(_)));

    // Releasing one slot makes room for exactly one more holder
    lock.release(second).await.unwrap();
    let third = lock.acquire().await.unwrap();
    assert_ne!(first.key(), third.key());
    assert!(matches!(
        lock.acquire().await.unwrap_err(),
        QueueError::LockUnavailable(_)
    ));
}

#[tokio::test]
#[ignore] // Requires Docker; run with: cargo test -- --ignored
async fn stale_holders_are_evicted_by_ttl() {
    let (url, _container) = common::start_redis().await;
    let client = HaClient::new("aggregators", &[url.clone()]).unwrap();
    let lock = PoolLock::new(&client, "jobchron-test", 1, 300);

    // A holder that died long ago: its timestamp is past the TTL window
    let stale = Utc::now().timestamp() - 301;
    let mut conn = client.connection(&url).await.unwrap();
    redis::cmd("SET")
        .arg("jobchron-test:lock:0")
        .arg(stale)
        .query_async::<()>(&mut conn)
        .await
        .unwrap();

    let slot = lock.acquire().await.unwrap();
    assert_eq!(slot.key(), "jobchron-test:lock:0");
}

#[tokio::test]
#[ignore] // Requires Docker; run with: cargo test -- --ignored
async fn refresh_keeps_a_slot_alive() {
    let (url, _container) = common::start_redis().await;
    let client = HaClient::new("aggregators", &[url.clone()]).unwrap();
    let lock = PoolLock::new(&client, "jobchron-test", 1, 300);

    let slot = lock.acquire().await.unwrap();

    // Age the slot artificially, then refresh it back to now
    let old = Utc::now().timestamp() - 250;
    let mut conn = client.connection(&url).await.unwrap();
    redis::cmd("SET")
        .arg(slot.key())
        .arg(old)
        .query_async::<()>(&mut conn)
        .await
        .unwrap();
    lock.refresh(&slot).await.unwrap();

    let stored: i64 = redis::cmd("GET")
        .arg(slot.key())
        .query_async(&mut conn)
        .await
        .unwrap();
    assert!(stored >= old + 200);

    lock.release(slot).await.unwrap();
    let gone: Option<i64> = redis::cmd("GET")
        .arg("jobchron-test:lock:0")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(gone, None);
}
