// libs/scheduling-cell/tests/redis_locks_test.rs
//
// Needs a live Redis: REDIS_TEST_URL=redis://localhost:6379 cargo test -- --ignored
use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::NaiveDate;
use uuid::Uuid;

use scheduling_cell::error::ScheduleError;
use scheduling_cell::models::DayKey;
use scheduling_cell::services::locks::{DayLockProvider, RedisDayLocks};
use shared_config::AppConfig;

fn redis_config() -> Option<AppConfig> {
    let url = std::env::var("REDIS_TEST_URL").ok()?;
    Some(AppConfig {
        redis_url: Some(url),
        lock_timeout_ms: 200,
        lock_ttl_seconds: 5,
        ..AppConfig::default()
    })
}

fn key() -> DayKey {
    DayKey::new(Uuid::new_v4(), NaiveDate::from_ymd_opt(2025, 6, 20).unwrap())
}

#[tokio::test]
#[ignore]
async fn lease_excludes_other_instances() {
    let Some(config) = redis_config() else {
        return;
    };
    let first_instance = RedisDayLocks::new(&config).await.unwrap();
    let second_instance = RedisDayLocks::new(&config).await.unwrap();
    let day = key();

    let lease = first_instance.acquire(&day).await.unwrap();
    assert_matches!(second_instance.acquire(&day).await, Err(ScheduleError::ScheduleBusy));

    lease.release().await.unwrap();
    let lease = second_instance.acquire(&day).await.unwrap();
    lease.release().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn waiter_acquires_once_released() {
    let Some(mut config) = redis_config() else {
        return;
    };
    config.lock_timeout_ms = 2_000;
    let locks = Arc::new(RedisDayLocks::new(&config).await.unwrap());
    let day = key();

    let lease = locks.acquire(&day).await.unwrap();
    let waiter = {
        let locks = Arc::clone(&locks);
        tokio::spawn(async move { locks.acquire(&day).await.map(|lease| *lease.key()) })
    };
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    lease.release().await.unwrap();

    assert_eq!(waiter.await.unwrap(), Ok(day));
}

#[tokio::test]
#[ignore]
async fn lapsed_lease_cannot_be_renewed() {
    let Some(config) = redis_config() else {
        return;
    };
    let locks = RedisDayLocks::new(&config).await.unwrap();
    let day = key();

    let lease = locks.acquire(&day).await.unwrap();
    assert!(lease.ensure_held().await.is_ok());

    // Simulate the TTL running out and another instance taking the day.
    let client = redis::Client::open(config.redis_url.clone().unwrap()).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    let lock_key = format!("schedule_lock:{}:{}", day.doctor_id, day.date);
    let _: () = redis::cmd("SET").arg(&lock_key).arg("other-instance").query_async(&mut conn).await.unwrap();

    assert_matches!(lease.ensure_held().await, Err(ScheduleError::ScheduleBusy));
    lease.release().await.unwrap();

    let still_other: String = redis::cmd("GET").arg(&lock_key).query_async(&mut conn).await.unwrap();
    assert_eq!(still_other, "other-instance");
    let _: () = redis::cmd("DEL").arg(&lock_key).query_async(&mut conn).await.unwrap();
}
