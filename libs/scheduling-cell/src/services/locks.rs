// libs/scheduling-cell/src/services/locks.rs
//
// Single-writer-per-day exclusion. Every booking, status change and window
// edit for a (doctor, date) runs while holding that day's lease.

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::error::ScheduleError;
use crate::models::DayKey;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

const RENEW_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#;

#[async_trait]
pub trait DayLockProvider: Send + Sync {
    /// Wait for the day's lease, giving up with `ScheduleBusy` after the configured timeout.
    async fn acquire(&self, key: &DayKey) -> Result<DayLease, ScheduleError>;
}

enum LeaseInner {
    Local(OwnedMutexGuard<()>),
    Redis {
        pool: Pool,
        lock_key: String,
        token: String,
        ttl: Duration,
    },
}

/// Held for the whole check-compute-persist sequence of one day.
pub struct DayLease {
    key: DayKey,
    inner: LeaseInner,
}

impl std::fmt::Debug for DayLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DayLease").field("key", &self.key).finish_non_exhaustive()
    }
}

impl DayLease {
    pub fn key(&self) -> &DayKey {
        &self.key
    }

    /// Confirm the lease is still ours right before a write, extending a
    /// Redis lease by its full TTL. A lease that lapsed and may now belong to
    /// another instance fails with `ScheduleBusy` so nothing is persisted.
    pub async fn ensure_held(&self) -> Result<(), ScheduleError> {
        match &self.inner {
            LeaseInner::Local(_) => Ok(()),
            LeaseInner::Redis { pool, lock_key, token, ttl } => {
                let mut conn = pool.get().await?;
                let renewed: i32 = redis::Script::new(RENEW_SCRIPT)
                    .key(lock_key)
                    .arg(token)
                    .arg(ttl.as_millis() as u64)
                    .invoke_async(&mut conn)
                    .await?;
                renewal_outcome(lock_key, renewed)
            }
        }
    }

    pub async fn release(self) -> Result<(), ScheduleError> {
        match self.inner {
            LeaseInner::Local(guard) => {
                drop(guard);
                debug!("Released local day lock {}", self.key);
                Ok(())
            }
            LeaseInner::Redis { pool, lock_key, token, .. } => {
                let mut conn = pool.get().await?;
                let released: i32 = redis::Script::new(RELEASE_SCRIPT)
                    .key(&lock_key)
                    .arg(&token)
                    .invoke_async(&mut conn)
                    .await?;
                if released == 0 {
                    warn!("Day lock {} expired before release", lock_key);
                } else {
                    debug!("Released day lock {}", lock_key);
                }
                Ok(())
            }
        }
    }
}

fn renewal_outcome(lock_key: &str, renewed: i32) -> Result<(), ScheduleError> {
    if renewed == 0 {
        warn!("Day lock {} lapsed before the write; aborting", lock_key);
        return Err(ScheduleError::ScheduleBusy);
    }
    debug!("Renewed day lock {}", lock_key);
    Ok(())
}

/// Per-process registry of one async mutex per day.
pub struct InProcessDayLocks {
    locks: Mutex<HashMap<DayKey, Arc<AsyncMutex<()>>>>,
    timeout: Duration,
}

impl InProcessDayLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(Duration::from_millis(config.lock_timeout_ms))
    }

    fn day_mutex(&self, key: &DayKey) -> Result<Arc<AsyncMutex<()>>, ScheduleError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| ScheduleError::Lock("day lock registry poisoned".to_string()))?;

        // Entries nobody holds or waits on are only referenced by the map.
        locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);

        Ok(Arc::clone(locks.entry(*key).or_default()))
    }
}

#[async_trait]
impl DayLockProvider for InProcessDayLocks {
    async fn acquire(&self, key: &DayKey) -> Result<DayLease, ScheduleError> {
        let mutex = self.day_mutex(key)?;
        match tokio::time::timeout(self.timeout, mutex.lock_owned()).await {
            Ok(guard) => {
                debug!("Acquired local day lock {}", key);
                Ok(DayLease {
                    key: *key,
                    inner: LeaseInner::Local(guard),
                })
            }
            Err(_) => {
                warn!("Timed out after {:?} waiting for day lock {}", self.timeout, key);
                Err(ScheduleError::ScheduleBusy)
            }
        }
    }
}

/// Redis lease shared by every API instance: `SET NX PX` to take, compare-and-delete to release.
pub struct RedisDayLocks {
    pool: Pool,
    ttl: Duration,
    timeout: Duration,
    retry_interval: Duration,
}

impl RedisDayLocks {
    pub async fn new(config: &AppConfig) -> Result<Self, ScheduleError> {
        let redis_url = config
            .redis_url
            .clone()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        let cfg = Config::from_url(redis_url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| ScheduleError::Lock(format!("Failed to create Redis pool: {}", e)))?;

        let mut conn = pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis day locks initialized");

        Ok(Self {
            pool,
            ttl: Duration::from_secs(config.lock_ttl_seconds),
            timeout: Duration::from_millis(config.lock_timeout_ms),
            retry_interval: Duration::from_millis(50),
        })
    }

    fn lock_key(key: &DayKey) -> String {
        format!("schedule_lock:{}:{}", key.doctor_id, key.date)
    }

    async fn try_acquire(&self, lock_key: &str, token: &str) -> Result<bool, ScheduleError> {
        let mut conn = self.pool.get().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(lock_key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(self.ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }
}

#[async_trait]
impl DayLockProvider for RedisDayLocks {
    async fn acquire(&self, key: &DayKey) -> Result<DayLease, ScheduleError> {
        let lock_key = Self::lock_key(key);
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.timeout;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            if self.try_acquire(&lock_key, &token).await? {
                debug!("Acquired day lock {} on attempt {}", lock_key, attempt);
                return Ok(DayLease {
                    key: *key,
                    inner: LeaseInner::Redis {
                        pool: self.pool.clone(),
                        lock_key,
                        token,
                        ttl: self.ttl,
                    },
                });
            }

            let now = Instant::now();
            if now >= deadline {
                warn!("Day lock {} still held after {} attempts", lock_key, attempt);
                return Err(ScheduleError::ScheduleBusy);
            }

            let backoff = (self.retry_interval * attempt).min(Duration::from_millis(500));
            tokio::time::sleep(backoff.min(deadline - now)).await;
        }
    }
}
