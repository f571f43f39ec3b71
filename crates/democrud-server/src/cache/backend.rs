//! Cache backend implementation: process-local (DashMap) or shared (Redis).

use dashmap::DashMap;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Errors surfaced by the cache layer.
///
/// The local backend never fails; every variant comes from the Redis mode.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// No pooled connection could be obtained.
    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// Redis rejected or failed the command.
    #[error("Redis command error: {0}")]
    Command(#[from] redis::RedisError),

    /// The command did not finish within the configured budget.
    #[error("Cache operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },
}

/// A cached entry with TTL support.
///
/// The data is wrapped in `Arc` to allow cheap cloning on cache hits.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Arc<Vec<u8>>,
    pub cached_at: Instant,
    pub ttl: Duration,
}

impl CachedEntry {
    /// Create a new cached entry.
    pub fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data: Arc::new(data),
            cached_at: Instant::now(),
            ttl,
        }
    }

    /// Check if this entry has expired.
    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() >= self.ttl
    }

    /// Time left before expiry.
    pub fn remaining_ttl(&self) -> Duration {
        self.ttl.saturating_sub(self.cached_at.elapsed())
    }
}

/// Cache backend: local DashMap or Redis.
///
/// ## Cache Modes
///
/// - **Local**: Single-instance mode using only DashMap
/// - **Redis**: Multi-instance mode; every operation goes to Redis
///
/// Redis mode keeps no per-instance copy. A local copy would survive a
/// `delete` issued by another instance and serve a stale list after a write.
///
/// Every operation is awaited and reports failure, so callers can order an
/// invalidation after a write and react when it does not happen.
#[derive(Clone)]
pub enum CacheBackend {
    /// Single-instance: local DashMap only
    Local(Arc<DashMap<String, CachedEntry>>),

    /// Multi-instance: shared Redis
    Redis { redis: Pool, timeout: Duration },
}

impl CacheBackend {
    /// Create a new local-only cache backend.
    pub fn new_local() -> Self {
        CacheBackend::Local(Arc::new(DashMap::new()))
    }

    /// Create a new Redis-backed cache backend.
    ///
    /// `timeout` bounds each operation, connection checkout included.
    pub fn new_redis(redis_pool: Pool, timeout: Duration) -> Self {
        CacheBackend::Redis {
            redis: redis_pool,
            timeout,
        }
    }

    /// Get a value from the cache.
    ///
    /// Returns `Ok(None)` for absent and expired keys.
    /// Returns `Arc<Vec<u8>>` for zero-copy access to cached data.
    pub async fn get(&self, key: &str) -> Result<Option<Arc<Vec<u8>>>, CacheError> {
        match self {
            CacheBackend::Local(map) => {
                if let Some(entry) = map.get(key) {
                    if !entry.is_expired() {
                        tracing::debug!(key = %key, "cache hit (local)");
                        return Ok(Some(Arc::clone(&entry.data)));
                    }
                    // Remove expired entry
                    drop(entry);
                    map.remove_if(key, |_, e| e.is_expired());
                }
                tracing::debug!(key = %key, "cache miss (local)");
                Ok(None)
            }
            CacheBackend::Redis { redis, timeout } => {
                let data = with_timeout("GET", *timeout, async {
                    let mut conn = redis.get().await?;
                    let data: Option<Vec<u8>> = conn.get(key).await?;
                    Ok::<_, CacheError>(data)
                })
                .await?;
                match &data {
                    Some(_) => tracing::debug!(key = %key, "cache hit (redis)"),
                    None => tracing::debug!(key = %key, "cache miss (redis)"),
                }
                Ok(data.map(Arc::new))
            }
        }
    }

    /// Set a value in the cache with TTL.
    ///
    /// Redis TTLs have second granularity; sub-second TTLs are rounded up to 1s.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        match self {
            CacheBackend::Local(map) => {
                map.insert(key.to_string(), CachedEntry::new(value, ttl));
                Ok(())
            }
            CacheBackend::Redis { redis, timeout } => {
                let ttl_secs = ttl.as_secs().max(1);
                with_timeout("SETEX", *timeout, async {
                    let mut conn = redis.get().await?;
                    conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
                    Ok::<_, CacheError>(())
                })
                .await?;
                tracing::debug!(key = %key, ttl_secs = %ttl_secs, "cache set (redis)");
                Ok(())
            }
        }
    }

    /// Delete a cache entry.
    ///
    /// Deleting an absent key succeeds.
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        match self {
            CacheBackend::Local(map) => {
                map.remove(key);
                tracing::debug!(key = %key, "cache delete (local)");
                Ok(())
            }
            CacheBackend::Redis { redis, timeout } => {
                with_timeout("DEL", *timeout, async {
                    let mut conn = redis.get().await?;
                    conn.del::<_, ()>(key).await?;
                    Ok::<_, CacheError>(())
                })
                .await?;
                tracing::debug!(key = %key, "cache delete (redis)");
                Ok(())
            }
        }
    }

    /// Remaining lifetime of a key, or `None` when it is absent.
    pub async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        match self {
            CacheBackend::Local(map) => Ok(map
                .get(key)
                .filter(|entry| !entry.is_expired())
                .map(|entry| entry.remaining_ttl())),
            CacheBackend::Redis { redis, timeout } => {
                let secs: i64 = with_timeout("TTL", *timeout, async {
                    let mut conn = redis.get().await?;
                    let secs: i64 = conn.ttl(key).await?;
                    Ok::<_, CacheError>(secs)
                })
                .await?;
                // -2: no such key, -1: key without expiry
                Ok(match secs {
                    -2 => None,
                    -1 => Some(Duration::MAX),
                    s => Some(Duration::from_secs(s.max(0) as u64)),
                })
            }
        }
    }

    /// Check that the backend can serve commands.
    pub async fn ping(&self) -> Result<(), CacheError> {
        match self {
            CacheBackend::Local(_) => Ok(()),
            CacheBackend::Redis {
                redis: pool,
                timeout,
            } => {
                with_timeout("PING", *timeout, async {
                    let mut conn = pool.get().await?;
                    redis::cmd("PING").query_async::<String>(&mut conn).await?;
                    Ok::<_, CacheError>(())
                })
                .await
            }
        }
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        match self {
            CacheBackend::Local(map) => CacheStats {
                local_entries: map.len(),
                mode: "local".to_string(),
            },
            CacheBackend::Redis { .. } => CacheStats {
                local_entries: 0,
                mode: "redis".to_string(),
            },
        }
    }

}

impl std::fmt::Debug for CacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheBackend::Local(map) => f.debug_tuple("Local").field(&map.len()).finish(),
            CacheBackend::Redis { timeout, .. } => f
                .debug_struct("Redis")
                .field("timeout", timeout)
                .finish_non_exhaustive(),
        }
    }
}

async fn with_timeout<T, F>(
    operation: &'static str,
    timeout: Duration,
    fut: F,
) -> Result<T, CacheError>
where
    F: Future<Output = Result<T, CacheError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            let timeout_ms = timeout.as_millis() as u64;
            tracing::warn!(operation, timeout_ms, "cache operation timed out");
            Err(CacheError::Timeout {
                operation,
                timeout_ms,
            })
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub local_entries: usize,
    pub mode: String,
}
