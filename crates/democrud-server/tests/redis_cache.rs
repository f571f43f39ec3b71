//! Integration tests for the Redis cache backend and the users list cache.
//!
//! Tests use testcontainers to spin up a real Redis instance.

use std::sync::Arc;
use std::time::Duration;

use democrud_db_memory::InMemoryRecordStore;
use democrud_server::{
    CacheBackend, RedisConfig, USERS_LIST_KEY, UserService, UserServiceError,
    UserServiceOptions, create_cache_backend,
};
use democrud_storage::{DynRecordStore, NewUser};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

// Shared Redis container for the key-level tests
static SHARED_REDIS: OnceCell<(ContainerAsync<Redis>, String)> = OnceCell::const_new();

async fn start_redis() -> (ContainerAsync<Redis>, String) {
    let container = Redis::default()
        .start()
        .await
        .expect("start redis container");

    let host_port = container.get_host_port_ipv4(6379).await.expect("get port");
    let url = format!("redis://127.0.0.1:{}", host_port);

    (container, url)
}

/// Get or create the shared Redis container
async fn get_redis_url() -> String {
    let (_, url) = SHARED_REDIS.get_or_init(start_redis).await;
    url.clone()
}

async fn redis_backend(url: &str) -> CacheBackend {
    let config = RedisConfig {
        enabled: true,
        url: url.to_string(),
        ..Default::default()
    };
    let cache = create_cache_backend(&config).await;
    assert_eq!(cache.stats().mode, "redis", "expected a Redis-backed cache");
    cache
}

#[tokio::test]
async fn test_redis_cache_connection() {
    let url = get_redis_url().await;
    let cache = redis_backend(&url).await;

    cache.ping().await.expect("ping");
}

#[tokio::test]
async fn test_redis_cache_get_set() {
    let url = get_redis_url().await;
    let cache = redis_backend(&url).await;

    cache
        .set(
            "redis_test_key",
            b"redis_test_value".to_vec(),
            Duration::from_secs(60),
        )
        .await
        .expect("set");

    let value = cache.get("redis_test_key").await.expect("get");
    assert_eq!(value, Some(Arc::new(b"redis_test_value".to_vec())));

    let ttl = cache
        .ttl("redis_test_key")
        .await
        .expect("ttl")
        .expect("key should have a ttl");
    assert!(ttl <= Duration::from_secs(60));
    assert!(ttl > Duration::from_secs(50));
}

#[tokio::test]
async fn test_redis_cache_missing_key() {
    let url = get_redis_url().await;
    let cache = redis_backend(&url).await;

    assert_eq!(cache.get("never_written").await.expect("get"), None);
    assert_eq!(cache.ttl("never_written").await.expect("ttl"), None);
    // Deleting an absent key is not an error
    cache.delete("never_written").await.expect("delete");
}

#[tokio::test]
async fn test_redis_cache_invalidation() {
    let url = get_redis_url().await;
    let cache = redis_backend(&url).await;

    cache
        .set(
            "invalidate_test",
            b"value".to_vec(),
            Duration::from_secs(60),
        )
        .await
        .expect("set");
    assert!(cache.get("invalidate_test").await.expect("get").is_some());

    cache.delete("invalidate_test").await.expect("delete");
    assert!(cache.get("invalidate_test").await.expect("get").is_none());
}

#[tokio::test]
async fn test_redis_cache_expiration() {
    let url = get_redis_url().await;
    let cache = redis_backend(&url).await;

    // Redis expiry has one second granularity
    cache
        .set("expiring_key", b"value".to_vec(), Duration::from_secs(1))
        .await
        .expect("set");
    assert!(cache.get("expiring_key").await.expect("get").is_some());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(cache.get("expiring_key").await.expect("get").is_none());
}

#[tokio::test]
async fn test_graceful_degradation_invalid_url() {
    let config = RedisConfig {
        enabled: true,
        url: "redis://127.0.0.1:1".to_string(),
        timeout_ms: 500,
        ..Default::default()
    };

    let cache = create_cache_backend(&config).await;

    // Falls back to local cache
    assert_eq!(cache.stats().mode, "local");

    cache
        .set("fallback_key", b"fallback_value".to_vec(), Duration::from_secs(60))
        .await
        .expect("local set");
    let value = cache.get("fallback_key").await.expect("local get");
    assert_eq!(value, Some(Arc::new(b"fallback_value".to_vec())));
}

#[tokio::test]
async fn test_disabled_redis() {
    let config = RedisConfig {
        enabled: false,
        ..Default::default()
    };

    let cache = create_cache_backend(&config).await;
    assert_eq!(cache.stats().mode, "local");
}

/// Two service instances sharing one Redis see each other's invalidations.
#[tokio::test]
async fn test_invalidation_is_visible_across_instances() {
    let (_container, url) = start_redis().await;
    let store: DynRecordStore = Arc::new(InMemoryRecordStore::new());

    let instance_a = UserService::new(
        store.clone(),
        redis_backend(&url).await,
        UserServiceOptions::default(),
    );
    let instance_b = UserService::new(
        store.clone(),
        redis_backend(&url).await,
        UserServiceOptions::default(),
    );

    instance_a
        .create_user(NewUser::new("Alice", "alice@example.com"))
        .await
        .expect("create alice");

    // A populates the shared snapshot
    let first = instance_a.list_users().await.expect("list");
    assert_eq!(first.len(), 1);
    let ttl = instance_a
        .cache()
        .remaining_ttl()
        .await
        .expect("ttl")
        .expect("snapshot should exist");
    assert!(ttl <= Duration::from_secs(60));

    // B writes and deletes the shared snapshot
    instance_b
        .create_user(NewUser::new("Bob", "bob@example.com"))
        .await
        .expect("create bob");
    assert_eq!(
        instance_a.cache().backend().get(USERS_LIST_KEY).await.expect("get"),
        None
    );

    // A misses and repopulates with both users
    let second = instance_a.list_users().await.expect("list");
    let names: Vec<_> = second.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["Alice", "Bob"]);

    // B now hits the snapshot A wrote
    let third = instance_b.list_users().await.expect("list");
    assert_eq!(third, second);
}

/// A Redis that answers reads but refuses writes (out of memory).
async fn start_write_refusing_redis() -> (ContainerAsync<Redis>, String) {
    let (container, url) = start_redis().await;
    let client = redis::Client::open(url.as_str()).expect("redis client");
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .expect("redis connection");
    redis::cmd("CONFIG")
        .arg("SET")
        .arg("maxmemory-policy")
        .arg("noeviction")
        .query_async::<()>(&mut conn)
        .await
        .expect("set policy");
    redis::cmd("CONFIG")
        .arg("SET")
        .arg("maxmemory")
        .arg("1")
        .query_async::<()>(&mut conn)
        .await
        .expect("set maxmemory");
    (container, url)
}

#[tokio::test]
async fn test_populate_failure_is_fatal_only_when_strict() {
    let (_container, url) = start_write_refusing_redis().await;
    let store: DynRecordStore = Arc::new(InMemoryRecordStore::with_users([
        NewUser::new("A", "a@x").with_id(1),
        NewUser::new("B", "b@x").with_id(2),
    ]));

    let strict = UserService::new(
        store.clone(),
        redis_backend(&url).await,
        UserServiceOptions {
            degrade_on_error: false,
            ..Default::default()
        },
    );
    let err = strict.list_users().await.expect_err("SET should be refused");
    assert!(
        matches!(err, UserServiceError::CacheWrite(_)),
        "unexpected error: {err:?}"
    );

    let degraded = UserService::new(
        store.clone(),
        redis_backend(&url).await,
        UserServiceOptions::default(),
    );
    let users = degraded.list_users().await.expect("served from the store");
    assert_eq!(users.len(), 2);
    assert_eq!(
        degraded.cache().get().await.expect("reads still work"),
        None
    );
}
