pub mod cache;
pub mod config;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod server;
pub mod users;

use std::time::Duration;

use democrud_storage::{DynRecordStore, StorageError};

pub use cache::{CacheBackend, CacheError, USERS_LIST_KEY, UsersListCache};
pub use config::{
    AppConfig, CacheConfig, LogFormat, LoggingConfig, PostgresStorageConfig, RedisConfig,
    ServerConfig, StorageBackendKind, StorageConfig,
};
pub use observability::init_tracing;
pub use server::{AppState, DemoCrudServer, ServerBuilder, build_app, build_state};
pub use users::{
    ComponentHealth, Readiness, UserService, UserServiceError, UserServiceOptions,
};

/// Create a cache backend based on configuration.
///
/// ## Cache Modes
///
/// - **Redis disabled**: Returns local-only cache (DashMap)
/// - **Redis enabled**: Attempts to connect to Redis, falls back to local on failure
///
/// The fallback only happens here, at startup. Once a Redis backend is handed
/// out, later Redis failures surface as [`CacheError`]s.
pub async fn create_cache_backend(config: &RedisConfig) -> CacheBackend {
    if !config.enabled {
        tracing::info!("Redis disabled, using local cache only");
        return CacheBackend::new_local();
    }

    tracing::info!(url = %config.url, "Connecting to Redis");

    let timeout = Duration::from_millis(config.timeout_ms);
    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size);
    pool_config.timeouts.wait = Some(timeout);
    pool_config.timeouts.create = Some(timeout);
    pool_config.timeouts.recycle = Some(timeout);
    redis_config.pool = Some(pool_config);

    let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to create Redis pool. Falling back to local cache."
            );
            return CacheBackend::new_local();
        }
    };

    let backend = CacheBackend::new_redis(pool, timeout);
    match backend.ping().await {
        Ok(()) => {
            tracing::info!("Connected to Redis");
            backend
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to connect to Redis. Falling back to local cache."
            );
            CacheBackend::new_local()
        }
    }
}

/// Create the record store selected by `storage.backend`.
pub async fn create_record_store(config: &StorageConfig) -> Result<DynRecordStore, StorageError> {
    match config.backend {
        StorageBackendKind::Memory => {
            tracing::info!("Using in-memory record store");
            Ok(democrud_db_memory::create_record_store())
        }
        StorageBackendKind::Postgres => {
            let pg = config.postgres.to_backend_config();
            tracing::info!(
                url = %pg.redacted_url(),
                max_connections = pg.max_connections,
                "Connecting to PostgreSQL"
            );
            let store: DynRecordStore = democrud_db_postgres::create_record_store(pg).await?;
            Ok(store)
        }
    }
}
