//! PostgreSQL implementation of the RecordStore trait.

use async_trait::async_trait;
use sqlx_core::pool::PoolOptions;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::{PgPool, Postgres};
use tracing::{info, instrument};

use democrud_storage::{NewUser, RecordStore, StorageError, User};

use crate::config::PostgresConfig;
use crate::error::{PostgresError, map_sqlx_error};
use crate::schema::SchemaManager;

/// PostgreSQL record store for users.
///
/// Ids come from the table's `BIGSERIAL` sequence. An insert returns only
/// after the statement has committed, so a read issued afterwards on any
/// pooled connection sees the row.
#[derive(Debug, Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
    schema_manager: SchemaManager,
}

impl PostgresRecordStore {
    /// Connects a pool and, when configured, creates the `users` table.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable, the settings are
    /// invalid, or schema setup fails.
    #[instrument(skip(config), fields(url = %config.redacted_url()))]
    pub async fn new(config: PostgresConfig) -> Result<Self, StorageError> {
        if config.max_connections == 0 {
            return Err(PostgresError::config("max_connections must be > 0").into());
        }

        let pool = PoolOptions::<Postgres>::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .connect(&config.url)
            .await
            .map_err(map_sqlx_error)?;
        info!(max_connections = config.max_connections, "connected to PostgreSQL");

        let store = Self::from_pool(pool);
        if config.ensure_schema {
            store.schema_manager.ensure_users_table().await?;
        }
        Ok(store)
    }

    /// Wraps an existing pool. Schema setup is left to the caller.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        let schema_manager = SchemaManager::new(pool.clone());
        Self {
            pool,
            schema_manager,
        }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[must_use]
    pub fn schema(&self) -> &SchemaManager {
        &self.schema_manager
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    #[instrument(skip(self, user), fields(name = %user.name))]
    async fn insert(&self, user: &NewUser) -> Result<User, StorageError> {
        let (id, name, email): (i64, String, String) = query_as(
            "INSERT INTO users (name, email) VALUES ($1, $2) RETURNING id, name, email",
        )
        .bind(&user.name)
        .bind(&user.email)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(User { id, name, email })
    }

    #[instrument(skip(self))]
    async fn select_all(&self) -> Result<Vec<User>, StorageError> {
        let rows: Vec<(i64, String, String)> =
            query_as("SELECT id, name, email FROM users ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|(id, name, email)| User { id, name, email })
            .collect())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
