//! Schema management for the PostgreSQL record store backend.
//!
//! The service owns a single table. It is created idempotently at startup;
//! there is no migration history.

use sqlx_postgres::PgPool;
use tracing::{debug, info, instrument};

use crate::error::{PostgresError, Result};

const UNIQUE_VIOLATION: &str = "23505";
const DUPLICATE_TABLE: &str = "42P07";

/// Name of the table holding user records.
pub const USERS_TABLE: &str = "users";

const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id BIGSERIAL PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    email VARCHAR(255) NOT NULL
)
"#;

/// Manages the database schema for user records.
#[derive(Debug, Clone)]
pub struct SchemaManager {
    pool: PgPool,
}

impl SchemaManager {
    /// Creates a new `SchemaManager` with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Ensures the `users` table exists.
    ///
    /// `CREATE TABLE IF NOT EXISTS` is not atomic in PostgreSQL: two sessions
    /// racing on it can fail with a unique violation on `pg_type` or a
    /// duplicate table error. Either means another session created the table,
    /// so both are treated as success.
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL statement fails.
    #[instrument(skip(self))]
    pub async fn ensure_users_table(&self) -> Result<()> {
        if self.table_exists(USERS_TABLE).await? {
            debug!("Table {} already exists", USERS_TABLE);
            return Ok(());
        }

        info!("Creating table {}", USERS_TABLE);
        match sqlx_core::query::query(CREATE_USERS_TABLE)
            .execute(&self.pool)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_concurrent_create(&e) => {
                debug!(error = %e, "Table {} was created concurrently", USERS_TABLE);
                Ok(())
            }
            Err(e) => Err(PostgresError::Schema(format!(
                "failed to create {USERS_TABLE}: {e}"
            ))),
        }
    }

    /// Checks whether a table exists in the current schema.
    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let exists: bool = sqlx_core::query_scalar::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1)",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

fn is_concurrent_create(err: &sqlx_core::error::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION || code == DUPLICATE_TABLE)
}
