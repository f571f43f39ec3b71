//! Cache-aside coordination between the record store and the users list cache.
//!
//! - Reads try the `users_list` snapshot first and populate it on a miss.
//! - Writes insert into the record store, then delete the snapshot.
//!
//! The delete is issued only after the insert has returned, so a reader that
//! misses right after it falls back to a store that already holds the new row.
//! An insert that outlives its timeout is left running and followed by a
//! second delete once it settles.
//! There are no locks: concurrent repopulations race and the last `SET` wins,
//! which is harmless because both computed the list from the same store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use democrud_storage::{DynRecordStore, NewUser, StorageError, User};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::{CacheBackend, CacheError, UsersListCache};

/// Failures of the cache-aside operations.
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// The insert failed; no user was created and the cache was not touched.
    #[error("failed to create user: {0}")]
    StoreWrite(#[source] StorageError),

    /// The insert did not answer within the store timeout and may still
    /// commit. The snapshot has been invalidated; retrying can duplicate the
    /// user.
    #[error("user insert timed out, the user may or may not exist: {0}")]
    InsertOutcomeUnknown(#[source] StorageError),

    /// The record store read behind a cache miss failed.
    #[error("failed to list users: {0}")]
    StoreRead(#[source] StorageError),

    /// The insert committed but the snapshot could not be deleted, so readers
    /// may see a list without this user until the snapshot expires.
    #[error(
        "user {} was created but the users cache could not be invalidated: {source}",
        .user.id
    )]
    CacheInvalidation {
        user: User,
        #[source]
        source: CacheError,
    },

    /// Reading the snapshot failed (only when degradation is disabled).
    #[error("failed to read users cache: {0}")]
    CacheRead(#[source] CacheError),

    /// Storing the snapshot failed (only when degradation is disabled).
    #[error("failed to populate users cache: {0}")]
    CacheWrite(#[source] CacheError),
}

impl UserServiceError {
    /// The user that exists despite the error, if any.
    pub fn committed_user(&self) -> Option<&User> {
        match self {
            UserServiceError::CacheInvalidation { user, .. } => Some(user),
            _ => None,
        }
    }
}

/// Tuning for [`UserService`].
#[derive(Debug, Clone)]
pub struct UserServiceOptions {
    /// Lifetime of the users list snapshot.
    pub users_ttl: Duration,
    /// Upper bound for a single record store call.
    pub store_timeout: Duration,
    /// Serve from the record store when the cache fails on the read path.
    pub degrade_on_error: bool,
}

impl Default for UserServiceOptions {
    fn default() -> Self {
        Self {
            users_ttl: Duration::from_secs(60),
            store_timeout: Duration::from_secs(5),
            degrade_on_error: true,
        }
    }
}

/// The cache-aside coordinator. Cheap to clone; clones share the pools.
#[derive(Clone)]
pub struct UserService {
    store: DynRecordStore,
    cache: UsersListCache,
    store_timeout: Duration,
    degrade_on_error: bool,
}

impl UserService {
    pub fn new(store: DynRecordStore, cache: CacheBackend, options: UserServiceOptions) -> Self {
        Self {
            store,
            cache: UsersListCache::new(cache, options.users_ttl),
            store_timeout: options.store_timeout,
            degrade_on_error: options.degrade_on_error,
        }
    }

    pub fn cache(&self) -> &UsersListCache {
        &self.cache
    }

    /// Creates a user and invalidates the users list snapshot.
    ///
    /// The insert runs on its own task so that it is never cancelled halfway.
    /// If it outlives the store timeout its outcome is unknown: the snapshot
    /// is deleted at once and again when the insert settles, and the caller
    /// gets [`UserServiceError::InsertOutcomeUnknown`].
    #[instrument(skip(self, new_user), fields(name = %new_user.name))]
    pub async fn create_user(&self, new_user: NewUser) -> Result<User, UserServiceError> {
        let store = Arc::clone(&self.store);
        let mut insert = tokio::spawn(async move { store.insert(&new_user).await });

        let inserted = match tokio::time::timeout(self.store_timeout, &mut insert).await {
            Ok(joined) => joined.unwrap_or_else(|e| {
                Err(StorageError::internal(format!("insert task failed: {e}")))
            }),
            Err(_) => return Err(self.insert_timed_out(insert).await),
        };
        let user = inserted.map_err(|e| {
            error!(error = %e, category = %e.category(), "user insert failed");
            UserServiceError::StoreWrite(e)
        })?;

        if let Err(source) = self.cache.invalidate().await {
            error!(id = user.id, error = %source, "users cache invalidation failed after insert");
            return Err(UserServiceError::CacheInvalidation { user, source });
        }

        info!(id = user.id, "user created");
        Ok(user)
    }

    async fn insert_timed_out(
        &self,
        insert: JoinHandle<Result<User, StorageError>>,
    ) -> UserServiceError {
        let source = StorageError::timeout("insert", self.store_timeout.as_millis() as u64);
        warn!(
            error = %source,
            category = %source.category(),
            "user insert timed out, outcome unknown"
        );

        let cache = self.cache.clone();
        tokio::spawn(async move {
            match insert.await {
                Ok(Ok(user)) => match cache.invalidate().await {
                    Ok(()) => info!(id = user.id, "user created after insert timeout"),
                    Err(e) => error!(
                        id = user.id,
                        error = %e,
                        "users cache invalidation failed after late insert"
                    ),
                },
                Ok(Err(e)) => debug!(error = %e, "timed out insert failed"),
                Err(e) => warn!(error = %e, "timed out insert task failed"),
            }
        });

        if let Err(e) = self.cache.invalidate().await {
            error!(error = %e, "users cache invalidation failed after insert timeout");
        }
        UserServiceError::InsertOutcomeUnknown(source)
    }

    /// Lists all users, from the snapshot when present.
    #[instrument(skip(self))]
    pub async fn list_users(&self) -> Result<Vec<User>, UserServiceError> {
        match self.cache.get().await {
            Ok(Some(users)) => {
                debug!(count = users.len(), "users list cache hit");
                return Ok(users);
            }
            Ok(None) => debug!("users list cache miss, querying record store"),
            Err(e) if self.degrade_on_error => {
                warn!(error = %e, "users cache read failed, falling back to record store");
            }
            Err(e) => return Err(UserServiceError::CacheRead(e)),
        }

        let users = self
            .with_store_timeout("select_all", self.store.select_all())
            .await
            .map_err(|e| {
                error!(error = %e, category = %e.category(), "users read failed");
                UserServiceError::StoreRead(e)
            })?;

        if let Err(e) = self.cache.set(&users).await {
            if !self.degrade_on_error {
                return Err(UserServiceError::CacheWrite(e));
            }
            warn!(error = %e, "users cache populate failed, serving uncached result");
        }

        Ok(users)
    }

    /// Probes both stores.
    pub async fn readiness(&self) -> Readiness {
        let store = match self
            .with_store_timeout("ping", self.store.ping())
            .await
        {
            Ok(()) => ComponentHealth::up(self.store.backend_name()),
            Err(e) => ComponentHealth::down(self.store.backend_name(), e.to_string()),
        };

        let cache_mode = self.cache.backend().stats().mode;
        let cache = match self.cache.backend().ping().await {
            Ok(()) => ComponentHealth::up(cache_mode),
            Err(e) => ComponentHealth::down(cache_mode, e.to_string()),
        };

        Readiness { store, cache }
    }

    async fn with_store_timeout<T, F>(
        &self,
        operation: &'static str,
        fut: F,
    ) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        tokio::time::timeout(self.store_timeout, fut)
            .await
            .unwrap_or_else(|_| {
                Err(StorageError::timeout(
                    operation,
                    self.store_timeout.as_millis() as u64,
                ))
            })
    }
}

/// Result of [`UserService::readiness`].
#[derive(Debug, Clone, Serialize)]
pub struct Readiness {
    pub store: ComponentHealth,
    pub cache: ComponentHealth,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.store.is_up() && self.cache.is_up()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub backend: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn up(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            status: "up",
            error: None,
        }
    }

    fn down(backend: impl Into<String>, error: String) -> Self {
        Self {
            backend: backend.into(),
            status: "down",
            error: Some(error),
        }
    }

    pub fn is_up(&self) -> bool {
        self.status == "up"
    }
}
