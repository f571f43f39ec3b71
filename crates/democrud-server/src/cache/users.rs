//! Cached snapshot of the full users list.
//!
//! The whole list lives under one well-known key and is stored as the JSON
//! array served by `GET /users`, ordered by id. Any user creation deletes it.
//!
//! ## Cache Key Format
//!
//! `users_list`

use std::time::Duration;

use democrud_storage::User;

use super::backend::{CacheBackend, CacheError};

/// Key of the users list snapshot.
pub const USERS_LIST_KEY: &str = "users_list";

/// Users list snapshot cache.
#[derive(Clone, Debug)]
pub struct UsersListCache {
    backend: CacheBackend,
    ttl: Duration,
}

impl UsersListCache {
    /// Create a new users list cache with the given backend and TTL.
    pub fn new(backend: CacheBackend, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn backend(&self) -> &CacheBackend {
        &self.backend
    }

    /// Get the cached snapshot.
    ///
    /// A snapshot that no longer decodes is deleted and reported as a miss.
    pub async fn get(&self) -> Result<Option<Vec<User>>, CacheError> {
        let Some(data) = self.backend.get(USERS_LIST_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_slice::<Vec<User>>(&data) {
            Ok(users) => Ok(Some(users)),
            Err(e) => {
                tracing::warn!(key = USERS_LIST_KEY, error = %e, "Failed to decode cached users list");
                if let Err(e) = self.backend.delete(USERS_LIST_KEY).await {
                    tracing::warn!(key = USERS_LIST_KEY, error = %e, "Failed to drop undecodable users list");
                }
                Ok(None)
            }
        }
    }

    /// Store a snapshot read from the record store.
    pub async fn set(&self, users: &[User]) -> Result<(), CacheError> {
        match serde_json::to_vec(users) {
            Ok(data) => self.backend.set(USERS_LIST_KEY, data, self.ttl).await,
            Err(e) => {
                tracing::warn!(key = USERS_LIST_KEY, error = %e, "Failed to serialize users list for cache");
                Ok(())
            }
        }
    }

    /// Delete the snapshot. Succeeds when it is already absent.
    pub async fn invalidate(&self) -> Result<(), CacheError> {
        self.backend.delete(USERS_LIST_KEY).await
    }

    /// Remaining lifetime of the snapshot, `None` when absent.
    pub async fn remaining_ttl(&self) -> Result<Option<Duration>, CacheError> {
        self.backend.ttl(USERS_LIST_KEY).await
    }
}
