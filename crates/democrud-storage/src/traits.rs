//! Storage traits for the record store abstraction layer.
//!
//! This module defines the core trait that all record store backends must implement.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::types::{NewUser, User};

/// The record store trait that all user storage backends must implement.
///
/// The record store is the sole source of truth for users. Implementations
/// must be thread-safe (`Send + Sync`) since a single instance is shared by
/// every in-flight request.
///
/// # Example
///
/// ```ignore
/// use democrud_storage::{NewUser, RecordStore, StorageError, User};
///
/// async fn register(store: &dyn RecordStore) -> Result<User, StorageError> {
///     store.insert(&NewUser::new("Ada", "ada@example.com")).await
/// }
/// ```
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts a new user and returns it with its store-assigned id.
    ///
    /// The insert must be durable and visible to subsequent reads before this
    /// returns. Ids are unique, strictly increasing and never reused.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable or rejects the insert.
    /// In that case no user has been created.
    async fn insert(&self, user: &NewUser) -> Result<User, StorageError>;

    /// Returns every user, ordered by ascending id.
    ///
    /// # Errors
    ///
    /// Returns an error for infrastructure issues.
    async fn select_all(&self) -> Result<Vec<User>, StorageError>;

    /// Checks that the backend is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot serve queries.
    async fn ping(&self) -> Result<(), StorageError>;

    /// Short backend name used in logs and readiness output.
    fn backend_name(&self) -> &'static str;
}
