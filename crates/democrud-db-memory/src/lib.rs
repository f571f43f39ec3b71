//! In-memory record store backend for the demo-crud service.
//!
//! This crate provides an in-memory implementation of the `RecordStore` trait
//! from `democrud-storage`, using papaya lock-free HashMap for concurrent access.
//! It backs `storage.backend = "memory"` and the service's test suites.
//!
//! # Example
//!
//! ```ignore
//! use democrud_db_memory::InMemoryRecordStore;
//! use democrud_storage::{NewUser, RecordStore};
//!
//! let store = InMemoryRecordStore::new();
//! let user = store.insert(&NewUser::new("Ada", "ada@example.com")).await?;
//! assert_eq!(user.id, 1);
//! ```

pub mod storage;

// Re-export the RecordStore trait for convenience
pub use democrud_storage::{NewUser, RecordStore, StorageError, User};

pub use storage::InMemoryRecordStore;

/// Creates a new shareable in-memory record store.
pub fn create_record_store() -> democrud_storage::DynRecordStore {
    std::sync::Arc::new(InMemoryRecordStore::new())
}
