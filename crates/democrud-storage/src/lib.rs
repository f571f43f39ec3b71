//! # democrud-storage
//!
//! Record store abstraction for the demo-crud service.
//!
//! This crate defines the trait and types that all record store backends must
//! implement. It does not contain any implementations - those are provided by
//! `democrud-db-postgres` and `democrud-db-memory`.
//!
//! ## Overview
//!
//! The main trait is [`RecordStore`], which defines the contract for:
//! - inserting a user and obtaining its store-assigned id
//! - reading every user in id order
//! - a liveness ping used by readiness probes
//!
//! ## Storage Backends
//!
//! ```ignore
//! use async_trait::async_trait;
//! use democrud_storage::{NewUser, RecordStore, StorageError, User};
//!
//! struct MyStore;
//!
//! #[async_trait]
//! impl RecordStore for MyStore {
//!     async fn insert(&self, user: &NewUser) -> Result<User, StorageError> {
//!         // Implementation
//!     }
//!     // ... other methods
//! }
//! ```

mod error;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::RecordStore;
pub use types::{NewUser, User};

/// Type alias for a shareable record store instance.
pub type DynRecordStore = std::sync::Arc<dyn RecordStore>;
