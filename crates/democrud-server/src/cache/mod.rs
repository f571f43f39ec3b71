//! Cache layer in front of the record store.
//!
//! ## Architecture
//!
//! - **Local (DashMap)**: In-memory, per-instance; used when Redis is disabled
//! - **Redis**: Network, shared across instances
//!
//! ## Cache Hierarchy
//!
//! ```text
//! GET /users → users_list snapshot → record store
//!                     ↑                    │
//!                     └──── populate ──────┘  (on miss, TTL 60s)
//! POST /users → record store insert → delete users_list
//! ```

pub mod backend;
pub mod users;

pub use backend::{CacheBackend, CacheError, CacheStats};
pub use users::{USERS_LIST_KEY, UsersListCache};
