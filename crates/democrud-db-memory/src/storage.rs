use async_trait::async_trait;
use democrud_storage::{NewUser, RecordStore, StorageError, User};
use papaya::HashMap as PapayaHashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// In-memory record store using papaya lock-free HashMap.
///
/// Ids come from an atomic sequence starting at 1, so they are unique and
/// strictly increasing in insertion order. Nothing survives a restart.
#[derive(Debug)]
pub struct InMemoryRecordStore {
    /// Users keyed by id
    pub(crate) data: Arc<PapayaHashMap<i64, User>>,
    /// Next id to hand out
    pub(crate) id_sequence: AtomicI64,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            data: Arc::new(PapayaHashMap::new()),
            id_sequence: AtomicI64::new(1),
        }
    }

    /// Creates a store pre-populated with the given users.
    ///
    /// The id sequence continues after the largest seeded id.
    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let store = Self::new();
        let mut max_id = 0;
        {
            let guard = store.data.pin();
            for user in users {
                max_id = max_id.max(user.id);
                guard.insert(user.id, user);
            }
        }
        store.id_sequence.store(max_id + 1, Ordering::SeqCst);
        store
    }

    pub(crate) fn next_id(&self) -> i64 {
        self.id_sequence.fetch_add(1, Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.data.pin().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert(&self, user: &NewUser) -> Result<User, StorageError> {
        let created = user.clone().with_id(self.next_id());
        self.data.pin().insert(created.id, created.clone());
        tracing::trace!(id = created.id, "user inserted (memory)");
        Ok(created)
    }

    async fn select_all(&self) -> Result<Vec<User>, StorageError> {
        let guard = self.data.pin();
        let mut users: Vec<User> = guard.values().cloned().collect();
        users.sort_unstable_by_key(|u| u.id);
        Ok(users)
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
