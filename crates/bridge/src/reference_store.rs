//! Component A: the process-local id→callable map. Ids are handed out by a
//! monotonic counter and are never reused, even after `free`; the lock-guarded
//! map pattern follows the teacher's `PendingRequests = Arc<Mutex<HashMap<..>>>`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

use crate::error::BridgeError;
use crate::value::Callable;

pub struct ReferenceStore {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, Callable>>,
}

impl ReferenceStore {
    pub fn new() -> Self {
        ReferenceStore {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `callable` under a freshly allocated id and returns it.
    pub async fn put(&self, callable: Callable) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().await.insert(id, callable);
        id
    }

    /// Looks up a previously-registered callable by id.
    pub async fn fetch(&self, id: u64) -> Result<Callable, BridgeError> {
        self.entries
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(BridgeError::UnregisteredClient(id))
    }

    /// Drops a callable once the host is known not to reference it anymore.
    /// Never called automatically by the dispatcher; it's here for a host
    /// that tracks reachability itself.
    pub async fn free(&self, id: u64) {
        self.entries.lock().await.remove(&id);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl Default for ReferenceStore {
    fn default() -> Self {
        Self::new()
    }
}
