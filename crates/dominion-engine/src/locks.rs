//! Per-user mutual exclusion for import runs and webhook events.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// One async mutex per user. Runs and events for the same user queue behind
/// each other; different users proceed in parallel.
#[derive(Debug, Clone, Default)]
pub struct UserLocks {
    locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `user_id`'s data.
    pub async fn acquire(&self, user_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Drop entries nobody holds or waits on
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks.entry(user_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Whether a run or event currently holds `user_id`.
    pub async fn is_locked(&self, user_id: Uuid) -> bool {
        match self.locks.lock().await.get(&user_id) {
            Some(lock) => lock.try_lock().is_err(),
            None => false,
        }
    }
}
