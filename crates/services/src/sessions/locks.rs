use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use syneval_core::model::SessionId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-session mutual exclusion for read-modify-write of answer vectors.
///
/// Different ids never contend. Entries nobody holds or waits on are dropped
/// on the next acquire.
#[derive(Debug, Default)]
pub(crate) struct SessionLocks {
    inner: Mutex<HashMap<SessionId, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    pub(crate) async fn acquire(&self, id: &SessionId) -> OwnedMutexGuard<()> {
        let lock = {
            // The map holds no invariant a panicking holder could break.
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.retain(|key, lock| key == id || Arc::strong_count(lock) > 1);
            Arc::clone(map.entry(id.clone()).or_default())
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
