use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per collection.
///
/// Grant changes and collection reindexing take the same lock so that a
/// reindex never interleaves with the ACL write it is meant to reflect.
#[derive(Debug, Default)]
pub struct CollectionLocks {
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl CollectionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and hold the lock of `collection_id` until the guard drops.
    pub async fn lock(&self, collection_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(collection_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_collection_serializes() {
        let locks = Arc::new(CollectionLocks::new());
        let guard = locks.lock(1).await;

        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = other.lock(1).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_collections_do_not_block() {
        let locks = CollectionLocks::new();
        let _one = locks.lock(1).await;
        let _two = locks.lock(2).await;
    }
}
