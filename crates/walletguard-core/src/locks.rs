use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-key async mutual exclusion over the key-value store.
///
/// The store has no compare-and-swap, so every read-modify-write of one key
/// must run while holding that key's guard.
#[derive(Debug, Default, Clone)]
pub struct KeyLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut guard = self.inner.lock();
            guard
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        slot.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = KeyLocks::new();
        let guard = locks.lock("session").await;
        let contended =
            tokio::time::timeout(Duration::from_millis(20), locks.lock("session")).await;
        assert!(contended.is_err());
        drop(guard);
        let reacquired =
            tokio::time::timeout(Duration::from_millis(20), locks.lock("session")).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyLocks::new();
        let _session = locks.lock("session").await;
        let vault = tokio::time::timeout(Duration::from_millis(20), locks.lock("vault")).await;
        assert!(vault.is_ok());
    }
}
