use crate::cache::error::LockError;
use crate::cache::lock::{LockFile, TokioWaiter, Waiter};
use log::{debug, error, info};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A memo with room for exactly one result.
///
/// Storing a value under a new key evicts the previous one.
pub struct LoadCache<K, V> {
    slot: Mutex<Option<(K, Arc<V>)>>,
}

impl<K, V> Default for LoadCache<K, V> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<K: PartialEq, V> LoadCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &K) -> Option<Arc<V>> {
        let slot = self.slot.lock().await;
        match slot.as_ref() {
            Some((cached_key, value)) if cached_key == key => Some(Arc::clone(value)),
            _ => None,
        }
    }

    pub async fn insert(&self, key: K, value: V) -> Arc<V> {
        let value = Arc::new(value);
        *self.slot.lock().await = Some((key, Arc::clone(&value)));
        value
    }

    pub async fn clear(&self) {
        *self.slot.lock().await = None;
    }
}

/// Routes loads through the memo and the lock file.
pub struct CacheManager<K, V, W = TokioWaiter> {
    lock: LockFile<W>,
    memo: LoadCache<K, V>,
}

impl<K, V, W> CacheManager<K, V, W>
where
    K: PartialEq + std::fmt::Debug,
    W: Waiter,
{
    pub fn new(lock: LockFile<W>) -> Self {
        Self {
            lock,
            memo: LoadCache::new(),
        }
    }

    pub fn lock_file(&self) -> &LockFile<W> {
        &self.lock
    }

    /// Returns the memoized result for `key`, or runs `loader` under the lock
    /// file and memoizes what it returns.
    ///
    /// `force` skips the memo lookup. The lock file is removed whether or not
    /// `loader` succeeds.
    pub async fn load<F, Fut, E>(&self, key: K, force: bool, loader: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: From<LockError> + std::fmt::Display,
    {
        if !force {
            if let Some(hit) = self.memo.get(&key).await {
                debug!("Cache hit for {:?}", key);
                return Ok(hit);
            }
        }

        let guard = self.lock.acquire().await?;
        // Another caller in this process may have finished the same load while we waited.
        if !force {
            if let Some(hit) = self.memo.get(&key).await {
                guard.release().await?;
                return Ok(hit);
            }
        }

        info!("Loading {:?}", key);
        let result = loader().await;
        let released = guard.release().await;
        let value = match result {
            Ok(value) => value,
            Err(e) => {
                error!("Load of {:?} failed: {}", key, e);
                if let Err(lock_error) = released {
                    error!("{}", lock_error);
                }
                return Err(e);
            }
        };
        released?;
        Ok(self.memo.insert(key, value).await)
    }

    pub async fn clear(&self) {
        self.memo.clear().await;
    }
}
