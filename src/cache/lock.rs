//! Cross-process mutual exclusion through a sentinel file.
//!
//! Holding the lock means having created the file. There is no timeout and
//! no stale-owner detection: a lock file left behind by a crashed process
//! blocks every later load until it is removed by hand.

use crate::cache::error::LockError;
use log::{debug, error, info};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{self, OpenOptions};

pub const LOCK_FILE_NAME: &str = ".lock";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Suspends a lock waiter between polls.
pub trait Waiter: Send + Sync {
    fn wait(&self, interval: Duration) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioWaiter;

impl Waiter for TokioWaiter {
    async fn wait(&self, interval: Duration) {
        tokio::time::sleep(interval).await;
    }
}

#[derive(Debug, Clone)]
pub struct LockFile<W = TokioWaiter> {
    path: PathBuf,
    poll_interval: Duration,
    waiter: W,
}

impl LockFile<TokioWaiter> {
    pub fn new(path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self::with_waiter(path, poll_interval, TokioWaiter)
    }

    /// `<data_dir>/.lock`, polled every second.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(LOCK_FILE_NAME), DEFAULT_POLL_INTERVAL)
    }
}

impl<W: Waiter> LockFile<W> {
    pub fn with_waiter(path: impl Into<PathBuf>, poll_interval: Duration, waiter: W) -> Self {
        Self {
            path: path.into(),
            poll_interval,
            waiter,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Waits until no lock file exists, then creates it.
    ///
    /// Creation is atomic, so of two processes that see the file disappear
    /// only one gets the lock; the other goes back to waiting.
    pub async fn acquire(&self) -> Result<LockGuard, LockError> {
        let mut announced = false;
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.path)
                .await
            {
                Ok(_) => {
                    debug!("Acquired lock {:?}", self.path);
                    return Ok(LockGuard {
                        path: Some(self.path.clone()),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if !announced {
                        info!("Waiting for lock {:?}", self.path);
                        announced = true;
                    }
                    self.waiter.wait(self.poll_interval).await;
                }
                Err(e) => {
                    error!("Failed to create lock file {:?}: {}", self.path, e);
                    return Err(LockError::Create(self.path.clone(), e));
                }
            }
        }
    }
}

/// Removes the lock file when released or dropped.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard {
    path: Option<PathBuf>,
}

impl LockGuard {
    /// Removes the lock file, reporting failure.
    ///
    /// If the returned future is dropped before it completes, the guard's
    /// `Drop` still removes the file.
    pub async fn release(mut self) -> Result<(), LockError> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let removed = fs::remove_file(&path).await;
        self.path = None;
        match removed {
            Ok(()) => {
                debug!("Released lock {:?}", path);
                Ok(())
            }
            Err(e) => {
                error!("Failed to remove lock file {:?}: {}", path, e);
                Err(LockError::Remove(path, e))
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Drop cannot await.
        if let Some(path) = self.path.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("Released lock {:?} on drop", path),
                Err(e) => error!("Failed to remove lock file {:?}: {}", path, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Counts polls and removes the lock file on the `release_after`-th one,
    /// standing in for another process finishing its load.
    struct ScriptedWaiter {
        waits: AtomicUsize,
        release_after: usize,
        path: PathBuf,
    }

    impl Waiter for ScriptedWaiter {
        async fn wait(&self, _interval: Duration) {
            if self.waits.fetch_add(1, Ordering::SeqCst) + 1 == self.release_after {
                std::fs::remove_file(&self.path).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_acquire_waits_for_existing_lock() -> Result<(), LockError> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCK_FILE_NAME);
        std::fs::write(&path, b"").unwrap();

        let lock = LockFile::with_waiter(
            &path,
            DEFAULT_POLL_INTERVAL,
            ScriptedWaiter {
                waits: AtomicUsize::new(0),
                release_after: 3,
                path: path.clone(),
            },
        );
        let guard = lock.acquire().await?;
        assert_eq!(lock.waiter.waits.load(Ordering::SeqCst), 3);
        assert!(path.exists());

        guard.release().await?;
        assert!(!path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_dropped_guard_removes_lock() -> Result<(), LockError> {
        let dir = tempfile::tempdir().unwrap();
        let lock = LockFile::in_dir(dir.path());
        {
            let _guard = lock.acquire().await?;
            assert!(lock.path().exists());
        }
        assert!(!lock.path().exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_second_holder_blocks_until_release() -> Result<(), LockError> {
        let dir = tempfile::tempdir().unwrap();
        let lock = Arc::new(LockFile::new(
            dir.path().join(LOCK_FILE_NAME),
            Duration::from_millis(5),
        ));
        let first_released = Arc::new(AtomicBool::new(false));

        let guard = lock.acquire().await?;
        let second = {
            let lock = Arc::clone(&lock);
            let first_released = Arc::clone(&first_released);
            tokio::spawn(async move {
                let guard = lock.acquire().await?;
                let saw_release = first_released.load(Ordering::SeqCst);
                guard.release().await?;
                Ok::<bool, LockError>(saw_release)
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!second.is_finished());
        first_released.store(true, Ordering::SeqCst);
        guard.release().await?;

        assert!(second.await.unwrap()?);
        assert!(!lock.path().exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_directory_is_a_create_error() {
        let dir = tempfile::tempdir().unwrap();
        let lock = LockFile::in_dir(&dir.path().join("missing"));
        assert!(matches!(lock.acquire().await, Err(LockError::Create(..))));
    }

    #[tokio::test]
    async fn test_release_reports_a_vanished_lock_file() -> Result<(), LockError> {
        let dir = tempfile::tempdir().unwrap();
        let lock = LockFile::in_dir(dir.path());
        let guard = lock.acquire().await?;
        std::fs::remove_file(lock.path()).unwrap();

        let result = guard.release().await;
        assert!(matches!(result, Err(LockError::Remove(path, _)) if path == lock.path()));
        Ok(())
    }
}
