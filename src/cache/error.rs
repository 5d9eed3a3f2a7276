use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Failed to create lock file '{0}'")]
    Create(PathBuf, #[source] std::io::Error),

    #[error("Failed to remove lock file '{0}'; remove it by hand before the next load")]
    Remove(PathBuf, #[source] std::io::Error),
}
