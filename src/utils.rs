use crate::error::VizDataError;
use log::info;
use std::io;
use std::path::Path;

pub async fn ensure_data_dir_exists(path: &Path) -> Result<(), VizDataError> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => {
            if !metadata.is_dir() {
                return Err(VizDataError::DataDirCreation(
                    path.to_path_buf(),
                    io::Error::new(io::ErrorKind::AlreadyExists, "path exists but is not a directory"),
                ));
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("Creating data directory: {}", path.display());
            tokio::fs::create_dir_all(path)
                .await
                .map_err(|e| VizDataError::DataDirCreation(path.to_path_buf(), e))
        }
        Err(e) => Err(VizDataError::Io(path.to_path_buf(), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_creates_nested_dir() -> Result<(), VizDataError> {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_data_dir_exists(&nested).await?;
        assert!(nested.is_dir());
        ensure_data_dir_exists(&nested).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_file_in_the_way() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data");
        std::fs::write(&file, b"").unwrap();
        assert!(matches!(
            ensure_data_dir_exists(&file).await,
            Err(VizDataError::DataDirCreation(..))
        ));
    }
}
