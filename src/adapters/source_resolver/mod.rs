// Source resolver - Turns source handles into readable local files

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tracing::{debug, instrument};

use crate::domain::errors::DomainError;
use crate::ports::{SourceHandle, SourceResolver};

const FILE_SCHEME: &str = "file://";

/// Resolves plain paths and `file://` URIs.
///
/// Regular files are used in place. Anything else that can be opened (a FIFO,
/// a device node) is copied into the working directory first.
#[derive(Debug, Clone)]
pub struct LocalSourceResolver {
    working_dir: PathBuf,
}

impl LocalSourceResolver {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self { working_dir: working_dir.into() }
    }

    fn handle_path(handle: &SourceHandle) -> PathBuf {
        let raw = handle.as_str();
        PathBuf::from(raw.strip_prefix(FILE_SCHEME).unwrap_or(raw))
    }

    async fn copy_to_working_dir(&self, source: &Path) -> Result<PathBuf, DomainError> {
        fs::create_dir_all(&self.working_dir).await.map_err(|e| {
            DomainError::Storage(format!("Failed to create {}: {}", self.working_dir.display(), e))
        })?;

        let copy = self
            .working_dir
            .join(Utc::now().format("%Y%m%d%H%M%S%3f").to_string());
        let mut reader = fs::File::open(source)
            .await
            .map_err(|e| DomainError::SourceUnavailable(format!("{}: {}", source.display(), e)))?;
        let mut writer = fs::File::create(&copy)
            .await
            .map_err(|e| DomainError::Storage(format!("Failed to create {}: {}", copy.display(), e)))?;
        let bytes = tokio::io::copy(&mut reader, &mut writer)
            .await
            .map_err(|e| DomainError::SourceUnavailable(format!("Copying {} failed: {}", source.display(), e)))?;

        debug!(bytes, copy = %copy.display(), "Copied source into working directory");
        Ok(copy)
    }
}

#[async_trait]
impl SourceResolver for LocalSourceResolver {
    #[instrument(skip(self), fields(handle = %handle))]
    async fn resolve(&self, handle: &SourceHandle) -> Result<PathBuf, DomainError> {
        let path = Self::handle_path(handle);
        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| DomainError::SourceUnavailable(format!("{}: {}", path.display(), e)))?;

        if metadata.is_file() {
            return Ok(path);
        }
        if metadata.is_dir() {
            return Err(DomainError::SourceUnavailable(format!(
                "{} is a directory",
                path.display()
            )));
        }
        self.copy_to_working_dir(&path).await
    }
}
