// Filesystem storage adapters - Where working and final outputs are placed

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use crate::domain::errors::DomainError;
use crate::ports::StorageDestination;

fn storage_error(action: &str, path: &Path, err: io::Error) -> DomainError {
    DomainError::Storage(format!("Failed to {} {}: {}", action, path.display(), err))
}

async fn ensure_parent(path: &Path) -> Result<(), DomainError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error("create directory", parent, e))?;
        }
    }
    Ok(())
}

/// Move `from` to `to`, copying when a rename cannot cross filesystems
async fn move_file(from: &Path, to: &Path) -> Result<(), DomainError> {
    if from == to {
        return Ok(());
    }
    ensure_parent(to).await?;
    if fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    fs::copy(from, to).await.map_err(|e| storage_error("copy into", to, e))?;
    fs::remove_file(from).await.map_err(|e| storage_error("remove", from, e))?;
    Ok(())
}

/// Files under a private application directory, optionally in a sub folder
#[derive(Debug, Clone)]
pub struct AppSpecificStorage {
    base_dir: PathBuf,
    sub_folder: Option<String>,
}

impl AppSpecificStorage {
    pub fn new(base_dir: impl Into<PathBuf>, sub_folder: Option<String>) -> Self {
        Self { base_dir: base_dir.into(), sub_folder }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        match &self.sub_folder {
            Some(sub) => self.base_dir.join(sub).join(name),
            None => self.base_dir.join(name),
        }
    }
}

#[async_trait]
impl StorageDestination for AppSpecificStorage {
    async fn create_output(&self, source_temp_file: &Path, name: &str, is_final: bool) -> Result<PathBuf, DomainError> {
        let destination = self.path_for(name);
        ensure_parent(&destination).await?;
        if is_final {
            move_file(source_temp_file, &destination).await?;
            info!(path = %destination.display(), "Saved output");
        }
        Ok(destination)
    }
}

/// Shared media collection an output is published to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveLocation {
    #[default]
    Movies,
    Downloads,
    Pictures,
}

impl SaveLocation {
    pub fn directory_name(self) -> &'static str {
        match self {
            SaveLocation::Movies => "Movies",
            SaveLocation::Downloads => "Downloads",
            SaveLocation::Pictures => "Pictures",
        }
    }
}

/// Working files stay private; the final call publishes into a shared collection
#[derive(Debug, Clone)]
pub struct SharedStorage {
    shared_root: PathBuf,
    working_dir: PathBuf,
    location: SaveLocation,
    sub_folder: Option<String>,
}

impl SharedStorage {
    pub fn new(
        shared_root: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
        location: SaveLocation,
        sub_folder: Option<String>,
    ) -> Self {
        Self {
            shared_root: shared_root.into(),
            working_dir: working_dir.into(),
            location,
            sub_folder,
        }
    }

    fn published_path(&self, name: &str) -> PathBuf {
        let collection = self.shared_root.join(self.location.directory_name());
        match &self.sub_folder {
            Some(sub) => collection.join(sub).join(name),
            None => collection.join(name),
        }
    }
}

#[async_trait]
impl StorageDestination for SharedStorage {
    async fn create_output(&self, source_temp_file: &Path, name: &str, is_final: bool) -> Result<PathBuf, DomainError> {
        if !is_final {
            let working = self.working_dir.join(name);
            ensure_parent(&working).await?;
            return Ok(working);
        }

        let destination = self.published_path(name);
        ensure_parent(&destination).await?;
        fs::copy(source_temp_file, &destination)
            .await
            .map_err(|e| storage_error("publish", &destination, e))?;
        if let Err(err) = fs::remove_file(source_temp_file).await {
            debug!(error = %err, path = %source_temp_file.display(), "Working file already gone");
        }
        info!(path = %destination.display(), location = ?self.location, "Published output");
        Ok(destination)
    }
}

/// Every working call gets a fresh temporary file; the final call keeps it in place
#[derive(Debug, Clone, Default)]
pub struct CacheStorage {
    dir: Option<PathBuf>,
}

impl CacheStorage {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl StorageDestination for CacheStorage {
    async fn create_output(&self, source_temp_file: &Path, name: &str, is_final: bool) -> Result<PathBuf, DomainError> {
        if is_final {
            return Ok(source_temp_file.to_path_buf());
        }

        let named = Path::new(name);
        let prefix = named
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "vidpress".to_string());
        let suffix = named
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        let dir = self.dir.clone().unwrap_or_else(std::env::temp_dir);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| storage_error("create directory", &dir, e))?;

        let file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&suffix)
            .tempfile_in(&dir)
            .map_err(|e| storage_error("create temporary file in", &dir, e))?;
        let (_, path) = file
            .keep()
            .map_err(|e| storage_error("keep temporary file in", &dir, e.error))?;
        debug!(path = %path.display(), "Created cache output");
        Ok(path)
    }
}
