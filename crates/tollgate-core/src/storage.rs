use crate::error::TollgateError;
use crate::llm::ImageBlob;
use std::path::PathBuf;

/// Where generated images are kept.
#[async_trait::async_trait]
pub trait ContentStore: Send + Sync {
    /// Persist an image and return its handle.
    async fn save_image(&self, image: &ImageBlob) -> Result<PathBuf, TollgateError>;
}

/// Saves images as `<uuid>.<ext>` files inside one directory.
pub struct FsContentStore {
    dir: PathBuf,
}

impl FsContentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }
}

#[async_trait::async_trait]
impl ContentStore for FsContentStore {
    async fn save_image(&self, image: &ImageBlob) -> Result<PathBuf, TollgateError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            TollgateError::Storage(format!("Failed to create {}: {e}", self.dir.display()))
        })?;
        let path = self
            .dir
            .join(format!("{}.{}", uuid::Uuid::new_v4(), image.extension()));
        tokio::fs::write(&path, &image.bytes).await.map_err(|e| {
            TollgateError::Storage(format!("Failed to write {}: {e}", path.display()))
        })?;
        tracing::info!("Saved generated image to {}", path.display());
        Ok(path)
    }
}
