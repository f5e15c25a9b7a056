//! Image blob storage

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::AsyncWriteExt;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;

/// Where an uploaded image lives and who owns it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub laptop_id: String,
    pub image_type: String,
    pub path: PathBuf,
}

/// Persistent storage for laptop images
#[async_trait]
pub trait ImageStore: Send + Sync + 'static {
    /// Persist `data` for `laptop_id` and return the generated image id
    ///
    /// A write failing partway leaves the partial file behind.
    async fn save(&self, laptop_id: &str, image_type: &str, data: &[u8]) -> Result<String>;

    /// Metadata of a stored image
    async fn find(&self, image_id: &str) -> Option<ImageInfo>;
}

/// Image store writing each image to `<dir>/<image id><image type>`
#[derive(Debug)]
pub struct DiskImageStore {
    image_dir: PathBuf,
    images: DashMap<String, ImageInfo>,
}

impl DiskImageStore {
    /// Create the store, creating `image_dir` if it does not exist
    pub async fn new(image_dir: impl Into<PathBuf>) -> Result<Self> {
        let image_dir = image_dir.into();
        tokio::fs::create_dir_all(&image_dir).await?;

        Ok(Self {
            image_dir,
            images: DashMap::new(),
        })
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }
}

#[async_trait]
impl ImageStore for DiskImageStore {
    async fn save(&self, laptop_id: &str, image_type: &str, data: &[u8]) -> Result<String> {
        let image_id = Uuid::new_v4().to_string();
        let path = self.image_dir.join(format!("{}{}", image_id, image_type));

        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(data).await?;
        file.flush().await?;

        info!(
            image_id = %image_id,
            laptop_id,
            size = data.len(),
            path = %path.display(),
            "Image saved"
        );

        self.images.insert(
            image_id.clone(),
            ImageInfo {
                laptop_id: laptop_id.to_string(),
                image_type: image_type.to_string(),
                path,
            },
        );

        Ok(image_id)
    }

    async fn find(&self, image_id: &str) -> Option<ImageInfo> {
        self.images.get(image_id).map(|info| info.clone())
    }
}
