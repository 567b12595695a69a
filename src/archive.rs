use crate::imaging::NormalizedImage;
use crate::llm::ListingMetadata;
use std::{io, path::PathBuf};
use tokio::fs;

/// On-disk dump of a processed batch: `batch_{id}/photo_{n}.jpg` plus `metadata.json`.
/// Nothing reads these back.
#[derive(Debug, Clone)]
pub struct BatchArchive {
    root: PathBuf,
}

impl BatchArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_env() -> Option<Self> {
        std::env::var("UPLOAD_FOLDER")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(Self::new)
    }

    pub async fn store(
        &self,
        batch_id: &str,
        images: &[NormalizedImage],
        metadata: &ListingMetadata,
    ) -> io::Result<PathBuf> {
        let dir = self.root.join(format!("batch_{batch_id}"));
        fs::create_dir_all(&dir).await?;
        for (idx, image) in images.iter().enumerate() {
            fs::write(dir.join(format!("photo_{}.jpg", idx + 1)), &image.bytes).await?;
        }
        let json = serde_json::to_vec_pretty(metadata).map_err(io::Error::other)?;
        fs::write(dir.join("metadata.json"), json).await?;
        Ok(dir)
    }
}
