//! On-disk screenshot store
//!
//! Screenshots are written as `<root>/<job-id>/<seq>.png`. Artifacts only
//! carry the file name, which is validated before any read so a reference
//! can never escape its job directory.

use crate::state::JobId;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScreenshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid screenshot reference: {0}")]
    InvalidReference(String),
}

/// Where a saved screenshot landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedScreenshot {
    /// File name relative to the job directory
    pub reference: String,
    /// Hex SHA-256 of the PNG bytes
    pub sha256: String,
}

#[derive(Debug, Clone)]
pub struct ScreenshotStore {
    root: PathBuf,
}

impl ScreenshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn job_dir(&self, job_id: JobId) -> PathBuf {
        self.root.join(job_id.to_string())
    }

    /// Writes the `seq`-th screenshot of a job
    pub async fn save(
        &self,
        job_id: JobId,
        seq: u64,
        bytes: &[u8],
    ) -> Result<SavedScreenshot, ScreenshotError> {
        let dir = self.job_dir(job_id);
        tokio::fs::create_dir_all(&dir).await?;

        let reference = format!("{:06}.png", seq);
        tokio::fs::write(dir.join(&reference), bytes).await?;

        Ok(SavedScreenshot {
            reference,
            sha256: hex::encode(Sha256::digest(bytes)),
        })
    }

    /// Reads a screenshot back
    ///
    /// # Returns
    ///
    /// * `Ok(Some(bytes))` - The screenshot exists
    /// * `Ok(None)` - No such screenshot
    /// * `Err(ScreenshotError::InvalidReference)` - The reference is not a plain file name
    pub async fn load(
        &self,
        job_id: JobId,
        reference: &str,
    ) -> Result<Option<Vec<u8>>, ScreenshotError> {
        validate_reference(reference)?;

        match tokio::fs::read(self.job_dir(job_id).join(reference)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn validate_reference(reference: &str) -> Result<(), ScreenshotError> {
    let valid = !reference.is_empty()
        && reference.ends_with(".png")
        && reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
        && !reference.contains("..");

    if valid {
        Ok(())
    } else {
        Err(ScreenshotError::InvalidReference(reference.to_string()))
    }
}
