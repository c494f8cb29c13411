use crate::core::pipeline::{ArtifactStore, PipelineError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub const DEFAULT_EXPORT_DIR: &str = "model_exports";
pub const DEFAULT_PROPOSAL_PATH: &str = "proposal.md";

/// Writes pipeline artifacts to the local filesystem.
pub struct FileArtifactStore {
    export_dir: PathBuf,
    proposal_path: PathBuf,
}

impl FileArtifactStore {
    pub fn new(export_dir: impl Into<PathBuf>, proposal_path: impl Into<PathBuf>) -> Self {
        Self {
            export_dir: export_dir.into(),
            proposal_path: proposal_path.into(),
        }
    }
}

fn storage_err(path: &Path, e: std::io::Error) -> PipelineError {
    PipelineError::Storage(path.display().to_string(), e.to_string())
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
    async fn write_artifact(&self, filename: &str, data: &[u8]) -> Result<PathBuf, PipelineError> {
        // Only the final component is kept so a model-supplied name cannot escape the directory.
        let name = Path::new(filename)
            .file_name()
            .ok_or_else(|| PipelineError::InvalidArtifact(format!("Bad filename: {}", filename)))?;

        tokio::fs::create_dir_all(&self.export_dir)
            .await
            .map_err(|e| storage_err(&self.export_dir, e))?;

        let path = self.export_dir.join(name);
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| storage_err(&path, e))?;
        tracing::info!("Saved {} ({} bytes)", path.display(), data.len());
        Ok(path)
    }

    async fn write_proposal(&self, markdown: &str) -> Result<PathBuf, PipelineError> {
        if let Some(parent) = self.proposal_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_err(parent, e))?;
        }
        tokio::fs::write(&self.proposal_path, markdown)
            .await
            .map_err(|e| storage_err(&self.proposal_path, e))?;
        tracing::info!("Design proposal saved to {}", self.proposal_path.display());
        Ok(self.proposal_path.clone())
    }

    async fn clear_proposal(&self) -> Result<bool, PipelineError> {
        match tokio::fs::remove_file(&self.proposal_path).await {
            Ok(()) => {
                tracing::info!("Removed {}", self.proposal_path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(storage_err(&self.proposal_path, e)),
        }
    }
}
