pub mod file_artifact_store;

pub use file_artifact_store::{FileArtifactStore, DEFAULT_EXPORT_DIR, DEFAULT_PROPOSAL_PATH};
