pub mod formatting;
pub mod workspace_models;
pub mod workspace_service;

pub use workspace_models::{BatchFile, BatchUploadReport, DriveFile, ExportFormat, ShareRole};
pub use workspace_service::{DocsApi, DriveApi, RemoteFetcher, WorkspaceError, WorkspaceService};
