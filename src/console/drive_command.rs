// `drive-test`: exercises the Drive client end to end from the terminal.
//
// The folder created here is the anchor for the later steps; sharing and
// listing are skipped when no folder was created in the same run.

use crate::core::workspace::{DocsApi, DriveApi, ShareRole, WorkspaceService};
use clap::{Args, ValueEnum};
use std::path::{Path, PathBuf};

pub const TEST_FOLDER_NAME: &str = "MCP Test Folder drive-test";
pub const DEFAULT_TEST_FILE: &str = "mcp_test/test4/test4.txt";
const SEPARATOR: &str = "--------------------------------------------------";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DriveOperation {
    CreateFolder,
    Upload,
    Share,
    List,
    All,
}

#[derive(Debug, Args)]
pub struct DriveArgs {
    /// File to upload (defaults to mcp_test/test4/test4.txt)
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Address to share the test folder with
    #[arg(short, long)]
    pub email: Option<String>,

    #[arg(short, long, value_enum, default_value_t = DriveOperation::All)]
    pub operation: DriveOperation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveStep {
    CreateFolder,
    Upload(PathBuf),
    Share(String),
    List,
}

fn wants(operation: DriveOperation, step: DriveOperation) -> bool {
    operation == step || operation == DriveOperation::All
}

/// Steps to run, in order. Share and list depend on the folder step.
pub fn plan(args: &DriveArgs, default_file: &Path) -> Vec<DriveStep> {
    let op = args.operation;
    let mut steps = Vec::new();
    if wants(op, DriveOperation::CreateFolder) {
        steps.push(DriveStep::CreateFolder);
    }
    if wants(op, DriveOperation::Upload) {
        let file = args.file.clone().unwrap_or_else(|| default_file.to_path_buf());
        steps.push(DriveStep::Upload(file));
    }
    if wants(op, DriveOperation::Share) {
        if let Some(email) = &args.email {
            steps.push(DriveStep::Share(email.clone()));
        }
    }
    if wants(op, DriveOperation::List) {
        steps.push(DriveStep::List);
    }
    steps
}

/// Returns the process exit code.
pub async fn run_drive_test<D: DriveApi, C: DocsApi>(
    args: &DriveArgs,
    workspace: &WorkspaceService<D, C>,
) -> i32 {
    let steps = plan(args, Path::new(DEFAULT_TEST_FILE));
    for step in &steps {
        if let DriveStep::Upload(path) = step {
            if !path.exists() {
                println!("Test file not found: {}", path.display());
                return 1;
            }
        }
    }

    let mut folder_id: Option<String> = None;
    for step in steps {
        let outcome = match step {
            DriveStep::CreateFolder => {
                println!("Creating folder: {}", TEST_FOLDER_NAME);
                workspace
                    .create_folder(TEST_FOLDER_NAME, None)
                    .await
                    .map(|folder| {
                        println!("Folder created successfully!");
                        println!("Folder ID: {}", folder.id_str());
                        println!("Web link: {}", folder.web_view_link.as_deref().unwrap_or_default());
                        folder_id = folder.id;
                    })
            }
            DriveStep::Upload(path) => {
                println!("Uploading file: {}", path.display());
                if let Some(id) = &folder_id {
                    println!("Target folder ID: {}", id);
                }
                workspace
                    .upload_local_file(&path, folder_id.as_deref())
                    .await
                    .map(|file| {
                        println!("Upload successful!");
                        println!("File ID: {}", file.id_str());
                        println!("File name: {}", file.name_str());
                        println!("Web link: {}", file.web_view_link.as_deref().unwrap_or_default());
                    })
            }
            DriveStep::Share(email) => {
                let Some(id) = folder_id.as_deref() else {
                    println!("No folder created in this run; skipping share");
                    continue;
                };
                println!("Sharing item {} with {} as writer", id, email);
                workspace
                    .share_item(id, &email, ShareRole::Writer, true, None)
                    .await
                    .map(|shared| {
                        println!("Sharing {}: {}", shared.kind, shared.name);
                        println!(
                            "Successfully shared with {} as {}",
                            shared.email_address, shared.role
                        );
                        println!(
                            "Permission ID: {}",
                            shared.permission.id.as_deref().unwrap_or_default()
                        );
                    })
            }
            DriveStep::List => {
                let Some(id) = folder_id.as_deref() else {
                    println!("No folder created in this run; skipping list");
                    continue;
                };
                println!("Listing files in folder: {}", id);
                workspace.list_drive_files(Some(id), None, None).await.map(|files| {
                    if files.is_empty() {
                        println!("No files found.");
                    } else {
                        println!("Found {} files:", files.len());
                    }
                    for file in &files {
                        println!("  - {}: {} (ID: {})", file.kind(), file.name_str(), file.id_str());
                        if let Some(link) = &file.web_view_link {
                            println!("    Link: {}", link);
                        }
                    }
                })
            }
        };

        if let Err(e) = outcome {
            tracing::error!("drive-test step failed: {}", e);
            println!("Error: {}", e);
            return 1;
        }
        println!("\n{}\n", SEPARATOR);
    }
    0
}
