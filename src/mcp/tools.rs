// =============================================================================
// MCP TOOLS
// =============================================================================
//
// Each tool parses its arguments into a typed input, makes one workspace or
// email call, and renders the outcome as a single text block. Failures of the
// underlying call are tool results with `isError`, never JSON-RPC errors;
// only malformed arguments and unknown tool names are protocol errors.

use super::protocol::{JsonRpcError, ToolResult};
use super::server::McpServer;
use crate::core::email::{EmailConfig, EmailOverrides, MailTransport};
use crate::core::workspace::formatting::upload_size;
use crate::core::workspace::workspace_models::{
    CreatedDoc, DownloadedFile, ExportedDoc, PermissionListing, SharedItem,
};
use crate::core::workspace::{
    BatchFile, BatchUploadReport, DocsApi, DriveApi, DriveFile, ExportFormat, ShareRole,
    WorkspaceError,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt::Display;
use std::future::Future;
use std::path::Path;

pub const EMAIL_FAILURE_TEXT: &str = "Failed to send email. Check SMTP settings and ensure they \
     are correctly configured in config.json, environment variables, or provided in the request.";

const BASE64_PREVIEW_CHARS: usize = 100;

// ============================================================================
// INPUTS
// ============================================================================

#[derive(Debug, Deserialize)]
struct CreateFolderInput {
    name: String,
    #[serde(default)]
    parent_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ListFoldersInput {
    #[serde(default)]
    parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadBase64Input {
    name: String,
    mime_type: String,
    base64_content: String,
    #[serde(default)]
    folder_id: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadFromUrlInput {
    name: String,
    mime_type: String,
    url: String,
    #[serde(default)]
    folder_id: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CopyFileInput {
    file_id: String,
    #[serde(default)]
    new_name: Option<String>,
    #[serde(default)]
    destination_folder_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileIdInput {
    file_id: String,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ShareInput {
    file_id: String,
    email_address: String,
    role: String,
    #[serde(default = "default_true")]
    send_notification_email: bool,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateDocInput {
    title: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateDocInput {
    doc_id: String,
    content: String,
    #[serde(default)]
    replace_all: bool,
}

#[derive(Debug, Deserialize)]
struct SearchDocsInput {
    query: String,
}

#[derive(Debug, Deserialize)]
struct DocIdInput {
    doc_id: String,
}

#[derive(Debug, Deserialize)]
struct ExportDocInput {
    doc_id: String,
    format: String,
}

#[derive(Debug, Deserialize)]
struct UploadBatchInput {
    files: Vec<BatchFile>,
    #[serde(default)]
    folder_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendFileEmailInput {
    file_path: String,
    to_email: String,
    subject: String,
    #[serde(default)]
    cc_emails: Option<Vec<String>>,
    #[serde(default)]
    smtp_server: Option<String>,
    #[serde(default)]
    smtp_port: Option<u16>,
    #[serde(default)]
    smtp_user: Option<String>,
    #[serde(default)]
    smtp_password: Option<String>,
    #[serde(default)]
    sender_email: Option<String>,
    #[serde(default = "default_true")]
    include_dummy_stl: bool,
}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, JsonRpcError> {
    serde_json::from_value(arguments)
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid arguments for {}: {}", tool, e)))
}

fn failure(verb: &str, error: impl Display) -> ToolResult {
    tracing::error!("Error {}: {}", verb, error);
    ToolResult::error(format!("Error {}: {}", verb, error))
}

// ============================================================================
// DEFINITIONS
// ============================================================================

fn tool(name: &str, description: &str, properties: Value, required: &[&str]) -> Value {
    json!({
        "name": name,
        "description": description,
        "inputSchema": {
            "type": "object",
            "properties": properties,
            "required": required,
        }
    })
}

/// Schemas advertised by `tools/list`.
pub fn tool_definitions() -> Vec<Value> {
    let formats: Vec<&str> = ExportFormat::ALL.iter().map(|f| f.extension()).collect();
    let roles: Vec<&str> = ShareRole::ALL.iter().map(|r| r.as_str()).collect();

    vec![
        tool(
            "create-folder",
            "Create a new folder in Google Drive",
            json!({
                "name": { "type": "string", "description": "The name of the new folder" },
                "parent_id": { "type": "string", "description": "Optional parent folder ID. If not provided, creates folder in the root" }
            }),
            &["name"],
        ),
        tool(
            "list-folders",
            "List folders in Google Drive",
            json!({
                "parent_id": { "type": "string", "description": "Optional parent folder ID. If not provided, lists folders in the root of My Drive" }
            }),
            &[],
        ),
        tool(
            "upload-file-base64",
            "Upload a base64 encoded file to Google Drive",
            json!({
                "name": { "type": "string", "description": "Filename to use when saving to Drive" },
                "mime_type": { "type": "string", "description": "The MIME type of the file" },
                "base64_content": { "type": "string", "description": "Base64 encoded content of the file" },
                "folder_id": { "type": "string", "description": "Optional folder ID to upload the file to" },
                "description": { "type": "string", "description": "Optional file description" }
            }),
            &["name", "mime_type", "base64_content"],
        ),
        tool(
            "upload-file-from-url",
            "Download a file from a URL and upload it to Google Drive",
            json!({
                "name": { "type": "string", "description": "Filename to use when saving to Drive" },
                "mime_type": { "type": "string", "description": "The MIME type of the file" },
                "url": { "type": "string", "description": "URL of the file to download and upload" },
                "folder_id": { "type": "string", "description": "Optional folder ID to upload the file to" },
                "description": { "type": "string", "description": "Optional file description" }
            }),
            &["name", "mime_type", "url"],
        ),
        tool(
            "copy-file",
            "Copy a file, optionally renaming it or placing it in another folder",
            json!({
                "file_id": { "type": "string", "description": "ID of the file to copy" },
                "new_name": { "type": "string", "description": "Optional new name for the copied file" },
                "destination_folder_id": { "type": "string", "description": "Optional destination folder ID" }
            }),
            &["file_id"],
        ),
        tool(
            "download-file-base64",
            "Download a file from Google Drive as base64",
            json!({
                "file_id": { "type": "string", "description": "The ID of the file to download from Google Drive" }
            }),
            &["file_id"],
        ),
        tool(
            "share-drive-item",
            "Share a file or folder with a user",
            json!({
                "file_id": { "type": "string", "description": "The ID of the file or folder to share" },
                "email_address": { "type": "string", "description": "The email address of the user to share with" },
                "role": { "type": "string", "enum": roles, "description": "The role to grant to the user" },
                "send_notification_email": { "type": "boolean", "default": true, "description": "Whether to send a notification email to the user" },
                "message": { "type": "string", "default": "", "description": "Optional message to include in the notification email" }
            }),
            &["file_id", "email_address", "role"],
        ),
        tool(
            "list-permissions",
            "List who has access to a file or folder",
            json!({
                "file_id": { "type": "string", "description": "The ID of the file or folder to check permissions for" }
            }),
            &["file_id"],
        ),
        tool(
            "create-doc",
            "Create a new Google Doc",
            json!({
                "title": { "type": "string", "description": "The title of the new document" },
                "content": { "type": "string", "default": "", "description": "Optional initial content for the document" }
            }),
            &["title"],
        ),
        tool(
            "update-doc",
            "Append to or replace the content of a Google Doc",
            json!({
                "doc_id": { "type": "string", "description": "The ID of the document to update" },
                "content": { "type": "string", "description": "The content to add to the document" },
                "replace_all": { "type": "boolean", "default": false, "description": "Whether to replace all content (true) or append (false)" }
            }),
            &["doc_id", "content"],
        ),
        tool(
            "search-docs",
            "Full-text search over Google Docs",
            json!({
                "query": { "type": "string", "description": "The search query to find documents" }
            }),
            &["query"],
        ),
        tool(
            "delete-doc",
            "Delete a Google Doc",
            json!({
                "doc_id": { "type": "string", "description": "The ID of the document to delete" }
            }),
            &["doc_id"],
        ),
        tool(
            "export-doc",
            "Export a Google Doc to another format",
            json!({
                "doc_id": { "type": "string", "description": "The ID of the Google Doc to export" },
                "format": { "type": "string", "enum": formats, "description": "The format to export to" }
            }),
            &["doc_id", "format"],
        ),
        tool(
            "upload-batch",
            "Upload several base64 encoded files at once",
            json!({
                "files": {
                    "type": "array",
                    "description": "Array of files to upload",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string", "description": "Filename to use when saving to Drive" },
                            "mime_type": { "type": "string", "description": "The MIME type of the file" },
                            "base64_content": { "type": "string", "description": "Base64 encoded content of the file" }
                        },
                        "required": ["name", "mime_type", "base64_content"]
                    }
                },
                "folder_id": { "type": "string", "description": "Optional folder ID to upload all files to" }
            }),
            &["files"],
        ),
        tool(
            "send-file-email",
            "Email the contents of a local file, optionally with a dummy STL attachment",
            json!({
                "file_path": { "type": "string", "description": "Path to the file whose contents will be included in the email" },
                "to_email": { "type": "string", "description": "Recipient email address" },
                "subject": { "type": "string", "description": "Email subject" },
                "cc_emails": { "type": "array", "items": { "type": "string" }, "description": "Optional list of CC recipient email addresses" },
                "smtp_server": { "type": "string", "description": "SMTP server (or use environment variable)" },
                "smtp_port": { "type": "integer", "description": "SMTP port (or use environment variable)" },
                "smtp_user": { "type": "string", "description": "SMTP username (or use environment variable)" },
                "smtp_password": { "type": "string", "description": "SMTP password (or use environment variable)" },
                "sender_email": { "type": "string", "description": "Sender email address (or use environment variable)" },
                "include_dummy_stl": { "type": "boolean", "default": true, "description": "Whether to include a dummy STL attachment" }
            }),
            &["file_path", "to_email", "subject"],
        ),
    ]
}

// ============================================================================
// TEXT RENDERING
// ============================================================================

fn or_empty(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or_default()
}

pub fn folder_created_text(folder: &DriveFile) -> String {
    format!(
        "Folder created successfully!\nName: {}\nFolder ID: {}\nLink: {}",
        folder.name_str(),
        folder.id_str(),
        or_empty(&folder.web_view_link)
    )
}

pub fn folder_list_text(folders: &[DriveFile]) -> String {
    let mut content = String::from("Google Drive Folders:\n\n");
    if folders.is_empty() {
        content.push_str("No folders found.");
    }
    for folder in folders {
        content.push_str(&format!(
            "Name: {}\nID: {}\nCreated: {}\nLast Modified: {}\n\n",
            folder.name_str(),
            folder.id_str(),
            or_empty(&folder.created_time),
            or_empty(&folder.modified_time)
        ));
    }
    content
}

pub fn uploaded_text(heading: &str, file: &DriveFile) -> String {
    format!(
        "{}\nName: {}\nFile ID: {}\nType: {}\nSize: {}\nLink: {}",
        heading,
        file.name_str(),
        file.id_str(),
        or_empty(&file.mime_type),
        upload_size(file.size_bytes()),
        or_empty(&file.web_view_link)
    )
}

pub fn copied_text(file: &DriveFile) -> String {
    format!(
        "File copied successfully!\nName: {}\nFile ID: {}\nLink: {}",
        file.name_str(),
        file.id_str(),
        or_empty(&file.web_view_link)
    )
}

pub fn download_result(file: &DownloadedFile) -> ToolResult {
    let encoded = BASE64.encode(&file.data);
    let preview: String = encoded.chars().take(BASE64_PREVIEW_CHARS).collect();

    ToolResult::text(format!(
        "File downloaded successfully!\nName: {}\nMIME Type: {}\nSize: {} bytes\nBase64 Content: {}...",
        file.name,
        file.mime_type,
        file.data.len(),
        preview
    ))
    .with_data(
        "fileData",
        json!({
            "name": file.name,
            "mimeType": file.mime_type,
            "base64Content": encoded,
            "size": file.data.len(),
        }),
    )
}

pub fn shared_text(shared: &SharedItem) -> String {
    format!(
        "{} \"{}\" successfully shared with {} as {}.\nPermission ID: {}",
        shared.kind,
        shared.name,
        shared.email_address,
        shared.role,
        or_empty(&shared.permission.id)
    )
}

pub fn permissions_text(listing: &PermissionListing) -> String {
    let mut content = format!(
        "Permissions for {} \"{}\" ({}):\n\n",
        listing.kind, listing.name, listing.file_id
    );
    if listing.permissions.is_empty() {
        content.push_str("No permissions found (other than owner).");
    }
    for permission in &listing.permissions {
        content.push_str(&format!(
            "ID: {}\nType: {}\nRole: {}\n",
            or_empty(&permission.id),
            or_empty(&permission.kind),
            or_empty(&permission.role)
        ));
        if let Some(email) = permission.email_address.as_deref().filter(|v| !v.is_empty()) {
            content.push_str(&format!("Email: {}\n", email));
        }
        if let Some(name) = permission.display_name.as_deref().filter(|v| !v.is_empty()) {
            content.push_str(&format!("Name: {}\n", name));
        }
        if let Some(domain) = permission.domain.as_deref().filter(|v| !v.is_empty()) {
            content.push_str(&format!("Domain: {}\n", domain));
        }
        content.push('\n');
    }
    content
}

pub fn doc_created_text(doc: &CreatedDoc) -> String {
    format!(
        "Document created successfully!\nTitle: {}\nDocument ID: {}\nYou can now reference this document using: googledocs://{}",
        doc.title, doc.document_id, doc.document_id
    )
}

pub fn search_results_text(query: &str, files: &[DriveFile]) -> String {
    let mut content = format!("Search results for \"{}\":\n\n", query);
    if files.is_empty() {
        content.push_str("No documents found matching your query.");
    }
    for file in files {
        content.push_str(&format!(
            "Title: {}\nID: {}\nCreated: {}\nLast Modified: {}\n\n",
            file.name_str(),
            file.id_str(),
            or_empty(&file.created_time),
            or_empty(&file.modified_time)
        ));
    }
    content
}

pub fn export_result(exported: &ExportedDoc) -> ToolResult {
    ToolResult::text(format!(
        "Google Doc successfully exported to {} format.\nOriginal document: {}\nExported as: {}\nSize: {} bytes",
        exported.format.extension().to_uppercase(),
        exported.original_name,
        exported.export_name,
        exported.data.len()
    ))
    .with_data(
        "exportData",
        json!({
            "name": exported.export_name,
            "mimeType": exported.format.mime_type(),
            "base64Content": BASE64.encode(&exported.data),
        }),
    )
}

pub fn batch_result(report: &BatchUploadReport) -> ToolResult {
    let mut content = format!(
        "Batch upload results:\n\nSuccessfully uploaded {} of {} files.\n\n",
        report.successful.len(),
        report.total()
    );
    if !report.successful.is_empty() {
        content.push_str("Successful uploads:\n");
        for upload in &report.successful {
            content.push_str(&format!(
                "- {}: {} ({})\n",
                upload.name,
                upload.id,
                or_empty(&upload.link)
            ));
        }
        content.push('\n');
    }
    if !report.failed.is_empty() {
        content.push_str("Failed uploads:\n");
        for failed in &report.failed {
            content.push_str(&format!("- {}: {}\n", failed.name, failed.error));
        }
    }

    let data = serde_json::to_value(report).unwrap_or_else(|_| json!({}));
    ToolResult::text(content).with_data("uploadResults", data)
}

fn email_sent_text(input: &SendFileEmailInput) -> String {
    let file = Path::new(&input.file_path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| input.file_path.clone());
    format!(
        "Email sent successfully!\n\nTo: {}\nSubject: {}\nFile: {}\nIncluded dummy STL: {}",
        input.to_email,
        input.subject,
        file,
        if input.include_dummy_stl { "Yes" } else { "No" }
    )
}

// ============================================================================
// DISPATCH
// ============================================================================

/// Runs one workspace call and turns its error into an `Error <verb>: ...` result.
async fn guarded<F>(verb: &str, work: F) -> ToolResult
where
    F: Future<Output = Result<ToolResult, WorkspaceError>>,
{
    work.await.unwrap_or_else(|e| failure(verb, e))
}

impl<D, C, T> McpServer<D, C, T>
where
    D: DriveApi,
    C: DocsApi,
    T: MailTransport,
{
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult, JsonRpcError> {
        tracing::info!("Tool call: {}", name);

        let result = match name {
            "create-folder" => {
                let input: CreateFolderInput = parse_args(name, arguments)?;
                guarded("creating folder", async {
                    let folder = self
                        .workspace()?
                        .create_folder(&input.name, input.parent_id.as_deref())
                        .await?;
                    Ok::<_, WorkspaceError>(ToolResult::text(folder_created_text(&folder)))
                })
                .await
            }
            "list-folders" => {
                let input: ListFoldersInput = parse_args(name, arguments)?;
                guarded("listing folders", async {
                    let folders = self
                        .workspace()?
                        .list_folders(input.parent_id.as_deref())
                        .await?;
                    Ok::<_, WorkspaceError>(ToolResult::text(folder_list_text(&folders)))
                })
                .await
            }
            "upload-file-base64" => {
                let input: UploadBase64Input = parse_args(name, arguments)?;
                guarded("uploading file", async {
                    let file = self
                        .workspace()?
                        .upload_base64(
                            &input.name,
                            &input.mime_type,
                            &input.base64_content,
                            input.folder_id.as_deref(),
                            input.description.as_deref(),
                        )
                        .await?;
                    Ok::<_, WorkspaceError>(ToolResult::text(uploaded_text(
                        "File uploaded successfully!",
                        &file,
                    )))
                })
                .await
            }
            "upload-file-from-url" => {
                let input: UploadFromUrlInput = parse_args(name, arguments)?;
                guarded("uploading file from URL", async {
                    let file = self
                        .workspace()?
                        .upload_from_url(
                            &input.name,
                            &input.mime_type,
                            &input.url,
                            input.folder_id.as_deref(),
                            input.description.as_deref(),
                        )
                        .await?;
                    Ok::<_, WorkspaceError>(ToolResult::text(uploaded_text(
                        "File uploaded successfully from URL!",
                        &file,
                    )))
                })
                .await
            }
            "copy-file" => {
                let input: CopyFileInput = parse_args(name, arguments)?;
                guarded("copying file", async {
                    let file = self
                        .workspace()?
                        .copy_file(
                            &input.file_id,
                            input.new_name.as_deref(),
                            input.destination_folder_id.as_deref(),
                        )
                        .await?;
                    Ok::<_, WorkspaceError>(ToolResult::text(copied_text(&file)))
                })
                .await
            }
            "download-file-base64" => {
                let input: FileIdInput = parse_args(name, arguments)?;
                guarded("downloading file", async {
                    let file = self.workspace()?.download_file(&input.file_id).await?;
                    Ok::<_, WorkspaceError>(download_result(&file))
                })
                .await
            }
            "share-drive-item" => {
                let input: ShareInput = parse_args(name, arguments)?;
                let role: ShareRole = input.role.parse().map_err(JsonRpcError::invalid_params)?;
                guarded("sharing file", async {
                    let shared = self
                        .workspace()?
                        .share_item(
                            &input.file_id,
                            &input.email_address,
                            role,
                            input.send_notification_email,
                            input.message.as_deref(),
                        )
                        .await?;
                    Ok::<_, WorkspaceError>(ToolResult::text(shared_text(&shared)))
                })
                .await
            }
            "list-permissions" => {
                let input: FileIdInput = parse_args(name, arguments)?;
                guarded("listing permissions", async {
                    let listing = self.workspace()?.list_permissions(&input.file_id).await?;
                    Ok::<_, WorkspaceError>(ToolResult::text(permissions_text(&listing)))
                })
                .await
            }
            "create-doc" => {
                let input: CreateDocInput = parse_args(name, arguments)?;
                guarded("creating document", async {
                    let doc = self
                        .workspace()?
                        .create_doc(&input.title, input.content.as_deref())
                        .await?;
                    Ok::<_, WorkspaceError>(ToolResult::text(doc_created_text(&doc)))
                })
                .await
            }
            "update-doc" => {
                let input: UpdateDocInput = parse_args(name, arguments)?;
                guarded("updating document", async {
                    self.workspace()?
                        .update_doc(&input.doc_id, &input.content, input.replace_all)
                        .await?;
                    Ok::<_, WorkspaceError>(ToolResult::text(format!(
                        "Document updated successfully!\nDocument ID: {}",
                        input.doc_id
                    )))
                })
                .await
            }
            "search-docs" => {
                let input: SearchDocsInput = parse_args(name, arguments)?;
                guarded("searching documents", async {
                    let files = self.workspace()?.search_docs(&input.query).await?;
                    Ok::<_, WorkspaceError>(ToolResult::text(search_results_text(
                        &input.query,
                        &files,
                    )))
                })
                .await
            }
            "delete-doc" => {
                let input: DocIdInput = parse_args(name, arguments)?;
                guarded("deleting document", async {
                    let title = self.workspace()?.delete_doc(&input.doc_id).await?;
                    Ok::<_, WorkspaceError>(ToolResult::text(format!(
                        "Document \"{}\" (ID: {}) has been successfully deleted.",
                        title, input.doc_id
                    )))
                })
                .await
            }
            "export-doc" => {
                let input: ExportDocInput = parse_args(name, arguments)?;
                let format: ExportFormat =
                    input.format.parse().map_err(JsonRpcError::invalid_params)?;
                guarded("exporting document", async {
                    let exported = self.workspace()?.export_doc(&input.doc_id, format).await?;
                    Ok::<_, WorkspaceError>(export_result(&exported))
                })
                .await
            }
            "upload-batch" => {
                let input: UploadBatchInput = parse_args(name, arguments)?;
                guarded("in batch upload", async {
                    let report = self
                        .workspace()?
                        .upload_batch(&input.files, input.folder_id.as_deref())
                        .await;
                    Ok::<_, WorkspaceError>(batch_result(&report))
                })
                .await
            }
            "send-file-email" => {
                let input: SendFileEmailInput = parse_args(name, arguments)?;
                self.send_file_email(&input).await
            }
            _ => {
                return Err(JsonRpcError::invalid_params(format!(
                    "Unknown tool: {}",
                    name
                )))
            }
        };

        Ok(result)
    }

    async fn send_file_email(&self, input: &SendFileEmailInput) -> ToolResult {
        if !Path::new(&input.file_path).exists() {
            return failure("sending email", format!("File not found: {}", input.file_path));
        }

        let overrides = EmailOverrides {
            smtp_server: input.smtp_server.clone(),
            smtp_port: input.smtp_port,
            smtp_user: input.smtp_user.clone(),
            smtp_password: input.smtp_password.clone(),
            use_tls: None,
            sender_email: input.sender_email.clone(),
        };
        let config = EmailConfig::from_file_and_env(&overrides, &self.email_file);
        let cc = input.cc_emails.clone().unwrap_or_default();

        let sent = self
            .email
            .send_file_content_email(
                &config,
                &input.to_email,
                &input.subject,
                &input.file_path,
                &cc,
                input.include_dummy_stl,
            )
            .await;

        if sent {
            ToolResult::text(email_sent_text(input))
        } else {
            ToolResult::error(EMAIL_FAILURE_TEXT)
        }
    }
}
