// MCP resources: read-only views over Docs and Drive addressed by URI.

use super::protocol::{text_contents, JsonRpcError};
use super::server::McpServer;
use crate::core::email::MailTransport;
use crate::core::workspace::formatting::listing_size;
use crate::core::workspace::{DocsApi, DriveApi, DriveFile};
use serde_json::{json, Value};

const DOCS_SCHEME: &str = "googledocs://";
const DRIVE_SCHEME: &str = "googledrive://";

/// A parsed resource URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceUri {
    /// `googledocs://list`
    DocList,
    /// `googledocs://{doc_id}`
    Doc(String),
    /// `googledrive://files{/folder_id}{?query,mimetype}`
    Files {
        folder_id: Option<String>,
        query: Option<String>,
        mime_type: Option<String>,
    },
    /// `googledrive://file/{file_id}`
    File(String),
}

impl ResourceUri {
    pub fn parse(uri: &str) -> Option<Self> {
        if let Some(rest) = uri.strip_prefix(DOCS_SCHEME) {
            return match rest {
                "" => None,
                "list" => Some(ResourceUri::DocList),
                id if id.contains('/') => None,
                id => Some(ResourceUri::Doc(id.to_string())),
            };
        }

        let rest = uri.strip_prefix(DRIVE_SCHEME)?;
        if let Some(id) = rest.strip_prefix("file/") {
            return (!id.is_empty() && !id.contains('/')).then(|| ResourceUri::File(id.to_string()));
        }

        let rest = rest.strip_prefix("files")?;
        let (path, query_string) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (rest, None),
        };
        let folder_id = match path {
            "" | "/" => None,
            p => {
                let id = p.strip_prefix('/')?;
                if id.contains('/') {
                    return None;
                }
                Some(id.to_string())
            }
        };

        let mut query = None;
        let mut mime_type = None;
        for (key, value) in url::form_urlencoded::parse(query_string.unwrap_or("").as_bytes()) {
            let value = (!value.is_empty()).then(|| value.to_string());
            match key.as_ref() {
                "query" => query = value,
                "mimetype" => mime_type = value,
                _ => {}
            }
        }

        Some(ResourceUri::Files {
            folder_id,
            query,
            mime_type,
        })
    }
}

pub fn resource_list() -> Value {
    json!({
        "resources": [{
            "uri": "googledocs://list",
            "name": "list-docs",
            "description": "All Google Docs in your Drive",
            "mimeType": "text/plain"
        }]
    })
}

pub fn resource_templates() -> Value {
    json!({
        "resourceTemplates": [
            {
                "uriTemplate": "googledocs://{doc_id}",
                "name": "get-doc",
                "description": "Text content of a Google Doc",
                "mimeType": "text/plain"
            },
            {
                "uriTemplate": "googledrive://files{/folder_id}{?query,mimetype}",
                "name": "list-drive-files",
                "description": "Files in Google Drive, optionally filtered by folder, name and MIME type",
                "mimeType": "text/plain"
            },
            {
                "uriTemplate": "googledrive://file/{file_id}",
                "name": "get-drive-file",
                "description": "Metadata of a single Drive file",
                "mimeType": "text/plain"
            }
        ]
    })
}

// ============================================================================
// TEXT RENDERING
// ============================================================================

fn or_empty(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or_default()
}

fn person(user: &crate::core::workspace::workspace_models::DriveUser) -> String {
    format!(
        "{} ({})",
        or_empty(&user.display_name),
        or_empty(&user.email_address)
    )
}

pub fn doc_list_text(files: &[DriveFile]) -> String {
    let mut content = String::from("Google Docs in your Drive:\n\n");
    if files.is_empty() {
        content.push_str("No Google Docs found.");
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

pub fn file_list_text(files: &[DriveFile]) -> String {
    let mut content = String::from("Google Drive Files:\n\n");
    if files.is_empty() {
        content.push_str("No files found.");
    }
    for file in files {
        content.push_str(&format!(
            "Name: {}\nID: {}\nType: {}\n",
            file.name_str(),
            file.id_str(),
            or_empty(&file.mime_type)
        ));
        if let Some(size) = file.size_bytes() {
            content.push_str(&format!("Size: {}\n", listing_size(size)));
        }
        content.push_str(&format!(
            "Created: {}\nModified: {}\n",
            or_empty(&file.created_time),
            or_empty(&file.modified_time)
        ));
        if let Some(link) = &file.web_view_link {
            content.push_str(&format!("Link: {}\n", link));
        }
        content.push('\n');
    }
    content
}

pub fn file_details_text(file: &DriveFile) -> String {
    let mut content = format!(
        "File Details:\n\nName: {}\nID: {}\nType: {}\n",
        file.name_str(),
        file.id_str(),
        or_empty(&file.mime_type)
    );
    if let Some(size) = file.size_bytes() {
        content.push_str(&format!("Size: {}\n", listing_size(size)));
    }
    if let Some(description) = file.description.as_deref().filter(|d| !d.is_empty()) {
        content.push_str(&format!("Description: {}\n", description));
    }
    content.push_str(&format!(
        "Created: {}\nModified: {}\n",
        or_empty(&file.created_time),
        or_empty(&file.modified_time)
    ));
    if file.shared == Some(true) {
        content.push_str("Shared: Yes\n");
    }
    if let Some(owner) = file.owners.first() {
        content.push_str(&format!("Owner: {}\n", person(owner)));
    }
    if let Some(user) = &file.last_modifying_user {
        content.push_str(&format!("Last Modified By: {}\n", person(user)));
    }
    if let Some(link) = &file.web_view_link {
        content.push_str(&format!("Web Link: {}\n", link));
    }
    if file.thumbnail_link.is_some() {
        content.push_str("Thumbnail Available: Yes\n");
    }
    if file.is_google_doc() {
        content.push_str(&format!(
            "\nThis is a Google Document. You can view its content using googledocs://{}\n",
            file.id_str()
        ));
    }
    content
}

// ============================================================================
// READ
// ============================================================================

impl<D, C, T> McpServer<D, C, T>
where
    D: DriveApi,
    C: DocsApi,
    T: MailTransport,
{
    /// Read failures are reported inside the contents, as text.
    pub async fn read_resource(&self, uri: &str) -> Result<Value, JsonRpcError> {
        let parsed = ResourceUri::parse(uri)
            .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown resource URI: {}", uri)))?;
        tracing::info!("Reading resource {}", uri);

        let text = match parsed {
            ResourceUri::DocList => {
                let listed = match self.workspace() {
                    Ok(ws) => ws.list_docs().await,
                    Err(e) => Err(e),
                };
                listed
                    .map(|files| doc_list_text(&files))
                    .unwrap_or_else(|e| {
                        tracing::error!("Error listing documents: {}", e);
                        format!("Error listing documents: {}", e)
                    })
            }
            ResourceUri::Doc(doc_id) => {
                let fetched = match self.workspace() {
                    Ok(ws) => ws.get_doc_text(&doc_id).await,
                    Err(e) => Err(e),
                };
                fetched
                    .map(|doc| format!("Document: {}\n\n{}", doc.title, doc.text))
                    .unwrap_or_else(|e| {
                        tracing::error!("Error getting document {}: {}", doc_id, e);
                        format!("Error getting document {}: {}", doc_id, e)
                    })
            }
            ResourceUri::Files {
                folder_id,
                query,
                mime_type,
            } => {
                let listed = match self.workspace() {
                    Ok(ws) => {
                        ws.list_drive_files(
                            folder_id.as_deref(),
                            query.as_deref(),
                            mime_type.as_deref(),
                        )
                        .await
                    }
                    Err(e) => Err(e),
                };
                listed
                    .map(|files| file_list_text(&files))
                    .unwrap_or_else(|e| {
                        tracing::error!("Error listing files: {}", e);
                        format!("Error listing files: {}", e)
                    })
            }
            ResourceUri::File(file_id) => {
                let fetched = match self.workspace() {
                    Ok(ws) => ws.get_file_details(&file_id).await,
                    Err(e) => Err(e),
                };
                fetched
                    .map(|file| file_details_text(&file))
                    .unwrap_or_else(|e| {
                        tracing::error!("Error getting file {}: {}", file_id, e);
                        format!("Error getting file {}: {}", file_id, e)
                    })
            }
        };

        Ok(text_contents(uri, &text))
    }
}
