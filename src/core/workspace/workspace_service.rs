use super::formatting::{build_files_query, escape_query_value, infer_mime_type};
use super::workspace_models::*;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::path::Path;
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// A Google API call failed; the message carries status and body.
    #[error("{0}")]
    Api(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Invalid base64 content: {0}")]
    Decode(String),

    #[error("Failed to fetch file from URL: {0}")]
    Fetch(String),

    #[error("The provided ID is not a Google Doc")]
    NotAGoogleDoc,

    #[error("Failed to read local file {0}: {1}")]
    LocalFile(String, String),
}

// ============================================================================
// API TRAITS
// ============================================================================
// The service only sees these traits. The REST clients in infra implement
// them; the tests below implement them in memory.

/// The subset of the Drive v3 API this server uses.
#[async_trait]
pub trait DriveApi: Send + Sync {
    async fn list_files(
        &self,
        query: Option<&str>,
        fields: &str,
        page_size: u32,
    ) -> Result<Vec<DriveFile>, WorkspaceError>;

    async fn get_file(&self, file_id: &str, fields: &str) -> Result<DriveFile, WorkspaceError>;

    async fn create_file(
        &self,
        metadata: &NewFile,
        media: Option<MediaUpload>,
        fields: &str,
    ) -> Result<DriveFile, WorkspaceError>;

    async fn copy_file(
        &self,
        file_id: &str,
        new_name: Option<&str>,
        fields: &str,
    ) -> Result<DriveFile, WorkspaceError>;

    async fn move_file(
        &self,
        file_id: &str,
        add_parents: &str,
        remove_parents: &str,
        fields: &str,
    ) -> Result<DriveFile, WorkspaceError>;

    async fn delete_file(&self, file_id: &str) -> Result<(), WorkspaceError>;

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, WorkspaceError>;

    async fn export_file(&self, file_id: &str, mime_type: &str)
        -> Result<Vec<u8>, WorkspaceError>;

    async fn create_permission(
        &self,
        file_id: &str,
        permission: &NewPermission,
        send_notification_email: bool,
        email_message: Option<&str>,
    ) -> Result<Permission, WorkspaceError>;

    async fn list_permissions(&self, file_id: &str) -> Result<Vec<Permission>, WorkspaceError>;
}

/// The subset of the Docs v1 API this server uses.
#[async_trait]
pub trait DocsApi: Send + Sync {
    async fn get_document(&self, doc_id: &str) -> Result<Document, WorkspaceError>;

    async fn create_document(&self, title: &str) -> Result<Document, WorkspaceError>;

    async fn batch_update(&self, doc_id: &str, requests: &[DocsRequest])
        -> Result<(), WorkspaceError>;
}

/// Downloads bytes from an arbitrary URL for `upload_from_url`.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, WorkspaceError>;
}

// ============================================================================
// FIELD PROJECTIONS
// ============================================================================

const DOC_LIST_FIELDS: &str = "files(id, name, createdTime, modifiedTime)";
const FILE_LIST_FIELDS: &str =
    "files(id, name, mimeType, createdTime, modifiedTime, size, webViewLink, parents)";
const FILE_DETAIL_FIELDS: &str = "id, name, mimeType, createdTime, modifiedTime, size, description, webViewLink, iconLink, thumbnailLink, parents, shared, owners, lastModifyingUser";
const UPLOAD_FIELDS: &str = "id, name, webViewLink, mimeType, size";
const NAME_AND_TYPE_FIELDS: &str = "name,mimeType";

const LIST_PAGE_SIZE: u32 = 50;
const SEARCH_PAGE_SIZE: u32 = 10;

// ============================================================================
// WORKSPACE SERVICE
// ============================================================================

pub struct WorkspaceService<D: DriveApi, C: DocsApi> {
    drive: D,
    docs: C,
    fetcher: Box<dyn RemoteFetcher>,
}

impl<D: DriveApi, C: DocsApi> WorkspaceService<D, C> {
    pub fn new(drive: D, docs: C, fetcher: Box<dyn RemoteFetcher>) -> Self {
        Self {
            drive,
            docs,
            fetcher,
        }
    }

    // ------------------------------------------------------------------------
    // Browsing
    // ------------------------------------------------------------------------

    pub async fn list_docs(&self) -> Result<Vec<DriveFile>, WorkspaceError> {
        let query = format!("mimeType='{}'", DOCUMENT_MIME_TYPE);
        self.drive
            .list_files(Some(&query), DOC_LIST_FIELDS, LIST_PAGE_SIZE)
            .await
    }

    pub async fn get_doc_text(&self, doc_id: &str) -> Result<DocText, WorkspaceError> {
        let doc = self.docs.get_document(doc_id).await?;
        Ok(DocText {
            text: doc.text(),
            title: doc.title,
        })
    }

    pub async fn list_drive_files(
        &self,
        folder_id: Option<&str>,
        query: Option<&str>,
        mime_type: Option<&str>,
    ) -> Result<Vec<DriveFile>, WorkspaceError> {
        let q = build_files_query(folder_id, mime_type, query);
        self.drive
            .list_files(q.as_deref(), FILE_LIST_FIELDS, LIST_PAGE_SIZE)
            .await
    }

    pub async fn get_file_details(&self, file_id: &str) -> Result<DriveFile, WorkspaceError> {
        self.drive.get_file(file_id, FILE_DETAIL_FIELDS).await
    }

    // ------------------------------------------------------------------------
    // Folders
    // ------------------------------------------------------------------------

    pub async fn create_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<DriveFile, WorkspaceError> {
        let metadata = NewFile {
            name: name.to_string(),
            mime_type: Some(FOLDER_MIME_TYPE.to_string()),
            parents: parent_id.map(|p| vec![p.to_string()]).unwrap_or_default(),
            description: None,
        };

        let folder = self
            .drive
            .create_file(&metadata, None, "id, name, webViewLink")
            .await?;
        tracing::info!("Created folder {} ({})", name, folder.id_str());
        Ok(folder)
    }

    pub async fn list_folders(
        &self,
        parent_id: Option<&str>,
    ) -> Result<Vec<DriveFile>, WorkspaceError> {
        let mut query = format!("mimeType='{}'", FOLDER_MIME_TYPE);
        if let Some(parent) = parent_id.filter(|p| !p.is_empty()) {
            query.push_str(&format!(" and '{}' in parents", escape_query_value(parent)));
        }

        self.drive
            .list_files(Some(&query), DOC_LIST_FIELDS, LIST_PAGE_SIZE)
            .await
    }

    // ------------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------------

    pub async fn upload_base64(
        &self,
        name: &str,
        mime_type: &str,
        base64_content: &str,
        folder_id: Option<&str>,
        description: Option<&str>,
    ) -> Result<DriveFile, WorkspaceError> {
        let data = decode_base64(base64_content)?;
        self.upload_bytes(name, mime_type, data, folder_id, description, UPLOAD_FIELDS)
            .await
    }

    pub async fn upload_from_url(
        &self,
        name: &str,
        mime_type: &str,
        url: &str,
        folder_id: Option<&str>,
        description: Option<&str>,
    ) -> Result<DriveFile, WorkspaceError> {
        let data = self.fetcher.fetch(url).await?;
        tracing::debug!("Fetched {} bytes from {}", data.len(), url);
        self.upload_bytes(name, mime_type, data, folder_id, description, UPLOAD_FIELDS)
            .await
    }

    /// Uploads a local file, guessing its MIME type from the extension.
    pub async fn upload_local_file(
        &self,
        path: &Path,
        folder_id: Option<&str>,
    ) -> Result<DriveFile, WorkspaceError> {
        let data = tokio::fs::read(path).await.map_err(|e| {
            WorkspaceError::LocalFile(path.display().to_string(), e.to_string())
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        self.upload_bytes(
            &name,
            infer_mime_type(path),
            data,
            folder_id,
            None,
            UPLOAD_FIELDS,
        )
        .await
    }

    async fn upload_bytes(
        &self,
        name: &str,
        mime_type: &str,
        data: Vec<u8>,
        folder_id: Option<&str>,
        description: Option<&str>,
        fields: &str,
    ) -> Result<DriveFile, WorkspaceError> {
        let metadata = NewFile {
            name: name.to_string(),
            mime_type: None,
            parents: folder_id
                .filter(|f| !f.is_empty())
                .map(|f| vec![f.to_string()])
                .unwrap_or_default(),
            description: description.filter(|d| !d.is_empty()).map(str::to_string),
        };
        let media = MediaUpload {
            mime_type: mime_type.to_string(),
            data,
        };

        let file = self.drive.create_file(&metadata, Some(media), fields).await?;
        tracing::info!("Uploaded {} ({})", name, file.id_str());
        Ok(file)
    }

    /// Copies a file, optionally moving the copy into another folder.
    pub async fn copy_file(
        &self,
        file_id: &str,
        new_name: Option<&str>,
        destination_folder_id: Option<&str>,
    ) -> Result<DriveFile, WorkspaceError> {
        let copy = self
            .drive
            .copy_file(file_id, new_name.filter(|n| !n.is_empty()), "id, name, parents")
            .await?;
        let new_id = copy
            .id
            .clone()
            .ok_or_else(|| WorkspaceError::Api("Copy response did not include an ID".into()))?;

        if let Some(destination) = destination_folder_id.filter(|d| !d.is_empty()) {
            let current = self.drive.get_file(&new_id, "parents").await?;
            let remove = current.parents.join(",");
            self.drive
                .move_file(&new_id, destination, &remove, "id, name, parents, webViewLink")
                .await?;
        }

        self.drive.get_file(&new_id, "id, name, webViewLink").await
    }

    pub async fn download_file(&self, file_id: &str) -> Result<DownloadedFile, WorkspaceError> {
        let metadata = self.drive.get_file(file_id, NAME_AND_TYPE_FIELDS).await?;
        let data = self.drive.download_file(file_id).await?;

        Ok(DownloadedFile {
            name: metadata.name.unwrap_or_default(),
            mime_type: metadata.mime_type.unwrap_or_default(),
            data,
        })
    }

    // ------------------------------------------------------------------------
    // Sharing
    // ------------------------------------------------------------------------

    pub async fn share_item(
        &self,
        file_id: &str,
        email_address: &str,
        role: ShareRole,
        send_notification_email: bool,
        message: Option<&str>,
    ) -> Result<SharedItem, WorkspaceError> {
        let metadata = self.drive.get_file(file_id, NAME_AND_TYPE_FIELDS).await?;

        let permission = NewPermission {
            kind: "user".to_string(),
            role: role.as_str().to_string(),
            email_address: email_address.to_string(),
        };
        let created = self
            .drive
            .create_permission(
                file_id,
                &permission,
                send_notification_email,
                message.filter(|m| !m.is_empty()),
            )
            .await?;

        tracing::info!("Shared {} with {} as {}", file_id, email_address, role);
        Ok(SharedItem {
            kind: metadata.kind(),
            name: metadata.name.unwrap_or_default(),
            email_address: email_address.to_string(),
            role,
            permission: created,
        })
    }

    pub async fn list_permissions(
        &self,
        file_id: &str,
    ) -> Result<PermissionListing, WorkspaceError> {
        let metadata = self.drive.get_file(file_id, NAME_AND_TYPE_FIELDS).await?;
        let permissions = self.drive.list_permissions(file_id).await?;

        Ok(PermissionListing {
            kind: metadata.kind(),
            name: metadata.name.unwrap_or_default(),
            file_id: file_id.to_string(),
            permissions,
        })
    }

    // ------------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------------

    pub async fn create_doc(
        &self,
        title: &str,
        content: Option<&str>,
    ) -> Result<CreatedDoc, WorkspaceError> {
        let doc = self.docs.create_document(title).await?;

        if let Some(text) = content.filter(|c| !c.is_empty()) {
            self.docs
                .batch_update(&doc.document_id, &[DocsRequest::insert_at(1, text)])
                .await?;
        }

        tracing::info!("Created document {} ({})", title, doc.document_id);
        Ok(CreatedDoc {
            document_id: doc.document_id,
            title: title.to_string(),
        })
    }

    /// Appends to a document, or replaces its whole body when `replace_all`.
    pub async fn update_doc(
        &self,
        doc_id: &str,
        content: &str,
        replace_all: bool,
    ) -> Result<(), WorkspaceError> {
        if doc_id.trim().is_empty() {
            return Err(WorkspaceError::InvalidInput(
                "Document ID is required".to_string(),
            ));
        }

        let requests = if replace_all {
            let doc = self.docs.get_document(doc_id).await?;
            // The body always ends with a newline that cannot be deleted.
            let end = doc.end_index() - 1;
            let mut requests = Vec::with_capacity(2);
            if end > 1 {
                requests.push(DocsRequest::delete_range(1, end));
            }
            requests.push(DocsRequest::insert_at(1, content));
            requests
        } else {
            vec![DocsRequest::append(content)]
        };

        self.docs.batch_update(doc_id, &requests).await
    }

    pub async fn search_docs(&self, query: &str) -> Result<Vec<DriveFile>, WorkspaceError> {
        let q = format!(
            "mimeType='{}' and fullText contains '{}'",
            DOCUMENT_MIME_TYPE,
            escape_query_value(query)
        );
        self.drive
            .list_files(Some(&q), DOC_LIST_FIELDS, SEARCH_PAGE_SIZE)
            .await
    }

    /// Deletes a document and returns the title it had.
    pub async fn delete_doc(&self, doc_id: &str) -> Result<String, WorkspaceError> {
        let doc = self.docs.get_document(doc_id).await?;
        self.drive.delete_file(doc_id).await?;
        tracing::info!("Deleted document {} ({})", doc.title, doc_id);
        Ok(doc.title)
    }

    pub async fn export_doc(
        &self,
        doc_id: &str,
        format: ExportFormat,
    ) -> Result<ExportedDoc, WorkspaceError> {
        let metadata = self.drive.get_file(doc_id, NAME_AND_TYPE_FIELDS).await?;
        if !metadata.is_google_doc() {
            return Err(WorkspaceError::NotAGoogleDoc);
        }

        let data = self.drive.export_file(doc_id, format.mime_type()).await?;
        let original_name = metadata
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "document".to_string());

        Ok(ExportedDoc {
            export_name: format!("{}.{}", original_name, format.extension()),
            original_name,
            format,
            data,
        })
    }

    /// Uploads each file independently. A failure is recorded and the batch
    /// moves on to the next file.
    pub async fn upload_batch(
        &self,
        files: &[BatchFile],
        folder_id: Option<&str>,
    ) -> BatchUploadReport {
        let mut report = BatchUploadReport::default();

        for file in files {
            let result = match decode_base64(&file.base64_content) {
                Ok(data) => {
                    self.upload_bytes(
                        &file.name,
                        &file.mime_type,
                        data,
                        folder_id,
                        None,
                        "id,name,webViewLink",
                    )
                    .await
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(uploaded) => report.successful.push(UploadSuccess {
                    name: file.name.clone(),
                    id: uploaded.id.unwrap_or_default(),
                    link: uploaded.web_view_link,
                }),
                Err(e) => {
                    tracing::warn!("Batch upload of {} failed: {}", file.name, e);
                    report.failed.push(UploadFailure {
                        name: file.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            "Batch upload finished: {} of {} succeeded",
            report.successful.len(),
            files.len()
        );
        report
    }
}

/// Decodes standard base64, ignoring embedded whitespace and line breaks.
fn decode_base64(content: &str) -> Result<Vec<u8>, WorkspaceError> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64
        .decode(compact.as_bytes())
        .map_err(|e| WorkspaceError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    // ------------------------------------------------------------------------
    // In-memory fakes
    // ------------------------------------------------------------------------

    #[derive(Default)]
    struct DriveState {
        files: HashMap<String, DriveFile>,
        contents: HashMap<String, Vec<u8>>,
        queries: Vec<(Option<String>, u32)>,
        moves: Vec<(String, String, String)>,
        permissions: Vec<NewPermission>,
        deleted: Vec<String>,
        next_id: u32,
    }

    #[derive(Clone, Default)]
    struct FakeDrive {
        state: Arc<Mutex<DriveState>>,
        reject_names: Vec<String>,
    }

    impl FakeDrive {
        fn insert(&self, file: DriveFile) {
            let id = file.id.clone().unwrap();
            self.state.lock().unwrap().files.insert(id, file);
        }

        fn queries(&self) -> Vec<(Option<String>, u32)> {
            self.state.lock().unwrap().queries.clone()
        }
    }

    fn not_found(id: &str) -> WorkspaceError {
        WorkspaceError::Api(format!("Drive API error (404 Not Found): File not found: {}", id))
    }

    #[async_trait]
    impl DriveApi for FakeDrive {
        async fn list_files(
            &self,
            query: Option<&str>,
            _fields: &str,
            page_size: u32,
        ) -> Result<Vec<DriveFile>, WorkspaceError> {
            let mut state = self.state.lock().unwrap();
            state.queries.push((query.map(str::to_string), page_size));
            Ok(state.files.values().cloned().collect())
        }

        async fn get_file(&self, file_id: &str, _fields: &str) -> Result<DriveFile, WorkspaceError> {
            self.state
                .lock()
                .unwrap()
                .files
                .get(file_id)
                .cloned()
                .ok_or_else(|| not_found(file_id))
        }

        async fn create_file(
            &self,
            metadata: &NewFile,
            media: Option<MediaUpload>,
            _fields: &str,
        ) -> Result<DriveFile, WorkspaceError> {
            if self.reject_names.contains(&metadata.name) {
                return Err(WorkspaceError::Api("Drive API error (403): quota".to_string()));
            }

            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let id = format!("id{}", state.next_id);
            let file = DriveFile {
                id: Some(id.clone()),
                name: Some(metadata.name.clone()),
                mime_type: metadata
                    .mime_type
                    .clone()
                    .or_else(|| media.as_ref().map(|m| m.mime_type.clone())),
                size: media.as_ref().map(|m| m.data.len().to_string()),
                parents: metadata.parents.clone(),
                web_view_link: Some(format!("https://drive.example/{}", id)),
                ..Default::default()
            };
            if let Some(media) = media {
                state.contents.insert(id.clone(), media.data);
            }
            state.files.insert(id, file.clone());
            Ok(file)
        }

        async fn copy_file(
            &self,
            file_id: &str,
            new_name: Option<&str>,
            _fields: &str,
        ) -> Result<DriveFile, WorkspaceError> {
            let mut state = self.state.lock().unwrap();
            let original = state.files.get(file_id).cloned().ok_or_else(|| not_found(file_id))?;
            state.next_id += 1;
            let id = format!("id{}", state.next_id);
            let copy = DriveFile {
                id: Some(id.clone()),
                name: new_name.map(str::to_string).or(original.name),
                parents: original.parents,
                ..Default::default()
            };
            state.files.insert(id, copy.clone());
            Ok(copy)
        }

        async fn move_file(
            &self,
            file_id: &str,
            add_parents: &str,
            remove_parents: &str,
            _fields: &str,
        ) -> Result<DriveFile, WorkspaceError> {
            let mut state = self.state.lock().unwrap();
            state.moves.push((
                file_id.to_string(),
                add_parents.to_string(),
                remove_parents.to_string(),
            ));
            let file = state.files.get_mut(file_id).ok_or_else(|| not_found(file_id))?;
            file.parents = vec![add_parents.to_string()];
            Ok(file.clone())
        }

        async fn delete_file(&self, file_id: &str) -> Result<(), WorkspaceError> {
            let mut state = self.state.lock().unwrap();
            state.files.remove(file_id);
            state.deleted.push(file_id.to_string());
            Ok(())
        }

        async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, WorkspaceError> {
            self.state
                .lock()
                .unwrap()
                .contents
                .get(file_id)
                .cloned()
                .ok_or_else(|| not_found(file_id))
        }

        async fn export_file(
            &self,
            _file_id: &str,
            mime_type: &str,
        ) -> Result<Vec<u8>, WorkspaceError> {
            Ok(format!("exported as {}", mime_type).into_bytes())
        }

        async fn create_permission(
            &self,
            _file_id: &str,
            permission: &NewPermission,
            _send_notification_email: bool,
            _email_message: Option<&str>,
        ) -> Result<Permission, WorkspaceError> {
            self.state.lock().unwrap().permissions.push(permission.clone());
            Ok(Permission {
                id: Some("perm1".to_string()),
                role: Some(permission.role.clone()),
                ..Default::default()
            })
        }

        async fn list_permissions(&self, _file_id: &str) -> Result<Vec<Permission>, WorkspaceError> {
            Ok(vec![Permission {
                id: Some("owner".to_string()),
                role: Some("owner".to_string()),
                ..Default::default()
            }])
        }
    }

    #[derive(Clone, Default)]
    struct FakeDocs {
        docs: Arc<Mutex<HashMap<String, Document>>>,
        updates: Arc<Mutex<Vec<(String, Vec<DocsRequest>)>>>,
    }

    #[async_trait]
    impl DocsApi for FakeDocs {
        async fn get_document(&self, doc_id: &str) -> Result<Document, WorkspaceError> {
            self.docs
                .lock()
                .unwrap()
                .get(doc_id)
                .cloned()
                .ok_or_else(|| not_found(doc_id))
        }

        async fn create_document(&self, title: &str) -> Result<Document, WorkspaceError> {
            let doc = Document {
                document_id: "doc-new".to_string(),
                title: title.to_string(),
                body: None,
            };
            self.docs
                .lock()
                .unwrap()
                .insert(doc.document_id.clone(), doc.clone());
            Ok(doc)
        }

        async fn batch_update(
            &self,
            doc_id: &str,
            requests: &[DocsRequest],
        ) -> Result<(), WorkspaceError> {
            self.updates
                .lock()
                .unwrap()
                .push((doc_id.to_string(), requests.to_vec()));
            Ok(())
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl RemoteFetcher for FailingFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, WorkspaceError> {
            Err(WorkspaceError::Fetch(format!("404 Not Found for {}", url)))
        }
    }

    fn service(drive: FakeDrive, docs: FakeDocs) -> WorkspaceService<FakeDrive, FakeDocs> {
        WorkspaceService::new(drive, docs, Box::new(FailingFetcher))
    }

    fn doc_with_text(id: &str, title: &str, text: &str) -> Document {
        serde_json::from_value(serde_json::json!({
            "documentId": id,
            "title": title,
            "body": { "content": [
                { "endIndex": 1 },
                { "endIndex": 1 + text.encode_utf16().count(), "paragraph": { "elements": [ { "textRun": { "content": text } } ] } }
            ] }
        }))
        .unwrap()
    }

    // ------------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_batch_upload_counts_every_file() {
        let drive = FakeDrive {
            reject_names: vec!["blocked.txt".to_string()],
            ..Default::default()
        };
        let service = service(drive, FakeDocs::default());

        let files = vec![
            BatchFile {
                name: "a.txt".to_string(),
                mime_type: "text/plain".to_string(),
                base64_content: BASE64.encode("alpha"),
            },
            BatchFile {
                name: "bad.bin".to_string(),
                mime_type: "application/octet-stream".to_string(),
                base64_content: "%%%not base64%%%".to_string(),
            },
            BatchFile {
                name: "blocked.txt".to_string(),
                mime_type: "text/plain".to_string(),
                base64_content: BASE64.encode("beta"),
            },
        ];

        let report = service.upload_batch(&files, Some("folder1")).await;

        assert_eq!(report.total(), files.len());
        assert_eq!(report.successful.len(), 1);
        assert_eq!(report.successful[0].name, "a.txt");
        assert_eq!(report.failed.len(), 2);
        assert!(report.failed[0].error.starts_with("Invalid base64 content"));
        assert!(report.failed[1].error.contains("quota"));
    }

    #[tokio::test]
    async fn test_list_drive_files_builds_query() {
        let drive = FakeDrive::default();
        let service = service(drive.clone(), FakeDocs::default());

        service
            .list_drive_files(Some("folder'1"), Some("plan"), None)
            .await
            .unwrap();
        service.list_drive_files(None, None, None).await.unwrap();

        let queries = drive.queries();
        assert_eq!(
            queries[0],
            (
                Some("'folder\\'1' in parents and name contains 'plan'".to_string()),
                LIST_PAGE_SIZE
            )
        );
        assert_eq!(queries[1], (None, LIST_PAGE_SIZE));
    }

    #[tokio::test]
    async fn test_search_docs_uses_small_page() {
        let drive = FakeDrive::default();
        let service = service(drive.clone(), FakeDocs::default());

        service.search_docs("budget").await.unwrap();

        let (query, page) = drive.queries().remove(0);
        assert_eq!(
            query.unwrap(),
            "mimeType='application/vnd.google-apps.document' and fullText contains 'budget'"
        );
        assert_eq!(page, SEARCH_PAGE_SIZE);
    }

    #[tokio::test]
    async fn test_copy_with_destination_moves_copy() {
        let drive = FakeDrive::default();
        drive.insert(DriveFile {
            id: Some("src".to_string()),
            name: Some("plan.txt".to_string()),
            parents: vec!["root".to_string()],
            ..Default::default()
        });
        let service = service(drive.clone(), FakeDocs::default());

        let copy = service
            .copy_file("src", Some("plan copy.txt"), Some("dest"))
            .await
            .unwrap();

        assert_eq!(copy.name_str(), "plan copy.txt");
        assert_eq!(copy.parents, vec!["dest"]);
        let moves = drive.state.lock().unwrap().moves.clone();
        assert_eq!(
            moves,
            vec![(copy.id_str().to_string(), "dest".to_string(), "root".to_string())]
        );
    }

    #[tokio::test]
    async fn test_export_rejects_non_doc() {
        let drive = FakeDrive::default();
        drive.insert(DriveFile {
            id: Some("pdf1".to_string()),
            name: Some("scan.pdf".to_string()),
            mime_type: Some("application/pdf".to_string()),
            ..Default::default()
        });
        let service = service(drive, FakeDocs::default());

        let err = service.export_doc("pdf1", ExportFormat::Txt).await.unwrap_err();
        assert_eq!(err.to_string(), "The provided ID is not a Google Doc");
    }

    #[tokio::test]
    async fn test_export_names_file_after_format() {
        let drive = FakeDrive::default();
        drive.insert(DriveFile {
            id: Some("d1".to_string()),
            name: Some("Report".to_string()),
            mime_type: Some(DOCUMENT_MIME_TYPE.to_string()),
            ..Default::default()
        });
        let service = service(drive, FakeDocs::default());

        let exported = service.export_doc("d1", ExportFormat::Pdf).await.unwrap();

        assert_eq!(exported.export_name, "Report.pdf");
        assert_eq!(exported.data, b"exported as application/pdf");
    }

    #[tokio::test]
    async fn test_update_doc_replace_all_deletes_then_inserts() {
        let docs = FakeDocs::default();
        docs.docs
            .lock()
            .unwrap()
            .insert("d1".to_string(), doc_with_text("d1", "T", "old text\n"));
        let service = service(FakeDrive::default(), docs.clone());

        service.update_doc("d1", "new", true).await.unwrap();

        let updates = docs.updates.lock().unwrap();
        assert_eq!(
            updates[0].1,
            vec![DocsRequest::delete_range(1, 9), DocsRequest::insert_at(1, "new")]
        );
    }

    #[tokio::test]
    async fn test_update_doc_replace_all_on_empty_doc_only_inserts() {
        let docs = FakeDocs::default();
        docs.docs
            .lock()
            .unwrap()
            .insert("d1".to_string(), doc_with_text("d1", "T", "\n"));
        let service = service(FakeDrive::default(), docs.clone());

        service.update_doc("d1", "fresh", true).await.unwrap();

        let updates = docs.updates.lock().unwrap();
        assert_eq!(updates[0].1, vec![DocsRequest::insert_at(1, "fresh")]);
    }

    #[tokio::test]
    async fn test_update_doc_append_and_empty_id() {
        let docs = FakeDocs::default();
        let service = service(FakeDrive::default(), docs.clone());

        service.update_doc("d1", "more", false).await.unwrap();
        assert_eq!(docs.updates.lock().unwrap()[0].1, vec![DocsRequest::append("more")]);

        let err = service.update_doc("  ", "x", false).await.unwrap_err();
        assert_eq!(err.to_string(), "Document ID is required");
    }

    #[tokio::test]
    async fn test_create_doc_inserts_content_only_when_given() {
        let docs = FakeDocs::default();
        let service = service(FakeDrive::default(), docs.clone());

        service.create_doc("Empty", None).await.unwrap();
        assert!(docs.updates.lock().unwrap().is_empty());

        let created = service.create_doc("Full", Some("Hello")).await.unwrap();
        assert_eq!(created.title, "Full");
        assert_eq!(
            docs.updates.lock().unwrap()[0],
            ("doc-new".to_string(), vec![DocsRequest::insert_at(1, "Hello")])
        );
    }

    #[tokio::test]
    async fn test_share_item_reports_kind() {
        let drive = FakeDrive::default();
        drive.insert(DriveFile {
            id: Some("f1".to_string()),
            name: Some("Projects".to_string()),
            mime_type: Some(FOLDER_MIME_TYPE.to_string()),
            ..Default::default()
        });
        let service = service(drive.clone(), FakeDocs::default());

        let shared = service
            .share_item("f1", "bob@example.com", ShareRole::Writer, true, Some(""))
            .await
            .unwrap();

        assert_eq!(shared.kind, ItemKind::Folder);
        assert_eq!(shared.name, "Projects");
        assert_eq!(shared.permission.id.as_deref(), Some("perm1"));
        let perms = drive.state.lock().unwrap().permissions.clone();
        assert_eq!(perms[0].kind, "user");
        assert_eq!(perms[0].role, "writer");
    }

    #[tokio::test]
    async fn test_delete_doc_returns_title() {
        let drive = FakeDrive::default();
        let docs = FakeDocs::default();
        docs.docs
            .lock()
            .unwrap()
            .insert("d1".to_string(), doc_with_text("d1", "Minutes", "x\n"));
        let service = service(drive.clone(), docs);

        let title = service.delete_doc("d1").await.unwrap();

        assert_eq!(title, "Minutes");
        assert_eq!(drive.state.lock().unwrap().deleted, vec!["d1"]);
    }

    #[tokio::test]
    async fn test_upload_from_url_reports_fetch_failure() {
        let service = service(FakeDrive::default(), FakeDocs::default());

        let err = service
            .upload_from_url("a.png", "image/png", "https://nowhere.example/a.png", None, None)
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("Failed to fetch file from URL: "));
    }

    #[tokio::test]
    async fn test_upload_local_file_infers_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(&path, "<p>hi</p>").unwrap();
        let service = service(FakeDrive::default(), FakeDocs::default());

        let file = service.upload_local_file(&path, None).await.unwrap();

        assert_eq!(file.name_str(), "page.html");
        assert_eq!(file.mime_type.as_deref(), Some("text/html"));
        assert_eq!(file.size_bytes(), Some(9));
    }

    #[tokio::test]
    async fn test_download_returns_bytes_and_metadata() {
        let drive = FakeDrive::default();
        let service = service(drive.clone(), FakeDocs::default());
        let uploaded = service
            .upload_base64("n.txt", "text/plain", &BASE64.encode("payload"), None, None)
            .await
            .unwrap();

        let downloaded = service.download_file(uploaded.id_str()).await.unwrap();

        assert_eq!(downloaded.name, "n.txt");
        assert_eq!(downloaded.mime_type, "text/plain");
        assert_eq!(downloaded.data, b"payload");
    }
}
