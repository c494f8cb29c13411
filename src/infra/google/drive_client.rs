use super::http::{api_url, check, request_err};
use super::oauth::GoogleAuth;
use crate::core::workspace::workspace_models::{
    DriveFile, MediaUpload, NewFile, NewPermission, Permission,
};
use crate::core::workspace::{DriveApi, RemoteFetcher, WorkspaceError};
use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::sync::Arc;

const DRIVE_API: &str = "https://www.googleapis.com/drive/v3";
const DRIVE_UPLOAD_API: &str = "https://www.googleapis.com/upload/drive/v3";

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct PermissionList {
    #[serde(default)]
    permissions: Vec<Permission>,
}

/// Drive v3 REST client.
pub struct DriveClient {
    client: Client,
    auth: Arc<GoogleAuth>,
}

impl DriveClient {
    pub fn new(auth: Arc<GoogleAuth>) -> Self {
        Self {
            client: Client::new(),
            auth,
        }
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, WorkspaceError> {
        let token = self.auth.access_token().await?;
        Ok(request.bearer_auth(token))
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, WorkspaceError> {
        let response = self
            .authorized(request)
            .await?
            .send()
            .await
            .map_err(request_err)?;
        check(response, "Drive API").await
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, WorkspaceError> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| WorkspaceError::Api(format!("Unexpected Drive API response: {}", e)))
    }

    async fn send_bytes(&self, request: RequestBuilder) -> Result<Vec<u8>, WorkspaceError> {
        let bytes = self.send(request).await?.bytes().await.map_err(request_err)?;
        Ok(bytes.to_vec())
    }
}

/// Body of a Drive `uploadType=multipart` request: JSON metadata then the media.
pub fn multipart_related_body(metadata_json: &str, media: &MediaUpload, boundary: &str) -> Vec<u8> {
    let mut body = Vec::with_capacity(media.data.len() + metadata_json.len() + 256);
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{m}\r\n--{b}\r\nContent-Type: {t}\r\n\r\n",
            b = boundary,
            m = metadata_json,
            t = media.mime_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(&media.data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

fn new_boundary() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();
    format!("mecha_drive_{}", suffix)
}

#[async_trait]
impl DriveApi for DriveClient {
    async fn list_files(
        &self,
        query: Option<&str>,
        fields: &str,
        page_size: u32,
    ) -> Result<Vec<DriveFile>, WorkspaceError> {
        let page = page_size.to_string();
        let mut params = vec![("fields", fields), ("pageSize", page.as_str())];
        if let Some(q) = query {
            params.push(("q", q));
        }

        tracing::debug!("Listing Drive files with query {:?}", query);
        let url = api_url(DRIVE_API, &["files"], &params)?;
        let list: FileList = self.send_json(self.client.get(url)).await?;
        Ok(list.files)
    }

    async fn get_file(&self, file_id: &str, fields: &str) -> Result<DriveFile, WorkspaceError> {
        let url = api_url(DRIVE_API, &["files", file_id], &[("fields", fields)])?;
        self.send_json(self.client.get(url)).await
    }

    async fn create_file(
        &self,
        metadata: &NewFile,
        media: Option<MediaUpload>,
        fields: &str,
    ) -> Result<DriveFile, WorkspaceError> {
        let Some(media) = media else {
            let url = api_url(DRIVE_API, &["files"], &[("fields", fields)])?;
            return self.send_json(self.client.post(url).json(metadata)).await;
        };

        let metadata_json = serde_json::to_string(metadata)
            .map_err(|e| WorkspaceError::InvalidInput(e.to_string()))?;
        let boundary = new_boundary();
        let body = multipart_related_body(&metadata_json, &media, &boundary);

        let url = api_url(
            DRIVE_UPLOAD_API,
            &["files"],
            &[("uploadType", "multipart"), ("fields", fields)],
        )?;
        let request = self
            .client
            .post(url)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body);
        self.send_json(request).await
    }

    async fn copy_file(
        &self,
        file_id: &str,
        new_name: Option<&str>,
        fields: &str,
    ) -> Result<DriveFile, WorkspaceError> {
        let url = api_url(DRIVE_API, &["files", file_id, "copy"], &[("fields", fields)])?;
        let body = match new_name {
            Some(name) => serde_json::json!({ "name": name }),
            None => serde_json::json!({}),
        };
        self.send_json(self.client.post(url).json(&body)).await
    }

    async fn move_file(
        &self,
        file_id: &str,
        add_parents: &str,
        remove_parents: &str,
        fields: &str,
    ) -> Result<DriveFile, WorkspaceError> {
        let mut params = vec![("addParents", add_parents), ("fields", fields)];
        if !remove_parents.is_empty() {
            params.push(("removeParents", remove_parents));
        }
        let url = api_url(DRIVE_API, &["files", file_id], &params)?;
        self.send_json(self.client.patch(url).json(&serde_json::json!({})))
            .await
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), WorkspaceError> {
        let url = api_url(DRIVE_API, &["files", file_id], &[])?;
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, WorkspaceError> {
        let url = api_url(DRIVE_API, &["files", file_id], &[("alt", "media")])?;
        self.send_bytes(self.client.get(url)).await
    }

    async fn export_file(
        &self,
        file_id: &str,
        mime_type: &str,
    ) -> Result<Vec<u8>, WorkspaceError> {
        let url = api_url(
            DRIVE_API,
            &["files", file_id, "export"],
            &[("mimeType", mime_type)],
        )?;
        self.send_bytes(self.client.get(url)).await
    }

    async fn create_permission(
        &self,
        file_id: &str,
        permission: &NewPermission,
        send_notification_email: bool,
        email_message: Option<&str>,
    ) -> Result<Permission, WorkspaceError> {
        let notify = send_notification_email.to_string();
        let mut params = vec![
            ("sendNotificationEmail", notify.as_str()),
            ("fields", "id,type,role,emailAddress"),
        ];
        if let Some(message) = email_message {
            params.push(("emailMessage", message));
        }

        let url = api_url(DRIVE_API, &["files", file_id, "permissions"], &params)?;
        self.send_json(self.client.post(url).json(permission)).await
    }

    async fn list_permissions(&self, file_id: &str) -> Result<Vec<Permission>, WorkspaceError> {
        let url = api_url(
            DRIVE_API,
            &["files", file_id, "permissions"],
            &[(
                "fields",
                "permissions(id,type,role,emailAddress,displayName,domain)",
            )],
        )?;
        let list: PermissionList = self.send_json(self.client.get(url)).await?;
        Ok(list.permissions)
    }
}

/// Plain HTTP GET used for `upload-file-from-url`.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, WorkspaceError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| WorkspaceError::Fetch(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| WorkspaceError::Fetch(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
