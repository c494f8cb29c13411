use super::http::{api_url, check, request_err};
use super::oauth::GoogleAuth;
use crate::core::workspace::workspace_models::{DocsRequest, Document};
use crate::core::workspace::{DocsApi, WorkspaceError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;

const DOCS_API: &str = "https://docs.googleapis.com/v1";

/// Docs v1 REST client.
pub struct DocsClient {
    client: Client,
    auth: Arc<GoogleAuth>,
}

impl DocsClient {
    pub fn new(auth: Arc<GoogleAuth>) -> Self {
        Self {
            client: Client::new(),
            auth,
        }
    }
}

#[async_trait]
impl DocsApi for DocsClient {
    async fn get_document(&self, doc_id: &str) -> Result<Document, WorkspaceError> {
        let token = self.auth.access_token().await?;
        let url = api_url(DOCS_API, &["documents", doc_id], &[])?;

        tracing::debug!("Fetching Google Doc via API: {}", doc_id);
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(request_err)?;

        check(response, "Google Docs API")
            .await?
            .json()
            .await
            .map_err(|e| WorkspaceError::Api(format!("Unexpected Docs API response: {}", e)))
    }

    async fn create_document(&self, title: &str) -> Result<Document, WorkspaceError> {
        let token = self.auth.access_token().await?;
        let url = api_url(DOCS_API, &["documents"], &[])?;

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&json!({ "title": title }))
            .send()
            .await
            .map_err(request_err)?;

        check(response, "Google Docs API")
            .await?
            .json()
            .await
            .map_err(|e| WorkspaceError::Api(format!("Unexpected Docs API response: {}", e)))
    }

    async fn batch_update(
        &self,
        doc_id: &str,
        requests: &[DocsRequest],
    ) -> Result<(), WorkspaceError> {
        let token = self.auth.access_token().await?;
        // The method suffix is part of the last path segment.
        let segment = format!("{}:batchUpdate", doc_id);
        let url = api_url(DOCS_API, &["documents", segment.as_str()], &[])?;

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&json!({ "requests": requests }))
            .send()
            .await
            .map_err(request_err)?;

        check(response, "Google Docs API").await?;
        tracing::debug!("Applied {} update(s) to {}", requests.len(), doc_id);
        Ok(())
    }
}
