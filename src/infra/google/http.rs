use crate::core::workspace::WorkspaceError;
use reqwest::Response;
use serde_json::Value;
use url::Url;

/// Builds `base/segment/segment?query`, percent-encoding each segment.
pub fn api_url(base: &str, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, WorkspaceError> {
    let mut url = Url::parse(base).map_err(|e| WorkspaceError::Api(e.to_string()))?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| WorkspaceError::Api(format!("Cannot extend URL {}", base)))?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url)
}

/// Passes successful responses through and turns failures into
/// `"<api> error (<status>): <message>"`.
pub async fn check(response: Response, api: &str) -> Result<Response, WorkspaceError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    Err(WorkspaceError::Api(format!(
        "{} error ({}): {}",
        api,
        status,
        google_error_message(&text)
    )))
}

/// Google wraps errors as `{"error": {"message": ...}}`; fall back to the raw body.
pub fn google_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

pub fn request_err(e: reqwest::Error) -> WorkspaceError {
    WorkspaceError::Api(format!("Request failed: {}", e))
}
