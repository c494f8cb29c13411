// =============================================================================
// GOOGLE OAUTH2 (INSTALLED APP FLOW)
// =============================================================================
//
// Access tokens come from, in order:
// 1. The in-memory cache, while more than a minute of validity remains.
// 2. `token.json` on disk (the layout Google's client libraries write).
// 3. A refresh-token grant, when the stored token has expired.
// 4. The interactive consent flow: a consent URL is printed to stderr and a
//    one-shot HTTP listener on 127.0.0.1 catches the redirect.
//
// Whatever the source, the resulting token is written back to `token.json`.
//
// **Setup:**
// 1. In Google Cloud Console enable the Drive API and the Docs API.
// 2. Create an OAuth client ID of type "Desktop app".
// 3. Download the client JSON as `credentials.json`
//    (or point `GOOGLE_CREDENTIALS_PATH` at it).

use crate::core::workspace::WorkspaceError;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use url::Url;

pub const SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/documents",
    "https://www.googleapis.com/auth/drive",
    "https://www.googleapis.com/auth/drive.readonly",
];

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const EXPIRY_MARGIN_SECS: i64 = 60;
const CONSENT_TIMEOUT: Duration = Duration::from_secs(300);

const CONSENT_DONE_PAGE: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nConnection: close\r\n\r\n<html><body>The authentication flow has completed. You may close this window.</body></html>";
const NOT_FOUND_PAGE: &str = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

// =============================================================================
// FILE FORMATS
// =============================================================================

/// `token.json`, written in the Google "authorized user" layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredToken {
    #[serde(default)]
    pub token: Option<String>,
    /// Older writers use this key. Only read, see [`StoredToken::from_json`].
    #[serde(default, skip_serializing)]
    access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expiry: Option<String>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl StoredToken {
    /// Parses `token.json`. A non-empty `token` wins over `access_token`
    /// when a file carries both.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        let mut stored: Self = serde_json::from_str(raw)?;
        let legacy = stored.access_token.take();
        if stored.token.as_deref().map_or(true, str::is_empty) {
            stored.token = legacy;
        }
        Ok(stored)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expiry.as_deref().and_then(parse_expiry)
    }

    /// A token without an expiry is treated as valid, as the Google clients do.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.token.as_deref().map_or(true, str::is_empty) {
            return false;
        }
        match self.expires_at() {
            Some(expiry) => expiry > now + ChronoDuration::seconds(EXPIRY_MARGIN_SECS),
            None => true,
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Accepts RFC 3339 and the naive ISO form some writers leave without a zone.
pub fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn format_expiry(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// `credentials.json` as downloaded from the Cloud Console.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecretsFile {
    #[serde(default)]
    installed: Option<ClientSecrets>,
    #[serde(default)]
    web: Option<ClientSecrets>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

impl ClientSecretsFile {
    pub fn into_secrets(self) -> Option<ClientSecrets> {
        self.installed.or(self.web)
    }
}

/// Response from Google's token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

// =============================================================================
// AUTHENTICATOR
// =============================================================================

pub struct GoogleAuth {
    client: Client,
    credentials_path: PathBuf,
    token_path: PathBuf,
    cached: Arc<RwLock<Option<StoredToken>>>,
}

fn auth_err(e: impl std::fmt::Display) -> WorkspaceError {
    WorkspaceError::Auth(e.to_string())
}

impl GoogleAuth {
    pub fn new(credentials_path: impl Into<PathBuf>, token_path: impl Into<PathBuf>) -> Self {
        Self {
            client: Client::new(),
            credentials_path: credentials_path.into(),
            token_path: token_path.into(),
            cached: Arc::new(RwLock::new(None)),
        }
    }

    /// Gets a valid access token, refreshing or re-consenting if necessary.
    pub async fn access_token(&self) -> Result<String, WorkspaceError> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref().filter(|t| t.is_valid_at(Utc::now())) {
                return Ok(token.token.clone().unwrap_or_default());
            }
        }

        let mut cached = self.cached.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(token) = cached.as_ref().filter(|t| t.is_valid_at(Utc::now())) {
            return Ok(token.token.clone().unwrap_or_default());
        }

        let stored = match cached.take() {
            Some(token) => Some(token),
            None => self.load_token().await,
        };

        let token = match stored {
            Some(token) if token.is_valid_at(Utc::now()) => token,
            Some(token) if token.can_refresh() => {
                tracing::info!("Refreshing expired Google token");
                let refreshed = self.refresh(&token).await?;
                self.save_token(&refreshed).await;
                refreshed
            }
            _ => {
                let fresh = self.run_consent_flow().await?;
                self.save_token(&fresh).await;
                fresh
            }
        };

        let access = token.token.clone().unwrap_or_default();
        *cached = Some(token);
        Ok(access)
    }

    async fn load_token(&self) -> Option<StoredToken> {
        let content = tokio::fs::read_to_string(&self.token_path).await.ok()?;
        match StoredToken::from_json(&content) {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::warn!("Ignoring unreadable token file {}: {}", self.token_path.display(), e);
                None
            }
        }
    }

    async fn save_token(&self, token: &StoredToken) {
        let result = match serde_json::to_string_pretty(token) {
            Ok(json) => tokio::fs::write(&self.token_path, json)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match result {
            Ok(()) => tracing::info!("Saved Google token to {}", self.token_path.display()),
            Err(e) => tracing::error!("Failed to save token to {}: {}", self.token_path.display(), e),
        }
    }

    async fn load_secrets(&self) -> Result<ClientSecrets, WorkspaceError> {
        let content = tokio::fs::read_to_string(&self.credentials_path)
            .await
            .map_err(|e| {
                auth_err(format!(
                    "Cannot read OAuth client file {}: {}",
                    self.credentials_path.display(),
                    e
                ))
            })?;
        let file: ClientSecretsFile = serde_json::from_str(&content).map_err(auth_err)?;
        file.into_secrets().ok_or_else(|| {
            auth_err("OAuth client file has neither an 'installed' nor a 'web' section")
        })
    }

    async fn refresh(&self, token: &StoredToken) -> Result<StoredToken, WorkspaceError> {
        let refresh_token = token.refresh_token.clone().unwrap_or_default();
        let response = self
            .client
            .post(&token.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", token.client_id.as_str()),
                ("client_secret", token.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(auth_err)?;

        let granted = read_token_response(response).await?;
        Ok(merge_token(token.clone(), granted))
    }

    async fn run_consent_flow(&self) -> Result<StoredToken, WorkspaceError> {
        let secrets = self.load_secrets().await?;

        let listener = TcpListener::bind("127.0.0.1:0").await.map_err(auth_err)?;
        let port = listener.local_addr().map_err(auth_err)?.port();
        let redirect_uri = format!("http://localhost:{}/", port);
        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(30)
            .map(char::from)
            .collect();

        let url = consent_url(&secrets, &redirect_uri, &state)?;
        eprintln!(
            "Please visit this URL to authorize this application:\n{}\n",
            url
        );
        tracing::info!("Waiting for OAuth consent on port {}", port);

        let code = tokio::time::timeout(CONSENT_TIMEOUT, wait_for_code(&listener, &state))
            .await
            .map_err(|_| auth_err("Timed out waiting for OAuth consent"))??;

        let response = self
            .client
            .post(&secrets.token_uri)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("client_id", secrets.client_id.as_str()),
                ("client_secret", secrets.client_secret.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(auth_err)?;
        let granted = read_token_response(response).await?;

        tracing::info!("OAuth consent completed");
        let base = StoredToken {
            token: None,
            access_token: None,
            refresh_token: None,
            token_uri: secrets.token_uri,
            client_id: secrets.client_id,
            client_secret: secrets.client_secret,
            scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
            expiry: None,
        };
        Ok(merge_token(base, granted))
    }
}

async fn read_token_response(response: reqwest::Response) -> Result<TokenResponse, WorkspaceError> {
    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(auth_err(format!("Token exchange failed ({}): {}", status, text)));
    }
    response.json().await.map_err(auth_err)
}

/// Applies a token grant. The refresh token survives when Google omits it.
fn merge_token(mut base: StoredToken, granted: TokenResponse) -> StoredToken {
    base.token = Some(granted.access_token);
    if let Some(refresh) = granted.refresh_token {
        base.refresh_token = Some(refresh);
    }
    if let Some(scope) = granted.scope {
        base.scopes = scope.split_whitespace().map(str::to_string).collect();
    }
    base.expiry = granted
        .expires_in
        .map(|secs| format_expiry(Utc::now() + ChronoDuration::seconds(secs)));
    base
}

pub fn consent_url(
    secrets: &ClientSecrets,
    redirect_uri: &str,
    state: &str,
) -> Result<Url, WorkspaceError> {
    let scope = SCOPES.join(" ");
    Url::parse_with_params(
        &secrets.auth_uri,
        &[
            ("response_type", "code"),
            ("client_id", secrets.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
            ("state", state),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .map_err(auth_err)
}

/// Accepts connections until one carries the authorization redirect.
async fn wait_for_code(listener: &TcpListener, state: &str) -> Result<String, WorkspaceError> {
    loop {
        let (stream, _) = listener.accept().await.map_err(auth_err)?;
        let mut reader = BufReader::new(stream);
        let mut request_line = String::new();
        reader.read_line(&mut request_line).await.map_err(auth_err)?;

        let outcome = parse_redirect(&request_line, state);
        let page = match &outcome {
            Ok(None) => NOT_FOUND_PAGE,
            _ => CONSENT_DONE_PAGE,
        };
        let mut stream = reader.into_inner();
        if let Err(e) = stream.write_all(page.as_bytes()).await {
            tracing::debug!("Failed to answer OAuth redirect: {}", e);
        }
        if let Err(e) = stream.shutdown().await {
            tracing::debug!("Failed to close OAuth redirect connection: {}", e);
        }

        if let Some(code) = outcome? {
            return Ok(code);
        }
    }
}

/// Extracts the authorization code from an HTTP request line such as
/// `GET /?state=abc&code=xyz HTTP/1.1`.
///
/// `Ok(None)` means the request was unrelated (a favicon fetch, say).
pub fn parse_redirect(request_line: &str, expected_state: &str) -> Result<Option<String>, WorkspaceError> {
    let target = request_line.split_whitespace().nth(1).unwrap_or("/");
    let url = Url::parse("http://localhost")
        .and_then(|base| base.join(target))
        .map_err(auth_err)?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.to_string()),
            "state" => state = Some(value.to_string()),
            "error" => return Err(auth_err(format!("Authorization denied: {}", value))),
            _ => {}
        }
    }

    let Some(code) = code else {
        return Ok(None);
    };
    if state.as_deref() != Some(expected_state) {
        return Err(auth_err("OAuth state mismatch in redirect"));
    }
    Ok(Some(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_file_accepts_access_token_key() {
        let token = StoredToken::from_json(
            r#"{"access_token": "ya29.x", "refresh_token": "1//r", "client_id": "id", "client_secret": "s"}"#,
        )
        .unwrap();

        assert_eq!(token.token.as_deref(), Some("ya29.x"));
        assert_eq!(token.token_uri, DEFAULT_TOKEN_URI);
        assert!(token.can_refresh());

        let saved = serde_json::to_value(&token).unwrap();
        assert_eq!(saved["token"], "ya29.x");
        assert!(saved.get("access_token").is_none());
    }

    #[test]
    fn test_token_file_with_both_keys() {
        let token = StoredToken::from_json(
            r#"{"token": "ya29.new", "access_token": "ya29.old", "refresh_token": "1//r"}"#,
        )
        .unwrap();
        assert_eq!(token.token.as_deref(), Some("ya29.new"));

        let token = StoredToken::from_json(r#"{"token": "", "access_token": "ya29.old"}"#).unwrap();
        assert_eq!(token.token.as_deref(), Some("ya29.old"));
    }

    #[test]
    fn test_expiry_margin() {
        let now = Utc::now();
        let mut token = StoredToken {
            token: Some("t".to_string()),
            ..Default::default()
        };

        token.expiry = Some(format_expiry(now + ChronoDuration::seconds(30)));
        assert!(!token.is_valid_at(now));

        token.expiry = Some(format_expiry(now + ChronoDuration::seconds(600)));
        assert!(token.is_valid_at(now));

        token.expiry = None;
        assert!(token.is_valid_at(now));

        token.token = None;
        assert!(!token.is_valid_at(now));
    }

    #[test]
    fn test_parse_expiry_formats() {
        let fractional = parse_expiry("2025-03-01T10:20:30.123456Z").unwrap();
        let naive = parse_expiry("2025-03-01T10:20:30").unwrap();
        let offset = parse_expiry("2025-03-01T11:20:30+01:00").unwrap();

        assert_eq!(fractional.timestamp(), naive.timestamp());
        assert_eq!(naive, offset);
        assert!(parse_expiry("yesterday").is_none());
    }

    #[test]
    fn test_merge_keeps_refresh_token() {
        let base = StoredToken {
            refresh_token: Some("keep-me".to_string()),
            ..Default::default()
        };
        let merged = merge_token(
            base,
            TokenResponse {
                access_token: "new".to_string(),
                expires_in: Some(3600),
                refresh_token: None,
                scope: Some("a b".to_string()),
            },
        );

        assert_eq!(merged.token.as_deref(), Some("new"));
        assert_eq!(merged.refresh_token.as_deref(), Some("keep-me"));
        assert_eq!(merged.scopes, vec!["a", "b"]);
        assert!(merged.is_valid_at(Utc::now()));
    }

    #[test]
    fn test_client_secrets_sections() {
        let installed: ClientSecretsFile = serde_json::from_str(
            r#"{"installed": {"client_id": "cid", "client_secret": "sec"}}"#,
        )
        .unwrap();
        let secrets = installed.into_secrets().unwrap();
        assert_eq!(secrets.auth_uri, DEFAULT_AUTH_URI);

        let web: ClientSecretsFile =
            serde_json::from_str(r#"{"web": {"client_id": "w", "client_secret": "s"}}"#).unwrap();
        assert_eq!(web.into_secrets().unwrap().client_id, "w");

        let empty: ClientSecretsFile = serde_json::from_str("{}").unwrap();
        assert!(empty.into_secrets().is_none());
    }

    #[test]
    fn test_consent_url_parameters() {
        let secrets = ClientSecrets {
            client_id: "cid".to_string(),
            client_secret: "sec".to_string(),
            auth_uri: DEFAULT_AUTH_URI.to_string(),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
        };

        let url = consent_url(&secrets, "http://localhost:8765/", "st4te").unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(pairs["client_id"], "cid");
        assert_eq!(pairs["redirect_uri"], "http://localhost:8765/");
        assert_eq!(pairs["state"], "st4te");
        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(pairs["scope"].split(' ').count(), 3);
    }

    #[test]
    fn test_parse_redirect() {
        assert_eq!(
            parse_redirect("GET /?state=abc&code=4%2F0Ab HTTP/1.1\r\n", "abc").unwrap(),
            Some("4/0Ab".to_string())
        );
        assert_eq!(parse_redirect("GET /favicon.ico HTTP/1.1", "abc").unwrap(), None);
        assert!(parse_redirect("GET /?state=zzz&code=c HTTP/1.1", "abc").is_err());

        let denied = parse_redirect("GET /?error=access_denied HTTP/1.1", "abc").unwrap_err();
        assert!(denied.to_string().contains("access_denied"));
    }

    #[tokio::test]
    async fn test_redirect_listener_answers_and_closes_each_connection() {
        use tokio::io::AsyncReadExt;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let browser = tokio::spawn(async move {
            let mut pages = Vec::new();
            for request in ["GET /favicon.ico HTTP/1.1\r\n", "GET /?state=s1&code=abc HTTP/1.1\r\n"] {
                let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
                stream.write_all(request.as_bytes()).await.unwrap();
                // Ends only once the listener has shut its side down.
                let mut page = String::new();
                stream.read_to_string(&mut page).await.unwrap();
                pages.push(page);
            }
            pages
        });

        let code = wait_for_code(&listener, "s1").await.unwrap();
        let pages = browser.await.unwrap();

        assert_eq!(code, "abc");
        assert!(pages[0].starts_with("HTTP/1.1 404"));
        assert!(pages[1].contains("The authentication flow has completed"));
    }

    #[tokio::test]
    async fn test_cached_token_from_disk_is_used_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("token.json");
        let expiry = format_expiry(Utc::now() + ChronoDuration::hours(1));
        std::fs::write(
            &token_path,
            serde_json::json!({ "token": "cached-access", "expiry": expiry }).to_string(),
        )
        .unwrap();

        let auth = GoogleAuth::new(dir.path().join("credentials.json"), &token_path);

        assert_eq!(auth.access_token().await.unwrap(), "cached-access");
        assert_eq!(auth.access_token().await.unwrap(), "cached-access");
    }
}
