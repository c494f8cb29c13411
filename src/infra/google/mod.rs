// Google infra layer.
// - `oauth.rs` obtains and caches access tokens.
// - `drive_client.rs` and `docs_client.rs` implement the workspace traits over REST.

#[path = "oauth.rs"]
pub mod oauth;

#[path = "http.rs"]
mod http;

#[path = "drive_client.rs"]
pub mod drive_client;

#[path = "docs_client.rs"]
pub mod docs_client;

pub use docs_client::DocsClient;
pub use drive_client::{DriveClient, HttpFetcher};
pub use oauth::GoogleAuth;
