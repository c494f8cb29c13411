use crate::core::email::EmailFileSection;
use serde::Deserialize;
use std::path::Path;

/// Top-level layout of `config.json`. Only the `email` section is read.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    email: EmailFileSection,
}

/// Loads the `email` section of a JSON config file.
///
/// A missing or unreadable file is logged and yields an empty section, so
/// the environment still gets a chance to supply every field.
pub async fn load_email_section(path: impl AsRef<Path>) -> EmailFileSection {
    let path = path.as_ref();

    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("Email config file {} not found, using environment", path.display());
            return EmailFileSection::default();
        }
        Err(e) => {
            tracing::error!("Failed to read email config {}: {}", path.display(), e);
            return EmailFileSection::default();
        }
    };

    match serde_json::from_str::<ConfigFile>(&content) {
        Ok(file) => {
            tracing::info!("Loaded email configuration from {}", path.display());
            file.email
        }
        Err(e) => {
            tracing::error!("Failed to parse email config {}: {}", path.display(), e);
            EmailFileSection::default()
        }
    }
}
