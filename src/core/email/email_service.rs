use super::email_models::{
    EmailAttachment, EmailConfig, LoadedAttachment, OutgoingEmail, SmtpSettings,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Failed to attach file {0}: {1}")]
    Attachment(String, String),

    #[error("Failed to read file {0}: {1}")]
    FileRead(String, String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("SMTP error: {0}")]
    Transport(String),
}

// ============================================================================
// TRANSPORT TRAIT
// ============================================================================

/// Delivers an assembled message over one SMTP session.
///
/// The core never speaks SMTP itself; the infra layer provides the real
/// implementation and tests provide recording fakes.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, settings: &SmtpSettings, email: &OutgoingEmail)
        -> Result<(), EmailError>;
}

#[async_trait]
impl MailTransport for Box<dyn MailTransport> {
    async fn deliver(
        &self,
        settings: &SmtpSettings,
        email: &OutgoingEmail,
    ) -> Result<(), EmailError> {
        (**self).deliver(settings, email).await
    }
}

// ============================================================================
// EMAIL SERVICE
// ============================================================================

pub const DUMMY_STL_FILENAME: &str = "dummy.stl";
pub const MAIL_TRAILER: &str = "This email was sent via the MCP Google Drive server.";

pub struct EmailService<T: MailTransport> {
    transport: T,
    dummy_stl_path: PathBuf,
}

impl<T: MailTransport> EmailService<T> {
    pub fn new(transport: T, dummy_stl_path: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            dummy_stl_path: dummy_stl_path.into(),
        }
    }

    /// Reads every attachment and assembles the message.
    pub async fn build_email(
        &self,
        settings: &SmtpSettings,
        to: &str,
        subject: &str,
        body: &str,
        attachments: &[EmailAttachment],
        cc: &[String],
    ) -> Result<OutgoingEmail, EmailError> {
        let mut loaded = Vec::with_capacity(attachments.len());

        for attachment in attachments {
            let data = tokio::fs::read(&attachment.file_path).await.map_err(|e| {
                tracing::error!("Failed to attach file {}: {}", attachment.file_path, e);
                EmailError::Attachment(attachment.file_path.clone(), e.to_string())
            })?;

            tracing::info!("Attached file: {}", attachment.filename);
            loaded.push(LoadedAttachment {
                filename: attachment.filename.clone(),
                content_type: attachment.content_type.clone(),
                data,
            });
        }

        Ok(OutgoingEmail {
            from: settings.sender.clone(),
            to: to.to_string(),
            cc: cc.to_vec(),
            subject: subject.to_string(),
            body: body.to_string(),
            attachments: loaded,
        })
    }

    /// Sends one message.
    ///
    /// Returns `Ok(false)` when the configuration is incomplete (nothing is
    /// sent) or when the SMTP session fails. A missing attachment is an
    /// error because the caller named a file that does not exist.
    pub async fn send_email(
        &self,
        config: &EmailConfig,
        to: &str,
        subject: &str,
        body: &str,
        attachments: &[EmailAttachment],
        cc: &[String],
    ) -> Result<bool, EmailError> {
        let Some(settings) = config.validate() else {
            tracing::error!(
                "Email configuration is incomplete (missing: {}). Check SMTP settings.",
                config.missing_fields().join(", ")
            );
            return Ok(false);
        };

        let email = self
            .build_email(&settings, to, subject, body, attachments, cc)
            .await?;

        match self.transport.deliver(&settings, &email).await {
            Ok(()) => {
                tracing::info!("Email sent successfully to {}", to);
                Ok(true)
            }
            Err(e) => {
                tracing::error!("Failed to send email: {}", e);
                Ok(false)
            }
        }
    }

    /// Mails the text of a local file, attaching the file itself and
    /// optionally the dummy STL model.
    ///
    /// Every failure is logged and reported as `false`.
    pub async fn send_file_content_email(
        &self,
        config: &EmailConfig,
        to: &str,
        subject: &str,
        file_path: &str,
        cc: &[String],
        include_dummy_stl: bool,
    ) -> bool {
        match self
            .try_send_file_content(config, to, subject, file_path, cc, include_dummy_stl)
            .await
        {
            Ok(sent) => sent,
            Err(e) => {
                tracing::error!("Failed to send file content email: {}", e);
                false
            }
        }
    }

    async fn try_send_file_content(
        &self,
        config: &EmailConfig,
        to: &str,
        subject: &str,
        file_path: &str,
        cc: &[String],
        include_dummy_stl: bool,
    ) -> Result<bool, EmailError> {
        let content = tokio::fs::read_to_string(file_path)
            .await
            .map_err(|e| EmailError::FileRead(file_path.to_string(), e.to_string()))?;

        let filename = base_name(file_path);
        let body = file_content_body(&filename, &content);

        let mut attachments =
            vec![EmailAttachment::new(file_path, filename.clone()).with_content_type("text/plain")];

        if include_dummy_stl {
            if tokio::fs::try_exists(&self.dummy_stl_path)
                .await
                .unwrap_or(false)
            {
                attachments.push(
                    EmailAttachment::new(
                        self.dummy_stl_path.to_string_lossy().to_string(),
                        DUMMY_STL_FILENAME,
                    )
                    .with_content_type("model/stl"),
                );
            } else {
                tracing::debug!(
                    "Dummy STL not found at {}, sending without it",
                    self.dummy_stl_path.display()
                );
            }
        }

        self.send_email(config, to, subject, &body, &attachments, cc)
            .await
    }
}

/// Body used when mailing a file's contents.
pub fn file_content_body(filename: &str, content: &str) -> String {
    let mut body = format!("File: {}\n\n", filename);
    body.push_str("=============== FILE CONTENTS ===============\n\n");
    body.push_str(content);
    body.push_str("\n\n============================================\n");
    body.push('\n');
    body.push_str(MAIL_TRAILER);
    body
}

fn base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}
