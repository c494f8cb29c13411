use crate::core::email::{EmailError, MailTransport, OutgoingEmail, SmtpSettings};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends mail over SMTP, upgrading with STARTTLS when the settings ask for it.
#[derive(Debug, Default, Clone)]
pub struct SmtpMailTransport;

impl SmtpMailTransport {
    pub fn new() -> Self {
        Self
    }
}

fn mailbox(address: &str) -> Result<Mailbox, EmailError> {
    address
        .trim()
        .parse::<Mailbox>()
        .map_err(|e| EmailError::InvalidMessage(format!("invalid address '{}': {}", address, e)))
}

fn content_type(raw: &str) -> Result<ContentType, EmailError> {
    ContentType::parse(raw)
        .or_else(|_| ContentType::parse("application/octet-stream"))
        .map_err(|e| EmailError::InvalidMessage(e.to_string()))
}

/// Builds a multipart/mixed message: the plain body first, then every attachment.
pub fn build_message(email: &OutgoingEmail) -> Result<Message, EmailError> {
    let mut builder = Message::builder()
        .from(mailbox(&email.from)?)
        .to(mailbox(&email.to)?)
        .subject(email.subject.clone())
        .date_now();

    for cc in &email.cc {
        builder = builder.cc(mailbox(cc)?);
    }

    let mut body = MultiPart::mixed().singlepart(SinglePart::plain(email.body.clone()));
    for attachment in &email.attachments {
        body = body.singlepart(
            Attachment::new(attachment.filename.clone())
                .body(attachment.data.clone(), content_type(&attachment.content_type)?),
        );
    }

    builder
        .multipart(body)
        .map_err(|e| EmailError::InvalidMessage(e.to_string()))
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn deliver(
        &self,
        settings: &SmtpSettings,
        email: &OutgoingEmail,
    ) -> Result<(), EmailError> {
        let message = build_message(email)?;

        let builder = if settings.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.server)
                .map_err(|e| EmailError::Transport(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.server)
        };

        let mailer = builder
            .port(settings.port)
            .credentials(Credentials::new(
                settings.user.clone(),
                settings.password.clone(),
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        tracing::debug!(
            "Connecting to {}:{} (STARTTLS: {})",
            settings.server,
            settings.port,
            settings.use_tls
        );
        tracing::info!(
            "Sending '{}' to {}",
            email.subject,
            email.recipients().join(", ")
        );

        mailer
            .send(message)
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::email::email_models::LoadedAttachment;

    fn email() -> OutgoingEmail {
        OutgoingEmail {
            from: "sender@example.com".to_string(),
            to: "to@example.com".to_string(),
            cc: vec!["cc1@example.com".to_string(), "cc2@example.com".to_string()],
            subject: "Drive report".to_string(),
            body: "See attached.".to_string(),
            attachments: vec![LoadedAttachment {
                filename: "dummy.stl".to_string(),
                content_type: "model/stl".to_string(),
                data: b"solid dummy".to_vec(),
            }],
        }
    }

    #[test]
    fn test_message_headers_and_envelope() {
        let message = build_message(&email()).unwrap();

        let recipients: Vec<String> = message
            .envelope()
            .to()
            .iter()
            .map(|a| a.to_string())
            .collect();
        assert_eq!(
            recipients,
            vec!["to@example.com", "cc1@example.com", "cc2@example.com"]
        );

        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: Drive report"));
        assert!(raw.contains("Cc: cc1@example.com, cc2@example.com"));
        assert!(raw.contains("Date: "));
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("filename=\"dummy.stl\""));
        assert!(raw.contains("model/stl"));
    }

    #[test]
    fn test_invalid_address_is_rejected() {
        let mut bad = email();
        bad.to = "not an address".to_string();

        assert!(matches!(
            build_message(&bad),
            Err(EmailError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_unknown_content_type_falls_back() {
        let mut odd = email();
        odd.attachments[0].content_type = "???".to_string();

        let raw = String::from_utf8(build_message(&odd).unwrap().formatted()).unwrap();
        assert!(raw.contains("application/octet-stream"));
    }
}
