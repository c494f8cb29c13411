pub mod email_models;
pub mod email_service;

pub use email_models::{EmailConfig, EmailFileSection, EmailOverrides, OutgoingEmail, SmtpSettings};
pub use email_service::{EmailError, EmailService, MailTransport};
