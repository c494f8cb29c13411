use serde::Deserialize;

/// Default SMTP submission port when nothing else is configured.
pub const DEFAULT_SMTP_PORT: u16 = 587;

// ============================================================================
// CONFIGURATION SOURCES
// ============================================================================
// An SMTP setting can come from three places. They are resolved field by field:
// 1. Explicit arguments (tool input, CLI flags)
// 2. The `email` section of the JSON config file
// 3. Environment variables

/// Values passed explicitly by the caller. `None` means "not provided".
#[derive(Debug, Clone, Default)]
pub struct EmailOverrides {
    pub smtp_server: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    pub use_tls: Option<bool>,
    pub sender_email: Option<String>,
}

/// The `email` section of `config.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailFileSection {
    #[serde(default)]
    pub smtp_server: Option<String>,
    #[serde(default)]
    pub smtp_port: Option<u16>,
    #[serde(default)]
    pub smtp_user: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default)]
    pub use_tls: Option<bool>,
    #[serde(default)]
    pub sender_email: Option<String>,
}

// ============================================================================
// RESOLVED CONFIGURATION
// ============================================================================

/// SMTP configuration after precedence has been applied.
///
/// Fields stay optional here: a config is allowed to be incomplete until a
/// send is attempted, at which point [`EmailConfig::validate`] decides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailConfig {
    pub smtp_server: Option<String>,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    pub use_tls: bool,
    pub sender_email: Option<String>,
}

/// A complete set of SMTP settings, ready to open a session with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub server: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub use_tls: bool,
    pub sender: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl EmailConfig {
    /// Resolves every field as `override > file > environment`.
    ///
    /// `env` is a lookup function so callers (and tests) decide where the
    /// environment comes from. Empty strings count as "not set" at every level.
    pub fn resolve<F>(overrides: &EmailOverrides, file: &EmailFileSection, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let smtp_server = non_empty(overrides.smtp_server.clone())
            .or_else(|| non_empty(file.smtp_server.clone()))
            .or_else(|| non_empty(env("SMTP_SERVER")));

        let smtp_port = overrides
            .smtp_port
            .or(file.smtp_port)
            .or_else(|| env("SMTP_PORT").and_then(|p| p.trim().parse::<u16>().ok()))
            .unwrap_or(DEFAULT_SMTP_PORT);

        let smtp_user = non_empty(overrides.smtp_user.clone())
            .or_else(|| non_empty(file.smtp_user.clone()))
            .or_else(|| non_empty(env("SMTP_USER")));

        let smtp_password = non_empty(overrides.smtp_password.clone())
            .or_else(|| non_empty(file.smtp_password.clone()))
            .or_else(|| non_empty(env("SMTP_PASSWORD")));

        let use_tls = overrides.use_tls.or(file.use_tls).unwrap_or_else(|| {
            env("SMTP_USE_TLS")
                .map(|v| v.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(true)
        });

        // The sender falls back to the login user when nothing names it.
        let sender_email = non_empty(overrides.sender_email.clone())
            .or_else(|| non_empty(file.sender_email.clone()))
            .or_else(|| non_empty(env("SENDER_EMAIL")))
            .or_else(|| smtp_user.clone());

        Self {
            smtp_server,
            smtp_port,
            smtp_user,
            smtp_password,
            use_tls,
            sender_email,
        }
    }

    /// Resolves against the process environment.
    pub fn from_file_and_env(overrides: &EmailOverrides, file: &EmailFileSection) -> Self {
        Self::resolve(overrides, file, |key| std::env::var(key).ok())
    }

    /// Names of the required fields that are still missing.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.smtp_server.is_none() {
            missing.push("smtp_server");
        }
        if self.smtp_port == 0 {
            missing.push("smtp_port");
        }
        if self.smtp_user.is_none() {
            missing.push("smtp_user");
        }
        if self.smtp_password.is_none() {
            missing.push("smtp_password");
        }
        if self.sender_email.is_none() {
            missing.push("sender_email");
        }
        missing
    }

    /// Returns complete settings, or `None` if any required field is absent.
    pub fn validate(&self) -> Option<SmtpSettings> {
        if !self.missing_fields().is_empty() {
            return None;
        }

        Some(SmtpSettings {
            server: self.smtp_server.clone()?,
            port: self.smtp_port,
            user: self.smtp_user.clone()?,
            password: self.smtp_password.clone()?,
            use_tls: self.use_tls,
            sender: self.sender_email.clone()?,
        })
    }
}

// ============================================================================
// MESSAGES
// ============================================================================

/// A file to attach, as named by the caller.
#[derive(Debug, Clone)]
pub struct EmailAttachment {
    pub file_path: String,
    pub filename: String,
    pub content_type: String,
}

impl EmailAttachment {
    pub fn new(file_path: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            filename: filename.into(),
            content_type: "application/octet-stream".to_string(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

/// An attachment whose bytes have been read from disk.
#[derive(Debug, Clone)]
pub struct LoadedAttachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// A fully assembled message handed to the transport.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<LoadedAttachment>,
}

impl OutgoingEmail {
    /// Envelope recipients: the primary address followed by every CC.
    pub fn recipients(&self) -> Vec<String> {
        let mut recipients = vec![self.to.clone()];
        recipients.extend(self.cc.iter().cloned());
        recipients
    }
}
