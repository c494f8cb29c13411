// `send-email`: mails the contents of a text file from the terminal.

use crate::core::email::{EmailConfig, EmailOverrides, EmailService, MailTransport};
use crate::infra::config::load_email_section;
use clap::Args;
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct EmailArgs {
    /// Text file whose contents become the message body
    #[arg(short, long)]
    pub file: PathBuf,

    /// Recipient address
    #[arg(short, long)]
    pub to: String,

    #[arg(short, long, default_value = "File from MCP server")]
    pub subject: String,

    /// CC recipients (repeatable)
    #[arg(long)]
    pub cc: Vec<String>,

    /// JSON config file with an `email` section
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub server: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long)]
    pub user: Option<String>,

    #[arg(long)]
    pub password: Option<String>,

    #[arg(long)]
    pub sender: Option<String>,

    /// Do not attach the dummy STL model
    #[arg(long)]
    pub no_stl: bool,
}

impl EmailArgs {
    pub fn overrides(&self) -> EmailOverrides {
        EmailOverrides {
            smtp_server: self.server.clone(),
            smtp_port: self.port,
            smtp_user: self.user.clone(),
            smtp_password: self.password.clone(),
            use_tls: None,
            sender_email: self.sender.clone(),
        }
    }
}

/// Returns the process exit code.
pub async fn run_send_email<T: MailTransport>(
    args: &EmailArgs,
    email: &EmailService<T>,
    default_config_file: &Path,
) -> i32 {
    if !args.file.exists() {
        println!("Error: File not found: {}", args.file.display());
        return 1;
    }

    let config_path = args.config.as_deref().unwrap_or(default_config_file);
    let section = load_email_section(config_path).await;
    let config = EmailConfig::from_file_and_env(&args.overrides(), &section);

    println!("Sending email to {}", args.to);
    println!("  with file: {}", args.file.display());
    println!("  subject: {}", args.subject);
    println!("  config: {}", config_path.display());

    let sent = email
        .send_file_content_email(
            &config,
            &args.to,
            &args.subject,
            &args.file.to_string_lossy(),
            &args.cc,
            !args.no_stl,
        )
        .await;

    if sent {
        println!("Email sent successfully!");
        0
    } else {
        println!("Failed to send email. Check your SMTP settings.");
        1
    }
}
