// Entry point of mecha_drive.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (Google REST, SMTP, LLM APIs, subprocesses)
// - `mcp/` = The MCP stdio server adapter
// - `console/` = Terminal adapters (design chat, operator commands)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Hand control to the front-end picked on the command line

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "console/console_layer.rs"]
mod console;
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;
#[path = "mcp/mcp_layer.rs"]
mod mcp;

mod app_config;

use crate::app_config::AppConfig;
use crate::console::{run_drive_test, run_send_email, DesignChat, DriveArgs, EmailArgs};
use crate::core::ai::{AiConfig, AiService};
use crate::core::email::EmailService;
use crate::core::pipeline::DesignPipeline;
use crate::core::workspace::WorkspaceService;
use crate::infra::ai::select_provider;
use crate::infra::config::load_email_section;
use crate::infra::email::SmtpMailTransport;
use crate::infra::google::{DocsClient, DriveClient, GoogleAuth, HttpFetcher};
use crate::infra::modeling::McpAgentBuilder;
use crate::infra::pipeline::FileArtifactStore;
use crate::mcp::McpServer;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const CALCULATION_SYSTEM_PROMPT: &str = "You are a mechanical design engineer. Work out \
    dimensions, loads, materials and tolerances from the user's request and state every \
    specification explicitly.";
const DOCUMENTATION_SYSTEM_PROMPT: &str = "You are a technical writer who turns engineering \
    notes into clear Markdown design proposals.";

#[derive(Parser)]
#[command(name = "mecha_drive")]
#[command(about = "Google Drive/Docs MCP server, SMTP mailer and mechanical design assistant", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the Google Drive & Docs MCP server on stdio.
    Serve,

    /// Mail the contents of a text file.
    SendEmail(EmailArgs),

    /// Exercise Drive: create a folder, upload, share and list.
    DriveTest(DriveArgs),

    /// Interactive design chat: calculate, model, document.
    Design,
}

type GoogleWorkspace = WorkspaceService<DriveClient, DocsClient>;

fn google_workspace(auth: Arc<GoogleAuth>) -> GoogleWorkspace {
    WorkspaceService::new(
        DriveClient::new(Arc::clone(&auth)),
        DocsClient::new(auth),
        Box::new(HttpFetcher::new()),
    )
}

fn email_service(config: &AppConfig) -> EmailService<SmtpMailTransport> {
    EmailService::new(SmtpMailTransport::new(), config.dummy_stl_path.clone())
}

async fn serve(config: &AppConfig) -> anyhow::Result<()> {
    let auth = Arc::new(GoogleAuth::new(
        config.google_credentials_path.clone(),
        config.google_token_path.clone(),
    ));

    // Authenticate up front so a consent flow happens before the host starts
    // sending requests.
    let workspace = match auth.access_token().await {
        Ok(_) => {
            tracing::info!("Google API services initialized");
            Ok(google_workspace(auth))
        }
        Err(e) => Err(e.to_string()),
    };

    let email_file = load_email_section(&config.email_config_file).await;
    let server = McpServer::new(workspace, email_service(config), email_file);
    server.run_stdio().await?;
    Ok(())
}

async fn drive_test(config: &AppConfig, args: &DriveArgs) -> anyhow::Result<i32> {
    let auth = Arc::new(GoogleAuth::new(
        config.google_credentials_path.clone(),
        config.google_token_path.clone(),
    ));
    if let Err(e) = auth.access_token().await {
        println!("Error: {}", e);
        return Ok(1);
    }
    Ok(run_drive_test(args, &google_workspace(auth)).await)
}

async fn design(config: &AppConfig) -> anyhow::Result<()> {
    let provider = select_provider(
        config.anthropic_api_key.clone(),
        config.openai_api_key.clone(),
        config.openai_base_url.clone(),
    );
    let ai_config = AiConfig::new(config.design_model.clone());

    let calculation = AiService::new(
        Arc::clone(&provider),
        CALCULATION_SYSTEM_PROMPT.to_string(),
        ai_config.clone(),
    );
    let documentation = AiService::new(
        Arc::clone(&provider),
        DOCUMENTATION_SYSTEM_PROMPT.to_string(),
        ai_config.clone(),
    );
    let builder = McpAgentBuilder::new(
        provider,
        ai_config,
        config.modeling_server_command.clone(),
        config.modeling_tool_timeout,
        config.agent_recursion_limit,
    );
    let store = FileArtifactStore::new(config.model_export_dir.clone(), config.proposal_path.clone());

    let pipeline = DesignPipeline::new(calculation, documentation, Box::new(builder), store);
    let mut chat = DesignChat::new(&pipeline);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    chat.run(stdin, &mut tokio::io::stdout()).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Logs go to stderr; stdout belongs to the MCP protocol.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env();

    let exit_code = match &cli.command {
        Command::Serve => serve(&config).await.map(|_| 0)?,
        Command::SendEmail(args) => {
            run_send_email(args, &email_service(&config), &config.email_config_file).await
        }
        Command::DriveTest(args) => drive_test(&config, args).await?,
        Command::Design => design(&config).await.map(|_| 0)?,
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}
