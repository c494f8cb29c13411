// Process-wide settings gathered from the environment (after `.env` has been
// loaded). Every value has a default so each subcommand can start with an
// empty environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::core::ai::agent::DEFAULT_RECURSION_LIMIT;
use crate::infra::modeling::{DEFAULT_MODELING_SERVER_COMMAND, DEFAULT_TOOL_TIMEOUT_SECS};
use crate::infra::pipeline::{DEFAULT_EXPORT_DIR, DEFAULT_PROPOSAL_PATH};

pub const DEFAULT_DESIGN_MODEL: &str = "claude-3-7-sonnet-20250219";
pub const DEFAULT_CREDENTIALS_PATH: &str = "credentials.json";
pub const DEFAULT_TOKEN_PATH: &str = "token.json";
pub const DEFAULT_EMAIL_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_DUMMY_STL_PATH: &str = "mcp_test/dummy.stl";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub design_model: String,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,

    pub google_credentials_path: PathBuf,
    pub google_token_path: PathBuf,

    pub email_config_file: PathBuf,
    pub dummy_stl_path: PathBuf,

    pub modeling_server_command: String,
    pub modeling_tool_timeout: Duration,
    pub agent_recursion_limit: usize,

    pub model_export_dir: PathBuf,
    pub proposal_path: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let path = |key: &str, default: &str| PathBuf::from(get(key).unwrap_or_else(|| default.to_string()));

        let modeling_tool_timeout = get("MODELING_TOOL_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS);
        let agent_recursion_limit = get("AGENT_RECURSION_LIMIT")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_RECURSION_LIMIT);

        Self {
            design_model: get("DESIGN_MODEL").unwrap_or_else(|| DEFAULT_DESIGN_MODEL.to_string()),
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL"),
            google_credentials_path: path("GOOGLE_CREDENTIALS_PATH", DEFAULT_CREDENTIALS_PATH),
            google_token_path: path("GOOGLE_TOKEN_PATH", DEFAULT_TOKEN_PATH),
            email_config_file: path("EMAIL_CONFIG_FILE", DEFAULT_EMAIL_CONFIG_FILE),
            dummy_stl_path: path("DUMMY_STL_PATH", DEFAULT_DUMMY_STL_PATH),
            modeling_server_command: get("MODELING_SERVER_COMMAND")
                .unwrap_or_else(|| DEFAULT_MODELING_SERVER_COMMAND.to_string()),
            modeling_tool_timeout: Duration::from_secs(modeling_tool_timeout),
            agent_recursion_limit,
            model_export_dir: path("MODEL_EXPORT_DIR", DEFAULT_EXPORT_DIR),
            proposal_path: path("PROPOSAL_PATH", DEFAULT_PROPOSAL_PATH),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);

        assert_eq!(config.design_model, DEFAULT_DESIGN_MODEL);
        assert_eq!(config.modeling_server_command, "uvx freecad-mcp");
        assert_eq!(config.modeling_tool_timeout, Duration::from_secs(120));
        assert_eq!(config.agent_recursion_limit, 25);
        assert_eq!(config.proposal_path, PathBuf::from("proposal.md"));
        assert_eq!(config.model_export_dir, PathBuf::from("model_exports"));
        assert!(config.anthropic_api_key.is_none());
    }

    #[test]
    fn test_overrides_and_bad_numbers() {
        let config = config_from(&[
            ("DESIGN_MODEL", "gpt-4o"),
            ("OPENAI_API_KEY", "sk-test"),
            ("ANTHROPIC_API_KEY", "  "),
            ("MODELING_TOOL_TIMEOUT_SECS", "30"),
            ("AGENT_RECURSION_LIMIT", "many"),
            ("PROPOSAL_PATH", "out/proposal.md"),
        ]);

        assert_eq!(config.design_model, "gpt-4o");
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
        assert!(config.anthropic_api_key.is_none());
        assert_eq!(config.modeling_tool_timeout, Duration::from_secs(30));
        assert_eq!(config.agent_recursion_limit, 25);
        assert_eq!(config.proposal_path, PathBuf::from("out/proposal.md"));
    }
}
