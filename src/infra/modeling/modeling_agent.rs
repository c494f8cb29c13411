use super::mcp_stdio_client::McpStdioClient;
use crate::core::ai::{AgentError, AiConfig, AiProvider, ToolAgent};
use crate::core::pipeline::{AgentBuilder, ModelingAgent};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

const MODELING_SYSTEM_PROMPT: &str = "You are a CAD modeling assistant operating FreeCAD through \
     the provided tools. Build the requested part step by step, export it when asked, and finish \
     with a short summary of what was created.";

/// Spawns the modeling server and wraps it in a [`ToolAgent`].
pub struct McpAgentBuilder {
    provider: Arc<dyn AiProvider>,
    config: AiConfig,
    server_command: String,
    tool_timeout: Duration,
    recursion_limit: usize,
}

impl McpAgentBuilder {
    pub fn new(
        provider: Arc<dyn AiProvider>,
        config: AiConfig,
        server_command: String,
        tool_timeout: Duration,
        recursion_limit: usize,
    ) -> Self {
        Self {
            provider,
            config,
            server_command,
            tool_timeout,
            recursion_limit,
        }
    }
}

#[async_trait]
impl AgentBuilder for McpAgentBuilder {
    async fn build(&self) -> Result<Arc<dyn ModelingAgent>, AgentError> {
        let client = McpStdioClient::spawn(&self.server_command, self.tool_timeout).await?;
        let agent = ToolAgent::new(
            self.provider.clone(),
            client,
            MODELING_SYSTEM_PROMPT.to_string(),
            self.config.clone(),
            self.recursion_limit,
        )
        .await
        .map_err(|e| AgentError::Init(e.to_string()))?;

        Ok(Arc::new(agent))
    }
}
