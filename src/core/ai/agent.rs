// =============================================================================
// TOOL-USING AGENT
// =============================================================================
//
// A ReAct-style loop: the model sees the conversation plus the available
// tools, asks for tool calls, sees their results, and repeats until it
// answers in plain text. Each model call counts as one step. Running out of
// steps is an error, and its message always contains `RECURSION_LIMIT_MARKER`
// so callers can recognise it from the text alone.

use super::ai_service::AiProvider;
use super::models::{AiConfig, AiMessage, AiTool, AiToolCall};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_RECURSION_LIMIT: usize = 25;
pub const RECURSION_LIMIT_MARKER: &str = "Recursion limit";

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("AI provider error: {0}")]
    Provider(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Agent initialization failed: {0}")]
    Init(String),

    #[error("Recursion limit of {0} reached without hitting a stop condition")]
    RecursionLimit(usize),
}

impl AgentError {
    pub fn is_recursion_limit(&self) -> bool {
        self.to_string().contains(RECURSION_LIMIT_MARKER)
    }
}

/// Something that can run the tools an agent is given.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<AiTool>, AgentError>;

    /// Runs one tool and renders its result as text.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String, AgentError>;
}

/// Text a tool returned during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub tool: String,
    pub output: String,
}

/// A completed agent run.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub final_text: String,
    pub tool_outputs: Vec<ToolOutput>,
    pub steps: usize,
}

pub struct ToolAgent<P: AiProvider, E: ToolExecutor> {
    provider: P,
    executor: E,
    system_prompt: String,
    config: AiConfig,
    recursion_limit: usize,
    tools: Vec<AiTool>,
}

impl<P: AiProvider, E: ToolExecutor> ToolAgent<P, E> {
    /// Builds the agent and discovers the executor's tools once.
    pub async fn new(
        provider: P,
        executor: E,
        system_prompt: String,
        config: AiConfig,
        recursion_limit: usize,
    ) -> Result<Self, AgentError> {
        let tools = executor.list_tools().await?;
        tracing::info!(
            "Agent ready with {} tool(s): {}",
            tools.len(),
            tools
                .iter()
                .map(|t| t.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Self {
            provider,
            executor,
            system_prompt,
            config,
            recursion_limit: recursion_limit.max(1),
            tools,
        })
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub async fn run(&self, prompt: &str) -> Result<AgentRun, AgentError> {
        let mut messages = vec![
            AiMessage::system(self.system_prompt.clone()),
            AiMessage::user(prompt),
        ];
        let mut tool_outputs = Vec::new();

        for step in 1..=self.recursion_limit {
            let response = self
                .provider
                .chat_complete(&messages, &self.tools, &self.config)
                .await
                .map_err(|e| AgentError::Provider(e.to_string()))?;

            if response.tool_calls.is_empty() {
                tracing::debug!("Agent finished after {} step(s)", step);
                return Ok(AgentRun {
                    final_text: response.content,
                    tool_outputs,
                    steps: step,
                });
            }

            messages.push(AiMessage::assistant_with_calls(
                response.content,
                response.tool_calls.clone(),
            ));

            for call in response.tool_calls {
                let output = self.execute(&call).await;
                messages.push(AiMessage::tool_result(call.id.clone(), output.clone()));
                tool_outputs.push(ToolOutput {
                    tool: call.name,
                    output,
                });
            }
        }

        tracing::warn!(
            "Agent stopped after {} steps without a final answer",
            self.recursion_limit
        );
        Err(AgentError::RecursionLimit(self.recursion_limit))
    }

    // Tool failures go back to the model as text so it can recover.
    async fn execute(&self, call: &AiToolCall) -> String {
        tracing::info!("Agent calling tool {}", call.name);
        match self
            .executor
            .call_tool(&call.name, call.arguments.clone())
            .await
        {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("Tool {} failed: {}", call.name, e);
                format!("Error: {}", e)
            }
        }
    }
}
