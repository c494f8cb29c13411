pub mod agent;
pub mod ai_service;
pub mod models;

pub use agent::{AgentError, AgentRun, ToolAgent, ToolExecutor};
pub use ai_service::{AiProvider, AiService};
pub use models::{AiConfig, AiMessage, AiProviderResponse, AiTool, AiToolCall};
