// Modeling infra.
// - `mcp_stdio_client.rs` drives the external modeling server over stdio.
// - `modeling_agent.rs` builds the tool-using agent on top of it.

pub mod mcp_stdio_client;
pub mod modeling_agent;

pub use mcp_stdio_client::{DEFAULT_MODELING_SERVER_COMMAND, DEFAULT_TOOL_TIMEOUT_SECS};
pub use modeling_agent::McpAgentBuilder;
