// MCP layer - the stdio server that exposes Drive, Docs and e-mail to an LLM host.
// - `protocol.rs` is the JSON-RPC framing.
// - `tools.rs`, `resources.rs` and `prompts.rs` are the registries.
// - `server.rs` routes requests and owns the stdio loop.

#[path = "protocol.rs"]
pub mod protocol;

#[path = "tools.rs"]
pub mod tools;

#[path = "resources.rs"]
pub mod resources;

#[path = "prompts.rs"]
pub mod prompts;

#[path = "server.rs"]
pub mod server;

pub use server::McpServer;
