// =============================================================================
// MCP STDIO CLIENT
// =============================================================================
//
// Runs the modeling server as a child process and talks newline-delimited
// JSON-RPC to it over stdin/stdout. The child is spawned once, handshaked,
// and kept for the whole session. Requests are serialized through a mutex so
// a response is always read by the caller that sent the request.

use crate::core::ai::{AgentError, AiTool, ToolExecutor};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

pub const DEFAULT_MODELING_SERVER_COMMAND: &str = "uvx freecad-mcp";
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 120;

const PROTOCOL_VERSION: &str = "2024-11-05";
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(60);

struct Connection {
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: i64,
    // Held so the child is killed when the client is dropped.
    _child: Child,
}

impl Connection {
    async fn send(&mut self, message: &Value) -> Result<(), AgentError> {
        let mut line = message.to_string();
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| AgentError::Tool(format!("Failed to write to modeling server: {}", e)))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| AgentError::Tool(format!("Failed to write to modeling server: {}", e)))
    }

    async fn read_message(&mut self) -> Result<Value, AgentError> {
        loop {
            let mut line = String::new();
            let read = self
                .reader
                .read_line(&mut line)
                .await
                .map_err(|e| AgentError::Tool(format!("Failed to read from modeling server: {}", e)))?;
            if read == 0 {
                return Err(AgentError::Tool("Modeling server closed its output".to_string()));
            }

            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(message) => return Ok(message),
                Err(_) => tracing::debug!("Ignoring non-JSON line from modeling server: {}", line),
            }
        }
    }

    /// Sends a request and waits for the response with the same id,
    /// skipping notifications and stale responses.
    async fn request(
        &mut self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, AgentError> {
        let id = self.next_id;
        self.next_id += 1;
        self.send(&json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }))
            .await?;

        let response = tokio::time::timeout(timeout, async {
            loop {
                let message = self.read_message().await?;
                match message.get("id").and_then(Value::as_i64) {
                    Some(got) if got == id => return Ok::<_, AgentError>(message),
                    Some(got) => tracing::debug!("Skipping response to request {}", got),
                    None => tracing::debug!(
                        "Skipping notification: {}",
                        message["method"].as_str().unwrap_or("unknown")
                    ),
                }
            }
        })
        .await
        .map_err(|_| {
            AgentError::Tool(format!(
                "Modeling server did not answer '{}' within {}s",
                method,
                timeout.as_secs()
            ))
        })??;

        if let Some(error) = response.get("error") {
            return Err(AgentError::Tool(format!(
                "Modeling server error {}: {}",
                error["code"].as_i64().unwrap_or(0),
                error["message"].as_str().unwrap_or("unknown")
            )));
        }
        response
            .get("result")
            .cloned()
            .ok_or_else(|| AgentError::Tool(format!("Response to '{}' has no result", method)))
    }
}

pub struct McpStdioClient {
    connection: Mutex<Connection>,
    call_timeout: Duration,
}

impl McpStdioClient {
    /// Spawns `command` (split with shell quoting rules) and performs the
    /// MCP handshake.
    pub async fn spawn(command: &str, call_timeout: Duration) -> Result<Self, AgentError> {
        let parts = shlex::split(command)
            .ok_or_else(|| AgentError::Init(format!("Malformed modeling server command: {}", command)))?;
        let (program, args) = parts
            .split_first()
            .ok_or_else(|| AgentError::Init("Modeling server command is empty".to_string()))?;

        tracing::info!("Starting modeling server: {}", command);
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AgentError::Init(format!("Failed to start '{}': {}", program, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AgentError::Init("Modeling server has no stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Init("Modeling server has no stdout".to_string()))?;

        // The pipe must be drained or the child blocks once it fills up.
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: "modeling_server", "{}", line);
                }
            });
        }

        let mut connection = Connection {
            stdin,
            reader: BufReader::new(stdout),
            next_id: 1,
            _child: child,
        };

        let init = connection
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": { "name": env!("CARGO_PKG_NAME"), "version": env!("CARGO_PKG_VERSION") }
                }),
                HANDSHAKE_TIMEOUT,
            )
            .await
            .map_err(|e| AgentError::Init(e.to_string()))?;
        tracing::info!(
            "Connected to modeling server {} {}",
            init["serverInfo"]["name"].as_str().unwrap_or("unknown"),
            init["serverInfo"]["version"].as_str().unwrap_or("")
        );

        connection
            .send(&json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
            .await
            .map_err(|e| AgentError::Init(e.to_string()))?;

        Ok(Self {
            connection: Mutex::new(connection),
            call_timeout,
        })
    }
}

/// Converts one `tools/list` entry.
pub fn parse_tool(tool: &Value) -> Option<AiTool> {
    Some(AiTool {
        name: tool["name"].as_str()?.to_string(),
        description: tool["description"].as_str().unwrap_or_default().to_string(),
        input_schema: tool
            .get("inputSchema")
            .cloned()
            .unwrap_or_else(|| json!({ "type": "object", "properties": {} })),
    })
}

/// Flattens a `tools/call` result to text. Images become data URI literals
/// so downstream extraction can find them.
pub fn render_content(result: &Value) -> String {
    let Some(blocks) = result["content"].as_array() else {
        return result.to_string();
    };

    blocks
        .iter()
        .map(|block| match block["type"].as_str() {
            Some("text") => block["text"].as_str().unwrap_or_default().to_string(),
            Some("image") => format!(
                "data:{};base64,{}",
                block["mimeType"].as_str().unwrap_or("image/png"),
                block["data"].as_str().unwrap_or_default()
            ),
            Some("resource") => block["resource"]["text"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| block["resource"].to_string()),
            _ => block.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl ToolExecutor for McpStdioClient {
    async fn list_tools(&self) -> Result<Vec<AiTool>, AgentError> {
        let mut connection = self.connection.lock().await;
        let result = connection
            .request("tools/list", json!({}), HANDSHAKE_TIMEOUT)
            .await?;

        let tools: Vec<AiTool> = result["tools"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(parse_tool)
            .collect();
        tracing::info!("Modeling server offers {} tool(s)", tools.len());
        Ok(tools)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String, AgentError> {
        tracing::info!("Calling modeling tool {}", name);
        let mut connection = self.connection.lock().await;
        let result = connection
            .request(
                "tools/call",
                json!({ "name": name, "arguments": arguments }),
                self.call_timeout,
            )
            .await?;

        let text = render_content(&result);
        if result["isError"].as_bool().unwrap_or(false) {
            return Err(AgentError::Tool(text));
        }
        Ok(text)
    }
}
