// =============================================================================
// MCP SERVER
// =============================================================================
//
// Newline-delimited JSON-RPC over stdin/stdout. Requests are handled one at a
// time in the order they are read. Nothing but protocol messages is written
// to stdout; logs go to stderr.

use super::prompts::{get_prompt, prompt_list};
use super::protocol::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION, PROTOCOL_VERSION, SERVER_NAME,
    SERVER_VERSION,
};
use super::resources::{resource_list, resource_templates};
use super::tools::tool_definitions;
use crate::core::email::{EmailFileSection, EmailService, MailTransport};
use crate::core::workspace::{DocsApi, DriveApi, WorkspaceError, WorkspaceService};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

pub struct McpServer<D: DriveApi, C: DocsApi, T: MailTransport> {
    /// `Err` holds the reason Google services could not be initialized.
    workspace: Result<WorkspaceService<D, C>, String>,
    pub(super) email: EmailService<T>,
    pub(super) email_file: EmailFileSection,
}

impl<D, C, T> McpServer<D, C, T>
where
    D: DriveApi,
    C: DocsApi,
    T: MailTransport,
{
    pub fn new(
        workspace: Result<WorkspaceService<D, C>, String>,
        email: EmailService<T>,
        email_file: EmailFileSection,
    ) -> Self {
        if let Err(e) = &workspace {
            tracing::error!(
                "Failed to initialize Google API services. Server will not work correctly: {}",
                e
            );
        }
        Self {
            workspace,
            email,
            email_file,
        }
    }

    pub(super) fn workspace(&self) -> Result<&WorkspaceService<D, C>, WorkspaceError> {
        self.workspace.as_ref().map_err(|e| {
            WorkspaceError::Auth(format!("Google API services are not initialized: {}", e))
        })
    }

    /// Handles one input line. Returns the serialized response, or `None`
    /// for notifications and blank lines.
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let response = match serde_json::from_str::<Value>(line) {
            Err(e) => {
                tracing::warn!("Unparseable message: {}", e);
                Some(JsonRpcResponse::error(Value::Null, JsonRpcError::parse_error()))
            }
            Ok(raw) => match serde_json::from_value::<JsonRpcRequest>(raw.clone()) {
                Err(_) => Some(JsonRpcResponse::error(
                    raw.get("id").cloned().unwrap_or(Value::Null),
                    JsonRpcError::invalid_request(),
                )),
                Ok(request) => self.handle_request(request).await,
            },
        };

        response.map(|r| {
            serde_json::to_string(&r).unwrap_or_else(|e| {
                tracing::error!("Failed to serialize response: {}", e);
                json!({
                    "jsonrpc": JSONRPC_VERSION,
                    "id": r.id,
                    "error": JsonRpcError::internal_error(),
                })
                .to_string()
            })
        })
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.jsonrpc != JSONRPC_VERSION {
            tracing::warn!(
                "Rejecting {} with jsonrpc version {:?}",
                request.method,
                request.jsonrpc
            );
            return request
                .id
                .map(|id| JsonRpcResponse::error(id, JsonRpcError::invalid_request()));
        }
        if request.is_notification() {
            match request.method.as_str() {
                "notifications/initialized" => tracing::info!("Client initialized"),
                other => tracing::debug!("Ignoring notification {}", other),
            }
            return None;
        }
        let id = request.id.clone().unwrap_or(Value::Null);

        tracing::debug!("Request {} (id {})", request.method, id);
        let outcome = self.dispatch(&request.method, request.params).await;
        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => {
                tracing::warn!("{} failed: {}", request.method, error.message);
                JsonRpcResponse::error(id, error)
            }
        })
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params = match params {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(JsonRpcError::invalid_params("params must be an object")),
        };

        match method {
            "initialize" => Ok(initialize_result(&params)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": tool_definitions() })),
            "tools/call" => {
                let name = params
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| JsonRpcError::invalid_params("Missing tool name"))?;
                let arguments = match params.get("arguments") {
                    None | Some(Value::Null) => json!({}),
                    Some(args) => args.clone(),
                };
                Ok(self.call_tool(name, arguments).await?.to_value())
            }
            "resources/list" => Ok(resource_list()),
            "resources/templates/list" => Ok(resource_templates()),
            "resources/read" => {
                let uri = params
                    .get("uri")
                    .and_then(Value::as_str)
                    .ok_or_else(|| JsonRpcError::invalid_params("Missing resource uri"))?;
                self.read_resource(uri).await
            }
            "prompts/list" => Ok(prompt_list()),
            "prompts/get" => {
                let name = params
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| JsonRpcError::invalid_params("Missing prompt name"))?;
                let empty = Map::new();
                let arguments = params
                    .get("arguments")
                    .and_then(Value::as_object)
                    .unwrap_or(&empty);
                get_prompt(name, arguments)
            }
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }

    /// Serves until the input closes.
    pub async fn run<R, W>(&self, input: R, mut output: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(response) = self.handle_line(&line).await {
                output.write_all(response.as_bytes()).await?;
                output.write_all(b"\n").await?;
                output.flush().await?;
            }
        }
        tracing::info!("Input closed, shutting down");
        Ok(())
    }

    pub async fn run_stdio(&self) -> std::io::Result<()> {
        tracing::info!("Google Drive & Docs MCP Server running on stdio");
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        self.run(stdin, tokio::io::stdout()).await
    }
}

fn initialize_result(params: &Map<String, Value>) -> Value {
    if let Some(client) = params.get("clientInfo") {
        tracing::info!(
            "Client connected: {} {}",
            client["name"].as_str().unwrap_or("unknown"),
            client["version"].as_str().unwrap_or("")
        );
    }
    let version = params
        .get("protocolVersion")
        .and_then(Value::as_str)
        .unwrap_or(PROTOCOL_VERSION);

    json!({
        "protocolVersion": version,
        "capabilities": {
            "tools": { "listChanged": false },
            "resources": { "listChanged": false, "subscribe": false },
            "prompts": { "listChanged": false }
        },
        "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION }
    })
}
