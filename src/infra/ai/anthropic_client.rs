use crate::core::ai::{AiConfig, AiMessage, AiProvider, AiProviderResponse, AiTool, AiToolCall};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::error::Error;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    client: Client,
    api_key: String,
}

impl AnthropicClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
        }
    }
}

/// Splits out the system prompt and converts the rest into Messages API
/// turns. Consecutive tool results are merged into one `user` turn.
fn build_messages(messages: &[AiMessage]) -> (Option<String>, Vec<Value>) {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == "system")
        .map(|m| m.content.as_str())
        .collect();
    let system = (!system.is_empty()).then(|| system.join("\n\n"));

    let mut turns: Vec<Value> = Vec::new();
    for message in messages.iter().filter(|m| m.role != "system") {
        match message.role.as_str() {
            "tool" => {
                let block = json!({
                    "type": "tool_result",
                    "tool_use_id": message.tool_call_id.clone().unwrap_or_default(),
                    "content": message.content,
                });
                let merged = turns.last_mut().and_then(|last| {
                    let is_results = last["role"] == "user"
                        && last["content"]
                            .as_array()
                            .map(|c| c.iter().all(|b| b["type"] == "tool_result"))
                            .unwrap_or(false);
                    if is_results {
                        last["content"].as_array_mut()
                    } else {
                        None
                    }
                });
                match merged {
                    Some(blocks) => blocks.push(block),
                    None => turns.push(json!({ "role": "user", "content": [block] })),
                }
            }
            "assistant" if !message.tool_calls.is_empty() => {
                let mut blocks = Vec::new();
                if !message.content.is_empty() {
                    blocks.push(json!({ "type": "text", "text": message.content }));
                }
                for call in &message.tool_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    }));
                }
                turns.push(json!({ "role": "assistant", "content": blocks }));
            }
            role => turns.push(json!({ "role": role, "content": message.content })),
        }
    }

    (system, turns)
}

fn build_tools(tools: &[AiTool]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": tool.input_schema,
            })
        })
        .collect()
}

fn parse_response(response: &Value) -> Result<AiProviderResponse, Box<dyn Error + Send + Sync>> {
    let blocks = response["content"]
        .as_array()
        .ok_or("Failed to parse response content")?;

    let mut text = Vec::new();
    let mut thinking = Vec::new();
    let mut tool_calls = Vec::new();

    for block in blocks {
        match block["type"].as_str() {
            Some("text") => text.push(block["text"].as_str().unwrap_or_default()),
            Some("thinking") => thinking.push(block["thinking"].as_str().unwrap_or_default()),
            Some("tool_use") => tool_calls.push(AiToolCall {
                id: block["id"].as_str().unwrap_or_default().to_string(),
                name: block["name"].as_str().unwrap_or_default().to_string(),
                arguments: block.get("input").cloned().unwrap_or_else(|| json!({})),
            }),
            _ => {}
        }
    }

    Ok(AiProviderResponse {
        content: text.join(""),
        thinking: (!thinking.is_empty()).then(|| thinking.join("\n")),
        tool_calls,
    })
}

#[async_trait]
impl AiProvider for AnthropicClient {
    async fn chat_complete(
        &self,
        messages: &[AiMessage],
        tools: &[AiTool],
        config: &AiConfig,
    ) -> Result<AiProviderResponse, Box<dyn Error + Send + Sync>> {
        let (system, turns) = build_messages(messages);

        let mut payload = json!({
            "model": config.model,
            "messages": turns,
            "max_tokens": config.max_tokens.unwrap_or(4096),
            "temperature": config.temperature,
        });
        if let Some(system) = system {
            payload["system"] = json!(system);
        }
        if !tools.is_empty() {
            payload["tools"] = json!(build_tools(tools));
        }

        tracing::debug!(
            "Anthropic request: model={}, {} message(s), {} tool(s)",
            config.model,
            messages.len(),
            tools.len()
        );

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await?;
            return Err(format!("Anthropic API error ({}): {}", status, text).into());
        }

        let response_json: Value = response.json().await?;
        parse_response(&response_json)
    }
}
