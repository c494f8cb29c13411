use crate::core::ai::{AiConfig, AiMessage, AiProvider, AiProviderResponse, AiTool, AiToolCall};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::error::Error;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

fn build_messages(messages: &[AiMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|message| {
            let mut value = json!({ "role": message.role, "content": message.content });
            if !message.tool_calls.is_empty() {
                value["tool_calls"] = message
                    .tool_calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                // Arguments travel as a JSON-encoded string.
                                "arguments": call.arguments.to_string(),
                            }
                        })
                    })
                    .collect();
            }
            if let Some(id) = &message.tool_call_id {
                value["tool_call_id"] = json!(id);
            }
            value
        })
        .collect()
}

fn build_tools(tools: &[AiTool]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.input_schema,
                }
            })
        })
        .collect()
}

fn parse_response(response: &Value) -> Result<AiProviderResponse, Box<dyn Error + Send + Sync>> {
    let message = response
        .pointer("/choices/0/message")
        .ok_or("Failed to parse response content")?;

    let content = message["content"].as_str().unwrap_or_default().to_string();
    let thinking = message["reasoning_content"]
        .as_str()
        .or_else(|| message["reasoning"].as_str())
        .map(str::to_string);

    let mut tool_calls = Vec::new();
    for call in message["tool_calls"].as_array().into_iter().flatten() {
        let raw = call["function"]["arguments"].as_str().unwrap_or("{}");
        let arguments = serde_json::from_str(raw)
            .map_err(|e| format!("Invalid tool arguments from model: {}", e))?;
        tool_calls.push(AiToolCall {
            id: call["id"].as_str().unwrap_or_default().to_string(),
            name: call["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            arguments,
        });
    }

    Ok(AiProviderResponse {
        content,
        thinking,
        tool_calls,
    })
}

#[async_trait]
impl AiProvider for OpenAiClient {
    async fn chat_complete(
        &self,
        messages: &[AiMessage],
        tools: &[AiTool],
        config: &AiConfig,
    ) -> Result<AiProviderResponse, Box<dyn Error + Send + Sync>> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut payload = json!({
            "model": config.model,
            "messages": build_messages(messages),
            "temperature": config.temperature,
            "max_tokens": config.max_tokens,
        });
        if !tools.is_empty() {
            payload["tools"] = json!(build_tools(tools));
        }

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await?;
            return Err(format!("OpenAI API error ({}): {}", status, text).into());
        }

        let response_json: Value = response.json().await?;
        parse_response(&response_json)
    }
}
