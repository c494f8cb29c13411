use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// One entry of the design chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Exported model bytes reported by the modeling agent as JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportPayload {
    pub filename: Option<String>,
    pub format: Option<String>,
    pub content: String,
}

const FILENAME_KEYS: [&str; 3] = ["filename", "file_name", "name"];
const CONTENT_KEYS: [&str; 3] = ["base64_content", "content", "data"];

fn first_string<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| object.get(*key).and_then(Value::as_str))
}

impl ExportPayload {
    /// Agents are inconsistent about key names. When an object carries
    /// several spellings the first one in `FILENAME_KEYS` / `CONTENT_KEYS`
    /// order wins.
    pub fn from_object(object: &Map<String, Value>) -> Option<Self> {
        let content = first_string(object, &CONTENT_KEYS)?;
        Some(Self {
            filename: first_string(object, &FILENAME_KEYS).map(str::to_string),
            format: first_string(object, &["format"]).map(str::to_string),
            content: content.to_string(),
        })
    }
}

/// Everything the modeling step produced for one turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelingStepResult {
    /// The `data:image/png;base64,...` literal, when one was found.
    pub image_data: Option<String>,
    pub model_file_path: Option<PathBuf>,
    pub screenshot_file_path: Option<PathBuf>,
    pub fallback_screenshot_path: Option<PathBuf>,
    pub error: Option<String>,
    /// The agent's final free-text answer.
    pub response_text: String,
}

impl ModelingStepResult {
    pub fn has_image(&self) -> bool {
        self.image_data.is_some()
    }
}

/// Result of one full pipeline turn.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// History including this turn's user message and the combined reply.
    pub history: Vec<ChatMessage>,
    pub proposal_markdown: String,
    pub proposal_path: Option<PathBuf>,
    pub modeling: ModelingStepResult,
}
