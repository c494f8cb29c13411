use super::extraction::{decode_data_uri, Extraction};
use super::pipeline_models::{ChatMessage, ExportPayload, ModelingStepResult, PipelineOutcome};
use crate::core::ai::{AgentError, AgentRun, AiMessage, AiProvider, AiService, ToolAgent, ToolExecutor};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, OnceCell};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to write artifact {0}: {1}")]
    Storage(String, String),

    #[error("Invalid artifact data: {0}")]
    InvalidArtifact(String),
}

// ============================================================================
// SEAMS
// ============================================================================

/// Where the pipeline writes its outputs.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Writes an exported file or screenshot and returns where it landed.
    async fn write_artifact(&self, filename: &str, data: &[u8]) -> Result<PathBuf, PipelineError>;

    async fn write_proposal(&self, markdown: &str) -> Result<PathBuf, PipelineError>;

    /// Removes the proposal. Returns whether a file was deleted.
    async fn clear_proposal(&self) -> Result<bool, PipelineError>;
}

/// The modeling agent as the pipeline uses it.
#[async_trait]
pub trait ModelingAgent: Send + Sync {
    async fn run(&self, prompt: &str) -> Result<AgentRun, AgentError>;

    /// Invokes one tool directly, bypassing the model.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String, AgentError>;
}

#[async_trait]
impl<P, E> ModelingAgent for ToolAgent<P, E>
where
    P: AiProvider,
    E: ToolExecutor,
{
    async fn run(&self, prompt: &str) -> Result<AgentRun, AgentError> {
        ToolAgent::run(self, prompt).await
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String, AgentError> {
        self.executor().call_tool(name, arguments).await
    }
}

/// Creates the modeling agent on first use.
#[async_trait]
pub trait AgentBuilder: Send + Sync {
    async fn build(&self) -> Result<Arc<dyn ModelingAgent>, AgentError>;
}

// ============================================================================
// PROMPTS
// ============================================================================

pub const FALLBACK_TOOL: &str = "execute_code";

/// Run inside the CAD application when the agent gives up: saves an isometric
/// view and prints it as a data URI.
const FALLBACK_SCREENSHOT_CODE: &str = r#"import base64, os, tempfile
import FreeCADGui
path = os.path.join(tempfile.gettempdir(), "mecha_fallback_view.png")
view = FreeCADGui.ActiveDocument.ActiveView
view.viewIsometric()
view.fitAll()
view.saveImage(path, 800, 600, "White")
with open(path, "rb") as f:
    print("data:image/png;base64," + base64.b64encode(f.read()).decode())
"#;

const SUMMARY_CHARS: usize = 300;

fn calculation_prompt(user_query: &str) -> String {
    format!(
        "User's request: '{}'\n\nBased on the above request, calculate the necessary mechanical \
         specifications and determine the detailed specifications. Please describe them clearly \
         in bullet points.",
        user_query
    )
}

fn parameter_prompt(specifications: &str) -> String {
    format!(
        "Condense the following specifications into a concise list of 3D modeling parameters \
         (overall dimensions, feature dimensions, hole positions, materials). Output only the \
         parameter list.\n\n{}",
        specifications
    )
}

fn modeling_prompt(parameters: &str) -> String {
    format!(
        "Create a 3D model based on the following specifications:\n{}\n\
         Export the finished model and report the export result as a JSON object with the keys \
         \"filename\", \"format\" and \"base64_content\".\n\
         The final output should be an image of the generated model (data:image/png;base64 format).",
        parameters
    )
}

fn documentation_prompt(user_query: &str, specifications: &str, modeling_summary: &str) -> String {
    format!(
        "Based on the following information, create a design proposal document for the user.\n\
         Assume it will be saved in Markdown format as 'proposal.md'.\n\n\
         Original user request:\n{}\n\n\
         Design calculation results and specifications:\n{}\n\n\
         Summary of 3D modeling results:\n{}\n\n\
         The document should include the following elements:\n\
         1.  Summary of user request\n\
         2.  Proposed specifications (mechanical specs, etc.)\n\
         3.  Design points and rationale\n\
         4.  Information about the 3D model (if generated)\n\
         5.  Next steps or recommendations (if any)\n",
        user_query, specifications, modeling_summary
    )
}

// ============================================================================
// DESIGN PIPELINE
// ============================================================================

pub struct DesignPipeline<P: AiProvider, S: ArtifactStore> {
    calculation: AiService<P>,
    documentation: AiService<P>,
    builder: Box<dyn AgentBuilder>,
    agent: OnceCell<Arc<dyn ModelingAgent>>,
    store: S,
}

impl<P: AiProvider, S: ArtifactStore> DesignPipeline<P, S> {
    pub fn new(
        calculation: AiService<P>,
        documentation: AiService<P>,
        builder: Box<dyn AgentBuilder>,
        store: S,
    ) -> Self {
        Self {
            calculation,
            documentation,
            builder,
            agent: OnceCell::new(),
            store,
        }
    }

    /// Returns the shared agent, building it if this is the first use.
    ///
    /// A failed build leaves the slot empty so the next turn tries again.
    pub async fn modeling_agent(&self) -> Result<Arc<dyn ModelingAgent>, AgentError> {
        self.agent
            .get_or_try_init(|| async {
                tracing::info!("Initializing modeling agent...");
                let agent = self.builder.build().await?;
                tracing::info!("Modeling agent initialized");
                Ok::<_, AgentError>(agent)
            })
            .await
            .cloned()
    }

    /// Runs all four steps for one user message.
    ///
    /// After each step the full chat so far is sent on `updates`, when given.
    pub async fn run_turn(
        &self,
        user_query: &str,
        history: &[ChatMessage],
        updates: Option<&mpsc::Sender<Vec<ChatMessage>>>,
    ) -> PipelineOutcome {
        let mut turn = Turn::new(history, user_query, updates);

        // Step 1: design calculation
        let specifications = self.run_calculation_step(user_query, history).await;
        turn.push(format!(
            "**Step 1: Design Calculation Complete**\n```\n{}\n```",
            specifications
        ))
        .await;

        // Step 2: parameter extraction
        let parameters = self.run_parameter_step(&specifications).await;
        turn.push(format!(
            "**Step 2: Parameter Extraction Complete**\n```\n{}\n```",
            parameters
        ))
        .await;

        // Step 3: 3D modeling
        let modeling = match self.modeling_agent().await {
            Err(e) => {
                tracing::error!("Modeling agent initialization failed: {}", e);
                turn.push(format!(
                    "**Step 3: 3D Modeling Skipped**\nFailed to initialize modeling agent: {}",
                    e
                ))
                .await;
                ModelingStepResult {
                    error: Some(format!("Modeling agent initialization failed: {}", e)),
                    ..Default::default()
                }
            }
            Ok(agent) => {
                turn.push(format!(
                    "**Step 3: 3D Modeling in Progress...**\nGenerating model based on specifications.\nParameters:\n```\n{}\n```",
                    parameters
                ))
                .await;
                let result = self.run_modeling_step(agent.as_ref(), &parameters).await;
                turn.push(modeling_message(&result)).await;
                result
            }
        };

        // Step 4: documentation
        turn.push("**Step 4: Document Generation in Progress...**".to_string())
            .await;
        let proposal = self
            .run_documentation_step(user_query, &specifications, &modeling_summary(&modeling))
            .await;

        let proposal_path = match self.store.write_proposal(&proposal).await {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::error!("Failed to save proposal: {}", e);
                None
            }
        };
        let location = proposal_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not saved)".to_string());
        turn.push(format!(
            "**Step 4: Document Generation Complete**\nProposal document is ready: {}\n\nSummary:\n{}...",
            location,
            truncate_chars(&proposal, SUMMARY_CHARS)
        ))
        .await;

        turn.finish(proposal, proposal_path, modeling)
    }

    /// Deletes the saved proposal.
    pub async fn clear(&self) -> Result<bool, PipelineError> {
        self.store.clear_proposal().await
    }

    async fn run_calculation_step(&self, user_query: &str, history: &[ChatMessage]) -> String {
        let mut messages: Vec<AiMessage> = history
            .iter()
            .filter(|m| !m.content.trim().is_empty())
            .filter_map(|m| match m.role.as_str() {
                "user" => Some(AiMessage::user(m.content.clone())),
                "assistant" => Some(AiMessage::assistant(m.content.clone())),
                _ => None,
            })
            .collect();
        messages.push(AiMessage::user(calculation_prompt(user_query)));

        match self.calculation.chat(&messages).await {
            Ok(response) => response.answer,
            Err(e) => {
                tracing::error!("Error in calculation step: {}", e);
                format!("An error occurred during design calculation: {}", e)
            }
        }
    }

    async fn run_parameter_step(&self, specifications: &str) -> String {
        match self.calculation.ask(&parameter_prompt(specifications)).await {
            Ok(parameters) if !parameters.trim().is_empty() => parameters,
            Ok(_) => {
                tracing::warn!("Parameter extraction returned nothing, using raw specifications");
                specifications.to_string()
            }
            Err(e) => {
                tracing::warn!(
                    "Parameter extraction failed, using raw specifications: {}",
                    e
                );
                specifications.to_string()
            }
        }
    }

    async fn run_modeling_step(
        &self,
        agent: &dyn ModelingAgent,
        parameters: &str,
    ) -> ModelingStepResult {
        let mut result = ModelingStepResult::default();

        let run = match agent.run(&modeling_prompt(parameters)).await {
            Ok(run) => run,
            Err(e) if e.is_recursion_limit() => {
                tracing::warn!("Modeling agent hit its recursion limit, taking fallback screenshot");
                result.error = Some(e.to_string());
                self.take_fallback_screenshot(agent, &mut result).await;
                return result;
            }
            Err(e) => {
                tracing::error!("Error in modeling step: {}", e);
                result.error = Some(format!("An error occurred during 3D modeling: {}", e));
                return result;
            }
        };

        tracing::info!(
            "Modeling agent answered after {} step(s) and {} tool call(s)",
            run.steps,
            run.tool_outputs.len()
        );
        let mut extraction = Extraction::scan(&run.final_text);
        extraction.fill_from(run.tool_outputs.iter().rev().map(|o| o.output.as_str()));
        result.response_text = run.final_text;

        if let Some(uri) = extraction.image_data {
            result.screenshot_file_path = self
                .save_image(&uri, &format!("model_screenshot_{}.png", timestamp()))
                .await;
            result.image_data = Some(uri);
        }

        if let Some(payload) = extraction.export {
            match self.save_export(&payload).await {
                Ok(path) => result.model_file_path = Some(path),
                Err(e) => tracing::error!("Failed to save exported model: {}", e),
            }
        }

        result
    }

    async fn take_fallback_screenshot(&self, agent: &dyn ModelingAgent, result: &mut ModelingStepResult) {
        let output = match agent
            .call_tool(FALLBACK_TOOL, json!({ "code": FALLBACK_SCREENSHOT_CODE }))
            .await
        {
            Ok(output) => output,
            Err(e) => {
                tracing::error!("Fallback screenshot failed: {}", e);
                return;
            }
        };

        let Some(uri) = Extraction::scan(&output).image_data else {
            tracing::warn!("Fallback screenshot returned no image");
            return;
        };

        result.fallback_screenshot_path = self
            .save_image(&uri, &format!("fallback_screenshot_{}.png", timestamp()))
            .await;
        result.image_data = Some(uri);
    }

    async fn save_image(&self, uri: &str, filename: &str) -> Option<PathBuf> {
        let Some(bytes) = decode_data_uri(uri) else {
            tracing::warn!("Image data could not be decoded");
            return None;
        };

        match self.store.write_artifact(filename, &bytes).await {
            Ok(path) => {
                tracing::info!("Saved screenshot to {}", path.display());
                Some(path)
            }
            Err(e) => {
                tracing::error!("Failed to save screenshot: {}", e);
                None
            }
        }
    }

    async fn save_export(&self, payload: &ExportPayload) -> Result<PathBuf, PipelineError> {
        let bytes = BASE64
            .decode(&payload.content)
            .map_err(|e| PipelineError::InvalidArtifact(e.to_string()))?;
        let filename = export_filename(payload);
        let path = self.store.write_artifact(&filename, &bytes).await?;
        tracing::info!("Saved exported model to {}", path.display());
        Ok(path)
    }

    async fn run_documentation_step(
        &self,
        user_query: &str,
        specifications: &str,
        modeling_summary: &str,
    ) -> String {
        let prompt = documentation_prompt(user_query, specifications, modeling_summary);
        match self.documentation.ask(&prompt).await {
            Ok(markdown) => markdown,
            Err(e) => {
                tracing::error!("Error in documentation step: {}", e);
                format!("An error occurred during document generation: {}", e)
            }
        }
    }
}

// ============================================================================
// TURN STATE
// ============================================================================

struct Turn<'a> {
    history: Vec<ChatMessage>,
    steps: Vec<ChatMessage>,
    updates: Option<&'a mpsc::Sender<Vec<ChatMessage>>>,
}

impl<'a> Turn<'a> {
    fn new(
        history: &[ChatMessage],
        user_query: &str,
        updates: Option<&'a mpsc::Sender<Vec<ChatMessage>>>,
    ) -> Self {
        let mut history = history.to_vec();
        history.push(ChatMessage::user(user_query));
        Self {
            history,
            steps: Vec::new(),
            updates,
        }
    }

    async fn push(&mut self, content: String) {
        self.steps.push(ChatMessage::assistant(content));

        if let Some(tx) = self.updates {
            let mut snapshot = self.history.clone();
            snapshot.extend(self.steps.iter().cloned());
            if tx.send(snapshot).await.is_err() {
                tracing::debug!("Snapshot receiver dropped");
            }
        }
    }

    fn finish(
        mut self,
        proposal_markdown: String,
        proposal_path: Option<PathBuf>,
        modeling: ModelingStepResult,
    ) -> PipelineOutcome {
        let combined = self
            .steps
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        self.history.push(ChatMessage::assistant(combined));

        PipelineOutcome {
            history: self.history,
            proposal_markdown,
            proposal_path,
            modeling,
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn modeling_message(result: &ModelingStepResult) -> String {
    let mut message = match &result.image_data {
        Some(uri) => format!(
            "**Step 3: 3D Modeling Complete**\n<img src=\"{}\" alt=\"generated 3d model\" />",
            uri
        ),
        None => {
            let body = result
                .error
                .clone()
                .unwrap_or_else(|| result.response_text.clone());
            format!("**Step 3: 3D Modeling Result**\n```\n{}\n```", body)
        }
    };

    if let Some(path) = &result.model_file_path {
        message.push_str(&format!("\nModel file: {}", path.display()));
    }
    if let Some(path) = &result.screenshot_file_path {
        message.push_str(&format!("\nScreenshot: {}", path.display()));
    }
    if let Some(path) = &result.fallback_screenshot_path {
        message.push_str(&format!("\nFallback screenshot: {}", path.display()));
    }
    message
}

fn modeling_summary(result: &ModelingStepResult) -> String {
    let mut summary = if result.has_image() {
        "3D model generated successfully. Please check the preview in the chat.".to_string()
    } else if let Some(error) = &result.error {
        error.clone()
    } else if !result.response_text.trim().is_empty() {
        result.response_text.clone()
    } else {
        "3D model was not generated.".to_string()
    };

    if let Some(path) = &result.model_file_path {
        summary.push_str(&format!("\nExported model file: {}", path.display()));
    }
    summary
}

/// File name for an exported model. Directory parts are dropped and the
/// format becomes the extension when the name has none.
fn export_filename(payload: &ExportPayload) -> String {
    let base = payload
        .filename
        .as_deref()
        .and_then(|name| Path::new(name).file_name())
        .map(|name| name.to_string_lossy().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("model_{}", timestamp()));

    match &payload.format {
        Some(format) if Path::new(&base).extension().is_none() && !format.is_empty() => {
            format!("{}.{}", base, format.to_ascii_lowercase())
        }
        _ => base,
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ai::agent::ToolOutput;
    use crate::core::ai::{AiConfig, AiProviderResponse, AiTool};
    use std::collections::HashMap;
    use std::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const PNG_B64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    // ------------------------------------------------------------------------
    // Fakes
    // ------------------------------------------------------------------------

    /// Answers by role: parameter prompts, documentation prompts and
    /// everything else (calculation).
    struct RoleProvider {
        fail_parameters: bool,
    }

    #[async_trait]
    impl AiProvider for RoleProvider {
        async fn chat_complete(
            &self,
            messages: &[AiMessage],
            _tools: &[AiTool],
            _config: &AiConfig,
        ) -> Result<AiProviderResponse, Box<dyn Error + Send + Sync>> {
            let last = &messages.last().unwrap().content;
            let content = if last.starts_with("Condense") {
                if self.fail_parameters {
                    return Err("rate limited".into());
                }
                "- width: 40 mm".to_string()
            } else if last.starts_with("Based on the following information") {
                format!("# Proposal\n\n{}", last)
            } else {
                "- load: 200 N\n- material: aluminium".to_string()
            };
            Ok(AiProviderResponse {
                content,
                ..Default::default()
            })
        }
    }

    #[derive(Clone)]
    enum AgentScript {
        Answer(AgentRun),
        RecursionLimit,
        Fail,
    }

    struct FakeAgent {
        script: AgentScript,
        prompts: Mutex<Vec<String>>,
        direct_calls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl ModelingAgent for FakeAgent {
        async fn run(&self, prompt: &str) -> Result<AgentRun, AgentError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.script {
                AgentScript::Answer(run) => Ok(run.clone()),
                AgentScript::RecursionLimit => Err(AgentError::RecursionLimit(25)),
                AgentScript::Fail => Err(AgentError::Provider("overloaded".to_string())),
            }
        }

        async fn call_tool(&self, name: &str, arguments: Value) -> Result<String, AgentError> {
            self.direct_calls
                .lock()
                .unwrap()
                .push((name.to_string(), arguments));
            Ok(format!("data:image/png;base64,{}", PNG_B64))
        }
    }

    struct FakeBuilder {
        agent: Arc<FakeAgent>,
        failures_left: AtomicUsize,
        builds: AtomicUsize,
    }

    #[async_trait]
    impl AgentBuilder for Arc<FakeBuilder> {
        async fn build(&self) -> Result<Arc<dyn ModelingAgent>, AgentError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(AgentError::Init("uvx not found".to_string()));
            }
            Ok(self.agent.clone())
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        artifacts: Mutex<HashMap<String, Vec<u8>>>,
        proposal: Mutex<Option<String>>,
    }

    #[async_trait]
    impl ArtifactStore for Arc<MemoryStore> {
        async fn write_artifact(
            &self,
            filename: &str,
            data: &[u8],
        ) -> Result<PathBuf, PipelineError> {
            self.artifacts
                .lock()
                .unwrap()
                .insert(filename.to_string(), data.to_vec());
            Ok(PathBuf::from("model_exports").join(filename))
        }

        async fn write_proposal(&self, markdown: &str) -> Result<PathBuf, PipelineError> {
            *self.proposal.lock().unwrap() = Some(markdown.to_string());
            Ok(PathBuf::from("proposal.md"))
        }

        async fn clear_proposal(&self) -> Result<bool, PipelineError> {
            Ok(self.proposal.lock().unwrap().take().is_some())
        }
    }

    struct Fixture {
        pipeline: DesignPipeline<RoleProvider, Arc<MemoryStore>>,
        agent: Arc<FakeAgent>,
        builder: Arc<FakeBuilder>,
        store: Arc<MemoryStore>,
    }

    fn fixture(script: AgentScript, init_failures: usize, fail_parameters: bool) -> Fixture {
        let agent = Arc::new(FakeAgent {
            script,
            prompts: Mutex::new(vec![]),
            direct_calls: Mutex::new(vec![]),
        });
        let builder = Arc::new(FakeBuilder {
            agent: agent.clone(),
            failures_left: AtomicUsize::new(init_failures),
            builds: AtomicUsize::new(0),
        });
        let store = Arc::new(MemoryStore::default());
        let pipeline = DesignPipeline::new(
            AiService::new(
                RoleProvider { fail_parameters },
                "calc".to_string(),
                AiConfig::new("m"),
            ),
            AiService::new(
                RoleProvider { fail_parameters },
                "docs".to_string(),
                AiConfig::new("m"),
            ),
            Box::new(builder.clone()),
            store.clone(),
        );

        Fixture {
            pipeline,
            agent,
            builder,
            store,
        }
    }

    fn successful_run() -> AgentRun {
        AgentRun {
            final_text: format!("Model ready: data:image/png;base64,{}", PNG_B64),
            tool_outputs: vec![
                ToolOutput {
                    tool: "export".to_string(),
                    output: r#"{"filename": "old.stl", "content": "b2xk"}"#.to_string(),
                },
                ToolOutput {
                    tool: "export".to_string(),
                    output: r#"{"filename": "exports/bracket", "format": "STEP", "base64_content": "SVNPLTEwMzAz"}"#.to_string(),
                },
            ],
            steps: 3,
        }
    }

    // ------------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_full_turn_saves_artifacts_and_streams_snapshots() {
        let f = fixture(AgentScript::Answer(successful_run()), 0, false);
        let (tx, mut rx) = mpsc::channel(16);
        let history = vec![ChatMessage::user("earlier"), ChatMessage::assistant("reply")];

        let outcome = f
            .pipeline
            .run_turn("design a bracket", &history, Some(&tx))
            .await;
        drop(tx);

        let mut snapshots = Vec::new();
        while let Some(snapshot) = rx.recv().await {
            snapshots.push(snapshot);
        }

        // One snapshot per step message, each one message longer.
        assert_eq!(snapshots.len(), 6);
        assert_eq!(snapshots[0].len(), 4);
        assert_eq!(snapshots.last().unwrap().len(), 9);

        assert!(outcome.modeling.image_data.is_some());
        assert!(outcome.modeling.screenshot_file_path.is_some());
        assert_eq!(
            outcome.modeling.model_file_path,
            Some(PathBuf::from("model_exports/bracket.step"))
        );
        let artifacts = f.store.artifacts.lock().unwrap();
        assert_eq!(artifacts["bracket.step"], b"ISO-10303");

        assert!(f.agent.prompts.lock().unwrap()[0].contains("- width: 40 mm"));
        assert!(outcome.proposal_markdown.contains("3D model generated successfully"));
        assert_eq!(outcome.proposal_path, Some(PathBuf::from("proposal.md")));
        assert!(f.store.proposal.lock().unwrap().is_some());

        assert_eq!(outcome.history.len(), 4);
        assert!(outcome.history[3].content.starts_with("**Step 1: Design Calculation Complete**"));
    }

    #[tokio::test]
    async fn test_recursion_limit_triggers_fallback_screenshot() {
        let f = fixture(AgentScript::RecursionLimit, 0, false);

        let outcome = f.pipeline.run_turn("gear", &[], None).await;

        let calls = f.agent.direct_calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, FALLBACK_TOOL);
        assert!(calls[0].1["code"].as_str().unwrap().contains("saveImage"));

        assert!(outcome.modeling.error.as_deref().unwrap().contains("Recursion limit"));
        assert!(outcome.modeling.fallback_screenshot_path.is_some());
        assert!(outcome.modeling.image_data.is_some());
    }

    #[tokio::test]
    async fn test_other_agent_errors_skip_fallback() {
        let f = fixture(AgentScript::Fail, 0, false);

        let outcome = f.pipeline.run_turn("gear", &[], None).await;

        assert!(f.agent.direct_calls.lock().unwrap().is_empty());
        assert_eq!(
            outcome.modeling.error.as_deref(),
            Some("An error occurred during 3D modeling: AI provider error: overloaded")
        );
        let reply = &outcome.history.last().unwrap().content;
        assert!(reply.contains("**Step 3: 3D Modeling Result**"));
    }

    #[tokio::test]
    async fn test_agent_init_failure_is_retried_next_turn() {
        let f = fixture(AgentScript::Answer(successful_run()), 1, false);

        let first = f.pipeline.run_turn("gear", &[], None).await;
        assert!(first.history[1]
            .content
            .contains("\n\n**Step 3: 3D Modeling Skipped**"));
        assert!(first.modeling.error.is_some());

        let second = f.pipeline.run_turn("gear", &first.history, None).await;
        assert!(second.modeling.image_data.is_some());

        f.pipeline.run_turn("gear again", &second.history, None).await;
        assert_eq!(f.builder.builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_parameter_failure_falls_back_to_specs() {
        let f = fixture(AgentScript::Answer(successful_run()), 0, true);

        f.pipeline.run_turn("gear", &[], None).await;

        let prompt = f.agent.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("- load: 200 N"));
    }

    #[tokio::test]
    async fn test_clear_removes_proposal() {
        let f = fixture(AgentScript::Fail, 0, false);
        f.pipeline.run_turn("gear", &[], None).await;

        assert!(f.pipeline.clear().await.unwrap());
        assert!(!f.pipeline.clear().await.unwrap());
    }

    #[test]
    fn test_export_filename() {
        let payload = |name: Option<&str>, format: Option<&str>| ExportPayload {
            filename: name.map(str::to_string),
            format: format.map(str::to_string),
            content: String::new(),
        };

        assert_eq!(export_filename(&payload(Some("../../etc/part.stl"), None)), "part.stl");
        assert_eq!(export_filename(&payload(Some("part"), Some("STL"))), "part.stl");
        assert_eq!(export_filename(&payload(Some("part.step"), Some("stl"))), "part.step");
        assert!(export_filename(&payload(None, None)).starts_with("model_"));
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
