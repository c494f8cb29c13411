// Terminal front-end for the design pipeline.
//
// Each line typed is one turn. While the turn runs, every snapshot the
// pipeline sends is diffed against what has already been printed and only
// the new assistant messages are shown.

use crate::core::ai::AiProvider;
use crate::core::pipeline::extraction::find_image_data_uri;
use crate::core::pipeline::{ArtifactStore, ChatMessage, DesignPipeline, PipelineOutcome};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

const SNAPSHOT_BUFFER: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Quit,
    Clear,
    Empty,
    Message(String),
}

pub fn parse_input(line: &str) -> ChatInput {
    match line.trim() {
        "" => ChatInput::Empty,
        "/quit" | "/exit" => ChatInput::Quit,
        "/clear" => ChatInput::Clear,
        text => ChatInput::Message(text.to_string()),
    }
}

/// Replaces embedded PNG data URIs with a short placeholder.
pub fn render_message(content: &str) -> String {
    let mut rendered = content.to_string();
    while let Some(uri) = find_image_data_uri(&rendered) {
        let placeholder = format!("[PNG preview, {} base64 chars]", uri.len());
        rendered = rendered.replacen(&uri, &placeholder, 1);
    }
    rendered
}

/// Assistant messages in `snapshot` past the first `already_shown` entries.
pub fn unseen_assistant_messages(
    snapshot: &[ChatMessage],
    already_shown: usize,
) -> impl Iterator<Item = &ChatMessage> {
    snapshot
        .get(already_shown..)
        .unwrap_or_default()
        .iter()
        .filter(|message| message.role == "assistant")
}

fn artifact_summary(outcome: &PipelineOutcome) -> Vec<String> {
    let modeling = &outcome.modeling;
    let mut lines = Vec::new();
    if let Some(path) = &modeling.model_file_path {
        lines.push(format!("Model file: {}", path.display()));
    }
    if let Some(path) = &modeling.screenshot_file_path {
        lines.push(format!("Preview image: {}", path.display()));
    }
    if let Some(path) = &modeling.fallback_screenshot_path {
        lines.push(format!("Fallback screenshot: {}", path.display()));
    }
    match &outcome.proposal_path {
        Some(path) => lines.push(format!("Proposal: {}", path.display())),
        None if !outcome.proposal_markdown.is_empty() => {
            lines.push(format!(
                "Proposal could not be saved:\n\n{}",
                outcome.proposal_markdown
            ));
        }
        None => {}
    }
    lines
}

pub struct DesignChat<'a, P: AiProvider, S: ArtifactStore> {
    pipeline: &'a DesignPipeline<P, S>,
    history: Vec<ChatMessage>,
}

impl<'a, P: AiProvider, S: ArtifactStore> DesignChat<'a, P, S> {
    pub fn new(pipeline: &'a DesignPipeline<P, S>) -> Self {
        Self {
            pipeline,
            history: Vec::new(),
        }
    }

    pub async fn run<R, W>(&mut self, input: R, output: &mut W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        output
            .write_all(b"Mechanical design assistant. Describe a part; /clear resets, /quit exits.\n")
            .await?;

        let mut lines = input.lines();
        loop {
            output.write_all(b"> ").await?;
            output.flush().await?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            match parse_input(&line) {
                ChatInput::Empty => continue,
                ChatInput::Quit => break,
                ChatInput::Clear => {
                    self.clear().await;
                    output.write_all(b"Chat cleared.\n").await?;
                }
                ChatInput::Message(text) => self.turn(&text, output).await?,
            }
        }

        output.flush().await
    }

    async fn clear(&mut self) {
        self.history.clear();
        match self.pipeline.clear().await {
            Ok(true) => tracing::info!("Deleted saved proposal"),
            Ok(false) => {}
            Err(e) => tracing::error!("Failed to delete proposal: {}", e),
        }
    }

    async fn turn<W>(&mut self, text: &str, output: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let (tx, mut rx) = mpsc::channel::<Vec<ChatMessage>>(SNAPSHOT_BUFFER);
        // Prior history plus this turn's user message.
        let mut shown = self.history.len() + 1;
        let history = self.history.clone();

        let printer = async {
            while let Some(snapshot) = rx.recv().await {
                for message in unseen_assistant_messages(&snapshot, shown) {
                    let text = format!("\n{}\n", render_message(&message.content));
                    output.write_all(text.as_bytes()).await?;
                }
                shown = shown.max(snapshot.len());
                output.flush().await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let run = async {
            let outcome = self.pipeline.run_turn(text, &history, Some(&tx)).await;
            drop(tx);
            outcome
        };

        let (printed, outcome) = tokio::join!(printer, run);
        printed?;

        let summary = artifact_summary(&outcome);
        if !summary.is_empty() {
            let text = format!("\n{}\n", summary.join("\n"));
            output.write_all(text.as_bytes()).await?;
        }
        self.history = outcome.history;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ai::{AgentError, AiConfig, AiMessage, AiProviderResponse, AiService, AiTool};
    use crate::core::pipeline::{AgentBuilder, ModelingAgent, PipelineError};
    use async_trait::async_trait;
    use std::error::Error;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    struct CannedProvider;

    #[async_trait]
    impl AiProvider for CannedProvider {
        async fn chat_complete(
            &self,
            _messages: &[AiMessage],
            _tools: &[AiTool],
            _config: &AiConfig,
        ) -> Result<AiProviderResponse, Box<dyn Error + Send + Sync>> {
            Ok(AiProviderResponse {
                content: "- Module: 2\n- Teeth: 20".to_string(),
                ..Default::default()
            })
        }
    }

    struct NoServer;

    #[async_trait]
    impl AgentBuilder for NoServer {
        async fn build(&self) -> Result<Arc<dyn ModelingAgent>, AgentError> {
            Err(AgentError::Init("uvx: not found".to_string()))
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        proposals: Mutex<Vec<String>>,
        cleared: Mutex<usize>,
        read_only: bool,
    }

    #[async_trait]
    impl ArtifactStore for Arc<MemoryStore> {
        async fn write_artifact(&self, filename: &str, _data: &[u8]) -> Result<PathBuf, PipelineError> {
            Ok(PathBuf::from(filename))
        }

        async fn write_proposal(&self, markdown: &str) -> Result<PathBuf, PipelineError> {
            if self.read_only {
                return Err(PipelineError::Storage(
                    "proposal.md".to_string(),
                    "read-only file system".to_string(),
                ));
            }
            self.proposals.lock().unwrap().push(markdown.to_string());
            Ok(PathBuf::from("proposal.md"))
        }

        async fn clear_proposal(&self) -> Result<bool, PipelineError> {
            *self.cleared.lock().unwrap() += 1;
            Ok(true)
        }
    }

    fn pipeline(store: Arc<MemoryStore>) -> DesignPipeline<CannedProvider, Arc<MemoryStore>> {
        let config = AiConfig::new("test-model");
        DesignPipeline::new(
            AiService::new(CannedProvider, "calc".to_string(), config.clone()),
            AiService::new(CannedProvider, "docs".to_string(), config),
            Box::new(NoServer),
            store,
        )
    }

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("  /quit "), ChatInput::Quit);
        assert_eq!(parse_input("/clear"), ChatInput::Clear);
        assert_eq!(parse_input(""), ChatInput::Empty);
        assert_eq!(
            parse_input("a spur gear"),
            ChatInput::Message("a spur gear".to_string())
        );
    }

    #[test]
    fn test_render_message_hides_images() {
        let text = "Preview: data:image/png;base64,iVBORw0KGgo= done";
        let rendered = render_message(text);

        assert!(!rendered.contains("base64,"));
        assert!(rendered.starts_with("Preview: [PNG preview"));
        assert!(rendered.ends_with(" done"));
        assert_eq!(render_message("plain"), "plain");
    }

    #[test]
    fn test_unseen_messages() {
        let snapshot = vec![
            ChatMessage::user("q"),
            ChatMessage::assistant("step 1"),
            ChatMessage::user("follow-up"),
            ChatMessage::assistant("step 2"),
        ];

        let unseen: Vec<&str> = unseen_assistant_messages(&snapshot, 1)
            .map(|m| m.content.as_str())
            .collect();

        assert_eq!(unseen, vec!["step 1", "step 2"]);
        assert_eq!(unseen_assistant_messages(&snapshot, 3).count(), 1);
        assert_eq!(unseen_assistant_messages(&snapshot, 5).count(), 0);
    }

    #[tokio::test]
    async fn test_chat_runs_turn_then_clears() {
        let store = Arc::new(MemoryStore::default());
        let pipeline = pipeline(store.clone());
        let mut chat = DesignChat::new(&pipeline);
        let input = "spur gear, 20 teeth\n/clear\n/quit\nnever read\n";
        let mut output = Vec::new();

        chat.run(tokio::io::BufReader::new(input.as_bytes()), &mut output)
            .await
            .unwrap();
        let text = String::from_utf8(output).unwrap();

        assert!(text.contains("**Step 1: Design Calculation Complete**"));
        assert!(text.contains("**Step 3: 3D Modeling Skipped**"));
        assert!(text.contains("**Step 4: Document Generation Complete**"));
        assert!(text.contains("Proposal: proposal.md"));
        assert!(text.contains("Chat cleared."));
        assert!(chat.history.is_empty());
        assert_eq!(*store.cleared.lock().unwrap(), 1);
        assert_eq!(store.proposals.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_each_step_printed_once() {
        let pipeline = pipeline(Arc::new(MemoryStore::default()));
        let mut chat = DesignChat::new(&pipeline);
        let mut output = Vec::new();

        chat.run(tokio::io::BufReader::new("bracket\n".as_bytes()), &mut output)
            .await
            .unwrap();
        let text = String::from_utf8(output).unwrap();

        assert_eq!(text.matches("**Step 2: Parameter Extraction Complete**").count(), 1);
        // user message plus one combined assistant message
        assert_eq!(chat.history.len(), 2);
    }

    #[tokio::test]
    async fn test_unsaved_proposal_is_printed() {
        let store = Arc::new(MemoryStore {
            read_only: true,
            ..Default::default()
        });
        let pipeline = pipeline(store.clone());
        let mut chat = DesignChat::new(&pipeline);
        let mut output = Vec::new();

        chat.run(tokio::io::BufReader::new("bracket\n".as_bytes()), &mut output)
            .await
            .unwrap();
        let text = String::from_utf8(output).unwrap();

        assert!(text.contains("Proposal document is ready: (not saved)"));
        assert!(text.contains("Proposal could not be saved:\n\n- Module: 2"));
        assert!(!text.contains("Proposal: "));
        assert!(store.proposals.lock().unwrap().is_empty());
    }
}
