use super::models::{AiConfig, AiMessage, AiProviderResponse, AiResponse, AiTool};
use async_trait::async_trait;
use std::error::Error;
use std::sync::Arc;

#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Sends a chat completion request to the AI provider.
    ///
    /// `tools` may be empty. When it is not, the provider may answer with
    /// tool calls instead of (or alongside) text.
    async fn chat_complete(
        &self,
        messages: &[AiMessage],
        tools: &[AiTool],
        config: &AiConfig,
    ) -> Result<AiProviderResponse, Box<dyn Error + Send + Sync>>;
}

// Blanket implementations so services can hold either a boxed provider
// chosen at runtime or a provider shared between several roles.
#[async_trait]
impl AiProvider for Box<dyn AiProvider> {
    async fn chat_complete(
        &self,
        messages: &[AiMessage],
        tools: &[AiTool],
        config: &AiConfig,
    ) -> Result<AiProviderResponse, Box<dyn Error + Send + Sync>> {
        (**self).chat_complete(messages, tools, config).await
    }
}

#[async_trait]
impl AiProvider for Arc<dyn AiProvider> {
    async fn chat_complete(
        &self,
        messages: &[AiMessage],
        tools: &[AiTool],
        config: &AiConfig,
    ) -> Result<AiProviderResponse, Box<dyn Error + Send + Sync>> {
        (**self).chat_complete(messages, tools, config).await
    }
}

/// One LLM role: a provider bound to a system prompt and a model config.
pub struct AiService<P: AiProvider> {
    provider: P,
    system_prompt: String,
    config: AiConfig,
}

impl<P: AiProvider> AiService<P> {
    pub fn new(provider: P, system_prompt: String, config: AiConfig) -> Self {
        Self {
            provider,
            system_prompt,
            config,
        }
    }

    pub async fn chat(
        &self,
        context_messages: &[AiMessage],
    ) -> Result<AiResponse, Box<dyn Error + Send + Sync>> {
        // System prompt first, then the conversation
        let mut messages = Vec::with_capacity(context_messages.len() + 1);
        messages.push(AiMessage::system(self.system_prompt.clone()));
        messages.extend(context_messages.iter().cloned());

        let response = self
            .provider
            .chat_complete(&messages, &[], &self.config)
            .await?;

        Ok(AiResponse {
            answer: response.content.trim().to_string(),
            reasoning: response.thinking,
        })
    }

    /// Single-turn convenience around [`AiService::chat`].
    pub async fn ask(&self, prompt: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
        let response = self.chat(&[AiMessage::user(prompt)]).await?;
        if let Some(reasoning) = &response.reasoning {
            tracing::debug!(
                "{} returned {} chars of reasoning",
                self.config.model,
                reasoning.len()
            );
        }
        Ok(response.answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct EchoProvider {
        seen: Mutex<Vec<AiMessage>>,
    }

    #[async_trait]
    impl AiProvider for EchoProvider {
        async fn chat_complete(
            &self,
            messages: &[AiMessage],
            _tools: &[AiTool],
            _config: &AiConfig,
        ) -> Result<AiProviderResponse, Box<dyn Error + Send + Sync>> {
            *self.seen.lock().unwrap() = messages.to_vec();
            Ok(AiProviderResponse {
                content: format!("  echo: {}  ", messages.last().unwrap().content),
                thinking: Some("considered it".to_string()),
                tool_calls: vec![],
            })
        }
    }

    #[tokio::test]
    async fn test_chat_prepends_system_prompt() {
        let provider = EchoProvider {
            seen: Mutex::new(vec![]),
        };
        let service = AiService::new(provider, "be brief".to_string(), AiConfig::new("m"));

        let response = service.chat(&[AiMessage::user("hi")]).await.unwrap();

        assert_eq!(response.answer, "echo: hi");
        assert_eq!(response.reasoning.as_deref(), Some("considered it"));
        let seen = service.provider.seen.lock().unwrap();
        assert_eq!(seen[0], AiMessage::system("be brief"));
        assert_eq!(seen[1], AiMessage::user("hi"));
    }
}
