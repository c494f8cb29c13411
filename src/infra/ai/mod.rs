// AI provider implementations.
// - `anthropic_client.rs` speaks the Anthropic Messages API.
// - `openai_client.rs` speaks OpenAI-compatible chat completions.

pub mod anthropic_client;
pub mod openai_client;

pub use anthropic_client::AnthropicClient;
pub use openai_client::OpenAiClient;

use crate::core::ai::AiProvider;
use std::sync::Arc;

/// Which provider `select_provider` settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
}

pub fn provider_kind(anthropic_key: Option<&str>) -> ProviderKind {
    match anthropic_key {
        Some(key) if !key.trim().is_empty() => ProviderKind::Anthropic,
        _ => ProviderKind::OpenAi,
    }
}

/// Anthropic when its key is set, otherwise the OpenAI-compatible endpoint.
///
/// Without any key the OpenAI client is still returned so startup succeeds;
/// every call will then fail with the provider's authentication error.
pub fn select_provider(
    anthropic_key: Option<String>,
    openai_key: Option<String>,
    openai_base_url: Option<String>,
) -> Arc<dyn AiProvider> {
    match provider_kind(anthropic_key.as_deref()) {
        ProviderKind::Anthropic => {
            tracing::info!("Using Anthropic provider");
            Arc::new(AnthropicClient::new(anthropic_key.unwrap_or_default()))
        }
        ProviderKind::OpenAi => {
            let key = openai_key.filter(|k| !k.trim().is_empty());
            if key.is_none() {
                tracing::warn!(
                    "Neither ANTHROPIC_API_KEY nor OPENAI_API_KEY is set; LLM calls will fail"
                );
            } else {
                tracing::info!("Using OpenAI-compatible provider");
            }
            Arc::new(OpenAiClient::new(key.unwrap_or_default(), openai_base_url))
        }
    }
}
