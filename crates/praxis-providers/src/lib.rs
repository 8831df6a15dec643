use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use praxis_types::{ChatOptions, LlmResponse, Message, ToolSchema};

mod openai_compat;
mod text_completion;
mod textcall;

pub use openai_compat::OpenAiCompatProvider;
pub use text_completion::TextCompletionProvider;
pub use textcall::extract_tool_calls_from_text;

/// Uniform chat contract over heterogeneous LLM backends. Implementations
/// are stateless after construction and safe to share across turns.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        model: &str,
        options: &ChatOptions,
        cancel: CancellationToken,
    ) -> anyhow::Result<LlmResponse>;
}

/// Maps model-name keys to the backend that serves them. The router looks
/// tiers up here by their configured model name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Arc<HashMap<String, Arc<dyn Provider>>>,
}

impl ProviderRegistry {
    pub fn new(providers: HashMap<String, Arc<dyn Provider>>) -> Self {
        Self {
            providers: Arc::new(providers),
        }
    }

    pub fn get(&self, model_name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(model_name).cloned()
    }

    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Strips a `<vendor>/` prefix for backends that expect a bare model name.
/// Aggregator APIs (detected by their base URL) require the prefixed form
/// and are left alone.
pub(crate) fn normalize_model(model: &str, api_base: &str) -> String {
    let Some(idx) = model.find('/') else {
        return model.to_string();
    };

    if api_base.to_lowercase().contains("openrouter.ai") {
        return model.to_string();
    }

    let prefix = model[..idx].to_lowercase();
    match prefix.as_str() {
        "moonshot" | "nvidia" | "groq" | "ollama" | "deepseek" | "google" | "openrouter"
        | "zhipu" | "mistral" => model[idx + 1..].to_string(),
        _ => model.to_string(),
    }
}

pub(crate) fn truncate_for_error(input: &str, max_len: usize) -> String {
    if input.len() <= max_len {
        input.to_string()
    } else {
        let mut end = max_len;
        while !input.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &input[..end])
    }
}
