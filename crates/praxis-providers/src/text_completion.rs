use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use praxis_types::{ChatOptions, FinishReason, LlmResponse, Message, Role, ToolSchema, Usage};

use crate::textcall::extract_tool_calls_from_text;
use crate::{normalize_model, truncate_for_error, Provider};

/// Backend for local chat endpoints that have no structured tool calling
/// at all. The request never carries a tools field (several local servers
/// reject it), and every reply runs through text-embedded recovery, which
/// is the only way these models can invoke tools.
pub struct TextCompletionProvider {
    api_key: Option<String>,
    api_base: String,
    client: Client,
}

impl TextCompletionProvider {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Self {
        Self::with_timeout(api_base, api_key, Duration::from_secs(120))
    }

    pub fn with_timeout(
        api_base: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        let api_base: String = api_base.into();
        Self {
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }
}

#[async_trait]
impl Provider for TextCompletionProvider {
    async fn chat(
        &self,
        messages: &[Message],
        _tools: &[ToolSchema],
        model: &str,
        options: &ChatOptions,
        cancel: CancellationToken,
    ) -> anyhow::Result<LlmResponse> {
        if self.api_base.is_empty() {
            anyhow::bail!("API base not configured");
        }

        let model = normalize_model(model, &self.api_base);
        let body = build_request_body(messages, &model, options);

        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .json(&body);
        if let Some(api_key) = &self.api_key {
            req = req.bearer_auth(api_key);
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => anyhow::bail!("provider request cancelled"),
            result = req.send() => result?,
        };

        let status = response.status();
        let raw = response.text().await?;
        if !status.is_success() {
            anyhow::bail!(
                "API request failed:\n  Status: {}\n  Body:   {}",
                status.as_u16(),
                truncate_for_error(&raw, 500)
            );
        }

        decode_response(&raw)
    }
}

/// Plain chat-completions payload: role/content pairs only, never a tools
/// field.
fn build_request_body(messages: &[Message], model: &str, options: &ChatOptions) -> Value {
    let wire_messages: Vec<_> = messages
        .iter()
        .map(|m| {
            json!({
                "role": match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                },
                "content": m.content,
            })
        })
        .collect();

    let mut body = json!({
        "model": model,
        "messages": wire_messages,
        "stream": false,
    });
    if let Some(max_tokens) = options.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    if let Some(temperature) = options.temperature {
        body["temperature"] = json!(temperature);
    }
    body
}

fn decode_response(raw: &str) -> anyhow::Result<LlmResponse> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|err| anyhow::anyhow!("failed to decode provider response: {err}"))?;

    let Some(choice) = value.get("choices").and_then(|v| v.get(0)) else {
        return Ok(LlmResponse::default());
    };

    let mut content = choice
        .pointer("/message/content")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let mut finish_reason = FinishReason::from_wire(
        choice
            .get("finish_reason")
            .and_then(|v| v.as_str())
            .unwrap_or_default(),
    );

    let mut tool_calls = Vec::new();
    if !content.is_empty() {
        tool_calls = extract_tool_calls_from_text(&content);
        if !tool_calls.is_empty() {
            content.clear();
            finish_reason = FinishReason::ToolCalls;
        }
    }

    let usage = value
        .get("usage")
        .and_then(|v| serde_json::from_value::<Usage>(v.clone()).ok())
        .unwrap_or_default();

    Ok(LlmResponse {
        content,
        reasoning_content: None,
        tool_calls,
        finish_reason,
        usage,
    })
}
