use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use praxis_types::{
    ChatOptions, FinishReason, LlmResponse, Message, Role, ToolCall, ToolSchema, Usage,
};

use crate::textcall::extract_tool_calls_from_text;
use crate::{normalize_model, truncate_for_error, Provider};

/// Backend speaking the OpenAI chat-completions wire format. Handles the
/// structured tool-call path and falls back to text-embedded recovery when
/// a model answers with tagged JSON instead.
pub struct OpenAiCompatProvider {
    api_key: Option<String>,
    api_base: String,
    /// Overrides the max-tokens field name. When unset the field is picked
    /// per model (reasoning models renamed it to `max_completion_tokens`).
    max_tokens_field: Option<String>,
    client: Client,
}

impl OpenAiCompatProvider {
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
            max_tokens_field: None,
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    pub fn with_max_tokens_field(mut self, field: impl Into<String>) -> Self {
        self.max_tokens_field = Some(field.into());
        self
    }

    fn max_tokens_field_for(&self, model: &str) -> String {
        if let Some(field) = &self.max_tokens_field {
            return field.clone();
        }
        let lower = model.to_lowercase();
        if lower.contains("glm") || lower.contains("o1") || lower.contains("gpt-5") {
            "max_completion_tokens".to_string()
        } else {
            "max_tokens".to_string()
        }
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        model: &str,
        options: &ChatOptions,
        cancel: CancellationToken,
    ) -> anyhow::Result<LlmResponse> {
        if self.api_base.is_empty() {
            anyhow::bail!("API base not configured");
        }

        let model = normalize_model(model, &self.api_base);

        let mut body = Map::new();
        body.insert("model".to_string(), json!(model));
        body.insert("messages".to_string(), json!(encode_messages(messages)));

        if !tools.is_empty() {
            body.insert("tools".to_string(), json!(encode_tools(tools)));
            body.insert("tool_choice".to_string(), json!("auto"));
        }

        if let Some(max_tokens) = options.max_tokens {
            body.insert(self.max_tokens_field_for(&model), json!(max_tokens));
        }

        if let Some(temperature) = options.temperature {
            // Kimi K2 models only accept temperature=1; clamp silently.
            let lower = model.to_lowercase();
            let temperature = if lower.contains("kimi") && lower.contains("k2") {
                1.0
            } else {
                temperature
            };
            body.insert("temperature".to_string(), json!(temperature));
        }

        // Stable cache key lets the backend bucket requests and reuse the
        // prefix KV cache across calls with the same key.
        if let Some(cache_key) = options.prompt_cache_key.as_deref() {
            if !cache_key.is_empty() {
                body.insert("prompt_cache_key".to_string(), json!(cache_key));
            }
        }

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

        parse_response(&raw)
    }
}

/// Wire-format message. Mirrors `Message` but drops `system_parts`, which
/// strict third-party endpoints reject as an unknown field, and re-encodes
/// tool calls into the function-call envelope the API expects.
#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn encode_messages(messages: &[Message]) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|m| WireMessage {
            role: role_str(m.role),
            content: m.content.clone(),
            tool_calls: m.tool_calls.iter().map(encode_tool_call).collect(),
            tool_call_id: m.tool_call_id.clone(),
        })
        .collect()
}

fn encode_tool_call(call: &ToolCall) -> Value {
    let mut wire = json!({
        "id": call.id,
        "type": "function",
        "function": {
            "name": call.name,
            "arguments": Value::Object(call.arguments.clone()).to_string(),
        }
    });
    // Opaque provider extension payloads ride along unchanged.
    if let Some(extra) = &call.extra {
        wire["extra_content"] = extra.clone();
    }
    wire
}

fn encode_tools(tools: &[ToolSchema]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                }
            })
        })
        .collect()
}

fn parse_response(raw: &str) -> anyhow::Result<LlmResponse> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|err| anyhow::anyhow!("failed to decode provider response: {err}"))?;

    let Some(choice) = value.get("choices").and_then(|v| v.get(0)) else {
        return Ok(LlmResponse::default());
    };

    let message = choice.get("message").cloned().unwrap_or_else(|| json!({}));
    let mut content = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let reasoning_content = message
        .get("reasoning_content")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string);

    let mut tool_calls = Vec::new();
    if let Some(raw_calls) = message.get("tool_calls").and_then(|v| v.as_array()) {
        for raw_call in raw_calls {
            if let Some(call) = decode_tool_call(raw_call) {
                tool_calls.push(call);
            }
        }
    }

    let mut finish_reason = FinishReason::from_wire(
        choice
            .get("finish_reason")
            .and_then(|v| v.as_str())
            .unwrap_or_default(),
    );

    // Fallback for models that ignore structured tool calling and emit
    // tagged JSON in the content instead.
    if tool_calls.is_empty() && !content.is_empty() {
        let extracted = extract_tool_calls_from_text(&content);
        if !extracted.is_empty() {
            tracing::debug!(
                target: "praxis.providers",
                count = extracted.len(),
                "extracted tool calls from text output"
            );
            tool_calls = extracted;
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
        reasoning_content,
        tool_calls,
        finish_reason,
        usage,
    })
}

fn decode_tool_call(raw: &Value) -> Option<ToolCall> {
    let id = raw.get("id").and_then(|v| v.as_str()).unwrap_or_default();
    let function = raw.get("function")?;
    let name = function.get("name").and_then(|v| v.as_str())?;
    if name.is_empty() {
        return None;
    }

    let mut arguments = Map::new();
    if let Some(raw_args) = function.get("arguments").and_then(|v| v.as_str()) {
        if !raw_args.is_empty() {
            match serde_json::from_str::<Map<String, Value>>(raw_args) {
                Ok(parsed) => arguments = parsed,
                Err(err) => {
                    tracing::warn!(
                        target: "praxis.providers",
                        tool = name,
                        error = %err,
                        "failed to decode tool call arguments"
                    );
                    arguments.insert("raw".to_string(), Value::String(raw_args.to_string()));
                }
            }
        }
    }

    let mut call = ToolCall::new(id, name, arguments);
    call.extra = raw.get("extra_content").cloned();
    Some(call)
}
