use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::Level;

use praxis_observability::{emit_event, EventBus, ObservabilityEvent, ProcessKind};
use praxis_routing::TierRouter;
use praxis_tools::ToolRegistry;
use praxis_types::{AgentConfig, AgentContext, ChatOptions, EngineEvent, Message, Role, ToolCall};
use praxis_workflow::SharedEngine;

use crate::session::SessionStore;

const CAP_EXHAUSTED_REPLY: &str =
    "Reached the tool iteration limit for this turn. Summarize progress or narrow the request to continue.";
const NO_ITERATIONS_REPLY: &str = "Tool iteration limit reached; no model call was made.";

const IMPERATIVE_VERBS: [&str; 5] = ["write", "generate", "create", "produce", "give"];

/// Sentinel error for a turn aborted by its cancellation token. Callers
/// downcast to distinguish it from provider and routing failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnCancelled;

impl fmt::Display for TurnCancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("turn cancelled")
    }
}

impl std::error::Error for TurnCancelled {}

#[derive(Debug, Clone, Default)]
struct TurnCache {
    last_tool_output: String,
    last_phase: Option<usize>,
}

/// Drives one conversation turn at a time: assembles context, classifies
/// the turn, routes it, dispatches tool calls sequentially, and persists
/// the transcript. Holds non-owning handles to everything it coordinates.
pub struct AgentLoop {
    config: AgentConfig,
    router: Arc<TierRouter>,
    tools: ToolRegistry,
    sessions: Arc<SessionStore>,
    events: EventBus,
    workflow: SharedEngine,
    identity_blocks: Vec<String>,
    turn_cache: RwLock<HashMap<String, TurnCache>>,
}

impl AgentLoop {
    pub fn new(
        config: AgentConfig,
        router: Arc<TierRouter>,
        tools: ToolRegistry,
        sessions: Arc<SessionStore>,
        events: EventBus,
        workflow: SharedEngine,
        identity_blocks: Vec<String>,
    ) -> Self {
        Self {
            config,
            router,
            tools,
            sessions,
            events,
            workflow,
            identity_blocks,
            turn_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn workflow_handle(&self) -> SharedEngine {
        self.workflow.clone()
    }

    /// Processes one user turn to completion and returns the reply text.
    pub async fn process(
        &self,
        cancel: CancellationToken,
        user_text: &str,
        session_key: &str,
    ) -> anyhow::Result<String> {
        self.events.publish(EngineEvent::new(
            "turn.started",
            json!({"sessionKey": session_key}),
        ));

        let history = self.sessions.load(session_key).await;
        let turn_count = history.iter().filter(|m| m.role == Role::Assistant).count();

        let current_phase = {
            let guard = self.workflow.read().await;
            guard.as_ref().map(|engine| engine.current_phase())
        };
        let (phase_changed, cached_output) = {
            let cache = self.turn_cache.read().await;
            let entry = cache.get(session_key);
            let previous_phase = entry.and_then(|c| c.last_phase);
            let phase_changed = match (previous_phase, current_phase) {
                (Some(previous), Some(current)) => previous != current,
                _ => false,
            };
            let output = entry.map(|c| c.last_tool_output.clone()).unwrap_or_default();
            (phase_changed, output)
        };
        // Remember the phase seen at the start of this turn; an advance
        // during the turn flips phase_changed on the next one.
        {
            let mut cache = self.turn_cache.write().await;
            cache.entry(session_key.to_string()).or_default().last_phase = current_phase;
        }

        let ctx = AgentContext {
            turn_count,
            last_tool_output: cached_output,
            phase_changed,
            user_message: user_text.to_string(),
            tools_available: self.tools.len().await,
            report_requested: report_requested(user_text),
            session_started: history.is_empty(),
            ..AgentContext::default()
        };
        let (task, enriched) = self.router.classify_task(&ctx);
        let supervise = enriched.requires_supervision;

        emit_event(
            Level::INFO,
            ProcessKind::Engine,
            ObservabilityEvent {
                event: "turn.classified",
                component: "agent-loop",
                session_key: Some(session_key),
                mission_target: None,
                task: Some(task.as_str()),
                tier: None,
                model: None,
                status: Some(if supervise { "supervised" } else { "direct" }),
                error_code: None,
                detail: None,
            },
        );

        let user_message = Message::user(user_text);
        let mut messages = Vec::with_capacity(history.len() + 2);
        let system_text = self.system_prompt().await;
        if !system_text.is_empty() {
            messages.push(Message::system(system_text));
        }
        messages.extend(history);
        messages.push(user_message.clone());

        if self.config.max_tool_iterations == 0 {
            self.persist_turn(session_key, &user_message, &[]).await;
            self.events.publish(EngineEvent::new(
                "turn.cap_exhausted",
                json!({"sessionKey": session_key, "iterations": 0}),
            ));
            return Ok(NO_ITERATIONS_REPLY.to_string());
        }

        let tool_schemas = self.tools.list().await;
        let options = ChatOptions {
            prompt_cache_key: Some(session_key.to_string()),
            ..ChatOptions::default()
        };

        let mut produced: Vec<Message> = Vec::new();
        let mut reply: Option<String> = None;

        for _ in 0..self.config.max_tool_iterations {
            if cancel.is_cancelled() {
                return self
                    .finish_cancelled(session_key, &user_message, &produced)
                    .await;
            }

            let (content, tool_calls) = if supervise {
                match self
                    .router
                    .route_with_supervision(
                        task,
                        &messages,
                        &tool_schemas,
                        &options,
                        session_key,
                        cancel.clone(),
                    )
                    .await
                {
                    Ok(result) => (result.final_output, result.tool_calls),
                    Err(err) => {
                        if cancel.is_cancelled() {
                            return self
                                .finish_cancelled(session_key, &user_message, &produced)
                                .await;
                        }
                        return Err(err);
                    }
                }
            } else {
                match self
                    .router
                    .route_chat(
                        task,
                        &messages,
                        &tool_schemas,
                        &options,
                        session_key,
                        cancel.clone(),
                    )
                    .await
                {
                    Ok(response) => (response.content, response.tool_calls),
                    Err(err) => {
                        if cancel.is_cancelled() {
                            return self
                                .finish_cancelled(session_key, &user_message, &produced)
                                .await;
                        }
                        return Err(err);
                    }
                }
            };

            let mut assistant = Message::assistant(content.clone());
            assistant.tool_calls = tool_calls.clone();
            messages.push(assistant.clone());
            produced.push(assistant);

            if tool_calls.is_empty() {
                reply = Some(content);
                break;
            }

            let results = self
                .dispatch_tools(session_key, &tool_calls, &cancel)
                .await;
            let Some(results) = results else {
                return self
                    .finish_cancelled(session_key, &user_message, &produced)
                    .await;
            };

            let mut largest = String::new();
            for (call_id, text) in results {
                if text.len() > largest.len() {
                    largest = text.clone();
                }
                let tool_message = Message::tool(call_id, text);
                messages.push(tool_message.clone());
                produced.push(tool_message);
            }
            // The largest single output of the batch feeds the next
            // turn's classification; length is all it looks at.
            let mut cache = self.turn_cache.write().await;
            cache
                .entry(session_key.to_string())
                .or_default()
                .last_tool_output = largest;
        }

        let reply = match reply {
            Some(reply) => {
                self.events.publish(EngineEvent::new(
                    "turn.completed",
                    json!({"sessionKey": session_key, "messages": produced.len()}),
                ));
                reply
            }
            None => {
                let terminal = Message::assistant(CAP_EXHAUSTED_REPLY);
                produced.push(terminal);
                self.events.publish(EngineEvent::new(
                    "turn.cap_exhausted",
                    json!({
                        "sessionKey": session_key,
                        "iterations": self.config.max_tool_iterations,
                    }),
                ));
                CAP_EXHAUSTED_REPLY.to_string()
            }
        };

        self.persist_turn(session_key, &user_message, &produced).await;
        Ok(reply)
    }

    async fn system_prompt(&self) -> String {
        let mut text = self.identity_blocks.join("\n\n");
        let guard = self.workflow.read().await;
        if let Some(engine) = guard.as_ref() {
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str(&engine.context_prompt());
        }
        text
    }

    /// Dispatches the batch sequentially, preserving a total order over
    /// tool effects. Returns None when cancellation interrupted the batch.
    async fn dispatch_tools(
        &self,
        session_key: &str,
        tool_calls: &[ToolCall],
        cancel: &CancellationToken,
    ) -> Option<Vec<(String, String)>> {
        let mut results = Vec::with_capacity(tool_calls.len());

        for call in tool_calls {
            if cancel.is_cancelled() {
                return None;
            }

            self.events.publish(EngineEvent::new(
                "tool.invoked",
                json!({
                    "sessionKey": session_key,
                    "tool": call.name,
                    "callId": call.id,
                }),
            ));

            let args = Value::Object(call.arguments.clone());
            let outcome = tokio::time::timeout(
                self.config.tool_timeout(),
                self.tools.execute(&call.name, args, cancel.clone()),
            )
            .await;

            let text = match outcome {
                Ok(Ok(result)) => result.output,
                // A failed tool is conversation content, not a loop error.
                Ok(Err(err)) => format!("Tool error: {err}"),
                Err(_) => format!(
                    "Tool '{}' timed out after {}s",
                    call.name, self.config.tool_timeout_secs
                ),
            };

            self.events.publish(EngineEvent::new(
                "tool.completed",
                json!({
                    "sessionKey": session_key,
                    "tool": call.name,
                    "callId": call.id,
                    "outputBytes": text.len(),
                }),
            ));

            results.push((call.id.clone(), text));
        }

        Some(results)
    }

    async fn finish_cancelled(
        &self,
        session_key: &str,
        user_message: &Message,
        produced: &[Message],
    ) -> anyhow::Result<String> {
        self.persist_turn(session_key, user_message, produced).await;
        self.events.publish(EngineEvent::new(
            "turn.cancelled",
            json!({"sessionKey": session_key}),
        ));
        Err(anyhow::Error::new(TurnCancelled))
    }

    /// Best-effort persistence: a failure is logged and never clobbers the
    /// in-flight reply.
    async fn persist_turn(&self, session_key: &str, user_message: &Message, produced: &[Message]) {
        self.sessions.append(session_key, user_message).await;
        for message in produced {
            self.sessions.append(session_key, message).await;
        }
        if let Err(err) = self.sessions.save(session_key).await {
            tracing::warn!(
                target: "praxis.core",
                session_key,
                error = %err,
                "failed to persist session log"
            );
        }
    }
}

/// The text asks for a report when "report" appears alongside an
/// imperative verb.
fn report_requested(user_text: &str) -> bool {
    let lower = user_text.to_lowercase();
    lower.contains("report") && IMPERATIVE_VERBS.iter().any(|verb| lower.contains(verb))
}
