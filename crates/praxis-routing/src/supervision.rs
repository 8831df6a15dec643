use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::Level;

use praxis_observability::{emit_event, ObservabilityEvent, ProcessKind};
use praxis_types::{ChatOptions, Message, TaskType, ToolCall, ToolSchema, Usage};

use crate::cost::call_cost;
use crate::router::TierRouter;

const HIGH_STAKES_TASKS: [TaskType; 3] =
    [TaskType::Exploitation, TaskType::Analysis, TaskType::Planning];

#[derive(Debug, Clone)]
pub struct ValidationRule {
    pub task_type: TaskType,
    pub min_confidence: f64,
    pub requires_validation: bool,
}

/// Static validation policy: which tasks get a supervisor pass and the
/// confidence floor each must clear.
#[derive(Debug, Clone)]
pub struct TaskValidator {
    rules: Vec<ValidationRule>,
}

impl TaskValidator {
    /// Builds the default rule table. A configured confidence threshold
    /// above zero overrides every rule's minimum.
    pub fn new(confidence_threshold: f64) -> Self {
        let mut rules = vec![
            ValidationRule {
                task_type: TaskType::Analysis,
                min_confidence: 0.8,
                requires_validation: true,
            },
            ValidationRule {
                task_type: TaskType::Exploitation,
                min_confidence: 0.9,
                requires_validation: true,
            },
            ValidationRule {
                task_type: TaskType::Planning,
                min_confidence: 0.7,
                requires_validation: false,
            },
            ValidationRule {
                task_type: TaskType::CodeReview,
                min_confidence: 0.75,
                requires_validation: true,
            },
            ValidationRule {
                task_type: TaskType::ToolSelection,
                min_confidence: 0.6,
                requires_validation: false,
            },
        ];
        if confidence_threshold > 0.0 {
            for rule in &mut rules {
                rule.min_confidence = confidence_threshold;
            }
        }
        Self { rules }
    }

    pub fn rule_for(&self, task: TaskType) -> Option<&ValidationRule> {
        self.rules.iter().find(|r| r.task_type == task)
    }
}

/// Outcome of a supervised route. Tool calls pass through from the worker
/// untouched; supervision judges the prose.
#[derive(Debug, Clone)]
pub struct SupervisionResult {
    pub original_task: TaskType,
    pub supervisor_task: TaskType,
    pub validated: bool,
    pub corrections: Vec<String>,
    pub final_output: String,
    pub tool_calls: Vec<ToolCall>,
    pub worker_model: String,
    pub supervisor_model: String,
    pub validation_score: f64,
    pub worker_usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ValidationDecision {
    #[serde(default)]
    approved: bool,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    corrections: Vec<String>,
    #[serde(default)]
    final_output: String,
}

fn is_high_stakes(task: TaskType) -> bool {
    HIGH_STAKES_TASKS.contains(&task)
}

fn validation_prompt(task: TaskType, worker_output: &str) -> String {
    format!(
        r#"Please validate the following {task} task output:

WORKER OUTPUT:
{worker_output}

Validation Requirements:
1. Check for accuracy, correctness, and completeness
2. Identify any potential issues, errors, or security concerns
3. If issues found, provide specific corrections
4. Approve if output is correct, or provide improved version

Respond in JSON format:
{{
  "approved": true/false,
  "confidence": 0.0-1.0,
  "corrections": ["specific correction 1", "specific correction 2"],
  "final_output": "approved or corrected output"
}}"#
    )
}

/// Parses the supervisor's verdict from whatever it wrote. No JSON object
/// at all soft-approves with the worker's text; a malformed object
/// soft-approves at lower confidence with a recorded note.
fn parse_validation_decision(supervisor_content: &str, worker_content: &str) -> ValidationDecision {
    let start = supervisor_content.find('{');
    let end = supervisor_content.rfind('}');

    let (Some(start), Some(end)) = (start, end) else {
        return ValidationDecision {
            approved: true,
            confidence: 0.7,
            corrections: Vec::new(),
            final_output: worker_content.to_string(),
        };
    };
    if end <= start {
        return ValidationDecision {
            approved: true,
            confidence: 0.7,
            corrections: Vec::new(),
            final_output: worker_content.to_string(),
        };
    }

    let mut decision = match serde_json::from_str::<ValidationDecision>(
        &supervisor_content[start..=end],
    ) {
        Ok(decision) => decision,
        Err(err) => {
            tracing::warn!(
                target: "praxis.routing",
                error = %err,
                "failed to parse supervisor verdict, soft-approving"
            );
            return ValidationDecision {
                approved: true,
                confidence: 0.6,
                corrections: vec!["failed to parse validation response".to_string()],
                final_output: worker_content.to_string(),
            };
        }
    };

    if !(0.0..=1.0).contains(&decision.confidence) {
        decision.confidence = 0.8;
    }
    if decision.final_output.is_empty() {
        decision.final_output = worker_content.to_string();
    }
    decision
}

impl TierRouter {
    /// Routes a task under hierarchical oversight: the worker tier answers,
    /// the supervisor tier validates, corrects, or is bypassed entirely
    /// when the task's rule does not require validation.
    #[allow(clippy::too_many_arguments)]
    pub async fn route_with_supervision(
        &self,
        task: TaskType,
        messages: &[Message],
        tools: &[ToolSchema],
        options: &ChatOptions,
        session_key: &str,
        cancel: CancellationToken,
    ) -> anyhow::Result<SupervisionResult> {
        let requires_validation = self
            .validator
            .as_ref()
            .and_then(|v| v.rule_for(task))
            .map(|r| r.requires_validation)
            .unwrap_or(false);

        if self.validator.is_none() || !requires_validation {
            let (_, tier_cfg, response) = self
                .route_chat_inner(task, messages, tools, options, session_key, cancel)
                .await?;
            return Ok(SupervisionResult {
                original_task: task,
                supervisor_task: task,
                validated: true,
                corrections: Vec::new(),
                final_output: response.content,
                tool_calls: response.tool_calls,
                worker_model: tier_cfg.model_name,
                supervisor_model: "none".to_string(),
                validation_score: 1.0,
                worker_usage: response.usage,
            });
        }

        let (_, worker_cfg, worker_resp) = self
            .route_chat_inner(task, messages, tools, options, session_key, cancel.clone())
            .await?;

        let mut validation_messages = messages.to_vec();
        validation_messages.push(Message::user(validation_prompt(task, &worker_resp.content)));

        let mut supervisor = None;
        let max_attempts = 2;
        for attempt in 1..=max_attempts {
            match self
                .route_chat_inner(
                    TaskType::Supervision,
                    &validation_messages,
                    tools,
                    options,
                    session_key,
                    cancel.clone(),
                )
                .await
            {
                Ok(result) => {
                    supervisor = Some(result);
                    break;
                }
                Err(err) => {
                    tracing::warn!(
                        target: "praxis.routing",
                        attempt,
                        max_attempts,
                        task = task.as_str(),
                        error = %err,
                        "supervisor validation attempt failed"
                    );
                }
            }
        }

        let Some((_, supervisor_cfg, supervisor_resp)) = supervisor else {
            emit_event(
                Level::ERROR,
                ProcessKind::Engine,
                ObservabilityEvent {
                    event: "supervision.fallback",
                    component: "supervision-router",
                    session_key: Some(session_key),
                    mission_target: None,
                    task: Some(task.as_str()),
                    tier: None,
                    model: None,
                    status: Some("supervisor_unavailable"),
                    error_code: None,
                    detail: None,
                },
            );
            self.cost_tracker()
                .record_supervision(session_key, false, true, true, 0, 0.0, 0.5, 0.0);
            return Ok(fallback_result(task, &worker_cfg.model_name, worker_resp));
        };

        let supervision_cost = call_cost(&supervisor_cfg.cost_per_m, supervisor_resp.usage);
        let decision = parse_validation_decision(&supervisor_resp.content, &worker_resp.content);

        if decision.approved && decision.confidence >= 0.7 {
            let savings = (call_cost(&supervisor_cfg.cost_per_m, worker_resp.usage)
                - call_cost(&worker_cfg.cost_per_m, worker_resp.usage))
            .max(0.0);
            self.cost_tracker().record_supervision(
                session_key,
                true,
                false,
                false,
                decision.corrections.len(),
                supervision_cost,
                decision.confidence,
                savings,
            );
            return Ok(SupervisionResult {
                original_task: task,
                supervisor_task: TaskType::Supervision,
                validated: true,
                corrections: decision.corrections,
                final_output: decision.final_output,
                tool_calls: worker_resp.tool_calls,
                worker_model: worker_cfg.model_name,
                supervisor_model: supervisor_cfg.model_name,
                validation_score: decision.confidence,
                worker_usage: worker_resp.usage,
            });
        }

        tracing::warn!(
            target: "praxis.routing",
            approved = decision.approved,
            confidence = decision.confidence,
            task = task.as_str(),
            "supervisor rejected output or low confidence"
        );

        if is_high_stakes(task) {
            self.cost_tracker().record_supervision(
                session_key,
                false,
                true,
                false,
                decision.corrections.len(),
                supervision_cost,
                decision.confidence,
                0.0,
            );
            anyhow::bail!(
                "high-stakes task {task} failed validation with confidence {:.2}",
                decision.confidence
            );
        }

        if !decision.final_output.is_empty() && decision.final_output != worker_resp.content {
            self.cost_tracker().record_supervision(
                session_key,
                false,
                true,
                false,
                decision.corrections.len(),
                supervision_cost,
                decision.confidence,
                0.0,
            );
            return Ok(SupervisionResult {
                original_task: task,
                supervisor_task: TaskType::Supervision,
                validated: false,
                corrections: decision.corrections,
                final_output: decision.final_output,
                tool_calls: worker_resp.tool_calls,
                worker_model: worker_cfg.model_name,
                supervisor_model: supervisor_cfg.model_name,
                validation_score: decision.confidence,
                worker_usage: worker_resp.usage,
            });
        }

        self.cost_tracker().record_supervision(
            session_key,
            false,
            true,
            true,
            0,
            supervision_cost,
            decision.confidence,
            0.0,
        );
        Ok(fallback_result(task, &worker_cfg.model_name, worker_resp))
    }
}

fn fallback_result(
    task: TaskType,
    worker_model: &str,
    worker_resp: praxis_types::LlmResponse,
) -> SupervisionResult {
    SupervisionResult {
        original_task: task,
        supervisor_task: TaskType::Supervision,
        validated: false,
        corrections: Vec::new(),
        final_output: worker_resp.content,
        tool_calls: worker_resp.tool_calls,
        worker_model: worker_model.to_string(),
        supervisor_model: "fallback".to_string(),
        validation_score: 0.5,
        worker_usage: worker_resp.usage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use praxis_observability::EventBus;
    use praxis_providers::{Provider, ProviderRegistry};
    use praxis_types::{
        AgentContext, CostPerM, LlmResponse, RoutingConfig, TierConfig,
    };

    struct MockProvider {
        responses: Mutex<VecDeque<anyhow::Result<LlmResponse>>>,
        calls: AtomicUsize,
    }

    impl MockProvider {
        fn new(responses: Vec<anyhow::Result<LlmResponse>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn text_response(content: &str) -> LlmResponse {
        LlmResponse {
            content: content.to_string(),
            usage: Usage {
                prompt_tokens: 20,
                completion_tokens: 30,
                total_tokens: 50,
            },
            ..LlmResponse::default()
        }
    }

    #[async_trait]
    impl Provider for MockProvider {
        async fn chat(
            &self,
            _messages: &[Message],
            _tools: &[ToolSchema],
            _model: &str,
            _options: &ChatOptions,
            _cancel: CancellationToken,
        ) -> anyhow::Result<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Ok(text_response("Mock response")))
        }
    }

    fn tier(model: &str, use_for: &[&str], input: f64, output: f64) -> TierConfig {
        TierConfig {
            model_name: model.to_string(),
            use_for: use_for.iter().map(|s| s.to_string()).collect(),
            cost_per_m: CostPerM { input, output },
        }
    }

    fn supervised_config() -> RoutingConfig {
        let mut tiers = HashMap::new();
        tiers.insert(
            "balanced".to_string(),
            tier("worker-model", &["analysis", "exploitation", "code_review"], 3.0, 15.0),
        );
        tiers.insert(
            "heavy".to_string(),
            tier("supervisor-model", &["supervision"], 15.0, 75.0),
        );
        RoutingConfig {
            enabled: true,
            default_tier: "balanced".to_string(),
            tiers,
            enable_supervision: true,
            supervisor_tier: "heavy".to_string(),
            validation_confidence_threshold: 0.0,
            min_task_complexity_for_supervision: 0,
        }
    }

    fn registry(entries: Vec<(&str, Arc<MockProvider>)>) -> ProviderRegistry {
        let map: HashMap<String, Arc<dyn Provider>> = entries
            .into_iter()
            .map(|(name, provider)| (name.to_string(), provider as Arc<dyn Provider>))
            .collect();
        ProviderRegistry::new(map)
    }

    #[tokio::test]
    async fn simple_classification_routes_without_supervision() {
        // Scenario: two tiers, supervision disabled, "analyze this log".
        let mut tiers = HashMap::new();
        tiers.insert("heavy".to_string(), tier("model-a", &["analysis"], 3.0, 15.0));
        tiers.insert("light".to_string(), tier("model-b", &["parsing"], 0.25, 1.25));
        let config = RoutingConfig {
            enabled: true,
            default_tier: "heavy".to_string(),
            tiers,
            ..RoutingConfig::default()
        };

        let provider_a = MockProvider::new(vec![Ok(text_response("done"))]);
        let provider_b = MockProvider::new(vec![]);
        let router = TierRouter::new(
            config,
            registry(vec![("model-a", provider_a.clone()), ("model-b", provider_b.clone())]),
            EventBus::new(),
        );

        let ctx = AgentContext {
            turn_count: 2,
            user_message: "analyze this log".to_string(),
            ..AgentContext::default()
        };
        let (task, enriched) = router.classify_task(&ctx);
        assert_eq!(task, TaskType::Analysis);
        assert!(!enriched.requires_supervision);

        let (tier_name, tier_cfg) = router.select_tier(task).expect("tier");
        assert_eq!(tier_name, "heavy");
        assert_eq!(tier_cfg.model_name, "model-a");

        let response = router
            .route_chat(task, &[Message::user("analyze this log")], &[], &ChatOptions::default(), "s1", CancellationToken::new())
            .await
            .expect("route");
        assert_eq!(response.content, "done");
        assert_eq!(provider_a.call_count(), 1);
        assert_eq!(provider_b.call_count(), 0);

        let session = router.cost_tracker().get_session("s1").expect("cost");
        assert_eq!(session.by_tier["heavy"].calls, 1);
    }

    #[tokio::test]
    async fn large_tool_output_classifies_as_parsing() {
        let mut tiers = HashMap::new();
        tiers.insert("heavy".to_string(), tier("model-a", &["analysis"], 3.0, 15.0));
        tiers.insert("light".to_string(), tier("model-b", &["parsing"], 0.25, 1.25));
        let config = RoutingConfig {
            enabled: true,
            default_tier: "heavy".to_string(),
            tiers,
            ..RoutingConfig::default()
        };
        let router = TierRouter::new(config, registry(vec![]), EventBus::new());

        let ctx = AgentContext {
            turn_count: 3,
            last_tool_output: "x".repeat(5_000),
            user_message: "please continue".to_string(),
            ..AgentContext::default()
        };
        let (task, _) = router.classify_task(&ctx);
        assert_eq!(task, TaskType::Parsing);

        let (tier_name, _) = router.select_tier(task).expect("tier");
        assert_eq!(tier_name, "light");
    }

    #[tokio::test]
    async fn supervised_happy_path_validates_worker_output() {
        let worker_text = "exploit analysis: the form is injectable";
        let worker = MockProvider::new(vec![Ok(text_response(worker_text))]);
        let supervisor = MockProvider::new(vec![Ok(text_response(&format!(
            r#"{{"approved":true,"confidence":0.95,"corrections":[],"final_output":"{worker_text}"}}"#
        )))]);

        let router = TierRouter::new(
            supervised_config(),
            registry(vec![("worker-model", worker.clone()), ("supervisor-model", supervisor.clone())]),
            EventBus::new(),
        );

        let result = router
            .route_with_supervision(
                TaskType::Exploitation,
                &[Message::user("exploit the login form")],
                &[],
                &ChatOptions::default(),
                "s1",
                CancellationToken::new(),
            )
            .await
            .expect("supervised route");

        assert!(result.validated);
        assert_eq!(result.final_output, worker_text);
        assert_eq!(result.worker_model, "worker-model");
        assert_eq!(result.supervisor_model, "supervisor-model");
        assert_eq!(worker.call_count(), 1);
        assert_eq!(supervisor.call_count(), 1);

        let stats = router.cost_tracker().get_session("s1").expect("cost").supervision;
        assert_eq!(stats.total_supervisions, 1);
        assert_eq!(stats.failed_validations, 0);
        assert_eq!(stats.corrections, 0);
        assert!(stats.estimated_savings > 0.0);
        assert!(stats.total_supervision_cost > 0.0);
    }

    #[tokio::test]
    async fn supervisor_correction_is_carried_for_low_stakes_tasks() {
        let worker = MockProvider::new(vec![Ok(text_response("this code is fine"))]);
        let supervisor = MockProvider::new(vec![Ok(text_response(
            r#"{"approved":false,"confidence":0.9,"corrections":["c1","c2"],"final_output":"the code has a SQL injection"}"#,
        ))]);

        let router = TierRouter::new(
            supervised_config(),
            registry(vec![("worker-model", worker), ("supervisor-model", supervisor)]),
            EventBus::new(),
        );

        let result = router
            .route_with_supervision(
                TaskType::CodeReview,
                &[Message::user("review this code")],
                &[],
                &ChatOptions::default(),
                "s1",
                CancellationToken::new(),
            )
            .await
            .expect("supervised route");

        assert!(!result.validated);
        assert_eq!(result.final_output, "the code has a SQL injection");
        assert_eq!(result.corrections, vec!["c1".to_string(), "c2".to_string()]);

        let stats = router.cost_tracker().get_session("s1").expect("cost").supervision;
        assert_eq!(stats.failed_validations, 1);
        assert_eq!(stats.corrections, 2);
    }

    #[tokio::test]
    async fn unreachable_supervisor_falls_back_to_worker_output() {
        let worker = MockProvider::new(vec![Ok(text_response("analysis complete"))]);
        let supervisor = MockProvider::new(vec![
            Err(anyhow::anyhow!("connection refused")),
            Err(anyhow::anyhow!("connection refused")),
        ]);

        let router = TierRouter::new(
            supervised_config(),
            registry(vec![("worker-model", worker), ("supervisor-model", supervisor.clone())]),
            EventBus::new(),
        );

        let result = router
            .route_with_supervision(
                TaskType::CodeReview,
                &[Message::user("review this code")],
                &[],
                &ChatOptions::default(),
                "s1",
                CancellationToken::new(),
            )
            .await
            .expect("supervised route");

        assert!(!result.validated);
        assert_eq!(result.final_output, "analysis complete");
        assert_eq!(result.supervisor_model, "fallback");
        assert_eq!(result.validation_score, 0.5);
        assert_eq!(supervisor.call_count(), 2);

        let stats = router.cost_tracker().get_session("s1").expect("cost").supervision;
        assert_eq!(stats.failed_validations, 1);
        assert_eq!(stats.fallbacks_used, 1);
    }

    #[tokio::test]
    async fn high_stakes_rejection_is_an_error() {
        let worker = MockProvider::new(vec![Ok(text_response("it is probably fine"))]);
        let supervisor = MockProvider::new(vec![Ok(text_response(
            r#"{"approved":false,"confidence":0.4,"corrections":[],"final_output":""}"#,
        ))]);

        let router = TierRouter::new(
            supervised_config(),
            registry(vec![("worker-model", worker), ("supervisor-model", supervisor)]),
            EventBus::new(),
        );

        let err = router
            .route_with_supervision(
                TaskType::Exploitation,
                &[Message::user("exploit this")],
                &[],
                &ChatOptions::default(),
                "s1",
                CancellationToken::new(),
            )
            .await
            .expect_err("high-stakes rejection must not be silently accepted");
        assert!(err.to_string().contains("failed validation"));
    }

    #[tokio::test]
    async fn non_validating_tasks_skip_the_supervisor() {
        let worker = MockProvider::new(vec![Ok(text_response("plan: enumerate first"))]);
        let supervisor = MockProvider::new(vec![]);

        let mut config = supervised_config();
        config
            .tiers
            .get_mut("balanced")
            .expect("tier")
            .use_for
            .push("planning".to_string());

        let router = TierRouter::new(
            config,
            registry(vec![("worker-model", worker.clone()), ("supervisor-model", supervisor.clone())]),
            EventBus::new(),
        );

        let result = router
            .route_with_supervision(
                TaskType::Planning,
                &[Message::user("plan the mission")],
                &[],
                &ChatOptions::default(),
                "s1",
                CancellationToken::new(),
            )
            .await
            .expect("route");

        assert!(result.validated);
        assert_eq!(result.supervisor_model, "none");
        assert_eq!(worker.call_count(), 1);
        assert_eq!(supervisor.call_count(), 0);
    }

    #[tokio::test]
    async fn disabled_routing_always_uses_default_tier() {
        let mut tiers = HashMap::new();
        tiers.insert("fast".to_string(), tier("model-a", &["parsing"], 0.25, 1.25));
        let config = RoutingConfig {
            enabled: false,
            default_tier: "fast".to_string(),
            tiers,
            ..RoutingConfig::default()
        };
        let router = TierRouter::new(config, registry(vec![]), EventBus::new());

        let (name, _) = router.select_tier(TaskType::Exploitation).expect("tier");
        assert_eq!(name, "fast");
    }

    struct StalledProvider;

    #[async_trait]
    impl Provider for StalledProvider {
        async fn chat(
            &self,
            _messages: &[Message],
            _tools: &[ToolSchema],
            _model: &str,
            _options: &ChatOptions,
            _cancel: CancellationToken,
        ) -> anyhow::Result<LlmResponse> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(text_response("too late"))
        }
    }

    #[tokio::test]
    async fn provider_calls_carry_the_configured_deadline() {
        let mut tiers = HashMap::new();
        tiers.insert("fast".to_string(), tier("slow-model", &["analysis"], 1.0, 1.0));
        let config = RoutingConfig {
            enabled: true,
            default_tier: "fast".to_string(),
            tiers,
            ..RoutingConfig::default()
        };

        let map: HashMap<String, Arc<dyn Provider>> = [(
            "slow-model".to_string(),
            Arc::new(StalledProvider) as Arc<dyn Provider>,
        )]
        .into_iter()
        .collect();
        let router = TierRouter::new(config, ProviderRegistry::new(map), EventBus::new())
            .with_provider_timeout(Duration::from_millis(20));

        let err = router
            .route_chat(
                TaskType::Analysis,
                &[Message::user("analyze")],
                &[],
                &ChatOptions::default(),
                "s1",
                CancellationToken::new(),
            )
            .await
            .expect_err("deadline must cut the call short");
        assert!(format!("{err:#}").contains("timed out after 0s"));
    }

    #[tokio::test]
    async fn missing_provider_is_an_error() {
        let mut tiers = HashMap::new();
        tiers.insert("fast".to_string(), tier("ghost-model", &["analysis"], 1.0, 1.0));
        let config = RoutingConfig {
            enabled: true,
            default_tier: "fast".to_string(),
            tiers,
            ..RoutingConfig::default()
        };
        let router = TierRouter::new(config, registry(vec![]), EventBus::new());

        let err = router
            .route_chat(
                TaskType::Analysis,
                &[Message::user("analyze")],
                &[],
                &ChatOptions::default(),
                "s1",
                CancellationToken::new(),
            )
            .await
            .expect_err("provider lookup must fail");
        assert!(err.to_string().contains("ghost-model"));
    }

    #[test]
    fn verdict_without_braces_soft_approves_with_worker_text() {
        let decision = parse_validation_decision("Looks good to me.", "worker text");
        assert!(decision.approved);
        assert_eq!(decision.confidence, 0.7);
        assert_eq!(decision.final_output, "worker text");
    }

    #[test]
    fn malformed_verdict_json_soft_approves_at_lower_confidence() {
        let decision = parse_validation_decision("{not valid json}", "worker text");
        assert!(decision.approved);
        assert_eq!(decision.confidence, 0.6);
        assert_eq!(decision.final_output, "worker text");
        assert_eq!(decision.corrections.len(), 1);
    }

    #[test]
    fn out_of_range_confidence_is_normalized() {
        let decision = parse_validation_decision(
            r#"{"approved":true,"confidence":7.5,"final_output":"ok"}"#,
            "worker",
        );
        assert_eq!(decision.confidence, 0.8);
    }

    #[test]
    fn configured_threshold_overrides_rule_minimums() {
        let validator = TaskValidator::new(0.85);
        for task in [TaskType::Analysis, TaskType::Planning, TaskType::ToolSelection] {
            let rule = validator.rule_for(task).expect("rule");
            assert_eq!(rule.min_confidence, 0.85);
        }

        let default_validator = TaskValidator::new(0.0);
        assert_eq!(
            default_validator.rule_for(TaskType::Exploitation).expect("rule").min_confidence,
            0.9
        );
    }

    #[test]
    fn requires_supervision_tracks_config_and_keywords() {
        let router = TierRouter::new(supervised_config(), registry(vec![]), EventBus::new());

        let calm = AgentContext {
            turn_count: 2,
            user_message: "summarize the notes".to_string(),
            confidence_score: 0.9,
            task_complexity: 3,
            ..AgentContext::default()
        };
        let (_, enriched) = router.classify_task(&calm);
        assert!(!enriched.requires_supervision);

        let risky = AgentContext {
            turn_count: 2,
            user_message: "how would an attacker breach this?".to_string(),
            confidence_score: 0.9,
            task_complexity: 3,
            ..AgentContext::default()
        };
        let (_, enriched) = router.classify_task(&risky);
        assert!(enriched.requires_supervision);
    }
}
