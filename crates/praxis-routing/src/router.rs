use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::Level;

use praxis_observability::{emit_event, EventBus, ObservabilityEvent, ProcessKind};
use praxis_providers::ProviderRegistry;
use praxis_types::{
    AgentContext, ChatOptions, EngineEvent, LlmResponse, Message, RoutingConfig, TaskType,
    TierConfig, ToolSchema,
};

use crate::classifier::classify;
use crate::cost::CostTracker;
use crate::supervision::TaskValidator;

const CRITICAL_KEYWORDS: [&str; 5] = ["exploit", "vulnerability", "attack", "hack", "breach"];

/// Routes each task to the tier that claims it, records cost, and (when
/// supervision is enabled) arranges for a supervisor model to validate the
/// worker's output.
pub struct TierRouter {
    config: RoutingConfig,
    providers: ProviderRegistry,
    costs: Arc<CostTracker>,
    events: EventBus,
    provider_timeout: Duration,
    pub(crate) validator: Option<TaskValidator>,
}

impl TierRouter {
    pub fn new(config: RoutingConfig, providers: ProviderRegistry, events: EventBus) -> Self {
        let validator = if config.enabled && config.enable_supervision {
            Some(TaskValidator::new(config.validation_confidence_threshold))
        } else {
            None
        };
        Self {
            config,
            providers,
            costs: Arc::new(CostTracker::new()),
            events,
            provider_timeout: Duration::from_secs(120),
            validator,
        }
    }

    /// Per-call deadline applied to every provider exchange, including the
    /// worker and each supervisor attempt individually.
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn cost_tracker(&self) -> Arc<CostTracker> {
        self.costs.clone()
    }

    /// Classifies the turn and resolves the supervision decision against
    /// this router's configuration.
    pub fn classify_task(&self, ctx: &AgentContext) -> (TaskType, AgentContext) {
        let (task, mut enriched) = classify(ctx);
        enriched.requires_supervision =
            enriched.requires_supervision || self.requires_supervision(&enriched);
        (task, enriched)
    }

    fn requires_supervision(&self, ctx: &AgentContext) -> bool {
        if !self.config.enabled || !self.config.enable_supervision {
            return false;
        }

        let min_complexity = if self.config.min_task_complexity_for_supervision > 0 {
            self.config.min_task_complexity_for_supervision
        } else {
            7
        };
        if ctx.task_complexity >= min_complexity {
            return true;
        }

        if ctx.confidence_score < 0.6 {
            return true;
        }

        let user_lower = ctx.user_message.to_lowercase();
        if CRITICAL_KEYWORDS.iter().any(|k| user_lower.contains(k)) {
            return true;
        }

        // Long-running work that stayed complex gets a second pair of eyes.
        ctx.turn_count > 5 && ctx.task_complexity > 6
    }

    /// Resolves the tier serving a task. When routing is disabled the
    /// default tier always wins; otherwise the first tier claiming the
    /// task, then the default, then an error.
    pub fn select_tier(&self, task: TaskType) -> anyhow::Result<(String, TierConfig)> {
        if !self.config.enabled {
            return self
                .default_tier()
                .ok_or_else(|| anyhow::anyhow!("routing disabled and no valid default tier"));
        }

        // Supervision honors the dedicated supervisor tier when configured.
        if task == TaskType::Supervision && !self.config.supervisor_tier.is_empty() {
            if let Some(tier) = self.config.tiers.get(&self.config.supervisor_tier) {
                return Ok((self.config.supervisor_tier.clone(), tier.clone()));
            }
        }

        for (name, cfg) in &self.config.tiers {
            if cfg
                .use_for
                .iter()
                .any(|t| t.eq_ignore_ascii_case(task.as_str()))
            {
                return Ok((name.clone(), cfg.clone()));
            }
        }

        if let Some(found) = self.default_tier() {
            tracing::debug!(
                target: "praxis.routing",
                task = task.as_str(),
                tier = found.0,
                "no tier claims task type, using default"
            );
            return Ok(found);
        }

        anyhow::bail!("no tier found for task type {task} and no valid default tier")
    }

    fn default_tier(&self) -> Option<(String, TierConfig)> {
        if self.config.default_tier.is_empty() {
            return None;
        }
        self.config
            .tiers
            .get(&self.config.default_tier)
            .map(|tier| (self.config.default_tier.clone(), tier.clone()))
    }

    pub async fn route_chat(
        &self,
        task: TaskType,
        messages: &[Message],
        tools: &[ToolSchema],
        options: &ChatOptions,
        session_key: &str,
        cancel: CancellationToken,
    ) -> anyhow::Result<LlmResponse> {
        let (_, _, response) = self
            .route_chat_inner(task, messages, tools, options, session_key, cancel)
            .await?;
        Ok(response)
    }

    pub(crate) async fn route_chat_inner(
        &self,
        task: TaskType,
        messages: &[Message],
        tools: &[ToolSchema],
        options: &ChatOptions,
        session_key: &str,
        cancel: CancellationToken,
    ) -> anyhow::Result<(String, TierConfig, LlmResponse)> {
        let (tier_name, tier_cfg) = self.select_tier(task).context("tier selection failed")?;

        let provider = self.providers.get(&tier_cfg.model_name).ok_or_else(|| {
            anyhow::anyhow!("provider not found for model {}", tier_cfg.model_name)
        })?;

        self.events.publish(EngineEvent::new(
            "routing.selected",
            json!({
                "sessionKey": session_key,
                "task": task.as_str(),
                "tier": tier_name,
                "model": tier_cfg.model_name,
            }),
        ));
        emit_event(
            Level::INFO,
            ProcessKind::Engine,
            ObservabilityEvent {
                event: "routing.chat.start",
                component: "tier-router",
                session_key: Some(session_key),
                mission_target: None,
                task: Some(task.as_str()),
                tier: Some(&tier_name),
                model: Some(&tier_cfg.model_name),
                status: Some("start"),
                error_code: None,
                detail: None,
            },
        );

        let start = Instant::now();
        let result = match tokio::time::timeout(
            self.provider_timeout,
            provider.chat(messages, tools, &tier_cfg.model_name, options, cancel),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!(
                "provider call for model {} timed out after {}s",
                tier_cfg.model_name,
                self.provider_timeout.as_secs()
            )),
        };
        let elapsed = start.elapsed();

        match result {
            Ok(response) => {
                self.costs.record(
                    session_key,
                    &tier_cfg.model_name,
                    &tier_name,
                    &tier_cfg,
                    response.usage,
                    elapsed,
                );
                emit_event(
                    Level::DEBUG,
                    ProcessKind::Engine,
                    ObservabilityEvent {
                        event: "routing.chat.complete",
                        component: "tier-router",
                        session_key: Some(session_key),
                        mission_target: None,
                        task: Some(task.as_str()),
                        tier: Some(&tier_name),
                        model: Some(&tier_cfg.model_name),
                        status: Some("ok"),
                        error_code: None,
                        detail: None,
                    },
                );
                Ok((tier_name, tier_cfg, response))
            }
            Err(err) => {
                let detail = err.to_string();
                emit_event(
                    Level::ERROR,
                    ProcessKind::Engine,
                    ObservabilityEvent {
                        event: "routing.chat.error",
                        component: "tier-router",
                        session_key: Some(session_key),
                        mission_target: None,
                        task: Some(task.as_str()),
                        tier: Some(&tier_name),
                        model: Some(&tier_cfg.model_name),
                        status: Some("failed"),
                        error_code: None,
                        detail: Some(&detail),
                    },
                );
                Err(err.context(format!("tier routing chat failed for task {task}")))
            }
        }
    }
}
