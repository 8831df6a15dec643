use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};

use praxis_types::{CostPerM, TierConfig, Usage};

#[derive(Debug, Clone, Default)]
pub struct ModelCost {
    pub model_name: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub calls: u64,
    pub total_cost: f64,
    pub total_latency: Duration,
    pub avg_latency: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct TierCost {
    pub tier_name: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub calls: u64,
    pub total_cost: f64,
    pub total_latency: Duration,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SupervisionStats {
    pub total_supervisions: u64,
    pub successful_validations: u64,
    pub failed_validations: u64,
    pub fallbacks_used: u64,
    pub corrections: u64,
    pub total_supervision_cost: f64,
    pub estimated_savings: f64,
    pub last_confidence: f64,
}

#[derive(Debug, Clone)]
pub struct SessionCost {
    pub session_key: String,
    pub by_model: HashMap<String, ModelCost>,
    pub by_tier: HashMap<String, TierCost>,
    pub total_cost: f64,
    pub start_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub supervision: SupervisionStats,
}

impl SessionCost {
    fn new(session_key: &str) -> Self {
        let now = Utc::now();
        Self {
            session_key: session_key.to_string(),
            by_model: HashMap::new(),
            by_tier: HashMap::new(),
            total_cost: 0.0,
            start_time: now,
            last_update: now,
            supervision: SupervisionStats::default(),
        }
    }
}

pub(crate) fn call_cost(pricing: &CostPerM, usage: Usage) -> f64 {
    usage.prompt_tokens as f64 / 1_000_000.0 * pricing.input
        + usage.completion_tokens as f64 / 1_000_000.0 * pricing.output
}

/// Tracks token usage and dollar cost across sessions, models, and tiers.
/// Writers take the lock exclusively; readers copy out under a shared lock
/// so no reference to internal state ever escapes.
#[derive(Default)]
pub struct CostTracker {
    sessions: RwLock<HashMap<String, SessionCost>>,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &self,
        session_key: &str,
        model_name: &str,
        tier_name: &str,
        tier_cfg: &TierConfig,
        usage: Usage,
        latency: Duration,
    ) {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let session = sessions
            .entry(session_key.to_string())
            .or_insert_with(|| SessionCost::new(session_key));

        let cost = call_cost(&tier_cfg.cost_per_m, usage);

        let model = session
            .by_model
            .entry(model_name.to_string())
            .or_insert_with(|| ModelCost {
                model_name: model_name.to_string(),
                ..ModelCost::default()
            });
        model.input_tokens += usage.prompt_tokens;
        model.output_tokens += usage.completion_tokens;
        model.calls += 1;
        model.total_cost += cost;
        model.total_latency += latency;
        model.avg_latency = model.total_latency / model.calls as u32;

        let tier = session
            .by_tier
            .entry(tier_name.to_string())
            .or_insert_with(|| TierCost {
                tier_name: tier_name.to_string(),
                ..TierCost::default()
            });
        tier.input_tokens += usage.prompt_tokens;
        tier.output_tokens += usage.completion_tokens;
        tier.calls += 1;
        tier.total_cost += cost;
        tier.total_latency += latency;

        session.total_cost += cost;
        session.last_update = Utc::now();
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_supervision(
        &self,
        session_key: &str,
        success: bool,
        failed: bool,
        fallback: bool,
        corrections: usize,
        cost: f64,
        confidence: f64,
        savings: f64,
    ) {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let session = sessions
            .entry(session_key.to_string())
            .or_insert_with(|| SessionCost::new(session_key));

        let stats = &mut session.supervision;
        stats.total_supervisions += 1;
        if success {
            stats.successful_validations += 1;
        }
        if failed {
            stats.failed_validations += 1;
        }
        if fallback {
            stats.fallbacks_used += 1;
        }
        stats.corrections += corrections as u64;
        stats.total_supervision_cost += cost;
        stats.estimated_savings += savings;
        stats.last_confidence = confidence;
        session.last_update = Utc::now();
    }

    /// Returns a copy; mutating the result never touches tracked state.
    pub fn get_session(&self, session_key: &str) -> Option<SessionCost> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_key)
            .cloned()
    }

    pub fn total(&self) -> f64 {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|s| s.total_cost)
            .sum()
    }

    pub fn format_report(&self, session_key: &str) -> String {
        let Some(session) = self.get_session(session_key) else {
            return "No cost data for session".to_string();
        };

        let duration = session.last_update - session.start_time;
        let mut report = String::new();
        let _ = writeln!(report, "Session Cost Report");
        let _ = writeln!(report, "==================");
        let _ = writeln!(report, "Session: {}", session.session_key);
        let _ = writeln!(report, "Duration: {}s", duration.num_seconds());
        let _ = writeln!(report, "Total Cost: ${:.4}", session.total_cost);
        let _ = writeln!(report);

        let _ = writeln!(report, "By Tier:");
        let _ = writeln!(report, "--------");
        let mut tiers: Vec<_> = session.by_tier.values().collect();
        tiers.sort_by(|a, b| a.tier_name.cmp(&b.tier_name));
        for tier in tiers {
            let _ = writeln!(report, "  {}:", tier.tier_name);
            let _ = writeln!(report, "    Calls: {}", tier.calls);
            let _ = writeln!(report, "    Input tokens: {}", tier.input_tokens);
            let _ = writeln!(report, "    Output tokens: {}", tier.output_tokens);
            let _ = writeln!(report, "    Cost: ${:.4}", tier.total_cost);
            if tier.calls > 0 {
                let avg = tier.total_latency / tier.calls as u32;
                let _ = writeln!(report, "    Avg latency: {}ms", avg.as_millis());
            }
            let _ = writeln!(report);
        }

        let _ = writeln!(report, "By Model:");
        let _ = writeln!(report, "---------");
        let mut models: Vec<_> = session.by_model.values().collect();
        models.sort_by(|a, b| a.model_name.cmp(&b.model_name));
        for model in models {
            let _ = writeln!(report, "  {}:", model.model_name);
            let _ = writeln!(report, "    Calls: {}", model.calls);
            let _ = writeln!(report, "    Input tokens: {}", model.input_tokens);
            let _ = writeln!(report, "    Output tokens: {}", model.output_tokens);
            let _ = writeln!(report, "    Cost: ${:.4}", model.total_cost);
            let _ = writeln!(report, "    Avg latency: {}ms", model.avg_latency.as_millis());
            let _ = writeln!(report);
        }

        if session.supervision.total_supervisions > 0 {
            let stats = session.supervision;
            let _ = writeln!(report, "Supervision:");
            let _ = writeln!(report, "------------");
            let _ = writeln!(report, "  Supervisions: {}", stats.total_supervisions);
            let _ = writeln!(report, "  Successful: {}", stats.successful_validations);
            let _ = writeln!(report, "  Failed validations: {}", stats.failed_validations);
            let _ = writeln!(report, "  Fallbacks used: {}", stats.fallbacks_used);
            let _ = writeln!(report, "  Corrections: {}", stats.corrections);
            let _ = writeln!(report, "  Supervision cost: ${:.4}", stats.total_supervision_cost);
            let _ = writeln!(report, "  Estimated savings: ${:.4}", stats.estimated_savings);
        }

        report
    }

    pub fn reset(&self) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
