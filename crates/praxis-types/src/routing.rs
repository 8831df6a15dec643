use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of task labels used to pick a tier and decide whether a
/// supervisor should review the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    // Strategic tasks, routed to powerful models.
    Planning,
    Analysis,
    Exploitation,
    ReportWriting,
    Supervision,
    // Intermediate tasks.
    ToolSelection,
    CodeReview,
    JsAnalysis,
    Validation,
    // Lightweight tasks, safe for local or cheap models.
    Parsing,
    Summary,
    Formatting,
    Triage,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Planning => "planning",
            TaskType::Analysis => "analysis",
            TaskType::Exploitation => "exploitation",
            TaskType::ReportWriting => "report_writing",
            TaskType::Supervision => "supervision",
            TaskType::ToolSelection => "tool_selection",
            TaskType::CodeReview => "code_review",
            TaskType::JsAnalysis => "js_analysis",
            TaskType::Validation => "validation",
            TaskType::Parsing => "parsing",
            TaskType::Summary => "summary",
            TaskType::Formatting => "formatting",
            TaskType::Triage => "triage",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-turn snapshot of agent state used for rule-based task classification.
/// `requires_supervision`, `confidence_score`, and `task_complexity` are
/// derived fields filled in by the classifier.
#[derive(Debug, Clone, Default)]
pub struct AgentContext {
    pub turn_count: usize,
    pub last_tool_output: String,
    pub phase_changed: bool,
    pub user_message: String,
    pub tools_available: usize,
    pub report_requested: bool,
    pub session_started: bool,
    pub requires_supervision: bool,
    pub confidence_score: f64,
    pub task_complexity: i32,
    pub dependent_tasks: Vec<TaskType>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostPerM {
    #[serde(default)]
    pub input: f64,
    #[serde(default)]
    pub output: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    pub model_name: String,
    #[serde(default)]
    pub use_for: Vec<String>,
    #[serde(default)]
    pub cost_per_m: CostPerM,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub default_tier: String,
    #[serde(default)]
    pub tiers: HashMap<String, TierConfig>,
    #[serde(default)]
    pub enable_supervision: bool,
    #[serde(default)]
    pub supervisor_tier: String,
    /// When > 0, overrides the minimum confidence of every validation rule.
    #[serde(default)]
    pub validation_confidence_threshold: f64,
    /// Tasks at or above this complexity are supervised. 0 means the
    /// built-in default of 7.
    #[serde(default)]
    pub min_task_complexity_for_supervision: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_type_serializes_as_snake_case() {
        let raw = serde_json::to_string(&TaskType::ReportWriting).expect("serialize");
        assert_eq!(raw, "\"report_writing\"");
        let back: TaskType = serde_json::from_str("\"js_analysis\"").expect("deserialize");
        assert_eq!(back, TaskType::JsAnalysis);
    }

    #[test]
    fn routing_config_defaults_are_disabled() {
        let cfg: RoutingConfig = serde_json::from_str("{}").expect("deserialize");
        assert!(!cfg.enabled);
        assert!(!cfg.enable_supervision);
        assert!(cfg.tiers.is_empty());
    }
}
