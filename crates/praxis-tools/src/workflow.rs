use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use praxis_types::{ToolResult, ToolSchema};
use praxis_workflow::{Severity, SharedEngine};

use crate::Tool;

const NO_ACTIVE_MISSION: &str = "No active mission/workflow";

fn string_arg(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(ToString::to_string)
}

/// Marks a workflow step complete in the current mission phase.
pub struct WorkflowStepCompleteTool {
    engine: SharedEngine,
}

impl WorkflowStepCompleteTool {
    pub fn new(engine: SharedEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for WorkflowStepCompleteTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "workflow_step_complete".to_string(),
            description: "Mark a workflow step as complete. Use this when you have finished a step in the current mission phase.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "step_id": {
                        "type": "string",
                        "description": "The ID of the step to mark complete (from the workflow context)"
                    }
                },
                "required": ["step_id"]
            }),
        }
    }

    async fn execute(&self, args: Value, _cancel: CancellationToken) -> anyhow::Result<ToolResult> {
        let mut guard = self.engine.write().await;
        let Some(engine) = guard.as_mut() else {
            return Ok(ToolResult::text(NO_ACTIVE_MISSION));
        };

        let Some(step_id) = string_arg(&args, "step_id") else {
            return Ok(ToolResult::text("Missing or invalid step_id parameter"));
        };

        if let Err(err) = engine.mark_step_complete(&step_id).await {
            return Ok(ToolResult::text(format!("Failed to mark step complete: {err}")));
        }

        Ok(ToolResult::text(format!("Step '{step_id}' marked complete")))
    }
}

/// Opens a new investigation branch in reaction to a discovery.
pub struct WorkflowCreateBranchTool {
    engine: SharedEngine,
}

impl WorkflowCreateBranchTool {
    pub fn new(engine: SharedEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for WorkflowCreateBranchTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "workflow_create_branch".to_string(),
            description: "Create a new investigation branch when you discover something that requires deeper exploration (e.g., found web service, discovered vulnerability, etc.)".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "condition": {
                        "type": "string",
                        "description": "The condition/trigger for this branch (e.g., 'web_service_found', 'smb_discovered')"
                    },
                    "description": {
                        "type": "string",
                        "description": "Description of what this branch will investigate"
                    }
                },
                "required": ["condition", "description"]
            }),
        }
    }

    async fn execute(&self, args: Value, _cancel: CancellationToken) -> anyhow::Result<ToolResult> {
        let mut guard = self.engine.write().await;
        let Some(engine) = guard.as_mut() else {
            return Ok(ToolResult::text(NO_ACTIVE_MISSION));
        };

        let Some(condition) = string_arg(&args, "condition") else {
            return Ok(ToolResult::text("Missing or invalid condition parameter"));
        };
        let Some(description) = string_arg(&args, "description") else {
            return Ok(ToolResult::text("Missing or invalid description parameter"));
        };

        if let Err(err) = engine.create_branch(&condition, &description).await {
            return Ok(ToolResult::text(format!("Failed to create branch: {err}")));
        }

        Ok(ToolResult::text(format!("Created branch: {condition} - {description}")))
    }
}

/// Closes an investigation branch once it has been fully explored.
pub struct WorkflowCompleteBranchTool {
    engine: SharedEngine,
}

impl WorkflowCompleteBranchTool {
    pub fn new(engine: SharedEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for WorkflowCompleteBranchTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "workflow_complete_branch".to_string(),
            description: "Mark an investigation branch as complete when you have finished exploring it.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "condition": {
                        "type": "string",
                        "description": "The condition of the branch to complete"
                    }
                },
                "required": ["condition"]
            }),
        }
    }

    async fn execute(&self, args: Value, _cancel: CancellationToken) -> anyhow::Result<ToolResult> {
        let mut guard = self.engine.write().await;
        let Some(engine) = guard.as_mut() else {
            return Ok(ToolResult::text(NO_ACTIVE_MISSION));
        };

        let Some(condition) = string_arg(&args, "condition") else {
            return Ok(ToolResult::text("Missing or invalid condition parameter"));
        };

        if let Err(err) = engine.complete_branch(&condition).await {
            return Ok(ToolResult::text(format!("Failed to complete branch: {err}")));
        }

        Ok(ToolResult::text(format!("Branch '{condition}' marked complete")))
    }
}

/// Records a finding against the mission with its severity and evidence.
pub struct WorkflowAddFindingTool {
    engine: SharedEngine,
}

impl WorkflowAddFindingTool {
    pub fn new(engine: SharedEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for WorkflowAddFindingTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "workflow_add_finding".to_string(),
            description: "Record a security finding or discovery in the mission report. Use this when you find vulnerabilities, misconfigurations, or other notable security issues.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "title": {
                        "type": "string",
                        "description": "Title of the finding"
                    },
                    "description": {
                        "type": "string",
                        "description": "Detailed description of the finding"
                    },
                    "severity": {
                        "type": "string",
                        "description": "Severity level: critical, high, medium, low, or info",
                        "enum": ["critical", "high", "medium", "low", "info"]
                    },
                    "evidence": {
                        "type": "string",
                        "description": "Evidence or proof (tool output, logs, etc.)"
                    }
                },
                "required": ["title", "description", "severity", "evidence"]
            }),
        }
    }

    async fn execute(&self, args: Value, _cancel: CancellationToken) -> anyhow::Result<ToolResult> {
        let mut guard = self.engine.write().await;
        let Some(engine) = guard.as_mut() else {
            return Ok(ToolResult::text(NO_ACTIVE_MISSION));
        };

        let Some(title) = string_arg(&args, "title") else {
            return Ok(ToolResult::text("Missing or invalid title parameter"));
        };
        let Some(description) = string_arg(&args, "description") else {
            return Ok(ToolResult::text("Missing or invalid description parameter"));
        };
        let Some(severity_raw) = string_arg(&args, "severity") else {
            return Ok(ToolResult::text("Missing or invalid severity parameter"));
        };
        let Some(evidence) = string_arg(&args, "evidence") else {
            return Ok(ToolResult::text("Missing or invalid evidence parameter"));
        };

        let severity: Severity = match severity_raw.parse() {
            Ok(severity) => severity,
            Err(_) => return Ok(ToolResult::text(format!("Invalid severity: {severity_raw}"))),
        };

        if let Err(err) = engine
            .add_finding(&title, &description, severity, &evidence)
            .await
        {
            return Ok(ToolResult::text(format!("Failed to add finding: {err}")));
        }

        Ok(ToolResult::text(format!("Added {severity_raw} finding: {title}")))
    }
}

/// Advances to the next mission phase, refusing while the current phase's
/// completion criteria are unmet.
pub struct WorkflowAdvancePhaseTool {
    engine: SharedEngine,
}

impl WorkflowAdvancePhaseTool {
    pub fn new(engine: SharedEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for WorkflowAdvancePhaseTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "workflow_advance_phase".to_string(),
            description: "Advance to the next phase of the mission workflow. Only use this when the current phase completion criteria are met.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    async fn execute(&self, _args: Value, _cancel: CancellationToken) -> anyhow::Result<ToolResult> {
        let mut guard = self.engine.write().await;
        let Some(engine) = guard.as_mut() else {
            return Ok(ToolResult::text(NO_ACTIVE_MISSION));
        };

        if !engine.is_phase_complete() {
            if let Some(phase) = engine.current_phase_name() {
                return Ok(ToolResult::text(format!(
                    "Phase '{phase}' completion criteria not yet met. Review the phase steps and completion requirements."
                )));
            }
        }

        if let Err(err) = engine.advance_phase().await {
            return Ok(ToolResult::text(format!("Failed to advance phase: {err}")));
        }

        let next = engine.current_phase_name().unwrap_or_default().to_string();
        Ok(ToolResult::text(format!("Advanced to phase: {next}")))
    }
}
