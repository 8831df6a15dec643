use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::types::{
    ActiveBranch, CompletionType, Finding, MissionState, PhaseExecution, Severity, Workflow,
};

/// Late-binding handle the workflow tools resolve the engine through. The
/// same handle serves agents whose mission attaches or detaches mid-session.
pub type SharedEngine = Arc<RwLock<Option<WorkflowEngine>>>;

pub fn shared_engine(engine: Option<WorkflowEngine>) -> SharedEngine {
    Arc::new(RwLock::new(engine))
}

/// Drives one mission: owns the workflow definition and its mutable state,
/// persisting after every mutating operation.
#[derive(Debug, Clone)]
pub struct WorkflowEngine {
    workflow: Workflow,
    state: MissionState,
    workspace: PathBuf,
}

impl WorkflowEngine {
    pub fn new(workflow: Workflow, target: impl Into<String>, workspace: impl Into<PathBuf>) -> Self {
        let state = MissionState {
            workflow_name: workflow.name.clone(),
            target: target.into(),
            start_time: Utc::now(),
            current_phase: 0,
            phase_history: Vec::new(),
            active_branches: Vec::new(),
            findings: Vec::new(),
            metadata: HashMap::new(),
        };
        Self {
            workflow,
            state,
            workspace: workspace.into(),
        }
    }

    /// Restores a mission from a previously saved state file.
    pub async fn load(
        workflow: Workflow,
        state_file: impl AsRef<Path>,
        workspace: impl Into<PathBuf>,
    ) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(state_file.as_ref())
            .await
            .map_err(|err| anyhow::anyhow!("failed to read state file: {err}"))?;
        let state: MissionState = serde_json::from_str(&raw)
            .map_err(|err| anyhow::anyhow!("failed to parse state: {err}"))?;
        Ok(Self {
            workflow,
            state,
            workspace: workspace.into(),
        })
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn state(&self) -> &MissionState {
        &self.state
    }

    pub fn current_phase(&self) -> usize {
        self.state.current_phase
    }

    pub fn current_phase_name(&self) -> Option<&str> {
        self.workflow
            .phases
            .get(self.state.current_phase)
            .map(|p| p.name.as_str())
    }

    /// Markdown block describing the mission, inserted verbatim into the
    /// agent's system prompt on every turn.
    pub fn context_prompt(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "# Active Mission Context");
        let _ = writeln!(out);
        let _ = writeln!(out, "**Workflow**: {}", self.workflow.name);
        let _ = writeln!(out, "**Target**: {}", self.state.target);
        let _ = writeln!(
            out,
            "**Started**: {}",
            self.state.start_time.format("%Y-%m-%d %H:%M:%S")
        );
        let _ = writeln!(out);

        if let Some(phase) = self.workflow.phases.get(self.state.current_phase) {
            let _ = writeln!(out, "## Current Phase: {}", phase.name);
            let _ = writeln!(out);

            if !phase.steps.is_empty() {
                let _ = writeln!(out, "### Steps:");
                let exec = self.current_phase_execution();
                for step in &phase.steps {
                    let done = exec
                        .map(|e| e.steps_complete.iter().any(|id| id == &step.id))
                        .unwrap_or(false);
                    let status = if done { "✓" } else { "○" };
                    let required = if step.required { " (required)" } else { "" };
                    let _ = writeln!(out, "- {} {}{}", status, step.name, required);
                    if !step.description.is_empty() {
                        let _ = writeln!(out, "  {}", step.description);
                    }
                }
                let _ = writeln!(out);
            }

            let _ = writeln!(out, "### Completion: {}", phase.completion.description);
            let _ = writeln!(out);

            if !phase.branches.is_empty() {
                let _ = writeln!(out, "### Possible Branches:");
                for branch in &phase.branches {
                    let _ = writeln!(out, "- **{}**: {}", branch.condition, branch.description);
                }
                let _ = writeln!(out);
            }
        }

        if !self.state.active_branches.is_empty() {
            let _ = writeln!(out, "## Active Investigation Branches:");
            for branch in &self.state.active_branches {
                let status = if branch.completed_at.is_some() {
                    "complete"
                } else {
                    "active"
                };
                let _ = writeln!(
                    out,
                    "- **{}**: {} ({})",
                    branch.condition, branch.description, status
                );
            }
            let _ = writeln!(out);
        }

        if !self.state.findings.is_empty() {
            let _ = writeln!(out, "## Findings: {} total", self.state.findings.len());
            let start = self.state.findings.len().saturating_sub(3);
            for finding in &self.state.findings[start..] {
                let _ = writeln!(out, "- [{}] {}", finding.severity.as_str(), finding.title);
            }
            let _ = writeln!(out);
        }

        out
    }

    /// Idempotent: marking an already-complete step is a no-op.
    pub async fn mark_step_complete(&mut self, step_id: &str) -> anyhow::Result<()> {
        let exec = self.current_phase_execution_mut();
        if exec.steps_complete.iter().any(|id| id == step_id) {
            return Ok(());
        }
        exec.steps_complete.push(step_id.to_string());
        let phase_name = exec.phase_name.clone();

        tracing::info!(
            target: "praxis.workflow",
            phase = %phase_name,
            step = step_id,
            "step complete"
        );

        self.save_state().await
    }

    /// Duplicate conditions are not rejected; the same lead may be
    /// investigated more than once.
    pub async fn create_branch(&mut self, condition: &str, description: &str) -> anyhow::Result<()> {
        self.state.active_branches.push(ActiveBranch {
            condition: condition.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
            completed_at: None,
            findings: Vec::new(),
        });

        tracing::info!(
            target: "praxis.workflow",
            condition,
            description,
            "branch created"
        );

        self.save_state().await
    }

    pub async fn complete_branch(&mut self, condition: &str) -> anyhow::Result<()> {
        let Some(branch) = self
            .state
            .active_branches
            .iter_mut()
            .find(|b| b.condition == condition)
        else {
            anyhow::bail!("branch not found: {condition}");
        };
        branch.completed_at = Some(Utc::now());

        tracing::info!(target: "praxis.workflow", condition, "branch completed");

        self.save_state().await
    }

    pub async fn add_finding(
        &mut self,
        title: &str,
        description: &str,
        severity: Severity,
        evidence: &str,
    ) -> anyhow::Result<()> {
        let phase = self
            .current_phase_name()
            .unwrap_or_default()
            .to_string();
        let finding = Finding {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            description: description.to_string(),
            severity,
            phase: phase.clone(),
            created_at: Utc::now(),
            evidence: evidence.to_string(),
            metadata: HashMap::new(),
        };
        self.state.findings.push(finding);

        tracing::info!(
            target: "praxis.workflow",
            title,
            severity = severity.as_str(),
            phase = %phase,
            "finding added"
        );

        self.save_state().await
    }

    /// Closes the current phase execution and opens the next. Completion
    /// criteria are not enforced here; callers consult `is_phase_complete`.
    pub async fn advance_phase(&mut self) -> anyhow::Result<()> {
        if self.state.current_phase + 1 >= self.workflow.phases.len() {
            anyhow::bail!("already at final phase");
        }

        let now = Utc::now();
        if let Some(exec) = self.state.phase_history.last_mut() {
            exec.end_time = Some(now);
        }

        self.state.current_phase += 1;
        self.start_phase_execution();

        tracing::info!(
            target: "praxis.workflow",
            new_phase = self.current_phase_name().unwrap_or_default(),
            phase_num = self.state.current_phase,
            "phase advanced"
        );

        self.save_state().await
    }

    pub fn is_phase_complete(&self) -> bool {
        let Some(phase) = self.workflow.phases.get(self.state.current_phase) else {
            return false;
        };
        let Some(exec) = self.current_phase_execution() else {
            return false;
        };

        match phase.completion.kind {
            CompletionType::AllRequired => phase
                .steps
                .iter()
                .filter(|s| s.required)
                .all(|s| exec.steps_complete.iter().any(|id| id == &s.id)),
            CompletionType::AnyBranch => !self.state.active_branches.is_empty(),
            CompletionType::Custom => false,
        }
    }

    /// Full replacement write of the mission state as pretty-printed JSON
    /// at `<workspace>/missions/<sanitized_target>_state.json`.
    pub async fn save_state(&self) -> anyhow::Result<()> {
        let state_dir = self.workspace.join("missions");
        tokio::fs::create_dir_all(&state_dir)
            .await
            .map_err(|err| anyhow::anyhow!("failed to create missions directory: {err}"))?;

        let payload = serde_json::to_string_pretty(&self.state)
            .map_err(|err| anyhow::anyhow!("failed to serialize state: {err}"))?;
        tokio::fs::write(self.state_file_path(), payload)
            .await
            .map_err(|err| anyhow::anyhow!("failed to write state file: {err}"))?;
        Ok(())
    }

    pub fn state_file_path(&self) -> PathBuf {
        let safe_name = self.state.target.replace(['/', ':'], "_");
        self.workspace
            .join("missions")
            .join(format!("{safe_name}_state.json"))
    }

    fn current_phase_execution(&self) -> Option<&PhaseExecution> {
        self.state.phase_history.last()
    }

    fn current_phase_execution_mut(&mut self) -> &mut PhaseExecution {
        if self.state.phase_history.is_empty() {
            self.start_phase_execution();
        }
        let last = self.state.phase_history.len() - 1;
        &mut self.state.phase_history[last]
    }

    fn start_phase_execution(&mut self) {
        let phase_name = self
            .workflow
            .phases
            .get(self.state.current_phase)
            .map(|p| p.name.clone())
            .unwrap_or_default();
        self.state.phase_history.push(PhaseExecution {
            phase_name,
            start_time: Utc::now(),
            end_time: None,
            steps_complete: Vec::new(),
            notes: Vec::new(),
        });
    }
}
