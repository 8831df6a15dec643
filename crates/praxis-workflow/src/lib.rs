mod engine;
mod parser;
mod types;

pub use engine::{shared_engine, SharedEngine, WorkflowEngine};
pub use parser::{load_workflow, parse_workflow, parse_workflow_file};
pub use types::{
    ActiveBranch, Branch, CompletionCriteria, CompletionType, Finding, MissionState, Phase,
    PhaseExecution, Severity, Step, Workflow,
};
