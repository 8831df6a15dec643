use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use praxis_types::{ToolResult, ToolSchema};

mod standard;
mod workflow;

pub use standard::{ExecTool, ReadFileTool, WebFetchTool, WriteFileTool};
pub use workflow::{
    WorkflowAddFindingTool, WorkflowAdvancePhaseTool, WorkflowCompleteBranchTool,
    WorkflowCreateBranchTool, WorkflowStepCompleteTool,
};

/// One capability exposed to the model: a schema it is advertised with and
/// an execution entry point. Failures surface as tool text, never as loop
/// errors, so `execute` only errors on programmer mistakes.
#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;
    async fn execute(&self, args: Value, cancel: CancellationToken) -> anyhow::Result<ToolResult>;
}

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the standard agent tools. Workflow tools
    /// are registered separately with their engine handle.
    pub fn with_standard_tools() -> Self {
        let tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(ExecTool),
            Arc::new(ReadFileTool),
            Arc::new(WriteFileTool),
            Arc::new(WebFetchTool::new()),
        ];
        let mut map: HashMap<String, Arc<dyn Tool>> = HashMap::new();
        for tool in tools {
            map.insert(tool.schema().name.clone(), tool);
        }
        Self {
            tools: Arc::new(RwLock::new(map)),
        }
    }

    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.schema().name.clone();
        self.tools.write().await.insert(name, tool);
    }

    pub async fn register_workflow_tools(&self, engine: praxis_workflow::SharedEngine) {
        self.register(Arc::new(WorkflowStepCompleteTool::new(engine.clone())))
            .await;
        self.register(Arc::new(WorkflowCreateBranchTool::new(engine.clone())))
            .await;
        self.register(Arc::new(WorkflowCompleteBranchTool::new(engine.clone())))
            .await;
        self.register(Arc::new(WorkflowAddFindingTool::new(engine.clone())))
            .await;
        self.register(Arc::new(WorkflowAdvancePhaseTool::new(engine)))
            .await;
    }

    pub async fn list(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .read()
            .await
            .values()
            .map(|t| t.schema())
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub async fn len(&self) -> usize {
        self.tools.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tools.read().await.is_empty()
    }

    pub async fn execute(
        &self,
        name: &str,
        args: Value,
        cancel: CancellationToken,
    ) -> anyhow::Result<ToolResult> {
        let tool = self.tools.read().await.get(name).cloned();
        let Some(tool) = tool else {
            return Ok(ToolResult::text(format!("Unknown tool: {name}")));
        };
        tool.execute(args, cancel).await
    }
}

/// File tools stay inside the working directory: absolute paths and parent
/// traversal are refused.
pub(crate) fn is_path_allowed(path: &str) -> bool {
    let raw = Path::new(path);
    if raw.is_absolute() {
        return false;
    }
    !raw.components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
}
