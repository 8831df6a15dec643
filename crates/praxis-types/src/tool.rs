use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Schema advertised to the model for one tool. `parameters` is a
/// JSON-Schema object with `type: "object"`, `properties`, and `required`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Outcome of one tool invocation. `output` is the single text payload
/// delivered back to the model; `metadata` is side-channel data for
/// observers and never reaches the conversation.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub output: String,
    pub metadata: Value,
}

impl ToolResult {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            metadata: json!({}),
        }
    }
}
