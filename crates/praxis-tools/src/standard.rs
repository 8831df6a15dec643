use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use praxis_types::{ToolResult, ToolSchema};

use crate::{is_path_allowed, Tool};

const WEB_FETCH_BYTE_CAP: usize = 100_000;

/// Runs a shell command. Cancellation kills the child process.
pub struct ExecTool;

#[async_trait]
impl Tool for ExecTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "exec".to_string(),
            description: "Run a shell command and return its output".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The command to run"
                    }
                },
                "required": ["command"]
            }),
        }
    }

    async fn execute(&self, args: Value, cancel: CancellationToken) -> anyhow::Result<ToolResult> {
        let cmd = args
            .get("command")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if cmd.is_empty() {
            return Ok(ToolResult::text("Missing or invalid command parameter"));
        }

        let mut command = Command::new("sh");
        command.args(["-c", cmd]);
        command.kill_on_drop(true);

        let output = tokio::select! {
            _ = cancel.cancelled() => {
                return Ok(ToolResult {
                    output: "command cancelled".to_string(),
                    metadata: json!({"cancelled": true}),
                });
            }
            result = command.output() => result,
        };

        match output {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let text = if stdout.is_empty() && !stderr.is_empty() {
                    stderr.clone()
                } else {
                    stdout
                };
                Ok(ToolResult {
                    output: text,
                    metadata: json!({
                        "exit_code": output.status.code(),
                        "stderr": stderr,
                    }),
                })
            }
            Err(err) => Ok(ToolResult::text(format!("Failed to run command: {err}"))),
        }
    }
}

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "read_file".to_string(),
            description: "Read the contents of a file in the workspace".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Relative path of the file to read"
                    }
                },
                "required": ["path"]
            }),
        }
    }

    async fn execute(&self, args: Value, _cancel: CancellationToken) -> anyhow::Result<ToolResult> {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or_default();
        if path.is_empty() {
            return Ok(ToolResult::text("Missing or invalid path parameter"));
        }
        if !is_path_allowed(path) {
            return Ok(ToolResult {
                output: "path denied by sandbox policy".to_string(),
                metadata: json!({"path": path}),
            });
        }

        match tokio::fs::read_to_string(path).await {
            Ok(data) => Ok(ToolResult::text(data)),
            Err(err) => Ok(ToolResult::text(format!("Failed to read {path}: {err}"))),
        }
    }
}

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "write_file".to_string(),
            description: "Write content to a file in the workspace, creating parent directories".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Relative path of the file to write"
                    },
                    "content": {
                        "type": "string",
                        "description": "Content to write"
                    }
                },
                "required": ["path", "content"]
            }),
        }
    }

    async fn execute(&self, args: Value, _cancel: CancellationToken) -> anyhow::Result<ToolResult> {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or_default();
        let content = args
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if path.is_empty() {
            return Ok(ToolResult::text("Missing or invalid path parameter"));
        }
        if !is_path_allowed(path) {
            return Ok(ToolResult {
                output: "path denied by sandbox policy".to_string(),
                metadata: json!({"path": path}),
            });
        }

        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(err) = tokio::fs::create_dir_all(parent).await {
                    return Ok(ToolResult::text(format!("Failed to create {}: {err}", parent.display())));
                }
            }
        }

        match tokio::fs::write(path, content).await {
            Ok(()) => Ok(ToolResult::text(format!("Wrote {} bytes to {path}", content.len()))),
            Err(err) => Ok(ToolResult::text(format!("Failed to write {path}: {err}"))),
        }
    }
}

/// Fetches a URL over GET with a response-size cap.
pub struct WebFetchTool {
    client: reqwest::Client,
}

impl WebFetchTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "web_fetch".to_string(),
            description: "Fetch a URL and return the response body as text".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The URL to fetch"
                    }
                },
                "required": ["url"]
            }),
        }
    }

    async fn execute(&self, args: Value, cancel: CancellationToken) -> anyhow::Result<ToolResult> {
        let url = args.get("url").and_then(|v| v.as_str()).unwrap_or_default();
        if url.is_empty() {
            return Ok(ToolResult::text("Missing or invalid url parameter"));
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                return Ok(ToolResult {
                    output: "fetch cancelled".to_string(),
                    metadata: json!({"cancelled": true}),
                });
            }
            result = self.client.get(url).send() => result,
        };

        match response {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                let truncated = body.len() > WEB_FETCH_BYTE_CAP;
                let mut text = body;
                if truncated {
                    let mut end = WEB_FETCH_BYTE_CAP;
                    while !text.is_char_boundary(end) {
                        end -= 1;
                    }
                    text.truncate(end);
                    text.push_str("...<truncated>");
                }
                Ok(ToolResult {
                    output: text,
                    metadata: json!({"status": status, "truncated": truncated}),
                })
            }
            Err(err) => Ok(ToolResult::text(format!("Failed to fetch {url}: {err}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exec_captures_stdout() {
        let result = ExecTool
            .execute(json!({"command": "echo praxis"}), CancellationToken::new())
            .await
            .expect("result");
        assert_eq!(result.output.trim(), "praxis");
        assert_eq!(result.metadata["exit_code"], json!(0));
    }

    #[tokio::test]
    async fn exec_with_cancelled_token_reports_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = ExecTool
            .execute(json!({"command": "sleep 5"}), cancel)
            .await
            .expect("result");
        assert_eq!(result.output, "command cancelled");
        assert_eq!(result.metadata["cancelled"], json!(true));
    }

    #[tokio::test]
    async fn file_tools_respect_the_sandbox() {
        let denied = ReadFileTool
            .execute(json!({"path": "/etc/passwd"}), CancellationToken::new())
            .await
            .expect("result");
        assert_eq!(denied.output, "path denied by sandbox policy");

        let denied = WriteFileTool
            .execute(
                json!({"path": "../escape.txt", "content": "x"}),
                CancellationToken::new(),
            )
            .await
            .expect("result");
        assert_eq!(denied.output, "path denied by sandbox policy");
    }

    #[tokio::test]
    async fn missing_file_read_is_tool_text_not_error() {
        let result = ReadFileTool
            .execute(
                json!({"path": "definitely/not/here.txt"}),
                CancellationToken::new(),
            )
            .await
            .expect("result");
        assert!(result.output.starts_with("Failed to read"));
    }
}
