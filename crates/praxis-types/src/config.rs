use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::routing::RoutingConfig;

fn default_max_tool_iterations() -> usize {
    40
}

fn default_provider_timeout_secs() -> u64 {
    120
}

fn default_tool_timeout_secs() -> u64 {
    300
}

fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}

/// Configuration handed to the core. The core never reads the environment
/// directly; whoever constructs the engine resolves this structure first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: default_max_tool_iterations(),
            provider_timeout_secs: default_provider_timeout_secs(),
            tool_timeout_secs: default_tool_timeout_secs(),
            routing: RoutingConfig::default(),
            workspace: default_workspace(),
        }
    }
}

impl AgentConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_applies_defaults() {
        let cfg: AgentConfig = serde_json::from_str("{}").expect("deserialize");
        assert_eq!(cfg.max_tool_iterations, 40);
        assert_eq!(cfg.provider_timeout(), Duration::from_secs(120));
        assert_eq!(cfg.tool_timeout(), Duration::from_secs(300));
        assert_eq!(cfg.workspace, PathBuf::from("."));
    }
}
