use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One event on the engine's broadcast bus. Consumers (UI, channel
/// adapters) subscribe and render; the core never reads events back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEvent {
    pub event_type: String,
    pub properties: Value,
    pub timestamp: DateTime<Utc>,
}

impl EngineEvent {
    pub fn new(event_type: impl Into<String>, properties: Value) -> Self {
        Self {
            event_type: event_type.into(),
            properties,
            timestamp: Utc::now(),
        }
    }
}
