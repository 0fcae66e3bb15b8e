//! Canonical error event model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Metadata key carrying the serialized operation history
pub const OPERATION_HISTORY_KEY: &str = "faultline.operation_history_json";

/// Severity of an error event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Non-fatal issue that may need attention
    Warning,
    /// Recoverable error that made an operation fail
    #[default]
    Error,
    /// Unrecoverable failure such as a panic
    Crash,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Crash => "crash",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process state captured when the failure happened.
///
/// Produced by the embedding application; the pipeline only carries it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemState {
    /// Resident memory in bytes
    pub memory_bytes: i64,
    /// Live tasks or threads
    pub task_count: u32,
    /// Process uptime in milliseconds
    pub uptime_ms: i64,
    /// Host the failure occurred on
    pub hostname: String,
}

/// A normalized error or crash record.
///
/// Empty strings mean "absent" for the free-form text fields. The numeric
/// linkage fields are `Option`s because zero is a valid context id, turn
/// depth and token count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    /// Unique identifier, generated by the collector when empty
    pub event_id: String,

    /// When the failure occurred, set by the collector when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    /// Grouping hash, always recomputed by the collector
    #[serde(default)]
    pub fingerprint: String,

    pub severity: Severity,

    /// Free-form classifier: "timeout", "panic", "guardrail", ...
    #[serde(default)]
    pub error_type: String,

    #[serde(default)]
    pub message: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stack_trace: String,

    /// What was running: "tool", "llm", "guardrail", "handoff", ...
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub operation: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub operation_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub agent_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tool_name: String,

    /// Tool arguments as a JSON string
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tool_args: String,

    /// Conversation context the failure belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<u64>,

    /// Turn within the conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_depth: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_state: Option<SystemState>,

    /// Tokens consumed before the failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_wasted: Option<i64>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl ErrorEvent {
    /// Create a partial event; identity fields are filled in by the collector.
    pub fn new(
        severity: Severity,
        error_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            error_type: error_type.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = stack_trace.into();
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    pub fn with_operation_id(mut self, operation_id: impl Into<String>) -> Self {
        self.operation_id = operation_id.into();
        self
    }

    pub fn with_agent(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_name = agent_name.into();
        self
    }

    pub fn with_tool(mut self, tool_name: impl Into<String>, tool_args: impl Into<String>) -> Self {
        self.tool_name = tool_name.into();
        self.tool_args = tool_args.into();
        self
    }

    pub fn with_context(mut self, context_id: u64, turn_depth: Option<u32>) -> Self {
        self.context_id = Some(context_id);
        self.turn_depth = turn_depth;
        self
    }

    pub fn with_tokens_wasted(mut self, tokens: i64) -> Self {
        self.tokens_wasted = Some(tokens);
        self
    }

    pub fn with_system_state(mut self, state: SystemState) -> Self {
        self.system_state = Some(state);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Severity::Crash).unwrap(), "\"crash\"");
        assert_eq!(Severity::Warning.to_string(), "warning");
        let parsed: Severity = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(parsed, Severity::Error);
    }

    #[test]
    fn test_zero_context_is_distinct_from_absent() {
        let unset = ErrorEvent::new(Severity::Error, "timeout", "slow");
        let zero = unset.clone().with_context(0, Some(0));

        assert_eq!(unset.context_id, None);
        assert_eq!(zero.context_id, Some(0));
        assert_eq!(zero.turn_depth, Some(0));

        let json = serde_json::to_value(&zero).unwrap();
        assert_eq!(json["context_id"], 0);
        assert_eq!(json["turn_depth"], 0);

        let json = serde_json::to_value(&unset).unwrap();
        assert!(json.get("context_id").is_none());
        assert!(json.get("tokens_wasted").is_none());
    }

    #[test]
    fn test_builder_populates_fields() {
        let event = ErrorEvent::new(Severity::Warning, "guardrail", "blocked")
            .with_operation("tool")
            .with_agent("planner")
            .with_tool("search", r#"{"q":"rust"}"#)
            .with_tokens_wasted(0)
            .with_metadata("run", "r-1");

        assert_eq!(event.operation, "tool");
        assert_eq!(event.agent_name, "planner");
        assert_eq!(event.tool_name, "search");
        assert_eq!(event.tokens_wasted, Some(0));
        assert_eq!(event.metadata.get("run").map(String::as_str), Some("r-1"));
        assert!(event.event_id.is_empty());
        assert!(event.timestamp.is_none());
    }
}
