//! Rolling history of recent operations, attached to events at failure time

use crate::event::{ErrorEvent, OPERATION_HISTORY_KEY};
use crate::ring_buffer::RingBuffer;
use crate::scrubber::{Scrubber, SCRUB_ERROR};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Default number of operations retained per run
pub const DEFAULT_HISTORY_SIZE: usize = 10;

/// One LLM or tool call made before a failure.
///
/// Carries sizes and names only, never prompt or tool payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// "llm", "tool", ...
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub agent_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub call_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl OperationRecord {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            timestamp: Utc::now(),
            duration_ms: None,
            agent_name: String::new(),
            tool_name: String::new(),
            call_id: String::new(),
            error: String::new(),
        }
    }

    pub fn with_agent(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_name = agent_name.into();
        self
    }

    pub fn with_tool(mut self, tool_name: impl Into<String>, call_id: impl Into<String>) -> Self {
        self.tool_name = tool_name.into();
        self.call_id = call_id.into();
        self
    }
}

/// Thread-safe wrapper around a [`RingBuffer`] of operations.
#[derive(Debug)]
pub struct OperationHistory {
    buffer: Mutex<RingBuffer<OperationRecord>>,
}

impl Default for OperationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}

impl OperationHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(RingBuffer::new(capacity)),
        }
    }

    /// Record the start of an operation
    pub fn record(&self, record: OperationRecord) {
        self.lock().add(record);
    }

    /// Patch the most recent operation with its outcome.
    ///
    /// Returns `false` when nothing has been recorded yet.
    pub fn complete_last(&self, duration_ms: u64, error: Option<&str>) -> bool {
        self.lock().update_last(|record| {
            record.duration_ms = Some(duration_ms);
            if let Some(error) = error {
                record.error = error.to_string();
            }
        })
    }

    /// Recorded operations, oldest first
    pub fn snapshot(&self) -> Vec<OperationRecord> {
        self.lock().get_all()
    }

    /// Serialize the history, scrub it, and store it under
    /// [`OPERATION_HISTORY_KEY`] in the event metadata.
    ///
    /// The stored value is always a complete JSON array no longer than the
    /// scrubber's `max_metadata_value_size`: the oldest records are dropped
    /// until it fits. When not even the newest record fits, the key is set to
    /// [`SCRUB_ERROR`] under `fail_closed` and left out otherwise. Leaves the
    /// event untouched when the history is empty.
    pub fn attach_to(&self, event: &mut ErrorEvent, scrubber: &Scrubber) {
        let records = self.snapshot();
        if records.is_empty() {
            return;
        }

        let limit = scrubber.config().max_metadata_value_size;
        for skip in 0..records.len() {
            match bounded_history(&records[skip..], scrubber, limit) {
                Ok(Some(json)) => {
                    if skip > 0 {
                        tracing::debug!(
                            faultline.event = "history_trimmed",
                            dropped = skip,
                            kept = records.len() - skip,
                            limit,
                            "Dropped oldest operations to fit the metadata value limit"
                        );
                    }
                    event.metadata.insert(OPERATION_HISTORY_KEY.to_string(), json);
                    return;
                }
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(
                        faultline.event = "history_serialize_failed",
                        error = %e,
                        "Could not serialize operation history"
                    );
                    break;
                }
            }
        }

        if scrubber.fail_closed() {
            event
                .metadata
                .insert(OPERATION_HISTORY_KEY.to_string(), SCRUB_ERROR.to_string());
        } else {
            tracing::debug!(
                faultline.event = "history_omitted",
                limit,
                "Operation history does not fit the metadata value limit"
            );
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RingBuffer<OperationRecord>> {
        // A panic while holding the lock cannot leave the buffer half-written.
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Scrubbed JSON for `records`, or `None` when it exceeds `limit`
fn bounded_history(
    records: &[OperationRecord],
    scrubber: &Scrubber,
    limit: usize,
) -> Result<Option<String>, serde_json::Error> {
    let json = serde_json::to_string(records)?;
    let scrubbed = scrubber.scrub_json_unbounded(&json)?;
    Ok((scrubbed.len() <= limit).then_some(scrubbed))
}
