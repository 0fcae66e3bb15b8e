//! Human-readable sink for development and debugging

use async_trait::async_trait;
use faultline_core::{
    ConsoleConfig, ConsoleFormat, ErrorEvent, OperationRecord, Sink, SinkError, SinkResult,
    OPERATION_HISTORY_KEY,
};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

const INDENT: &str = "        ";

/// Writes each event to a terminal-like writer.
///
/// `Pretty` prints a header line plus indented details, `Compact` prints
/// one line per event and `Json` prints one JSON object per line. Stack
/// traces and operation history are only shown in pretty mode when
/// verbose output is enabled.
pub struct ConsoleSink<W: Write + Send = io::Stderr> {
    writer: Mutex<W>,
    format: ConsoleFormat,
    verbose: bool,
    closed: AtomicBool,
}

impl ConsoleSink<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }

    pub fn from_config(config: &ConsoleConfig) -> Self {
        Self::stderr()
            .with_format(config.format)
            .with_verbose(config.verbose)
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            format: ConsoleFormat::default(),
            verbose: false,
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_format(mut self, format: ConsoleFormat) -> Self {
        self.format = format;
        self
    }

    /// Include stack traces and operation history
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock(&self) -> MutexGuard<'_, W> {
        self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn render(&self, event: &ErrorEvent) -> SinkResult<String> {
        match self.format {
            ConsoleFormat::Pretty => Ok(render_pretty(event, self.verbose)),
            ConsoleFormat::Compact => Ok(render_compact(event)),
            ConsoleFormat::Json => {
                let mut line = serde_json::to_string(event)?;
                line.push('\n');
                Ok(line)
            }
        }
    }
}

#[async_trait]
impl<W: Write + Send> Sink for ConsoleSink<W> {
    async fn write(&self, event: &ErrorEvent) -> SinkResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        let text = self.render(event)?;
        self.lock().write_all(text.as_bytes())?;
        Ok(())
    }

    async fn flush(&self) -> SinkResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        self.lock().flush()?;
        Ok(())
    }

    async fn close(&self) -> SinkResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.lock().flush()?;
        Ok(())
    }
}

fn timestamp(event: &ErrorEvent) -> String {
    event
        .timestamp
        .map(|ts| ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_else(|| "-".to_string())
}

fn render_pretty(event: &ErrorEvent, verbose: bool) -> String {
    let mut header = vec![format!(
        "[FAULTLINE] {} {} {}",
        timestamp(event),
        event.severity.as_str().to_uppercase(),
        event.error_type
    )];
    if !event.operation.is_empty() {
        header.push(format!("in {}", event.operation));
    }
    if !event.tool_name.is_empty() {
        header.push(event.tool_name.clone());
    }
    if !event.agent_name.is_empty() {
        header.push(format!("(agent: {})", event.agent_name));
    }

    let mut out = header.join(" ");
    out.push('\n');

    if !event.message.is_empty() {
        out.push_str(&format!("{INDENT}Message: {}\n", event.message));
    }
    if !event.fingerprint.is_empty() {
        out.push_str(&format!("{INDENT}Fingerprint: {}\n", event.fingerprint));
    }
    match (event.context_id, event.turn_depth) {
        (Some(id), Some(turn)) => out.push_str(&format!("{INDENT}Context: {} (turn {})\n", id, turn)),
        (Some(id), None) => out.push_str(&format!("{INDENT}Context: {}\n", id)),
        _ => {}
    }

    if !verbose {
        return out;
    }

    if !event.stack_trace.is_empty() {
        out.push_str(&format!("{INDENT}Stack trace:\n"));
        for line in event.stack_trace.lines() {
            out.push_str(&format!("{INDENT}  {}\n", line));
        }
    }

    if let Some(json) = event.metadata.get(OPERATION_HISTORY_KEY) {
        // Scrubbed-away or malformed history is skipped rather than shown raw
        if let Ok(records) = serde_json::from_str::<Vec<OperationRecord>>(json) {
            if !records.is_empty() {
                out.push_str(&format!(
                    "{INDENT}Operation History ({} operations):\n",
                    records.len()
                ));
                for (i, record) in records.iter().enumerate() {
                    render_operation(&mut out, i + 1, record);
                }
            }
        }
    }

    out
}

fn render_operation(out: &mut String, index: usize, record: &OperationRecord) {
    out.push_str(&format!(
        "{INDENT}  {}. [{}] {}",
        index,
        record.kind,
        record.timestamp.format("%H:%M:%S")
    ));
    if !record.agent_name.is_empty() {
        out.push_str(&format!(" agent={}", record.agent_name));
    }
    if let Some(ms) = record.duration_ms.filter(|ms| *ms > 0) {
        out.push_str(&format!(" ({})", format_duration(ms)));
    }
    out.push('\n');

    if !record.tool_name.is_empty() {
        out.push_str(&format!("{INDENT}     Tool: {}", record.tool_name));
        if !record.call_id.is_empty() {
            out.push_str(&format!(" (id: {})", record.call_id));
        }
        out.push('\n');
    }
    if !record.error.is_empty() {
        out.push_str(&format!("{INDENT}     Error: {}\n", record.error));
    }
}

fn render_compact(event: &ErrorEvent) -> String {
    let mut parts = vec![
        timestamp(event),
        event.severity.as_str().to_uppercase(),
        event.error_type.clone(),
    ];
    if !event.operation.is_empty() {
        parts.push(format!("op={}", event.operation));
    }
    if !event.tool_name.is_empty() {
        parts.push(format!("tool={}", event.tool_name));
    }
    if !event.agent_name.is_empty() {
        parts.push(format!("agent={}", event.agent_name));
    }
    if !event.fingerprint.is_empty() {
        let short = event.fingerprint.get(..8).unwrap_or(&event.fingerprint);
        parts.push(format!("fp={}", short));
    }
    parts.push(format!("{:?}", event.message));

    let mut line = parts.join(" ");
    line.push('\n');
    line
}

fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else {
        format!("{:.3}s", ms as f64 / 1000.0)
    }
}
