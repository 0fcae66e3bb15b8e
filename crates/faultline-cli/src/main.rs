use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use faultline_core::fingerprint::normalize_stack_trace;
use faultline_core::{
    catch_panic_sync, fingerprint, with_context_id, Collector, ConsoleFormat, ErrorEvent,
    FaultlineConfig, OperationHistory, OperationRecord, Scrubber, Severity, Sink,
};
use faultline_sinks::{AsyncSink, ConsoleSink, MultiSink};
use faultline_telemetry::{LoggingConfig, TelemetrySystem};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(
    after_help = "ENVIRONMENT:\n  FAULTLINE_SCRUBBING, FAULTLINE_SCRUB_MESSAGES, FAULTLINE_FAIL_CLOSED,\n  FAULTLINE_QUEUE_CAPACITY override the pipeline config.\n  FAULTLINE_LOG_LEVEL, FAULTLINE_LOG_FORMAT, FAULTLINE_LOG_DIR and RUST_LOG\n  override logging."
)]
struct Cli {
    /// Pipeline configuration file
    #[arg(long, help = "Path to faultline.toml")]
    config: Option<PathBuf>,

    /// Logging configuration file
    #[arg(long, help = "Path to logging.toml")]
    log_config: Option<PathBuf>,

    /// Shorthand for --log-level debug
    #[arg(short, long)]
    verbose: bool,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(long, help = "Set log level")]
    log_level: Option<String>,

    /// Set log format (json, pretty, compact)
    #[arg(long, help = "Set log output format")]
    log_format: Option<String>,

    /// Write logs to daily-rolling files in this directory
    #[arg(long, help = "Directory for log files")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Redact credentials and PII from text ("-" reads stdin)
    Scrub {
        text: String,

        /// Treat the input as JSON and redact sensitive keys
        #[arg(long, conflicts_with = "stack_trace")]
        json: bool,

        /// Treat the input as a stack trace and normalize paths and addresses
        #[arg(long)]
        stack_trace: bool,
    },

    /// Print the grouping fingerprint for an error
    Fingerprint {
        #[arg(long)]
        error_type: String,

        #[arg(long)]
        operation: Option<String>,

        #[arg(long)]
        agent: Option<String>,

        #[arg(long)]
        tool: Option<String>,

        /// File holding the stack trace
        #[arg(long)]
        stack_file: Option<PathBuf>,

        /// Also print the frames that went into the hash
        #[arg(long)]
        frames: bool,
    },

    /// Run sample failures through the configured pipeline
    Demo {
        /// Deliver through the bounded async queue
        #[arg(long = "async")]
        use_async: bool,

        /// Console output format
        #[arg(long, value_enum)]
        format: Option<FormatArg>,

        /// Show stack traces and operation history
        #[arg(long)]
        details: bool,

        /// Also append JSON lines to this file
        #[arg(long)]
        jsonl: Option<PathBuf>,

        /// Skip scrubbing, even when configured
        #[arg(long)]
        raw: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Pretty,
    Compact,
    Json,
}

impl From<FormatArg> for ConsoleFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Pretty => Self::Pretty,
            FormatArg::Compact => Self::Compact,
            FormatArg::Json => Self::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScrubMode {
    Message,
    Json,
    StackTrace,
}

/// Create logging configuration from CLI arguments
async fn create_logging_config(cli: &Cli) -> Result<LoggingConfig> {
    let mut config = LoggingConfig::load(cli.log_config.as_deref()).await?;

    if let Some(level) = &cli.log_level {
        config.level = level
            .parse()
            .with_context(|| format!("Invalid --log-level '{}'", level))?;
    } else if cli.verbose {
        config.level = faultline_telemetry::LogLevel::Debug;
    }

    if let Some(format) = &cli.log_format {
        config.format = format
            .parse()
            .with_context(|| format!("Invalid --log-format '{}'", format))?;
    }

    if let Some(log_dir) = &cli.log_dir {
        config.log_dir = log_dir.clone();
        config.file_enabled = true;
    }

    Ok(config)
}

fn read_input(text: &str) -> Result<String> {
    if text != "-" {
        return Ok(text.to_string());
    }
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read stdin")?;
    Ok(buffer)
}

fn scrub_text(scrubber: &Scrubber, text: &str, mode: ScrubMode) -> String {
    match mode {
        ScrubMode::Message => scrubber.scrub_message(text),
        ScrubMode::Json => scrubber.scrub_json(text),
        ScrubMode::StackTrace => scrubber.scrub_stack_trace(text),
    }
}

fn fingerprint_event(
    error_type: &str,
    operation: Option<&str>,
    agent: Option<&str>,
    tool: Option<&str>,
    stack_trace: &str,
) -> ErrorEvent {
    let mut event = ErrorEvent::new(Severity::Error, error_type, "").with_stack_trace(stack_trace);
    if let Some(operation) = operation {
        event = event.with_operation(operation);
    }
    if let Some(agent) = agent {
        event = event.with_agent(agent);
    }
    if let Some(tool) = tool {
        event = event.with_tool(tool, "");
    }
    event
}

/// Console sink, plus an optional JSON-lines file, optionally behind the
/// async queue.
fn build_demo_sink(
    config: &FaultlineConfig,
    use_async: bool,
    format: Option<ConsoleFormat>,
    details: bool,
    jsonl: Option<&Path>,
) -> Result<Arc<dyn Sink>> {
    let mut console_config = config.console.clone();
    if let Some(format) = format {
        console_config.format = format;
    }
    console_config.verbose |= details;

    let mut fan_out = MultiSink::default().with(ConsoleSink::from_config(&console_config));
    if let Some(path) = jsonl {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        fan_out = fan_out.with(ConsoleSink::new(file).with_format(ConsoleFormat::Json));
    }

    if !(use_async || config.async_sink.enabled) {
        return Ok(Arc::new(fan_out));
    }

    let mut builder = AsyncSink::builder(fan_out)
        .queue_capacity(config.async_sink.queue_capacity)
        .poll_interval(config.async_sink.poll_interval())
        .on_dropped(|n| warn!(dropped = n, "Demo queue overflowed"))
        .on_delivery_failure(|e| warn!(error = %e, "Demo delivery failed"));
    if let Some(timeout) = config.async_sink.flush_timeout() {
        builder = builder.flush_timeout(timeout);
    }
    Ok(Arc::new(builder.build()))
}

fn demo_history() -> OperationHistory {
    let history = OperationHistory::default();
    history.record(OperationRecord::new("llm").with_agent("planner"));
    history.complete_last(850, None);
    history.record(
        OperationRecord::new("tool")
            .with_agent("planner")
            .with_tool("http_get", "call-1"),
    );
    history.complete_last(5000, Some("deadline exceeded"));
    history
}

fn demo_timeout(attempt: u32) -> ErrorEvent {
    ErrorEvent::new(
        Severity::Error,
        "timeout",
        format!(
            "GET https://api.example.com/v1/search failed on attempt {} (token=sk-demo-{})",
            attempt, attempt
        ),
    )
    .with_operation("tool")
    .with_agent("planner")
    .with_tool(
        "http_get",
        r#"{"url":"https://api.example.com/v1/search","api_key":"demo-key","query":"weather"}"#,
    )
    .with_context(1, Some(attempt))
    .with_stack_trace(
        "agent::tools::http::get\n\t/home/dev/agent/src/tools/http.rs:88 +0x1f\n\
         agent::runner::run_tool\n\t/home/dev/agent/src/runner.rs:41 +0x2a",
    )
}

/// Record sample failures and return how many were recorded
async fn run_demo(collector: &Collector) -> Result<usize> {
    let history = demo_history();
    let history_scrubber = collector.scrubber().cloned().unwrap_or_default();

    let mut recorded = 0;
    for attempt in 1..=2 {
        let mut event = demo_timeout(attempt);
        history.attach_to(&mut event, &history_scrubber);
        collector.record(event).await?;
        recorded += 1;
    }

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(|_| {}));
    let outcome = with_context_id(1, catch_panic_sync(collector, || -> usize {
        let frames: Vec<usize> = Vec::new();
        frames[3]
    }))
    .await;
    std::panic::set_hook(previous_hook);

    if let Err(panic) = outcome {
        info!(panic = %panic, "Recovered demo panic");
        recorded += 1;
    }

    collector.flush().await?;
    Ok(recorded)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables before parsing configuration
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let logging_config = create_logging_config(&cli).await?;
    let _logging_guard = TelemetrySystem::init(logging_config)
        .await
        .context("Logging initialization failed")?;

    let config = FaultlineConfig::load(cli.config.as_deref())
        .await
        .context("Failed to load configuration")?;

    match cli.command {
        Command::Scrub {
            text,
            json,
            stack_trace,
        } => {
            let input = read_input(&text)?;
            let scrubber = Scrubber::new(config.scrubber.unwrap_or_default());
            let mode = if json {
                ScrubMode::Json
            } else if stack_trace {
                ScrubMode::StackTrace
            } else {
                ScrubMode::Message
            };
            println!("{}", scrub_text(&scrubber, &input, mode));
        }

        Command::Fingerprint {
            error_type,
            operation,
            agent,
            tool,
            stack_file,
            frames,
        } => {
            let stack_trace = match &stack_file {
                Some(path) => tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => String::new(),
            };
            let event = fingerprint_event(
                &error_type,
                operation.as_deref(),
                agent.as_deref(),
                tool.as_deref(),
                &stack_trace,
            );
            println!("{}", fingerprint(&event));
            if frames {
                for frame in normalize_stack_trace(&stack_trace) {
                    println!("  {}", frame);
                }
            }
        }

        Command::Demo {
            use_async,
            format,
            details,
            jsonl,
            raw,
        } => {
            let sink = build_demo_sink(
                &config,
                use_async,
                format.map(ConsoleFormat::from),
                details,
                jsonl.as_deref(),
            )?;
            let scrubber = if raw {
                None
            } else {
                Some(config.scrubber.clone().unwrap_or_default())
            };
            let collector = Collector::builder()
                .shared_sink(sink)
                .maybe_scrubber(scrubber)
                .build();

            let recorded = run_demo(&collector).await?;
            collector.close().await?;
            println!("Recorded {} demo events", recorded);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_core::{SinkResult, OPERATION_HISTORY_KEY};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySink {
        events: Mutex<Vec<ErrorEvent>>,
    }

    #[faultline_core::async_trait]
    impl Sink for MemorySink {
        async fn write(&self, event: &ErrorEvent) -> SinkResult<()> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }

        async fn flush(&self) -> SinkResult<()> {
            Ok(())
        }

        async fn close(&self) -> SinkResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["faultline", "scrub", "--json", "{}"]).unwrap();
        assert!(matches!(cli.command, Command::Scrub { json: true, .. }));

        let cli = Cli::try_parse_from([
            "faultline",
            "--log-level",
            "debug",
            "demo",
            "--async",
            "--format",
            "compact",
        ])
        .unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(
            cli.command,
            Command::Demo {
                use_async: true,
                format: Some(FormatArg::Compact),
                ..
            }
        ));

        assert!(Cli::try_parse_from(["faultline", "scrub", "--json", "--stack-trace", "x"]).is_err());
    }

    #[test]
    fn test_scrub_modes() {
        let scrubber = Scrubber::default();
        let message = scrub_text(&scrubber, "login failed password=hunter2", ScrubMode::Message);
        assert!(!message.contains("hunter2"));

        let json = scrub_text(&scrubber, r#"{"api_key":"abc","q":"ok"}"#, ScrubMode::Json);
        assert!(!json.contains("abc"));
        assert!(json.contains("ok"));

        let trace = scrub_text(&scrubber, "main()\n\t/home/alice/app.rs:3", ScrubMode::StackTrace);
        assert!(!trace.contains("alice"));
    }

    #[test]
    fn test_fingerprint_event_ignores_absent_fields() {
        let a = fingerprint_event("timeout", Some("tool"), None, Some("search"), "");
        let b = fingerprint_event("timeout", Some("tool"), None, Some("search"), "");
        let c = fingerprint_event("timeout", Some("llm"), None, Some("search"), "");
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&c));
    }

    #[tokio::test]
    async fn test_demo_records_grouped_scrubbed_events() {
        let sink = Arc::new(MemorySink::default());
        let collector = Collector::builder()
            .shared_sink(sink.clone())
            .default_scrubbing()
            .build();

        let recorded = run_demo(&collector).await.unwrap();
        assert_eq!(recorded, 3);

        let events = sink.events.lock().unwrap().clone();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].fingerprint, events[1].fingerprint);
        assert!(!events[0].message.contains("sk-demo"));
        assert!(!events[0].tool_args.contains("demo-key"));
        assert!(events[0].metadata.contains_key(OPERATION_HISTORY_KEY));
        assert_eq!(events[2].severity, Severity::Crash);
        assert_eq!(events[2].error_type, "panic");
        assert_eq!(events[2].context_id, Some(1));
    }

    #[tokio::test]
    async fn test_demo_sink_writes_json_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");
        let sink = build_demo_sink(
            &FaultlineConfig::default(),
            true,
            Some(ConsoleFormat::Compact),
            false,
            Some(&path),
        )
        .unwrap();
        let collector = Collector::builder().shared_sink(sink).build();

        collector.record(demo_timeout(1)).await.unwrap();
        collector.close().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let event: ErrorEvent = serde_json::from_str(contents.trim_end()).unwrap();
        assert_eq!(event.error_type, "timeout");
    }
}
