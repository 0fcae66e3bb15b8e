//! # Faultline Core
//!
//! Turns raw failures into normalized, redacted, groupable error events and
//! hands them to a pluggable [`Sink`].
//!
//! ## Pipeline
//!
//! - **Collector**: fills identity fields, scrubs, fingerprints, writes
//! - **Scrubber**: fail-closed redaction of credentials and PII
//! - **Fingerprint**: stable grouping hash over non-volatile fields
//! - **RingBuffer**: bounded rolling history of recent operations
//!
//! ## Quick Start
//!
//! ```rust
//! use faultline_core::{Collector, ErrorEvent, Severity};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let collector = Collector::builder().default_scrubbing().build();
//!
//!     collector
//!         .record(ErrorEvent::new(Severity::Error, "timeout", "search timed out"))
//!         .await?;
//!     collector.close().await?;
//!     Ok(())
//! }
//! ```

pub mod collector;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod fingerprint;
pub mod history;
pub mod recover;
pub mod ring_buffer;
pub mod scrubber;
pub mod sink;

pub use collector::{Collector, CollectorBuilder};
pub use config::{AsyncSinkConfig, ConsoleConfig, ConsoleFormat, FaultlineConfig, ScrubberConfig};
pub use context::{current_context_id, sync_with_context_id, with_context_id};
pub use error::{Error, Result, SinkError, SinkResult};
pub use event::{ErrorEvent, Severity, SystemState, OPERATION_HISTORY_KEY};
pub use fingerprint::fingerprint;
pub use history::{OperationHistory, OperationRecord};
pub use recover::{catch_panic, catch_panic_sync, PanicError};
pub use ring_buffer::RingBuffer;
pub use scrubber::Scrubber;
pub use sink::{NoopSink, Sink};

pub use async_trait::async_trait;
