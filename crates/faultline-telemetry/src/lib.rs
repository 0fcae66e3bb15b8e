//! # Faultline Telemetry
//!
//! Structured logging for processes running the Faultline pipeline.
//!
//! - **Formats**: JSON, pretty and compact output via `tracing-subscriber`
//! - **Files**: optional daily-rolling, non-blocking file output
//! - **Configurable**: TOML file, `FAULTLINE_LOG_*` variables and `RUST_LOG`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use faultline_telemetry::{LoggingConfig, TelemetrySystem};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), faultline_telemetry::Error> {
//!     let config = LoggingConfig::load(None).await?;
//!     let _guard = TelemetrySystem::init(config).await?;
//!
//!     tracing::info!("Application started");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod system;

pub use config::{LogFormat, LogLevel, LoggingConfig};
pub use system::{TelemetryGuard, TelemetrySystem};

/// Result type for telemetry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Logging setup errors
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Telemetry system error: {message}")]
    System { message: String },
}
