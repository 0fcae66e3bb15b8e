//! Subscriber construction and installation

use crate::{
    config::{LogFormat, LoggingConfig},
    Error, Result,
};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// A type-erased layer over the bare registry
pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installs the process-wide tracing subscriber
pub struct TelemetrySystem;

/// Keeps the background file writer alive. Dropping it flushes buffered
/// log lines, so hold it until the process exits.
pub struct TelemetryGuard {
    _file_guard: Option<WorkerGuard>,
}

impl TelemetrySystem {
    /// Validate `config` and install the global subscriber.
    ///
    /// Fails if a global subscriber is already installed.
    pub async fn init(config: LoggingConfig) -> Result<TelemetryGuard> {
        config.validate()?;

        if config.file_enabled {
            tokio::fs::create_dir_all(&config.log_dir).await?;
        }

        let (layers, file_guard) = Self::build_layers(&config)?;
        let filter = Self::build_env_filter(&config)?;

        Registry::default()
            .with(layers)
            .with(filter)
            .try_init()
            .map_err(|e| Error::System {
                message: format!("Failed to initialize tracing subscriber: {}", e),
            })?;

        tracing::info!(
            faultline.event = "logging_initialized",
            faultline.version = env!("CARGO_PKG_VERSION"),
            level = ?config.level,
            format = ?config.format,
            file = config.file_enabled,
            "Logging initialized"
        );

        Ok(TelemetryGuard {
            _file_guard: file_guard,
        })
    }

    /// Level filter from the config, replaced entirely by `RUST_LOG` when set
    pub fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
        if let Ok(directives) = std::env::var("RUST_LOG") {
            return EnvFilter::try_new(&directives).map_err(|e| Error::Config {
                message: format!("Invalid RUST_LOG '{}': {}", directives, e),
            });
        }

        if !config.enabled {
            return Ok(EnvFilter::new("off"));
        }

        let level: Level = config.level.into();
        let mut filter = EnvFilter::new(level.to_string());
        for noisy in ["tokio=warn", "mio=warn"] {
            let directive = noisy.parse().map_err(|e| Error::Config {
                message: format!("Invalid filter directive '{}': {}", noisy, e),
            })?;
            filter = filter.add_directive(directive);
        }

        Ok(filter)
    }

    /// Console and file layers for `config`, plus the file writer's guard.
    pub fn build_layers(config: &LoggingConfig) -> Result<(Vec<BoxedLayer>, Option<WorkerGuard>)> {
        let mut layers = Vec::new();
        if !config.enabled {
            return Ok((layers, None));
        }

        if config.console_enabled {
            layers.push(Self::build_console_layer(config));
        }

        let mut file_guard = None;
        if config.file_enabled {
            let appender =
                tracing_appender::rolling::daily(&config.log_dir, &config.log_file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(Self::format_layer(
                fmt::layer().with_writer(writer).with_ansi(false),
                config,
            ));
            file_guard = Some(guard);
        }

        Ok((layers, file_guard))
    }

    fn build_console_layer(config: &LoggingConfig) -> BoxedLayer {
        Self::format_layer(fmt::layer().with_writer(std::io::stderr), config)
    }

    fn format_layer<W>(
        layer: fmt::Layer<Registry, fmt::format::DefaultFields, fmt::format::Format, W>,
        config: &LoggingConfig,
    ) -> BoxedLayer
    where
        W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
    {
        let layer = layer
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_thread_ids(config.include_thread_info)
            .with_thread_names(config.include_thread_info);

        match config.format {
            LogFormat::Json => layer
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .with_target(true)
                .boxed(),
            LogFormat::Pretty => layer.pretty().with_target(true).boxed(),
            LogFormat::Compact => layer.compact().with_target(false).boxed(),
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::debug!(faultline.event = "logging_shutdown", "Flushing log writers");
    }
}
