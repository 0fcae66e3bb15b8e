//! Pipeline configuration and management

use crate::{Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for a collector pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultlineConfig {
    /// Scrubbing settings; `None` leaves events untouched
    pub scrubber: Option<ScrubberConfig>,

    /// Bounded queue in front of slow sinks
    pub async_sink: AsyncSinkConfig,

    /// Human-readable console output
    pub console: ConsoleConfig,
}

/// Redaction and size-limit settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrubberConfig {
    /// Maximum message length in bytes
    pub max_message_size: usize,

    /// Maximum stack trace length in bytes
    pub max_stack_trace_size: usize,

    /// Maximum serialized tool-argument length in bytes
    pub max_tool_args_size: usize,

    /// Maximum length of a serialized metadata blob (JSON scrub output)
    pub max_metadata_size: usize,

    /// Maximum length of a single metadata value
    pub max_metadata_value_size: usize,

    /// Apply pattern redaction to messages
    pub scrub_messages: bool,

    /// Replace a producer-side structured value that cannot be bounded with
    /// the scrub-error marker instead of leaving it out. Malformed JSON is
    /// always replaced with the marker.
    pub fail_closed: bool,

    /// Extra key substrings treated as sensitive, on top of the built-in list
    pub extra_sensitive_keys: Vec<String>,
}

impl Default for ScrubberConfig {
    fn default() -> Self {
        Self {
            max_message_size: 4096,
            max_stack_trace_size: 32768,
            max_tool_args_size: 8192,
            max_metadata_size: 16384,
            max_metadata_value_size: 1024,
            scrub_messages: true,
            fail_closed: true,
            extra_sensitive_keys: Vec::new(),
        }
    }
}

/// Bounded-queue settings for the asynchronous sink wrapper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsyncSinkConfig {
    /// Enable the asynchronous wrapper
    pub enabled: bool,

    /// Maximum number of queued events
    pub queue_capacity: usize,

    /// How often flush re-checks the queue (in milliseconds)
    pub poll_interval_ms: u64,

    /// Upper bound on a flush (in milliseconds); unbounded when unset
    pub flush_timeout_ms: Option<u64>,
}

impl Default for AsyncSinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            queue_capacity: 1000,
            poll_interval_ms: 10,
            flush_timeout_ms: None,
        }
    }
}

impl AsyncSinkConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn flush_timeout(&self) -> Option<Duration> {
        self.flush_timeout_ms.map(Duration::from_millis)
    }
}

/// Console output settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub format: ConsoleFormat,
    /// Include stack traces and operation history
    pub verbose: bool,
}

/// Console output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleFormat {
    /// Multi-line human-readable block
    #[default]
    Pretty,
    /// Single summary line
    Compact,
    /// One JSON object per line
    Json,
}

impl FaultlineConfig {
    /// Load configuration from file, falling back to defaults plus env overrides
    pub async fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_file = match config_path {
            Some(path) => path.to_path_buf(),
            None => Self::default_config_path()?,
        };

        let mut config = if config_file.exists() {
            let content = tokio::fs::read_to_string(&config_file).await?;
            toml::from_str(&content).map_err(|e| Error::Config {
                message: format!("Failed to parse faultline config: {}", e),
            })?
        } else {
            Self::default()
        };

        config.load_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, config_path: Option<&Path>) -> Result<()> {
        let config_file = match config_path {
            Some(path) => path.to_path_buf(),
            None => Self::default_config_path()?,
        };

        if let Some(parent) = config_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| Error::Config {
            message: format!("Failed to serialize faultline config: {}", e),
        })?;

        tokio::fs::write(&config_file, content).await?;
        Ok(())
    }

    /// Apply environment variable overrides
    pub fn load_env_overrides(&mut self) {
        if let Ok(enabled) = std::env::var("FAULTLINE_SCRUBBING") {
            match enabled.parse::<bool>() {
                Ok(true) if self.scrubber.is_none() => {
                    self.scrubber = Some(ScrubberConfig::default());
                }
                Ok(false) => self.scrubber = None,
                _ => {}
            }
        }

        if let Some(scrubber) = self.scrubber.as_mut() {
            if let Ok(value) = std::env::var("FAULTLINE_SCRUB_MESSAGES") {
                scrubber.scrub_messages = value.parse().unwrap_or(scrubber.scrub_messages);
            }
            if let Ok(value) = std::env::var("FAULTLINE_FAIL_CLOSED") {
                scrubber.fail_closed = value.parse().unwrap_or(scrubber.fail_closed);
            }
        }

        if let Ok(capacity) = std::env::var("FAULTLINE_QUEUE_CAPACITY") {
            self.async_sink.queue_capacity =
                capacity.parse().unwrap_or(self.async_sink.queue_capacity);
        }
    }

    /// Default configuration file path
    fn default_config_path() -> Result<PathBuf> {
        let project_dirs =
            ProjectDirs::from("dev", "faultline", "faultline").ok_or_else(|| Error::Config {
                message: "Could not determine config directory".to_string(),
            })?;

        Ok(project_dirs.config_dir().join("faultline.toml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(scrubber) = &self.scrubber {
            let limits = [
                ("max_message_size", scrubber.max_message_size),
                ("max_stack_trace_size", scrubber.max_stack_trace_size),
                ("max_tool_args_size", scrubber.max_tool_args_size),
                ("max_metadata_size", scrubber.max_metadata_size),
                ("max_metadata_value_size", scrubber.max_metadata_value_size),
            ];
            for (name, value) in limits {
                if value == 0 {
                    return Err(Error::Config {
                        message: format!("{} must be greater than 0", name),
                    });
                }
            }
        }

        if self.async_sink.queue_capacity == 0 {
            return Err(Error::Config {
                message: "queue_capacity must be greater than 0".to_string(),
            });
        }

        if self.async_sink.poll_interval_ms == 0 {
            return Err(Error::Config {
                message: "poll_interval_ms must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_config_serialization() {
        let config = FaultlineConfig {
            scrubber: Some(ScrubberConfig::default()),
            ..Default::default()
        };
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: FaultlineConfig = toml::from_str(&serialized).unwrap();

        assert_eq!(config.scrubber, deserialized.scrubber);
        assert_eq!(config.async_sink, deserialized.async_sink);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: FaultlineConfig = toml::from_str(
            r#"
            [scrubber]
            max_message_size = 256

            [async_sink]
            enabled = true
            "#,
        )
        .unwrap();

        let scrubber = config.scrubber.unwrap();
        assert_eq!(scrubber.max_message_size, 256);
        assert_eq!(scrubber.max_stack_trace_size, 32768);
        assert!(scrubber.fail_closed);
        assert!(config.async_sink.enabled);
        assert_eq!(config.async_sink.queue_capacity, 1000);
        assert_eq!(config.async_sink.poll_interval(), Duration::from_millis(10));
    }

    #[tokio::test]
    #[serial]
    async fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("faultline.toml");

        let mut original = FaultlineConfig::default();
        original.async_sink.queue_capacity = 42;
        original.console.format = ConsoleFormat::Json;
        original.save(Some(&config_path)).await.unwrap();

        let loaded = FaultlineConfig::load(Some(&config_path)).await.unwrap();
        assert_eq!(loaded.async_sink.queue_capacity, 42);
        assert_eq!(loaded.console.format, ConsoleFormat::Json);
        assert!(loaded.scrubber.is_none());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("FAULTLINE_SCRUBBING", "true");
        std::env::set_var("FAULTLINE_SCRUB_MESSAGES", "false");
        std::env::set_var("FAULTLINE_QUEUE_CAPACITY", "64");

        let mut config = FaultlineConfig::default();
        config.load_env_overrides();

        let scrubber = config.scrubber.as_ref().unwrap();
        assert!(!scrubber.scrub_messages);
        assert!(scrubber.fail_closed);
        assert_eq!(config.async_sink.queue_capacity, 64);

        std::env::remove_var("FAULTLINE_SCRUBBING");
        std::env::remove_var("FAULTLINE_SCRUB_MESSAGES");
        std::env::remove_var("FAULTLINE_QUEUE_CAPACITY");
    }

    #[test]
    fn test_config_validation() {
        let mut config = FaultlineConfig::default();
        assert!(config.validate().is_ok());

        config.async_sink.queue_capacity = 0;
        assert!(config.validate().is_err());

        config.async_sink.queue_capacity = 10;
        config.scrubber = Some(ScrubberConfig {
            max_message_size: 0,
            ..Default::default()
        });
        assert!(config.validate().is_err());
    }
}
