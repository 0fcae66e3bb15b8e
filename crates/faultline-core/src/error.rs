use std::time::Duration;
use thiserror::Error;

/// Result type for configuration and setup operations
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for sink operations
pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Configuration and setup errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors surfaced by sinks.
///
/// The collector hands these back to its caller untouched, so a caller can
/// match on the variant its configured sink produced.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("sink is closed")]
    Closed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{sink} sink error: {message}")]
    Backend { sink: String, message: String },

    #[error("{} sink(s) failed: {}", .0.len(), join_messages(.0))]
    Multiple(Vec<SinkError>),
}

impl SinkError {
    /// Convenience constructor for backend failures
    pub fn backend(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            sink: sink.into(),
            message: message.into(),
        }
    }

    /// Every leaf error, with `Multiple` aggregates flattened recursively.
    pub fn causes(&self) -> Vec<&SinkError> {
        match self {
            SinkError::Multiple(errors) => errors.iter().flat_map(|e| e.causes()).collect(),
            other => vec![other],
        }
    }

    /// Whether any leaf error satisfies the predicate.
    pub fn contains<F>(&self, mut predicate: F) -> bool
    where
        F: FnMut(&SinkError) -> bool,
    {
        self.causes().into_iter().any(|e| predicate(e))
    }

    /// Collapse a list of per-child failures into one result.
    ///
    /// No errors is success, a single error is returned as-is, anything more
    /// becomes `Multiple` in the order the failures occurred.
    pub fn aggregate(mut errors: Vec<SinkError>) -> SinkResult<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(SinkError::Multiple(errors)),
        }
    }
}

fn join_messages(errors: &[SinkError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
