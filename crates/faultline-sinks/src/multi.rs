//! Fan-out sink

use async_trait::async_trait;
use faultline_core::{ErrorEvent, Sink, SinkError, SinkResult};
use std::sync::Arc;

/// Delivers every operation to each child sink in order.
///
/// A failing child never stops delivery to the children after it. All
/// failures are returned together through [`SinkError::aggregate`], so
/// callers can still match each child's original error with
/// [`SinkError::contains`]. With no children every operation succeeds.
#[derive(Clone, Default)]
pub struct MultiSink {
    sinks: Vec<Arc<dyn Sink>>,
}

impl std::fmt::Debug for MultiSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl MultiSink {
    pub fn new(sinks: Vec<Arc<dyn Sink>>) -> Self {
        Self { sinks }
    }

    /// Append a child sink
    pub fn with<S: Sink + 'static>(mut self, sink: S) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    /// Append a child sink shared with other owners
    pub fn with_shared(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl Sink for MultiSink {
    async fn write(&self, event: &ErrorEvent) -> SinkResult<()> {
        let mut errors = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.write(event).await {
                errors.push(e);
            }
        }
        SinkError::aggregate(errors)
    }

    async fn flush(&self) -> SinkResult<()> {
        let mut errors = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.flush().await {
                errors.push(e);
            }
        }
        SinkError::aggregate(errors)
    }

    async fn close(&self) -> SinkResult<()> {
        let mut errors = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.close().await {
                errors.push(e);
            }
        }
        SinkError::aggregate(errors)
    }
}
