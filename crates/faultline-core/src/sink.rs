//! Destination contract for finalized error events

use crate::error::{SinkError, SinkResult};
use crate::event::ErrorEvent;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A destination for finalized error events.
///
/// Lifecycle is `write* -> flush* -> close`. Implementations must be safe for
/// concurrent use, and once closed, `write` and `flush` must return an error
/// instead of silently succeeding.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Persist one event. Should not panic and should be idempotent where
    /// the backend allows it.
    async fn write(&self, event: &ErrorEvent) -> SinkResult<()>;

    /// Drain any internal buffering. A no-op is a valid implementation.
    async fn flush(&self) -> SinkResult<()>;

    /// Release resources held by the sink.
    async fn close(&self) -> SinkResult<()>;
}

#[async_trait]
impl<S: Sink + ?Sized> Sink for Arc<S> {
    async fn write(&self, event: &ErrorEvent) -> SinkResult<()> {
        (**self).write(event).await
    }

    async fn flush(&self) -> SinkResult<()> {
        (**self).flush().await
    }

    async fn close(&self) -> SinkResult<()> {
        (**self).close().await
    }
}

#[async_trait]
impl<S: Sink + ?Sized> Sink for Box<S> {
    async fn write(&self, event: &ErrorEvent) -> SinkResult<()> {
        (**self).write(event).await
    }

    async fn flush(&self) -> SinkResult<()> {
        (**self).flush().await
    }

    async fn close(&self) -> SinkResult<()> {
        (**self).close().await
    }
}

/// Discards every event.
///
/// Used as the collector's default so an unconfigured pipeline still works.
#[derive(Debug, Default)]
pub struct NoopSink {
    closed: AtomicBool,
}

impl NoopSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> SinkResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(SinkError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Sink for NoopSink {
    async fn write(&self, _event: &ErrorEvent) -> SinkResult<()> {
        self.ensure_open()
    }

    async fn flush(&self) -> SinkResult<()> {
        self.ensure_open()
    }

    async fn close(&self) -> SinkResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Severity;

    #[tokio::test]
    async fn test_noop_accepts_until_closed() {
        let sink = NoopSink::new();
        let event = ErrorEvent::new(Severity::Error, "timeout", "slow");

        assert!(sink.write(&event).await.is_ok());
        assert!(sink.flush().await.is_ok());
        assert!(sink.close().await.is_ok());

        assert!(matches!(sink.write(&event).await, Err(SinkError::Closed)));
        assert!(matches!(sink.flush().await, Err(SinkError::Closed)));
        assert!(sink.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_shared_sink_delegates() {
        let sink: Arc<dyn Sink> = Arc::new(NoopSink::new());
        let boxed: Box<dyn Sink> = Box::new(Arc::clone(&sink));

        boxed.close().await.unwrap();
        assert!(sink
            .write(&ErrorEvent::default())
            .await
            .unwrap_err()
            .to_string()
            .contains("closed"));
    }
}
