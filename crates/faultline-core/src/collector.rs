//! Collector: completes, scrubs and fingerprints events before handing them
//! to a sink

use crate::config::ScrubberConfig;
use crate::error::SinkResult;
use crate::event::ErrorEvent;
use crate::fingerprint::fingerprint;
use crate::scrubber::Scrubber;
use crate::sink::{NoopSink, Sink};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Records error events to a configured sink.
///
/// `record` is synchronous with respect to the sink: it returns once the
/// sink's `write` returns. Wrapping the sink in an async queue moves the
/// real delivery off the caller's path.
#[derive(Clone)]
pub struct Collector {
    sink: Arc<dyn Sink>,
    scrubber: Option<Scrubber>,
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("scrubbing", &self.scrubber.is_some())
            .finish()
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Collector {
    pub fn builder() -> CollectorBuilder {
        CollectorBuilder::default()
    }

    pub fn scrubber(&self) -> Option<&Scrubber> {
        self.scrubber.as_ref()
    }

    /// Finalize an event and write it to the sink.
    ///
    /// Fills `event_id` and `timestamp` when absent, scrubs the message,
    /// stack trace, tool arguments and metadata when a scrubber is
    /// configured, recomputes the fingerprint from the scrubbed event, and
    /// calls the sink's `write` exactly once. The sink's error is returned
    /// unchanged.
    pub async fn record(&self, event: ErrorEvent) -> SinkResult<()> {
        let event = self.finalize(event);

        let result = self.sink.write(&event).await;
        if let Err(e) = &result {
            tracing::debug!(
                faultline.event = "record_failed",
                event_id = %event.event_id,
                fingerprint = %event.fingerprint,
                error = %e,
                "Sink rejected error event"
            );
        }
        result
    }

    /// Apply identity defaults, scrubbing and fingerprinting without writing.
    pub fn finalize(&self, mut event: ErrorEvent) -> ErrorEvent {
        if event.event_id.is_empty() {
            event.event_id = Uuid::new_v4().to_string();
        }
        if event.timestamp.is_none() {
            event.timestamp = Some(Utc::now());
        }

        if let Some(scrubber) = &self.scrubber {
            event.message = scrubber.scrub_message(&event.message);
            event.stack_trace = scrubber.scrub_stack_trace(&event.stack_trace);
            event.tool_args = scrubber.scrub_tool_args(&event.tool_args);
            event.metadata = scrubber.scrub_metadata(&event.metadata);
        }

        event.fingerprint = fingerprint(&event);
        event
    }

    pub async fn flush(&self) -> SinkResult<()> {
        self.sink.flush().await
    }

    pub async fn close(&self) -> SinkResult<()> {
        self.sink.close().await
    }
}

/// Builder for [`Collector`]
#[derive(Default)]
pub struct CollectorBuilder {
    sink: Option<Arc<dyn Sink>>,
    scrubber: Option<Scrubber>,
}

impl CollectorBuilder {
    /// Destination for recorded events; a no-op sink when unset
    pub fn sink<S: Sink + 'static>(mut self, sink: S) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Destination shared with other owners
    pub fn shared_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Scrub events with a custom configuration
    pub fn scrubber(mut self, config: ScrubberConfig) -> Self {
        self.scrubber = Some(Scrubber::new(config));
        self
    }

    /// Scrub events with the default configuration
    pub fn default_scrubbing(self) -> Self {
        self.scrubber(ScrubberConfig::default())
    }

    /// Use an optional scrubber configuration as loaded from a config file
    pub fn maybe_scrubber(mut self, config: Option<ScrubberConfig>) -> Self {
        self.scrubber = config.map(Scrubber::new);
        self
    }

    pub fn build(self) -> Collector {
        Collector {
            sink: self.sink.unwrap_or_else(|| Arc::new(NoopSink::new())),
            scrubber: self.scrubber,
        }
    }
}
