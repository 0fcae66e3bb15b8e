//! Bounded, non-blocking queue in front of a slow sink

use async_trait::async_trait;
use faultline_core::recover::panic_message;
use faultline_core::{AsyncSinkConfig, ErrorEvent, Sink, SinkError, SinkResult};
use futures::FutureExt;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Called with the number of events evicted to make room for a new one
pub type DropCallback = Arc<dyn Fn(usize) + Send + Sync>;

/// Called when the wrapped sink rejects a queued event
pub type DeliveryFailureCallback = Arc<dyn Fn(&SinkError) + Send + Sync>;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// State shared with the delivery worker
struct Queue {
    events: Mutex<VecDeque<ErrorEvent>>,
    /// Events taken off the queue whose delivery has not finished
    in_flight: AtomicUsize,
    /// Set under the `events` lock so no write can slip in after close
    closed: AtomicBool,
    capacity: usize,
    wake: Notify,
}

impl Queue {
    fn lock(&self) -> MutexGuard<'_, VecDeque<ErrorEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue, evicting the oldest event when full.
    ///
    /// Returns how many events were evicted.
    fn push(&self, event: ErrorEvent) -> SinkResult<usize> {
        let mut events = self.lock();
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }

        let mut evicted = 0;
        while events.len() >= self.capacity {
            events.pop_front();
            evicted += 1;
        }
        events.push_back(event);
        drop(events);

        self.wake.notify_one();
        Ok(evicted)
    }

    fn pop(&self) -> Option<(ErrorEvent, InFlight<'_>)> {
        let mut events = self.lock();
        let event = events.pop_front()?;
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        Some((event, InFlight(self)))
    }

    fn pending(&self) -> usize {
        let events = self.lock();
        events.len() + self.in_flight.load(Ordering::Acquire)
    }

    fn queued(&self) -> usize {
        self.lock().len()
    }

    fn mark_closed(&self) {
        let _events = self.lock();
        self.closed.store(true, Ordering::Release);
    }
}

/// Counts a popped event as delivered once dropped, however delivery ended
struct InFlight<'a>(&'a Queue);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Wraps a sink so that `write` only enqueues.
///
/// A background task delivers queued events to the wrapped sink in order.
/// A panic inside the wrapped sink's `write` is reported as a delivery
/// failure and the task moves on to the next event.
/// When the queue is full the oldest event is evicted and the drop callback
/// is told about it; `write` never waits on the wrapped sink.
///
/// `close` stops accepting events, waits for the queue to drain, then closes
/// the wrapped sink. Dropping the sink without closing it still lets the
/// worker drain, but leaves the wrapped sink open.
pub struct AsyncSink {
    queue: Arc<Queue>,
    inner: Arc<dyn Sink>,
    shutdown: CancellationToken,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    poll_interval: Duration,
    flush_timeout: Option<Duration>,
    on_dropped: Option<DropCallback>,
}

impl std::fmt::Debug for AsyncSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncSink")
            .field("capacity", &self.queue.capacity)
            .field("queued", &self.queue.queued())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl AsyncSink {
    /// Wrap `inner` with default settings. Must be called inside a Tokio runtime.
    pub fn new<S: Sink + 'static>(inner: S) -> Self {
        Self::builder(inner).build()
    }

    /// Wrap `inner` using a loaded configuration
    pub fn from_config<S: Sink + 'static>(inner: S, config: &AsyncSinkConfig) -> Self {
        let mut builder = Self::builder(inner)
            .queue_capacity(config.queue_capacity)
            .poll_interval(config.poll_interval());
        if let Some(timeout) = config.flush_timeout() {
            builder = builder.flush_timeout(timeout);
        }
        builder.build()
    }

    pub fn builder<S: Sink + 'static>(inner: S) -> AsyncSinkBuilder {
        AsyncSinkBuilder {
            inner: Arc::new(inner),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            flush_timeout: None,
            on_dropped: None,
            on_delivery_failure: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity
    }

    /// Events waiting in the queue
    pub fn queued(&self) -> usize {
        self.queue.queued()
    }

    /// Events accepted but not yet delivered, including the one in flight
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    pub fn is_closed(&self) -> bool {
        self.queue.closed.load(Ordering::Acquire)
    }

    /// Wait until every accepted event has been delivered, then flush the
    /// wrapped sink. Returns [`SinkError::Cancelled`] if `cancel` fires first.
    pub async fn flush_with_cancel(&self, cancel: &CancellationToken) -> SinkResult<()> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }

        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SinkError::Cancelled),
                _ = ticker.tick() => {
                    if self.queue.pending() == 0 {
                        break;
                    }
                }
            }
        }

        self.inner.flush().await
    }
}

#[async_trait]
impl Sink for AsyncSink {
    async fn write(&self, event: &ErrorEvent) -> SinkResult<()> {
        let evicted = self.queue.push(event.clone())?;
        if evicted > 0 {
            tracing::warn!(
                faultline.event = "queue_overflow",
                evicted,
                capacity = self.queue.capacity,
                "Async sink queue full, dropped oldest event"
            );
            if let Some(on_dropped) = &self.on_dropped {
                on_dropped(evicted);
            }
        }
        Ok(())
    }

    async fn flush(&self) -> SinkResult<()> {
        let cancel = CancellationToken::new();
        match self.flush_timeout {
            Some(limit) => tokio::time::timeout(limit, self.flush_with_cancel(&cancel))
                .await
                .map_err(|_| SinkError::Timeout(limit))?,
            None => self.flush_with_cancel(&cancel).await,
        }
    }

    async fn close(&self) -> SinkResult<()> {
        // Held for the whole teardown so concurrent closers wait for it
        let mut worker = self.worker.lock().await;
        let Some(handle) = worker.take() else {
            return Ok(());
        };

        self.queue.mark_closed();
        self.shutdown.cancel();

        if let Err(e) = handle.await {
            tracing::warn!(
                faultline.event = "worker_join_failed",
                error = %e,
                "Async sink delivery task ended abnormally"
            );
        }

        tracing::debug!(faultline.event = "async_sink_closed", "Async sink drained and closed");
        self.inner.close().await
    }
}

impl Drop for AsyncSink {
    fn drop(&mut self) {
        self.queue.mark_closed();
        self.shutdown.cancel();
    }
}

/// Builder for [`AsyncSink`]
pub struct AsyncSinkBuilder {
    inner: Arc<dyn Sink>,
    queue_capacity: usize,
    poll_interval: Duration,
    flush_timeout: Option<Duration>,
    on_dropped: Option<DropCallback>,
    on_delivery_failure: Option<DeliveryFailureCallback>,
}

impl AsyncSinkBuilder {
    /// Maximum queued events (minimum 1)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// How often `flush` checks whether the queue has drained
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.poll_interval = interval;
        }
        self
    }

    /// Upper bound on `flush`; unbounded when unset
    pub fn flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = Some(timeout);
        self
    }

    pub fn on_dropped<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.on_dropped = Some(Arc::new(callback));
        self
    }

    pub fn on_delivery_failure<F>(mut self, callback: F) -> Self
    where
        F: Fn(&SinkError) + Send + Sync + 'static,
    {
        self.on_delivery_failure = Some(Arc::new(callback));
        self
    }

    /// Start the delivery task. Must be called inside a Tokio runtime.
    pub fn build(self) -> AsyncSink {
        let queue = Arc::new(Queue {
            events: Mutex::new(VecDeque::with_capacity(self.queue_capacity)),
            in_flight: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            capacity: self.queue_capacity,
            wake: Notify::new(),
        });
        let shutdown = CancellationToken::new();

        tracing::debug!(
            faultline.event = "async_sink_started",
            capacity = self.queue_capacity,
            "Async sink delivery task starting"
        );
        let handle = tokio::spawn(deliver(
            Arc::clone(&queue),
            Arc::clone(&self.inner),
            shutdown.clone(),
            self.on_delivery_failure,
        ));

        AsyncSink {
            queue,
            inner: self.inner,
            shutdown,
            worker: tokio::sync::Mutex::new(Some(handle)),
            poll_interval: self.poll_interval,
            flush_timeout: self.flush_timeout,
            on_dropped: self.on_dropped,
        }
    }
}

/// Deliver queued events until shutdown is requested and the queue is empty.
async fn deliver(
    queue: Arc<Queue>,
    inner: Arc<dyn Sink>,
    shutdown: CancellationToken,
    on_failure: Option<DeliveryFailureCallback>,
) {
    loop {
        match queue.pop() {
            Some((event, _in_flight)) => {
                let result = match AssertUnwindSafe(inner.write(&event)).catch_unwind().await {
                    Ok(result) => result,
                    Err(payload) => Err(SinkError::backend(
                        "async",
                        format!("wrapped sink panicked: {}", panic_message(payload.as_ref())),
                    )),
                };
                if let Err(e) = result {
                    tracing::warn!(
                        faultline.event = "delivery_failed",
                        event_id = %event.event_id,
                        error = %e,
                        "Wrapped sink rejected queued event"
                    );
                    if let Some(on_failure) = &on_failure {
                        on_failure(&e);
                    }
                }
            }
            None => {
                if shutdown.is_cancelled() {
                    break;
                }
                tokio::select! {
                    _ = queue.wake.notified() => {}
                    _ = shutdown.cancelled() => {}
                }
            }
        }
    }
}
