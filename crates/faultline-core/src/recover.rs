//! Panic capture for code running outside an instrumented agent loop

use crate::collector::Collector;
use crate::context::current_context_id;
use crate::event::{ErrorEvent, Severity};
use futures::FutureExt;
use std::any::Any;
use std::backtrace::Backtrace;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// A panic caught by [`catch_panic`] or [`catch_panic_sync`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("panic: {message}")]
pub struct PanicError {
    pub message: String,
}

/// Render a panic payload as text
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

/// Build the crash event for a panic payload.
///
/// Carries the ambient context id when called inside a
/// [`with_context_id`](crate::context::with_context_id) scope.
pub fn panic_event(payload: &(dyn Any + Send)) -> ErrorEvent {
    let mut event = ErrorEvent::new(Severity::Crash, "panic", panic_message(payload))
        .with_stack_trace(Backtrace::force_capture().to_string());
    event.context_id = current_context_id();
    event
}

/// Run `future`, recording a crash event if it panics.
///
/// The panic is not resumed: the caller gets a [`PanicError`] instead.
/// Failures to record are logged and otherwise ignored so the caller's
/// control flow never depends on the telemetry pipeline.
pub async fn catch_panic<F, T>(collector: &Collector, future: F) -> Result<T, PanicError>
where
    F: Future<Output = T>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(value) => Ok(value),
        Err(payload) => {
            let event = panic_event(payload.as_ref());
            Err(record_panic(collector, event).await)
        }
    }
}

/// Synchronous variant of [`catch_panic`] for closures.
pub async fn catch_panic_sync<F, T>(collector: &Collector, f: F) -> Result<T, PanicError>
where
    F: FnOnce() -> T,
{
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Ok(value),
        Err(payload) => {
            let event = panic_event(payload.as_ref());
            Err(record_panic(collector, event).await)
        }
    }
}

async fn record_panic(collector: &Collector, event: ErrorEvent) -> PanicError {
    let message = event.message.clone();

    if let Err(e) = collector.record(event).await {
        tracing::warn!(
            faultline.event = "panic_record_failed",
            error = %e,
            "Failed to record recovered panic"
        );
    }

    PanicError { message }
}
