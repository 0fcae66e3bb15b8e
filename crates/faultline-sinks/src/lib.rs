//! # Faultline Sinks
//!
//! Destinations and wrappers for [`faultline_core::Sink`]:
//!
//! - [`MultiSink`]: fan out to several sinks, aggregating failures
//! - [`AsyncSink`]: bounded drop-oldest queue in front of a slow sink
//! - [`ConsoleSink`]: human-readable or JSON-lines output for development

pub mod async_sink;
pub mod console;
pub mod multi;

pub use async_sink::{AsyncSink, AsyncSinkBuilder, DeliveryFailureCallback, DropCallback};
pub use console::ConsoleSink;
pub use multi::MultiSink;
