//! Progress streaming (§4.8).
//!
//! The source pattern (a generator yielding intermediate values then a final
//! result) is re-architected per the DESIGN NOTES as a typed producer with a
//! single consumer, using a separate "final" slot rather than mixing
//! progress and result types: a [`GenerativeHandler`] (see
//! `crate::middleware`) calls [`ProgressSink::emit`] synchronously while it
//! works and returns the final result as its ordinary return value — there
//! is no generator or channel machinery to drain.

use serde_json::Value;
use std::sync::Arc;

/// An intermediate event emitted by a long-running handler before it
/// produces a final result.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub stage: String,
    pub percent: Option<f64>,
    pub message: Option<String>,
    pub data: Option<Value>,
}

impl ProgressEvent {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            percent: None,
            message: None,
            data: None,
        }
    }

    #[must_use]
    pub fn percent(mut self, percent: f64) -> Self {
        self.percent = Some(percent);
        self
    }

    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// The single consumer a handler forwards progress events to. Ordering is
/// strict FIFO as produced by the handler (§5) — `emit` is called
/// synchronously on the handler's own task, so no reordering is possible.
/// There is no back-pressure: an observer that cannot keep up must drop
/// events itself.
pub trait ProgressObserver: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

pub type ProgressSink = Arc<dyn ProgressObserver>;

/// An observer that discards every event. Used when a caller passes no
/// sink but a generative handler still wants an unconditional target.
pub struct NullObserver;

impl ProgressObserver for NullObserver {
    fn emit(&self, _event: ProgressEvent) {}
}
