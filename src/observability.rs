//! Observability hooks.
//!
//! A host that wants metrics or tracing spans beyond the kernel's own
//! `tracing` events implements [`KernelObserver`]; every method has a no-op
//! default so wiring one in is opt-in and costs nothing when absent.

use crate::error::KernelError;
use std::time::Duration;

pub trait KernelObserver: Send + Sync {
    fn on_dispatch_start(&self, _route: &str) {}

    fn on_dispatch_end(&self, _route: &str, _is_error: bool, _elapsed: Duration) {}

    fn on_middleware_error(&self, _route: &str, _error: &KernelError) {}
}

/// The default observer: observes nothing. `Kernel` holds
/// `Arc<dyn KernelObserver>` rather than `Option<Arc<dyn KernelObserver>>` so
/// the dispatch path never has to branch on presence.
pub struct NullKernelObserver;

impl KernelObserver for NullKernelObserver {}
