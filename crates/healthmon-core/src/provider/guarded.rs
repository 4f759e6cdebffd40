//! Panic isolation for application-registered providers

use super::{EventProvider, ProviderParameters};
use crate::error::panic_message;
use healthmon_types::WebEvent;
use std::panic::{self, AssertUnwindSafe};
use tracing::error;

/// Wraps an untrusted provider so a panic in any of its hooks is contained.
///
/// A panicking `process_event` becomes an ordinary delivery error, which the
/// monitor hands to `log_exception` like any other failure.
pub(crate) struct GuardedProvider {
    inner: Box<dyn EventProvider>,
}

impl GuardedProvider {
    pub(crate) fn new(inner: Box<dyn EventProvider>) -> Self {
        Self { inner }
    }

    fn contain(&self, hook: &str, f: impl FnOnce()) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
            error!(
                provider = %self.inner.name(),
                hook,
                panic = %panic_message(payload.as_ref()),
                "Event provider panicked"
            );
        }
    }
}

impl EventProvider for GuardedProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn initialize(&mut self, name: &str, parameters: &ProviderParameters) -> anyhow::Result<()> {
        let inner = &mut self.inner;
        panic::catch_unwind(AssertUnwindSafe(|| inner.initialize(name, parameters))).unwrap_or_else(
            |payload| {
                Err(anyhow::anyhow!(
                    "provider panicked during initialization: {}",
                    panic_message(payload.as_ref())
                ))
            },
        )
    }

    fn process_event(&self, event: &WebEvent) -> anyhow::Result<()> {
        panic::catch_unwind(AssertUnwindSafe(|| self.inner.process_event(event))).unwrap_or_else(
            |payload| {
                Err(anyhow::anyhow!(
                    "provider panicked while processing event {}: {}",
                    event.event_code,
                    panic_message(payload.as_ref())
                ))
            },
        )
    }

    fn flush(&self) {
        self.contain("flush", || self.inner.flush());
    }

    fn shutdown(&self) {
        self.contain("shutdown", || self.inner.shutdown());
    }

    fn log_exception(&self, error: &anyhow::Error) {
        self.contain("log_exception", || self.inner.log_exception(error));
    }
}
