//! Event providers
//!
//! A provider is a named sink that receives dispatched events. Provider
//! types are registered in a [`ProviderTypeRegistry`] under the type name
//! used in configuration; the [`ProviderRegistry`] turns configured provider
//! settings into live, initialized instances on first use.

mod builtin;
mod guarded;
mod registry;

pub use builtin::{EventBuffer, MemoryEventProvider, TraceEventProvider};
pub use registry::ProviderRegistry;

use healthmon_types::WebEvent;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Configuration type name of [`TraceEventProvider`]
pub const TRACE_PROVIDER_TYPE: &str = "TraceEventProvider";
/// Configuration type name of [`MemoryEventProvider`]
pub const MEMORY_PROVIDER_TYPE: &str = "MemoryEventProvider";

/// String attributes handed to a provider on initialization
pub type ProviderParameters = BTreeMap<String, String>;

/// Sink for dispatched events
pub trait EventProvider: Send + Sync {
    /// Name the provider was configured under
    fn name(&self) -> &str;

    /// Called once, before the provider is shared, with the configured
    /// name and remaining attributes
    fn initialize(&mut self, name: &str, parameters: &ProviderParameters) -> anyhow::Result<()>;

    /// Deliver one event
    fn process_event(&self, event: &WebEvent) -> anyhow::Result<()>;

    /// Push out anything buffered
    fn flush(&self) {}

    /// Release resources; no events are delivered afterwards
    fn shutdown(&self) {}

    /// Report a failure raised by [`EventProvider::process_event`]
    fn log_exception(&self, error: &anyhow::Error) {
        warn!(provider = %self.name(), error = %error, "Event provider failed to process event");
    }
}

impl fmt::Debug for dyn EventProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventProvider").field("name", &self.name()).finish()
    }
}

/// Whether a provider type ships with the engine.
///
/// Untrusted (application-registered) providers run behind `catch_unwind`:
/// a panic while constructing or initializing surfaces as a configuration
/// error, and a panic while delivering is reported like any delivery error.
/// The built-in trusted types are called directly. Containment needs
/// `panic = "unwind"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderTrust {
    Trusted,
    Untrusted,
}

/// Constructor for a provider type
pub type ProviderConstructor = Arc<dyn Fn() -> Box<dyn EventProvider> + Send + Sync>;

#[derive(Clone)]
pub(crate) struct ProviderType {
    pub(crate) constructor: ProviderConstructor,
    pub(crate) trust: ProviderTrust,
}

/// Provider types known by configuration name
#[derive(Clone)]
pub struct ProviderTypeRegistry {
    types: HashMap<String, ProviderType>,
}

impl Default for ProviderTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderTypeRegistry {
    /// Registry holding the built-in provider types
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.insert(
            TRACE_PROVIDER_TYPE,
            Arc::new(|| Box::new(TraceEventProvider::default()) as Box<dyn EventProvider>),
            ProviderTrust::Trusted,
        );
        registry.insert(
            MEMORY_PROVIDER_TYPE,
            Arc::new(|| Box::new(MemoryEventProvider::default()) as Box<dyn EventProvider>),
            ProviderTrust::Trusted,
        );
        registry
    }

    /// Registry with no types at all
    pub fn empty() -> Self {
        Self { types: HashMap::new() }
    }

    /// Register an application provider type
    pub fn register<F>(&mut self, type_name: impl Into<String>, constructor: F)
    where
        F: Fn() -> Box<dyn EventProvider> + Send + Sync + 'static,
    {
        self.insert(type_name, Arc::new(constructor), ProviderTrust::Untrusted);
    }

    fn insert(
        &mut self,
        type_name: impl Into<String>,
        constructor: ProviderConstructor,
        trust: ProviderTrust,
    ) {
        self.types.insert(type_name.into(), ProviderType { constructor, trust });
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name.trim())
    }

    pub fn trust(&self, type_name: &str) -> Option<ProviderTrust> {
        self.types.get(type_name.trim()).map(|t| t.trust)
    }

    pub(crate) fn get(&self, type_name: &str) -> Option<&ProviderType> {
        self.types.get(type_name.trim())
    }

    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for ProviderTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderTypeRegistry").field("types", &self.type_names()).finish()
    }
}
