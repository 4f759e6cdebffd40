//! Shared fixtures for the integration tests

#![allow(dead_code)]

use healthmon_core::config::{EventMappingSettings, ProfileSettings, ProviderSettings, RuleSettings};
use healthmon_core::{
    BuiltinEventType, EvaluatorTypeRegistry, EventBuffer, EventTaxonomy, EventTypeId,
    HealthMonitor, HealthMonitoringConfig, HealthResult, MemoryEventProvider, ProviderTypeRegistry,
};
use std::sync::Arc;

/// Application type deriving from `WebBaseErrorEvent`
pub const CONCRETE_ERROR: &str = "ConcreteErrorEvent";
/// Application type deriving from `ConcreteErrorEvent`
pub const NESTED_ERROR: &str = "NestedErrorEvent";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Built-in taxonomy plus two application error types
pub fn taxonomy() -> Arc<EventTaxonomy> {
    let mut taxonomy = EventTaxonomy::new();
    let concrete = taxonomy
        .register(CONCRETE_ERROR, BuiltinEventType::WebBaseErrorEvent.id())
        .expect("register concrete error");
    taxonomy.register(NESTED_ERROR, concrete).expect("register nested error");
    Arc::new(taxonomy)
}

pub fn type_id(taxonomy: &EventTaxonomy, name: &str) -> EventTypeId {
    taxonomy.resolve(name).unwrap_or_else(|| panic!("event type {name} not registered"))
}

/// Provider types whose instances write into buffers the test can read
pub struct Recorders {
    pub types: ProviderTypeRegistry,
}

impl Recorders {
    pub fn new() -> Self {
        Self { types: ProviderTypeRegistry::new() }
    }

    /// Register `type_name` as a memory provider writing into the returned buffer
    pub fn add(&mut self, type_name: &str) -> Arc<EventBuffer> {
        let buffer = Arc::new(EventBuffer::default());
        let shared = Arc::clone(&buffer);
        self.types.register(type_name, move || {
            Box::new(MemoryEventProvider::with_buffer(Arc::clone(&shared)))
        });
        buffer
    }
}

pub fn monitor(
    config: &HealthMonitoringConfig,
    taxonomy: Arc<EventTaxonomy>,
    types: ProviderTypeRegistry,
) -> HealthResult<Arc<HealthMonitor>> {
    HealthMonitor::from_config(config, taxonomy, types, &EvaluatorTypeRegistry::new())
}

/// Mapping `Errors` → {WebBaseErrorEvent, 100..=199}, provider `Log`, rule `R1`
pub fn scenario_config(provider_type: &str) -> HealthMonitoringConfig {
    HealthMonitoringConfig {
        event_mappings: vec![EventMappingSettings::new("Errors", "WebBaseErrorEvent").with_codes(100, 199)],
        providers: vec![ProviderSettings::new("Log", provider_type)],
        rules: vec![RuleSettings::new("R1", "Errors").with_provider("Log")],
        ..HealthMonitoringConfig::default()
    }
}

/// Config routing custom error codes to two recording providers
pub fn custom_events_config(primary_type: &str, secondary_type: &str) -> HealthMonitoringConfig {
    HealthMonitoringConfig {
        event_mappings: vec![
            EventMappingSettings::new("All Events", "WebBaseEvent"),
            EventMappingSettings::new("Custom Errors", "WebBaseErrorEvent").with_codes(100_000, 199_999),
            EventMappingSettings::new("Concrete Errors", CONCRETE_ERROR),
        ],
        providers: vec![
            ProviderSettings::new("Primary", primary_type),
            ProviderSettings::new("Secondary", secondary_type),
        ],
        profiles: vec![ProfileSettings::new("Critical")],
        rules: vec![
            RuleSettings::new("Everything", "All Events").with_provider("Secondary"),
            RuleSettings::new("Custom", "Custom Errors").with_provider("Primary").with_profile("Critical"),
            RuleSettings::new("Concrete", "Concrete Errors").with_provider("Primary"),
        ],
        ..HealthMonitoringConfig::default()
    }
}
