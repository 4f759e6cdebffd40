//! Lazily-instantiated provider instances

use super::guarded::GuardedProvider;
use super::{EventProvider, ProviderParameters, ProviderTrust, ProviderTypeRegistry};
use crate::config::{ProviderSettings, element_path};
use crate::error::{ConfigLocation, HealthError, HealthResult, panic_message};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, info_span};

enum ProviderSlot {
    /// Configured but never requested
    Settings(ProviderSettings),
    /// Constructed and initialized
    Live(Arc<dyn EventProvider>),
}

/// Configured providers keyed by name.
///
/// Each slot starts out holding the raw settings and is replaced in place by
/// the live instance the first time [`ProviderRegistry::get`] asks for it.
/// Only touched while a monitor is being built, so no locking is needed.
pub struct ProviderRegistry {
    types: ProviderTypeRegistry,
    slots: HashMap<String, ProviderSlot>,
}

impl ProviderRegistry {
    pub fn new(types: ProviderTypeRegistry, settings: &[ProviderSettings]) -> Self {
        let slots = settings
            .iter()
            .map(|s| (s.name.clone(), ProviderSlot::Settings(s.clone())))
            .collect();
        Self { types, slots }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Live instance for `name`, constructing and initializing it on first use
    pub fn get(&mut self, name: &str) -> HealthResult<Arc<dyn EventProvider>> {
        let settings = match self.slots.get(name) {
            Some(ProviderSlot::Live(provider)) => return Ok(Arc::clone(provider)),
            Some(ProviderSlot::Settings(settings)) => settings.clone(),
            None => {
                return Err(HealthError::configuration(
                    ConfigLocation::element(element_path("providers", name)),
                    format!("provider '{name}' is not configured"),
                ));
            }
        };

        let provider = self.instantiate(&settings)?;
        self.slots.insert(name.to_string(), ProviderSlot::Live(Arc::clone(&provider)));
        Ok(provider)
    }

    fn instantiate(&self, settings: &ProviderSettings) -> HealthResult<Arc<dyn EventProvider>> {
        let location =
            ConfigLocation::attribute(element_path("providers", &settings.name), "type");

        let provider_type = self.types.get(&settings.provider_type).ok_or_else(|| {
            HealthError::configuration(
                location.clone(),
                format!("unknown provider type '{}'", settings.provider_type),
            )
        })?;

        let span = info_span!(
            "provider_init",
            provider = %settings.name,
            provider_type = %settings.provider_type,
            trust = ?provider_type.trust
        );
        let _entered = span.enter();

        let parameters: ProviderParameters = settings.string_parameters();
        let constructor = Arc::clone(&provider_type.constructor);
        let name = settings.name.clone();

        let initialized = match provider_type.trust {
            ProviderTrust::Trusted => {
                let mut provider = constructor();
                provider.initialize(&name, &parameters).map(|_| provider)
            }
            ProviderTrust::Untrusted => {
                match panic::catch_unwind(AssertUnwindSafe(|| constructor())) {
                    Ok(provider) => {
                        let mut guarded: Box<dyn EventProvider> = Box::new(GuardedProvider::new(provider));
                        guarded.initialize(&name, &parameters).map(|_| guarded)
                    }
                    Err(payload) => Err(anyhow::anyhow!(
                        "provider panicked during construction: {}",
                        panic_message(payload.as_ref())
                    )),
                }
            }
        };

        let provider = initialized.map_err(|cause| {
            HealthError::configuration_caused_by(
                location,
                format!("provider '{}' failed to initialize", settings.name),
                cause,
            )
        })?;

        info!("Initialized event provider");
        Ok(Arc::from(provider))
    }

    /// Drop every provider that was configured but never requested
    pub fn purge_uninitialized(&mut self) -> usize {
        let before = self.slots.len();
        self.slots.retain(|name, slot| {
            let keep = matches!(slot, ProviderSlot::Live(_));
            if !keep {
                debug!(provider = %name, "Dropping unused provider");
            }
            keep
        });
        before - self.slots.len()
    }

    /// Live instances by name
    pub fn live_providers(&self) -> HashMap<String, Arc<dyn EventProvider>> {
        self.slots
            .iter()
            .filter_map(|(name, slot)| match slot {
                ProviderSlot::Live(provider) => Some((name.clone(), Arc::clone(provider))),
                ProviderSlot::Settings(_) => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
