//! Owner of the current monitor across configuration reloads

use crate::config::HealthMonitoringConfig;
use crate::error::HealthResult;
use crate::evaluator::EvaluatorTypeRegistry;
use crate::monitor::HealthMonitor;
use crate::provider::ProviderTypeRegistry;
use healthmon_types::EventTaxonomy;
use std::sync::{Arc, RwLock};
use tracing::{error, info, instrument, warn};

/// Holds the active [`HealthMonitor`].
///
/// A reload builds a complete new monitor from the snapshot. If that fails
/// the previous monitor stays active and the error is returned.
pub struct HealthMonitorHost {
    taxonomy: Arc<EventTaxonomy>,
    provider_types: ProviderTypeRegistry,
    evaluator_types: EvaluatorTypeRegistry,
    current: RwLock<Option<Arc<HealthMonitor>>>,
}

impl HealthMonitorHost {
    pub fn new(
        taxonomy: Arc<EventTaxonomy>,
        provider_types: ProviderTypeRegistry,
        evaluator_types: EvaluatorTypeRegistry,
    ) -> Self {
        Self { taxonomy, provider_types, evaluator_types, current: RwLock::new(None) }
    }

    /// The active monitor, if any snapshot has loaded successfully
    pub fn current(&self) -> Option<Arc<HealthMonitor>> {
        self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    /// Load the configuration file named by the environment and apply it
    pub fn load(&self) -> HealthResult<Arc<HealthMonitor>> {
        let config = HealthMonitoringConfig::load()?;
        self.reload(&config)
    }

    /// Replace the active monitor with one built from `config`.
    ///
    /// The replaced monitor is shut down. On failure the active monitor is
    /// left untouched.
    #[instrument(skip_all)]
    pub fn reload(&self, config: &HealthMonitoringConfig) -> HealthResult<Arc<HealthMonitor>> {
        let built = HealthMonitor::from_config(
            config,
            Arc::clone(&self.taxonomy),
            self.provider_types.clone(),
            &self.evaluator_types,
        );

        let monitor = match built {
            Ok(monitor) => monitor,
            Err(err) => {
                if self.current().is_some() {
                    warn!(error = %err, "Configuration rejected; keeping last known good health monitor");
                } else {
                    error!(error = %err, "Configuration rejected; health monitoring unavailable");
                }
                return Err(err);
            }
        };

        let previous = {
            let mut current = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            current.replace(Arc::clone(&monitor))
        };
        if let Some(previous) = previous {
            previous.shutdown();
        }

        info!("Health monitor configuration applied");
        Ok(monitor)
    }

    /// Shut the active monitor down and forget it
    pub fn shutdown(&self) {
        let previous = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner()).take();
        if let Some(previous) = previous {
            previous.shutdown();
        }
    }
}
