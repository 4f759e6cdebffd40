//! Custom firing evaluators
//!
//! A profile or rule may name a custom evaluator type in its `custom`
//! attribute. Before the built-in throttle checks run, the evaluator is asked
//! whether the rule may fire for the event at hand.

use crate::error::{ConfigLocation, HealthError, HealthResult, panic_message};
use crate::throttle::RuleThrottleState;
use healthmon_types::WebEvent;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::debug;

/// Application hook deciding whether a matched rule fires
pub trait CustomEvaluator: Send + Sync {
    /// `state` reflects the current raise; `times_raised` already counts it.
    /// An error is logged and treated as "do not fire".
    fn can_fire(&self, event: &WebEvent, state: &RuleThrottleState) -> anyhow::Result<bool>;
}

impl<F> CustomEvaluator for F
where
    F: Fn(&WebEvent, &RuleThrottleState) -> anyhow::Result<bool> + Send + Sync,
{
    fn can_fire(&self, event: &WebEvent, state: &RuleThrottleState) -> anyhow::Result<bool> {
        self(event, state)
    }
}

/// Constructor for an evaluator type
pub type EvaluatorConstructor = Arc<dyn Fn() -> Arc<dyn CustomEvaluator> + Send + Sync>;

/// Evaluator types known by configuration name
#[derive(Clone, Default)]
pub struct EvaluatorTypeRegistry {
    types: HashMap<String, EvaluatorConstructor>,
}

impl EvaluatorTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, type_name: impl Into<String>, constructor: F)
    where
        F: Fn() -> Arc<dyn CustomEvaluator> + Send + Sync + 'static,
    {
        self.types.insert(type_name.into(), Arc::new(constructor));
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name.trim())
    }

    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.keys().cloned().collect();
        names.sort();
        names
    }

    /// Construct an instance of `type_name`.
    ///
    /// `location` is the `custom` attribute that named the type; both an
    /// unknown type and a panicking constructor are reported there.
    pub(crate) fn construct(
        &self,
        type_name: &str,
        location: &ConfigLocation,
    ) -> HealthResult<Arc<dyn CustomEvaluator>> {
        let constructor = self.types.get(type_name.trim()).ok_or_else(|| {
            HealthError::configuration(
                location.clone(),
                format!("unknown custom evaluator type '{type_name}'"),
            )
        })?;

        let evaluator = panic::catch_unwind(AssertUnwindSafe(|| constructor())).map_err(|payload| {
            HealthError::configuration_caused_by(
                location.clone(),
                format!("custom evaluator '{type_name}' could not be constructed"),
                anyhow::anyhow!(panic_message(payload.as_ref())),
            )
        })?;

        debug!(evaluator = %type_name, "Constructed custom evaluator");
        Ok(evaluator)
    }
}

impl fmt::Debug for EvaluatorTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluatorTypeRegistry").field("types", &self.type_names()).finish()
    }
}

/// One shared instance per distinct evaluator type
#[derive(Default)]
pub(crate) struct EvaluatorInstances {
    instances: HashMap<String, Arc<dyn CustomEvaluator>>,
}

impl EvaluatorInstances {
    pub(crate) fn resolve(
        &mut self,
        registry: &EvaluatorTypeRegistry,
        type_name: &str,
        location: &ConfigLocation,
    ) -> HealthResult<Arc<dyn CustomEvaluator>> {
        let key = type_name.trim();
        if let Some(existing) = self.instances.get(key) {
            return Ok(Arc::clone(existing));
        }
        let evaluator = registry.construct(key, location)?;
        self.instances.insert(key.to_string(), Arc::clone(&evaluator));
        Ok(evaluator)
    }

    pub(crate) fn len(&self) -> usize {
        self.instances.len()
    }
}
