//! The health monitor: raising events and dispatching them to providers
//!
//! A [`HealthMonitor`] owns everything built from one configuration
//! snapshot: the sorted rule index, the dispatch cache, the throttle state
//! of every rule and the live providers. It is created explicitly and
//! shared by reference; nothing lives in global state apart from the
//! per-thread guard that stops providers from raising events recursively.

use crate::config::{HealthMonitoringConfig, Interval};
use crate::dispatch_cache::{DispatchCacheStats, EventDispatchCache, FiringRules};
use crate::error::{HealthError, HealthResult, ResultExt};
use crate::evaluator::EvaluatorTypeRegistry;
use crate::heartbeat::Heartbeat;
use crate::provider::{EventProvider, ProviderRegistry, ProviderTypeRegistry};
use crate::rule_index::RuleIndex;
use crate::throttle::{RuleThrottleState, ThrottleArena};
use ahash::RandomState;
use dashmap::DashMap;
use healthmon_types::codes::{self, APPLICATION_HEARTBEAT, WEB_EXTENDED_BASE};
use healthmon_types::{EventTaxonomy, EventTypeId, WebEvent};
use serde::Serialize;
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info, instrument, trace};

thread_local! {
    static RAISING: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as dispatching for as long as it lives
struct RaiseGuard;

impl RaiseGuard {
    fn enter() -> Option<Self> {
        RAISING.with(|raising| {
            if raising.get() {
                None
            } else {
                raising.set(true);
                Some(RaiseGuard)
            }
        })
    }
}

impl Drop for RaiseGuard {
    fn drop(&mut self) {
        RAISING.with(|raising| raising.set(false));
    }
}

/// Why a raise was not dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// Health monitoring is switched off in configuration
    Disabled,
    /// The monitor has been shut down
    ShutDown,
    /// Raised from inside a provider on the same thread
    Reentrant,
    /// System code with no built-in event type
    UnknownSystemCode,
}

/// What happened to one raised event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub skipped: Option<SkipReason>,
    /// Sequence number assigned to the event; zero when skipped
    pub sequence: u64,
    pub matched_rules: usize,
    /// Matched rules that passed their throttle
    pub fired_rules: usize,
    pub providers_invoked: usize,
    pub provider_failures: usize,
}

impl DispatchOutcome {
    fn skipped(reason: SkipReason) -> Self {
        Self { skipped: Some(reason), ..Self::default() }
    }
}

/// Rule matching and dispatch for one configuration snapshot
pub struct HealthMonitor {
    enabled: bool,
    heartbeat_interval: Interval,
    cache: EventDispatchCache,
    throttle: ThrottleArena,
    providers: HashMap<String, Arc<dyn EventProvider>>,
    sequence: AtomicU64,
    occurrences: DashMap<i32, AtomicU64, RandomState>,
    shut_down: AtomicBool,
    heartbeat: Mutex<Option<Heartbeat>>,
}

impl HealthMonitor {
    /// Validate `config`, build the rule index and start the heartbeat.
    ///
    /// Configuration errors carry the file and line of the offending
    /// element when the snapshot was loaded from a file.
    #[instrument(skip_all, fields(enabled = config.enabled))]
    pub fn from_config(
        config: &HealthMonitoringConfig,
        taxonomy: Arc<EventTaxonomy>,
        provider_types: ProviderTypeRegistry,
        evaluator_types: &EvaluatorTypeRegistry,
    ) -> HealthResult<Arc<Self>> {
        config.validate(&taxonomy, &provider_types, evaluator_types)?;

        let mut providers = ProviderRegistry::new(provider_types, &config.providers);
        let index = RuleIndex::build(config, taxonomy, &mut providers, evaluator_types)
            .with_file_context(config.source.file.as_ref(), |loc| config.source.source_map.line_of(loc))?;

        let monitor = Arc::new(Self::from_index(Arc::new(index), config.enabled, config.heartbeat_interval));

        if monitor.enabled && !monitor.heartbeat_interval.is_zero() {
            let weak = Arc::downgrade(&monitor);
            let heartbeat = Heartbeat::start(monitor.heartbeat_interval.to_duration(), move || {
                beat(&weak)
            });
            match heartbeat {
                Ok(heartbeat) => *monitor.lock_heartbeat() = Some(heartbeat),
                Err(err) => {
                    monitor.shutdown();
                    return Err(err);
                }
            }
        }

        info!(
            enabled = monitor.enabled,
            rules = monitor.cache.index().len(),
            providers = monitor.providers.len(),
            heartbeat = %monitor.heartbeat_interval,
            "Health monitor ready"
        );
        Ok(monitor)
    }

    /// Monitor over an already built rule index, without a heartbeat
    pub fn from_index(index: Arc<RuleIndex>, enabled: bool, heartbeat_interval: Interval) -> Self {
        let providers = index.providers().clone();
        let throttle = ThrottleArena::with_len(index.len());
        Self {
            enabled,
            heartbeat_interval,
            cache: EventDispatchCache::new(index),
            throttle,
            providers,
            sequence: AtomicU64::new(0),
            occurrences: DashMap::with_hasher(RandomState::new()),
            shut_down: AtomicBool::new(false),
            heartbeat: Mutex::new(None),
        }
    }

    fn lock_heartbeat(&self) -> std::sync::MutexGuard<'_, Option<Heartbeat>> {
        self.heartbeat.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    pub fn heartbeat_interval(&self) -> Interval {
        self.heartbeat_interval
    }

    pub fn rule_index(&self) -> &Arc<RuleIndex> {
        self.cache.index()
    }

    pub fn taxonomy(&self) -> &Arc<EventTaxonomy> {
        self.cache.index().taxonomy()
    }

    /// Live provider by name
    pub fn provider(&self, name: &str) -> Option<&Arc<dyn EventProvider>> {
        self.providers.get(name)
    }

    /// Throttle state of the rule at `index` in the sorted rule list
    pub fn throttle_state(&self, index: usize) -> Option<&RuleThrottleState> {
        self.throttle.get(index)
    }

    pub fn find_firing_rules(&self, event_type: EventTypeId, event_code: i32) -> FiringRules {
        self.cache.find_firing_rules(event_type, event_code)
    }

    pub fn cache_stats(&self) -> DispatchCacheStats {
        self.cache.stats()
    }

    /// Raise an application event.
    ///
    /// Codes below [`WEB_EXTENDED_BASE`] are reserved for the framework and
    /// rejected.
    pub fn raise(&self, event: WebEvent) -> HealthResult<DispatchOutcome> {
        if event.event_code < WEB_EXTENDED_BASE {
            return Err(HealthError::ReservedEventCode {
                event_code: event.event_code,
                minimum: WEB_EXTENDED_BASE,
            });
        }
        if !self.taxonomy().contains(event.event_type) {
            return Err(HealthError::UnknownEventType { event_type: event.event_type.to_string() });
        }
        Ok(self.dispatch(event))
    }

    /// Raise the built-in event for a system code. Codes without a built-in
    /// event type are ignored.
    pub fn raise_system_event(
        &self,
        event_code: i32,
        event_detail_code: i32,
        error: Option<&str>,
    ) -> DispatchOutcome {
        let Some(mut event) = WebEvent::system(event_code) else {
            debug!(event_code, "Ignoring system code with no event type");
            return DispatchOutcome::skipped(SkipReason::UnknownSystemCode);
        };
        event = event.with_detail_code(event_detail_code);
        if let Some(error) = error {
            event = event.with_error(error);
        }
        self.dispatch(event)
    }

    fn dispatch(&self, mut event: WebEvent) -> DispatchOutcome {
        if !self.enabled {
            return DispatchOutcome::skipped(SkipReason::Disabled);
        }
        if self.is_shut_down() {
            return DispatchOutcome::skipped(SkipReason::ShutDown);
        }
        let Some(_guard) = RaiseGuard::enter() else {
            trace!(event_code = event.event_code, "Ignoring event raised while dispatching");
            return DispatchOutcome::skipped(SkipReason::Reentrant);
        };

        event.sequence = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        event.occurrence = self
            .occurrences
            .entry(event.event_code)
            .or_default()
            .fetch_add(1, Ordering::AcqRel)
            + 1;

        let firing = self.cache.find_firing_rules(event.event_type, event.event_code);
        let mut outcome = DispatchOutcome {
            sequence: event.sequence,
            matched_rules: firing.len(),
            ..DispatchOutcome::default()
        };
        if firing.is_empty() {
            return outcome;
        }

        // One slot per result position; a provider group is keyed by its leader
        let mut provider_fired = vec![false; firing.len()];

        for info in firing.iter() {
            let Some(state) = self.throttle.get(info.rule.index) else { continue };
            if !state.check_and_update(&info.rule, &event) {
                continue;
            }
            outcome.fired_rules += 1;

            let Some(provider) = info.provider() else { continue };
            if let Some(leader) = info.index_of_first_rule_with_same_provider {
                if provider_fired[leader] {
                    continue;
                }
                provider_fired[leader] = true;
            }

            match provider.process_event(&event) {
                Ok(()) => outcome.providers_invoked += 1,
                Err(err) => {
                    outcome.provider_failures += 1;
                    provider.log_exception(&err);
                }
            }
        }

        debug!(
            event_code = event.event_code,
            sequence = event.sequence,
            matched = outcome.matched_rules,
            fired = outcome.fired_rules,
            invoked = outcome.providers_invoked,
            "Event dispatched"
        );
        outcome
    }

    /// Flush one provider
    pub fn flush(&self, provider_name: &str) -> HealthResult<()> {
        let provider = self
            .providers
            .get(provider_name)
            .ok_or_else(|| HealthError::ProviderNotFound { name: provider_name.to_string() })?;
        provider.flush();
        Ok(())
    }

    /// Flush every provider
    pub fn flush_all(&self) {
        for provider in self.providers.values() {
            provider.flush();
        }
    }

    /// Stop the heartbeat and shut every provider down. Later raises are
    /// dropped. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(mut heartbeat) = self.lock_heartbeat().take() {
            heartbeat.stop();
        }
        for provider in self.providers.values() {
            provider.shutdown();
        }
        info!(providers = self.providers.len(), "Health monitor shut down");
    }
}

fn beat(monitor: &Weak<HealthMonitor>) -> bool {
    match monitor.upgrade() {
        Some(monitor) if !monitor.is_shut_down() => {
            monitor.raise_system_event(APPLICATION_HEARTBEAT, codes::UNDEFINED_EVENT_DETAIL_CODE, None);
            true
        }
        _ => false,
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("enabled", &self.enabled)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("rules", &self.cache.index().len())
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
