//! Resolved rules ordered by event type specificity
//!
//! Each configured rule becomes one immutable [`RuleInfo`]: its event mapping
//! is looked up, firing policy merged over the referenced profile, provider
//! and custom evaluator resolved. The finished list is sorted so rules bound
//! to general event types come first and rules bound to derived types last;
//! matching walks it backwards so the most specific rules are found first.

use crate::config::{
    DEFAULT_MAX_LIMIT, DEFAULT_MIN_INSTANCES, DEFAULT_MIN_INTERVAL, HealthMonitoringConfig,
    IntOrInfinite, Interval, ProfileSettings, RuleSettings, element_path,
};
use crate::error::{ConfigLocation, HealthError, HealthResult};
use crate::evaluator::{CustomEvaluator, EvaluatorInstances, EvaluatorTypeRegistry};
use crate::provider::{EventProvider, ProviderRegistry};
use healthmon_types::{EventTaxonomy, EventTypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// A rule with every reference resolved
#[derive(Clone)]
pub struct RuleInfo {
    /// Position in the sorted rule list; also indexes the throttle arena
    pub index: usize,
    pub name: String,
    pub event_name: String,
    pub event_type: EventTypeId,
    pub event_type_name: String,
    /// Distance of `event_type` from the taxonomy root
    pub specificity: u32,
    pub start_event_code: i32,
    pub end_event_code: i32,
    pub min_instances: i32,
    pub max_limit: IntOrInfinite,
    pub min_interval: Interval,
    pub provider_name: Option<String>,
    pub provider: Option<Arc<dyn EventProvider>>,
    pub custom_evaluator_type: Option<String>,
    pub custom_evaluator: Option<Arc<dyn CustomEvaluator>>,
}

impl RuleInfo {
    /// True when `event_type` is the rule's mapped type or derives from it
    /// and `event_code` lies in the mapped range
    pub fn matches(&self, taxonomy: &EventTaxonomy, event_type: EventTypeId, event_code: i32) -> bool {
        taxonomy.is_assignable(event_type, self.event_type)
            && self.start_event_code <= event_code
            && event_code <= self.end_event_code
    }

    /// Whether both rules dispatch to the same provider instance
    pub fn shares_provider_with(&self, other: &RuleInfo) -> bool {
        match (&self.provider, &other.provider) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_test(name: &str, event_type: EventTypeId) -> Self {
        Self {
            index: 0,
            name: name.to_string(),
            event_name: name.to_string(),
            event_type,
            event_type_name: String::new(),
            specificity: 0,
            start_event_code: 0,
            end_event_code: crate::config::INFINITE,
            min_instances: DEFAULT_MIN_INSTANCES,
            max_limit: DEFAULT_MAX_LIMIT,
            min_interval: DEFAULT_MIN_INTERVAL,
            provider_name: None,
            provider: None,
            custom_evaluator_type: None,
            custom_evaluator: None,
        }
    }
}

impl fmt::Debug for RuleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleInfo")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("event_name", &self.event_name)
            .field("event_type", &self.event_type_name)
            .field("codes", &(self.start_event_code..=self.end_event_code))
            .field("min_instances", &self.min_instances)
            .field("max_limit", &self.max_limit)
            .field("min_interval", &self.min_interval)
            .field("provider", &self.provider_name)
            .field("custom", &self.custom_evaluator_type)
            .finish()
    }
}

/// Rule value if set, else the profile's, else the element default
fn merge<T>(rule: Option<T>, profile: Option<T>, default: T) -> T {
    rule.or(profile).unwrap_or(default)
}

/// The sorted, immutable rule list of one configuration snapshot
pub struct RuleIndex {
    taxonomy: Arc<EventTaxonomy>,
    rules: Vec<Arc<RuleInfo>>,
    providers: HashMap<String, Arc<dyn EventProvider>>,
}

impl RuleIndex {
    /// Resolve every configured rule.
    ///
    /// Providers are initialized as rules first reference them; afterwards
    /// the registry drops the providers no rule uses.
    #[instrument(skip_all, fields(rules = config.rules.len()))]
    pub fn build(
        config: &HealthMonitoringConfig,
        taxonomy: Arc<EventTaxonomy>,
        providers: &mut ProviderRegistry,
        evaluator_types: &EvaluatorTypeRegistry,
    ) -> HealthResult<Self> {
        let mut evaluators = EvaluatorInstances::default();
        let mut rules = Vec::with_capacity(config.rules.len());

        for settings in &config.rules {
            match Self::resolve_rule(settings, config, &taxonomy, providers, evaluator_types, &mut evaluators) {
                Ok(rule) => rules.push(rule),
                Err(err) => {
                    // Nothing will own the providers started so far
                    for (name, provider) in providers.live_providers() {
                        debug!(provider = %name, "Shutting down provider of rejected configuration");
                        provider.shutdown();
                    }
                    return Err(err);
                }
            }
        }

        // Stable: rules of equal specificity keep configuration order
        rules.sort_by_key(|rule: &RuleInfo| rule.specificity);

        let rules: Vec<Arc<RuleInfo>> = rules
            .into_iter()
            .enumerate()
            .map(|(index, mut rule)| {
                rule.index = index;
                Arc::new(rule)
            })
            .collect();

        let purged = providers.purge_uninitialized();
        let providers = providers.live_providers();

        info!(
            rules = rules.len(),
            providers = providers.len(),
            unused_providers = purged,
            evaluators = evaluators.len(),
            "Built rule index"
        );

        Ok(Self { taxonomy, rules, providers })
    }

    fn resolve_rule(
        settings: &RuleSettings,
        config: &HealthMonitoringConfig,
        taxonomy: &EventTaxonomy,
        providers: &mut ProviderRegistry,
        evaluator_types: &EvaluatorTypeRegistry,
        evaluators: &mut EvaluatorInstances,
    ) -> HealthResult<RuleInfo> {
        let element = element_path("rules", &settings.name);

        let mapping = config.event_mapping(&settings.event_name).ok_or_else(|| {
            HealthError::configuration(
                ConfigLocation::attribute(&element, "eventName"),
                format!(
                    "rule '{}' references unknown event mapping '{}'",
                    settings.name, settings.event_name
                ),
            )
        })?;
        let mapping_element = element_path("eventMappings", &mapping.name);
        let event_type = taxonomy.resolve(&mapping.event_type).ok_or_else(|| {
            HealthError::configuration(
                ConfigLocation::attribute(mapping_element, "type"),
                format!("event type '{}' is not registered", mapping.event_type),
            )
        })?;

        let profile: Option<&ProfileSettings> = match &settings.profile {
            Some(name) => Some(config.profile(name).ok_or_else(|| {
                HealthError::configuration(
                    ConfigLocation::attribute(&element, "profile"),
                    format!("rule '{}' references unknown profile '{name}'", settings.name),
                )
            })?),
            None => None,
        };

        let min_instances =
            merge(settings.min_instances, profile.map(|p| p.min_instances), DEFAULT_MIN_INSTANCES);
        let max_limit = merge(settings.max_limit, profile.map(|p| p.max_limit), DEFAULT_MAX_LIMIT);
        let min_interval =
            merge(settings.min_interval, profile.map(|p| p.min_interval), DEFAULT_MIN_INTERVAL);

        let (custom_evaluator_type, custom_location) = match (&settings.custom, profile) {
            (Some(custom), _) => (Some(custom.clone()), ConfigLocation::attribute(&element, "custom")),
            (None, Some(profile)) => (
                profile.custom.clone(),
                ConfigLocation::attribute(element_path("profiles", &profile.name), "custom"),
            ),
            (None, None) => (None, ConfigLocation::attribute(&element, "custom")),
        };
        let custom_evaluator = match &custom_evaluator_type {
            Some(type_name) => Some(evaluators.resolve(evaluator_types, type_name, &custom_location)?),
            None => None,
        };

        let provider = match &settings.provider {
            Some(name) => {
                if !providers.contains(name) {
                    return Err(HealthError::configuration(
                        ConfigLocation::attribute(&element, "provider"),
                        format!("rule '{}' references unknown provider '{name}'", settings.name),
                    ));
                }
                Some(providers.get(name)?)
            }
            None => None,
        };

        debug!(
            rule = %settings.name,
            event_type = %mapping.event_type,
            min_instances,
            max_limit = %max_limit,
            min_interval = %min_interval,
            provider = settings.provider.as_deref().unwrap_or("<none>"),
            "Resolved rule"
        );

        Ok(RuleInfo {
            index: 0,
            name: settings.name.clone(),
            event_name: settings.event_name.clone(),
            event_type,
            event_type_name: mapping.event_type.trim().to_string(),
            specificity: taxonomy.depth(event_type),
            start_event_code: mapping.start_event_code,
            end_event_code: mapping.end_event_code.to_i32(),
            min_instances,
            max_limit,
            min_interval,
            provider_name: settings.provider.clone(),
            provider,
            custom_evaluator_type,
            custom_evaluator,
        })
    }

    /// Rules in ascending specificity
    pub fn rules(&self) -> &[Arc<RuleInfo>] {
        &self.rules
    }

    pub fn rule(&self, name: &str) -> Option<&Arc<RuleInfo>> {
        self.rules.iter().find(|rule| rule.name == name)
    }

    pub fn taxonomy(&self) -> &Arc<EventTaxonomy> {
        &self.taxonomy
    }

    /// Providers referenced by at least one rule
    pub fn providers(&self) -> &HashMap<String, Arc<dyn EventProvider>> {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl fmt::Debug for RuleIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleIndex")
            .field("rules", &self.rules)
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EventMappingSettings, ProviderSettings};
    use crate::provider::{MEMORY_PROVIDER_TYPE, ProviderParameters, ProviderTypeRegistry};
    use healthmon_types::BuiltinEventType;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn build(config: &HealthMonitoringConfig) -> HealthResult<RuleIndex> {
        let mut providers = ProviderRegistry::new(ProviderTypeRegistry::new(), &config.providers);
        RuleIndex::build(config, Arc::new(EventTaxonomy::new()), &mut providers, &EvaluatorTypeRegistry::new())
    }

    fn config() -> HealthMonitoringConfig {
        HealthMonitoringConfig {
            event_mappings: vec![
                EventMappingSettings::new("All Events", "WebBaseEvent"),
                EventMappingSettings::new("Errors", "WebBaseErrorEvent").with_codes(100, 199),
                EventMappingSettings::new("Request Errors", "WebRequestErrorEvent"),
            ],
            providers: vec![
                ProviderSettings::new("Log", MEMORY_PROVIDER_TYPE),
                ProviderSettings::new("Unused", MEMORY_PROVIDER_TYPE),
            ],
            profiles: vec![ProfileSettings::new("Slow")
                .with_min_instances(2)
                .with_max_limit(10)
                .with_min_interval(Interval::from_secs(60))],
            rules: vec![
                RuleSettings::new("Requests", "Request Errors").with_provider("Log"),
                RuleSettings::new("Everything", "All Events"),
                RuleSettings::new("Errors", "Errors")
                    .with_provider("Log")
                    .with_profile("Slow")
                    .with_min_interval(Interval::from_secs(5)),
            ],
            ..HealthMonitoringConfig::default()
        }
    }

    #[test]
    fn rules_sort_by_specificity() {
        let index = build(&config()).unwrap();
        let names: Vec<&str> = index.rules().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Everything", "Errors", "Requests"]);
        for (position, rule) in index.rules().iter().enumerate() {
            assert_eq!(rule.index, position);
        }
    }

    #[test]
    fn rule_overrides_win_over_profile() {
        let index = build(&config()).unwrap();
        let errors = index.rule("Errors").unwrap();
        assert_eq!(errors.min_interval, Interval::from_secs(5));
        assert_eq!(errors.min_instances, 2);
        assert_eq!(errors.max_limit, IntOrInfinite(10));

        let everything = index.rule("Everything").unwrap();
        assert_eq!(everything.min_instances, DEFAULT_MIN_INSTANCES);
        assert!(everything.max_limit.is_infinite());
        assert!(everything.min_interval.is_zero());
        assert!(everything.provider.is_none());
    }

    #[test]
    fn unused_providers_are_purged() {
        let index = build(&config()).unwrap();
        assert!(index.providers().contains_key("Log"));
        assert!(!index.providers().contains_key("Unused"));

        let requests = index.rule("Requests").unwrap();
        let errors = index.rule("Errors").unwrap();
        assert!(requests.shares_provider_with(errors));
    }

    #[test]
    fn matching_checks_type_and_code_range() {
        let index = build(&config()).unwrap();
        let taxonomy = index.taxonomy();
        let errors = index.rule("Errors").unwrap();
        let request_error = BuiltinEventType::WebRequestErrorEvent.id();

        assert!(errors.matches(taxonomy, request_error, 150));
        assert!(!errors.matches(taxonomy, request_error, 99));
        assert!(!errors.matches(taxonomy, request_error, 200));
        assert!(!errors.matches(taxonomy, BuiltinEventType::WebAuditEvent.id(), 150));
    }

    #[test]
    fn unknown_event_mapping_names_the_rule() {
        let mut config = config();
        config.rules.push(RuleSettings::new("Broken", "Nope"));
        let err = build(&config).unwrap_err();
        let location = err.location().unwrap();
        assert_eq!(location.element, "rules[\"Broken\"]");
        assert_eq!(location.attribute.as_deref(), Some("eventName"));
    }

    struct Tracked {
        name: String,
        shut_down: Arc<AtomicBool>,
    }

    impl EventProvider for Tracked {
        fn name(&self) -> &str {
            &self.name
        }

        fn initialize(&mut self, name: &str, _parameters: &ProviderParameters) -> anyhow::Result<()> {
            self.name = name.to_string();
            Ok(())
        }

        fn process_event(&self, _event: &healthmon_types::WebEvent) -> anyhow::Result<()> {
            Ok(())
        }

        fn shutdown(&self) {
            self.shut_down.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn failed_build_shuts_down_started_providers() {
        let shut_down = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shut_down);
        let mut types = ProviderTypeRegistry::new();
        types.register("Tracked", move || {
            Box::new(Tracked { name: String::new(), shut_down: Arc::clone(&flag) })
        });

        let mut config = config();
        config.providers.push(ProviderSettings::new("Audit", "Tracked"));
        config.rules.insert(0, RuleSettings::new("Audited", "All Events").with_provider("Audit"));
        config.rules.push(RuleSettings::new("Broken", "Nope"));

        let mut providers = ProviderRegistry::new(types, &config.providers);
        let result = RuleIndex::build(
            &config,
            Arc::new(EventTaxonomy::new()),
            &mut providers,
            &EvaluatorTypeRegistry::new(),
        );

        assert!(result.is_err());
        assert!(shut_down.load(Ordering::SeqCst));
    }
}
