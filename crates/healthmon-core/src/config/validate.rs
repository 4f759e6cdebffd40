//! Load-time checks over a configuration snapshot
//!
//! Every check reports the first violation as a fatal configuration error
//! naming the element and attribute at fault.

use super::{
    EventMappingSettings, HealthMonitoringConfig, ProfileSettings, ProviderSettings, RuleSettings,
    element_path,
};
use crate::error::{ConfigLocation, HealthError, HealthResult, ResultExt};
use crate::evaluator::EvaluatorTypeRegistry;
use crate::provider::ProviderTypeRegistry;
use healthmon_types::EventTaxonomy;
use std::collections::HashSet;
use tracing::debug;

impl HealthMonitoringConfig {
    /// Run every load-time check, filling in file and line on failure
    pub fn validate(
        &self,
        taxonomy: &EventTaxonomy,
        providers: &ProviderTypeRegistry,
        evaluators: &EvaluatorTypeRegistry,
    ) -> HealthResult<()> {
        validate(self, taxonomy, providers, evaluators)
            .with_file_context(self.source.file.as_ref(), |loc| self.source.source_map.line_of(loc))
    }
}

/// Check a snapshot against the taxonomy and the registered provider and
/// evaluator types
pub fn validate(
    config: &HealthMonitoringConfig,
    taxonomy: &EventTaxonomy,
    providers: &ProviderTypeRegistry,
    evaluators: &EvaluatorTypeRegistry,
) -> HealthResult<()> {
    unique_names("eventMappings", config.event_mappings.iter().map(|m| m.name.as_str()))?;
    unique_names("providers", config.providers.iter().map(|p| p.name.as_str()))?;
    unique_names("profiles", config.profiles.iter().map(|p| p.name.as_str()))?;
    unique_names("rules", config.rules.iter().map(|r| r.name.as_str()))?;

    if config.heartbeat_interval.is_negative() {
        return Err(HealthError::configuration(
            ConfigLocation::attribute("healthMonitoring", "heartbeatInterval"),
            "heartbeatInterval must not be negative",
        ));
    }

    for mapping in &config.event_mappings {
        validate_mapping(mapping, taxonomy)?;
    }
    for provider in &config.providers {
        validate_provider(provider, providers)?;
    }
    for profile in &config.profiles {
        validate_profile(profile, evaluators)?;
    }
    for rule in &config.rules {
        validate_rule(rule, config, evaluators)?;
    }

    debug!(
        mappings = config.event_mappings.len(),
        providers = config.providers.len(),
        profiles = config.profiles.len(),
        rules = config.rules.len(),
        "Configuration validated"
    );
    Ok(())
}

fn unique_names<'a>(collection: &str, names: impl Iterator<Item = &'a str>) -> HealthResult<()> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(HealthError::configuration(
                ConfigLocation::attribute(collection, "name"),
                format!("an element of '{collection}' has an empty name"),
            ));
        }
        if !seen.insert(name) {
            return Err(HealthError::configuration(
                ConfigLocation::attribute(element_path(collection, name), "name"),
                format!("'{name}' is defined more than once in '{collection}'"),
            ));
        }
    }
    Ok(())
}

fn validate_mapping(mapping: &EventMappingSettings, taxonomy: &EventTaxonomy) -> HealthResult<()> {
    let element = element_path("eventMappings", &mapping.name);

    let Some(event_type) = taxonomy.resolve(&mapping.event_type) else {
        return Err(HealthError::configuration(
            ConfigLocation::attribute(&element, "type"),
            format!("event type '{}' is not registered", mapping.event_type),
        ));
    };
    if !taxonomy.is_assignable(event_type, taxonomy.root()) {
        return Err(HealthError::configuration(
            ConfigLocation::attribute(&element, "type"),
            format!("event type '{}' does not derive from WebBaseEvent", mapping.event_type),
        ));
    }

    if mapping.start_event_code < 0 {
        return Err(HealthError::configuration(
            ConfigLocation::attribute(&element, "startEventCode"),
            "startEventCode must not be negative",
        ));
    }
    if mapping.end_event_code.0 < 0 {
        return Err(HealthError::configuration(
            ConfigLocation::attribute(&element, "endEventCode"),
            "endEventCode must not be negative",
        ));
    }
    if i64::from(mapping.start_event_code) > mapping.end_event_code.0 {
        return Err(HealthError::configuration(
            ConfigLocation::attribute(&element, "startEventCode"),
            format!(
                "startEventCode ({}) must not be greater than endEventCode ({})",
                mapping.start_event_code, mapping.end_event_code
            ),
        ));
    }
    Ok(())
}

fn validate_provider(provider: &ProviderSettings, types: &ProviderTypeRegistry) -> HealthResult<()> {
    if !types.contains(&provider.provider_type) {
        return Err(HealthError::configuration(
            ConfigLocation::attribute(element_path("providers", &provider.name), "type"),
            format!("provider type '{}' is not registered", provider.provider_type),
        ));
    }
    Ok(())
}

fn validate_policy(
    element: &str,
    min_instances: Option<i32>,
    max_limit: Option<i64>,
    min_interval_negative: bool,
) -> HealthResult<()> {
    if min_instances.is_some_and(|n| n < 1) {
        return Err(HealthError::configuration(
            ConfigLocation::attribute(element, "minInstances"),
            "minInstances must be at least 1",
        ));
    }
    if max_limit.is_some_and(|n| n < 0) {
        return Err(HealthError::configuration(
            ConfigLocation::attribute(element, "maxLimit"),
            "maxLimit must not be negative",
        ));
    }
    if min_interval_negative {
        return Err(HealthError::configuration(
            ConfigLocation::attribute(element, "minInterval"),
            "minInterval must not be negative",
        ));
    }
    Ok(())
}

fn validate_custom(
    element: &str,
    custom: Option<&str>,
    evaluators: &EvaluatorTypeRegistry,
) -> HealthResult<()> {
    match custom {
        Some(type_name) if !evaluators.contains(type_name) => Err(HealthError::configuration(
            ConfigLocation::attribute(element, "custom"),
            format!("custom evaluator type '{type_name}' is not registered"),
        )),
        _ => Ok(()),
    }
}

fn validate_profile(profile: &ProfileSettings, evaluators: &EvaluatorTypeRegistry) -> HealthResult<()> {
    let element = element_path("profiles", &profile.name);
    validate_policy(
        &element,
        Some(profile.min_instances),
        Some(profile.max_limit.0),
        profile.min_interval.is_negative(),
    )?;
    validate_custom(&element, profile.custom.as_deref(), evaluators)
}

fn validate_rule(
    rule: &RuleSettings,
    config: &HealthMonitoringConfig,
    evaluators: &EvaluatorTypeRegistry,
) -> HealthResult<()> {
    let element = element_path("rules", &rule.name);

    if config.event_mapping(&rule.event_name).is_none() {
        return Err(HealthError::configuration(
            ConfigLocation::attribute(&element, "eventName"),
            format!("rule '{}' references unknown event mapping '{}'", rule.name, rule.event_name),
        ));
    }
    if let Some(provider) = &rule.provider {
        if config.provider(provider).is_none() {
            return Err(HealthError::configuration(
                ConfigLocation::attribute(&element, "provider"),
                format!("rule '{}' references unknown provider '{provider}'", rule.name),
            ));
        }
    }
    if let Some(profile) = &rule.profile {
        if config.profile(profile).is_none() {
            return Err(HealthError::configuration(
                ConfigLocation::attribute(&element, "profile"),
                format!("rule '{}' references unknown profile '{profile}'", rule.name),
            ));
        }
    }

    validate_policy(
        &element,
        rule.min_instances,
        rule.max_limit.map(|m| m.0),
        rule.min_interval.is_some_and(|i| i.is_negative()),
    )?;
    validate_custom(&element, rule.custom.as_deref(), evaluators)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EventMappingSettings, Interval};
    use crate::provider::MEMORY_PROVIDER_TYPE;

    fn base() -> HealthMonitoringConfig {
        HealthMonitoringConfig {
            event_mappings: vec![EventMappingSettings::new("Errors", "WebBaseErrorEvent").with_codes(100, 199)],
            providers: vec![ProviderSettings::new("Log", MEMORY_PROVIDER_TYPE)],
            profiles: vec![ProfileSettings::new("Default")],
            rules: vec![RuleSettings::new("R1", "Errors").with_provider("Log").with_profile("Default")],
            ..HealthMonitoringConfig::default()
        }
    }

    fn check(config: &HealthMonitoringConfig) -> HealthResult<()> {
        validate(config, &EventTaxonomy::new(), &ProviderTypeRegistry::new(), &EvaluatorTypeRegistry::new())
    }

    fn failing_attribute(config: &HealthMonitoringConfig) -> (String, Option<String>) {
        let err = check(config).unwrap_err();
        let location = err.location().cloned().unwrap();
        (location.element, location.attribute)
    }

    #[test]
    fn consistent_snapshot_passes() {
        assert!(check(&base()).is_ok());
        assert!(check(&HealthMonitoringConfig::with_builtin_defaults()).is_ok());
    }

    #[test]
    fn reversed_code_range_is_rejected() {
        let mut config = base();
        config.event_mappings[0] = EventMappingSettings::new("Errors", "WebBaseErrorEvent").with_codes(200, 100);
        let (element, attribute) = failing_attribute(&config);
        assert_eq!(element, "eventMappings[\"Errors\"]");
        assert_eq!(attribute.as_deref(), Some("startEventCode"));
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let mut config = base();
        config.event_mappings[0].event_type = "NoSuchEvent".into();
        assert_eq!(failing_attribute(&config).1.as_deref(), Some("type"));
    }

    #[test]
    fn dangling_rule_references_name_the_attribute() {
        let mut config = base();
        config.rules[0].event_name = "Missing".into();
        assert_eq!(failing_attribute(&config), ("rules[\"R1\"]".to_string(), Some("eventName".to_string())));

        let mut config = base();
        config.rules[0].provider = Some("Missing".into());
        assert_eq!(failing_attribute(&config).1.as_deref(), Some("provider"));

        let mut config = base();
        config.rules[0].profile = Some("Missing".into());
        assert_eq!(failing_attribute(&config).1.as_deref(), Some("profile"));
    }

    #[test]
    fn out_of_range_policy_values_are_rejected() {
        let mut config = base();
        config.profiles[0].min_instances = 0;
        assert_eq!(failing_attribute(&config).1.as_deref(), Some("minInstances"));

        let mut config = base();
        config.rules[0].min_interval = Some(Interval::from_secs(-5));
        assert_eq!(failing_attribute(&config).1.as_deref(), Some("minInterval"));

        let mut config = base();
        config.rules[0].max_limit = Some((-1).into());
        assert_eq!(failing_attribute(&config).1.as_deref(), Some("maxLimit"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut config = base();
        config.rules.push(RuleSettings::new("R1", "Errors"));
        assert_eq!(failing_attribute(&config), ("rules[\"R1\"]".to_string(), Some("name".to_string())));
    }

    #[test]
    fn unregistered_types_are_rejected() {
        let mut config = base();
        config.providers[0].provider_type = "SqlEventProvider".into();
        assert_eq!(failing_attribute(&config).0, "providers[\"Log\"]");

        let mut config = base();
        config.profiles[0].custom = Some("Sampler".into());
        assert_eq!(failing_attribute(&config), ("profiles[\"Default\"]".to_string(), Some("custom".to_string())));
    }

    #[test]
    fn method_form_attaches_file_and_line() {
        let mut config = HealthMonitoringConfig::from_yaml_str(
            "eventMappings:\n  - name: Errors\n    type: WebBaseErrorEvent\nrules:\n  - name: R1\n    eventName: Nope\n",
        )
        .unwrap();
        config.source.file = Some("health.yaml".into());

        let err = config
            .validate(&EventTaxonomy::new(), &ProviderTypeRegistry::new(), &EvaluatorTypeRegistry::new())
            .unwrap_err();
        let location = err.location().unwrap();
        assert_eq!(location.line, Some(5));
        assert!(err.to_string().contains("health.yaml:5"));
    }
}
