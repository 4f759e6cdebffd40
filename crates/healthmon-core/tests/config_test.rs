//! Loading, validating and reloading configuration snapshots

mod common;

use common::*;
use healthmon_core::config::{EventMappingSettings, Interval, ProfileSettings, RuleSettings};
use healthmon_core::provider::MEMORY_PROVIDER_TYPE;
use healthmon_core::{
    EvaluatorTypeRegistry, HealthError, HealthMonitorHost, HealthMonitoringConfig,
    ProviderTypeRegistry,
};
use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Configuration file under the temp dir, removed when dropped
struct TempConfig(PathBuf);

impl Deref for TempConfig {
    type Target = Path;

    fn deref(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempConfig {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}

fn write_temp(name: &str, contents: &str) -> TempConfig {
    let path = std::env::temp_dir().join(format!("healthmon-{}-{name}", std::process::id()));
    fs::write(&path, contents).unwrap();
    TempConfig(path)
}

const YAML: &str = r#"enabled: true
eventMappings:
  - name: Errors
    type: WebBaseErrorEvent
    startEventCode: 100
    endEventCode: 199
providers:
  - name: Log
    type: MemoryEventProvider
    maxEvents: 10
profiles:
  - name: Throttled
    minInterval: "00:10:00"
    maxLimit: Infinite
rules:
  - name: Inherits
    eventName: Errors
    provider: Log
    profile: Throttled
  - name: Overrides
    eventName: Errors
    provider: Log
    profile: Throttled
    minInterval: "00:00:05"
"#;

#[test]
fn rule_interval_overrides_profile_only_when_set() {
    let path = write_temp("merge.yaml", YAML);
    let config = HealthMonitoringConfig::from_path(&path).unwrap();
    let monitor = monitor(&config, taxonomy(), ProviderTypeRegistry::new()).unwrap();

    let index = monitor.rule_index();
    assert_eq!(index.rule("Inherits").unwrap().min_interval, Interval::from_secs(600));
    assert_eq!(index.rule("Overrides").unwrap().min_interval, Interval::from_secs(5));
    assert!(index.rule("Overrides").unwrap().max_limit.is_infinite());
}

#[test]
fn reversed_code_range_fails_to_load() {
    let mut config = scenario_config(MEMORY_PROVIDER_TYPE);
    config.event_mappings[0] = EventMappingSettings::new("Errors", "WebBaseErrorEvent").with_codes(300, 200);

    let err = monitor(&config, taxonomy(), ProviderTypeRegistry::new()).unwrap_err();
    assert_eq!(err.category(), "configuration");
    assert!(!err.is_recoverable());
    assert_eq!(err.location().unwrap().element, "eventMappings[\"Errors\"]");
}

#[test]
fn dangling_event_name_reports_rule_and_line() {
    let text = YAML.replace("    eventName: Errors\n    provider: Log\n    profile: Throttled\n    minInterval", "    eventName: Missing\n    provider: Log\n    profile: Throttled\n    minInterval");
    let path = write_temp("dangling.yaml", &text);
    let config = HealthMonitoringConfig::from_path(&path).unwrap();
    let err = monitor(&config, taxonomy(), ProviderTypeRegistry::new()).unwrap_err();

    let location = err.location().unwrap();
    assert_eq!(location.element, "rules[\"Overrides\"]");
    assert_eq!(location.attribute.as_deref(), Some("eventName"));
    assert_eq!(location.file.as_deref(), Some(&*path));
    assert_eq!(location.line, Some(20));
    assert!(err.to_string().contains("Overrides"));
}

#[test]
fn toml_files_load_like_yaml() {
    let path = write_temp(
        "health.toml",
        r#"
heartbeatInterval = "00:00:00"

[[eventMappings]]
name = "Errors"
type = "WebBaseErrorEvent"

[[providers]]
name = "Log"
type = "MemoryEventProvider"

[[rules]]
name = "R1"
eventName = "Errors"
provider = "Log"
minInstances = 2
"#,
    );
    let config = HealthMonitoringConfig::from_path(&path).unwrap();

    let monitor = monitor(&config, taxonomy(), ProviderTypeRegistry::new()).unwrap();
    assert_eq!(monitor.rule_index().rule("R1").unwrap().min_instances, 2);
    assert!(monitor.provider("Log").is_some());
}

#[test]
fn temp_configs_are_removed_on_drop() {
    let path = write_temp("dropped.yaml", YAML);
    let location = path.to_path_buf();
    assert!(location.exists());
    drop(path);
    assert!(!location.exists());
}

#[test]
fn missing_file_is_a_load_error() {
    let err = HealthMonitoringConfig::from_path(&std::env::temp_dir().join("healthmon-does-not-exist.yaml"))
        .unwrap_err();
    assert!(matches!(err, HealthError::ConfigurationLoad { .. }));
}

#[test]
fn provider_initialization_failure_is_a_configuration_error() {
    let config = HealthMonitoringConfig::from_yaml_str(&YAML.replace("maxEvents: 10", "maxEvents: lots")).unwrap();
    let err = monitor(&config, taxonomy(), ProviderTypeRegistry::new()).unwrap_err();

    let location = err.location().unwrap();
    assert_eq!(location.element, "providers[\"Log\"]");
    assert_eq!(location.attribute.as_deref(), Some("type"));
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn profile_custom_evaluator_must_be_registered() {
    let mut config = scenario_config(MEMORY_PROVIDER_TYPE);
    config.profiles.push(ProfileSettings::new("Sampled").with_custom("Sampler"));
    config.rules[0] = RuleSettings::new("R1", "Errors").with_provider("Log").with_profile("Sampled");

    let err = monitor(&config, taxonomy(), ProviderTypeRegistry::new()).unwrap_err();
    assert_eq!(err.location().unwrap().attribute.as_deref(), Some("custom"));
}

#[test]
fn builtin_defaults_build_a_monitor() {
    let monitor = monitor(
        &HealthMonitoringConfig::with_builtin_defaults(),
        taxonomy(),
        ProviderTypeRegistry::new(),
    )
    .unwrap();
    assert_eq!(monitor.rule_index().len(), 2);
    assert!(monitor.provider(healthmon_core::config::DEFAULT_PROVIDER_NAME).is_some());
}

#[test]
fn reload_keeps_last_known_good_monitor() {
    let host = HealthMonitorHost::new(taxonomy(), ProviderTypeRegistry::new(), EvaluatorTypeRegistry::new());
    let good = host.reload(&scenario_config(MEMORY_PROVIDER_TYPE)).unwrap();

    let mut broken = scenario_config(MEMORY_PROVIDER_TYPE);
    broken.rules[0].event_name = "Missing".into();
    assert!(host.reload(&broken).is_err());

    let current = host.current().unwrap();
    assert!(Arc::ptr_eq(&current, &good));
    assert!(!good.is_shut_down());
}

#[test]
fn reload_without_previous_monitor_propagates() {
    let host = HealthMonitorHost::new(taxonomy(), ProviderTypeRegistry::new(), EvaluatorTypeRegistry::new());
    let mut broken = scenario_config(MEMORY_PROVIDER_TYPE);
    broken.rules[0].profile = Some("Missing".into());

    assert!(host.reload(&broken).is_err());
    assert!(host.current().is_none());
}

#[test]
fn successful_reload_replaces_and_shuts_down_previous() {
    let host = HealthMonitorHost::new(taxonomy(), ProviderTypeRegistry::new(), EvaluatorTypeRegistry::new());
    let first = host.reload(&scenario_config(MEMORY_PROVIDER_TYPE)).unwrap();
    let second = host.reload(&HealthMonitoringConfig::with_builtin_defaults()).unwrap();

    assert!(first.is_shut_down());
    assert!(Arc::ptr_eq(&host.current().unwrap(), &second));

    host.shutdown();
    assert!(second.is_shut_down());
    assert!(host.current().is_none());
}
