//! Health monitoring configuration snapshot
//!
//! The snapshot mirrors the `healthMonitoring` section: ordered collections
//! of event mappings, providers, profiles and rules plus two section-level
//! attributes. It is loaded once, validated, and then treated as read-only;
//! a reload builds a fresh snapshot.

mod source_map;
pub mod validate;
pub mod values;

pub use source_map::{SourceMap, element_path};
pub use values::{INFINITE, IntOrInfinite, Interval, ParameterValue};

use crate::error::{HealthError, HealthResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "HEALTHMON_CONFIG_PATH";
/// Default configuration file
pub const DEFAULT_CONFIG_PATH: &str = "healthmon.yaml";

/// Element default for `minInstances`
pub const DEFAULT_MIN_INSTANCES: i32 = 1;
/// Element default for `maxLimit`
pub const DEFAULT_MAX_LIMIT: IntOrInfinite = IntOrInfinite::INFINITE;
/// Element default for `minInterval`
pub const DEFAULT_MIN_INTERVAL: Interval = Interval::ZERO;

/// Binding of an event type and code range to a logical event name
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventMappingSettings {
    pub name: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub start_event_code: i32,
    #[serde(default = "default_end_event_code")]
    pub end_event_code: IntOrInfinite,
}

impl EventMappingSettings {
    pub fn new(name: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            event_type: event_type.into(),
            start_event_code: 0,
            end_event_code: default_end_event_code(),
        }
    }

    pub fn with_codes(mut self, start: i32, end: i32) -> Self {
        self.start_event_code = start;
        self.end_event_code = end.into();
        self
    }
}

fn default_end_event_code() -> IntOrInfinite {
    IntOrInfinite::INFINITE
}

/// A configured event sink
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub name: String,
    #[serde(rename = "type")]
    pub provider_type: String,
    /// Every other attribute, handed to the provider on initialization
    #[serde(flatten)]
    pub parameters: BTreeMap<String, ParameterValue>,
}

impl ProviderSettings {
    pub fn new(name: impl Into<String>, provider_type: impl Into<String>) -> Self {
        Self { name: name.into(), provider_type: provider_type.into(), parameters: BTreeMap::new() }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), ParameterValue::Text(value.into()));
        self
    }

    /// Parameters rendered as strings
    pub fn string_parameters(&self) -> BTreeMap<String, String> {
        self.parameters.iter().map(|(k, v)| (k.clone(), v.to_string())).collect()
    }
}

/// Named bundle of firing-policy defaults
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSettings {
    pub name: String,
    #[serde(default = "default_min_instances")]
    pub min_instances: i32,
    #[serde(default = "default_max_limit")]
    pub max_limit: IntOrInfinite,
    #[serde(default)]
    pub min_interval: Interval,
    #[serde(default)]
    pub custom: Option<String>,
}

impl ProfileSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_instances: DEFAULT_MIN_INSTANCES,
            max_limit: DEFAULT_MAX_LIMIT,
            min_interval: DEFAULT_MIN_INTERVAL,
            custom: None,
        }
    }

    pub fn with_min_instances(mut self, min_instances: i32) -> Self {
        self.min_instances = min_instances;
        self
    }

    pub fn with_max_limit(mut self, max_limit: i32) -> Self {
        self.max_limit = max_limit.into();
        self
    }

    pub fn with_min_interval(mut self, min_interval: Interval) -> Self {
        self.min_interval = min_interval;
        self
    }

    pub fn with_custom(mut self, custom: impl Into<String>) -> Self {
        self.custom = Some(custom.into());
        self
    }
}

fn default_min_instances() -> i32 {
    DEFAULT_MIN_INSTANCES
}

fn default_max_limit() -> IntOrInfinite {
    DEFAULT_MAX_LIMIT
}

/// Binding of an event mapping to a provider.
///
/// Firing-policy attributes left unset (`None`) fall back to the referenced
/// profile, then to the element defaults.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleSettings {
    pub name: String,
    pub event_name: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub min_instances: Option<i32>,
    #[serde(default)]
    pub max_limit: Option<IntOrInfinite>,
    #[serde(default)]
    pub min_interval: Option<Interval>,
    #[serde(default)]
    pub custom: Option<String>,
}

impl RuleSettings {
    pub fn new(name: impl Into<String>, event_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            event_name: event_name.into(),
            provider: None,
            profile: None,
            min_instances: None,
            max_limit: None,
            min_interval: None,
            custom: None,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_min_instances(mut self, min_instances: i32) -> Self {
        self.min_instances = Some(min_instances);
        self
    }

    pub fn with_max_limit(mut self, max_limit: i32) -> Self {
        self.max_limit = Some(max_limit.into());
        self
    }

    pub fn with_min_interval(mut self, min_interval: Interval) -> Self {
        self.min_interval = Some(min_interval);
        self
    }

    pub fn with_custom(mut self, custom: impl Into<String>) -> Self {
        self.custom = Some(custom.into());
        self
    }
}

/// Where a snapshot was loaded from
#[derive(Debug, Clone, Default)]
pub struct ConfigSource {
    pub file: Option<PathBuf>,
    pub source_map: SourceMap,
}

/// The `healthMonitoring` section
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct HealthMonitoringConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Interval between heartbeat events; zero disables the heartbeat
    #[serde(default)]
    pub heartbeat_interval: Interval,
    #[serde(default)]
    pub event_mappings: Vec<EventMappingSettings>,
    #[serde(default)]
    pub providers: Vec<ProviderSettings>,
    #[serde(default)]
    pub profiles: Vec<ProfileSettings>,
    #[serde(default)]
    pub rules: Vec<RuleSettings>,
    #[serde(skip)]
    pub source: ConfigSource,
}

fn default_true() -> bool {
    true
}

impl Default for HealthMonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            heartbeat_interval: Interval::ZERO,
            event_mappings: Vec::new(),
            providers: Vec::new(),
            profiles: Vec::new(),
            rules: Vec::new(),
            source: ConfigSource::default(),
        }
    }
}

/// Name of the provider registered by [`HealthMonitoringConfig::with_builtin_defaults`]
pub const DEFAULT_PROVIDER_NAME: &str = "TraceEventProvider";

impl HealthMonitoringConfig {
    /// Snapshot carrying the framework's stock mappings, profiles and rules
    pub fn with_builtin_defaults() -> Self {
        let event_mappings = vec![
            EventMappingSettings::new("All Events", "WebBaseEvent"),
            EventMappingSettings::new("Heartbeats", "WebHeartbeatEvent"),
            EventMappingSettings::new("Application Lifetime Events", "WebApplicationLifetimeEvent"),
            EventMappingSettings::new("Request Processing Events", "WebRequestEvent"),
            EventMappingSettings::new("All Errors", "WebBaseErrorEvent"),
            EventMappingSettings::new("Infrastructure Errors", "WebErrorEvent"),
            EventMappingSettings::new("Request Processing Errors", "WebRequestErrorEvent"),
            EventMappingSettings::new("All Audits", "WebAuditEvent"),
            EventMappingSettings::new("Failure Audits", "WebFailureAuditEvent"),
            EventMappingSettings::new("Success Audits", "WebSuccessAuditEvent"),
        ];

        let profiles = vec![
            ProfileSettings::new("Default").with_min_interval(Interval::from_secs(60)),
            ProfileSettings::new("Critical"),
        ];

        let providers =
            vec![ProviderSettings::new(DEFAULT_PROVIDER_NAME, crate::provider::TRACE_PROVIDER_TYPE)];

        let rules = vec![
            RuleSettings::new("All Errors Default", "All Errors")
                .with_provider(DEFAULT_PROVIDER_NAME)
                .with_profile("Default")
                .with_min_interval(Interval::from_secs(60)),
            RuleSettings::new("Failure Audits Default", "Failure Audits")
                .with_provider(DEFAULT_PROVIDER_NAME)
                .with_profile("Default")
                .with_min_interval(Interval::from_secs(60)),
        ];

        Self { event_mappings, providers, profiles, rules, ..Self::default() }
    }

    /// Load from the path in `HEALTHMON_CONFIG_PATH`, or the default file.
    ///
    /// A missing file falls back to [`Self::with_builtin_defaults`].
    pub fn load() -> HealthResult<Self> {
        let config_path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let path = Path::new(&config_path);

        if !path.exists() {
            warn!(
                "Configuration file '{}' not found. Using built-in health monitoring defaults.",
                config_path
            );
            return Ok(Self::with_builtin_defaults().apply_env_overrides());
        }

        Ok(Self::from_path(path)?.apply_env_overrides())
    }

    /// Load a YAML (`.yaml`/`.yml`) or TOML (`.toml`) file
    #[instrument(level = "debug")]
    pub fn from_path(path: &Path) -> HealthResult<Self> {
        let text = fs::read_to_string(path).map_err(|err| {
            HealthError::load(
                Some(path.to_path_buf()),
                format!("cannot read '{}'", path.display()),
                err,
            )
        })?;

        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let mut config = if is_toml { Self::from_toml_str(&text) } else { Self::from_yaml_str(&text) }
            .map_err(|err| match err {
                HealthError::ConfigurationLoad { message, source, .. } => {
                    HealthError::ConfigurationLoad { message, file: Some(path.to_path_buf()), source }
                }
                other => other,
            })?;

        config.source.file = Some(path.to_path_buf());
        info!(
            path = %path.display(),
            mappings = config.event_mappings.len(),
            providers = config.providers.len(),
            profiles = config.profiles.len(),
            rules = config.rules.len(),
            "Loaded health monitoring configuration"
        );
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> HealthResult<Self> {
        let mut config: Self = serde_yaml::from_str(text)
            .map_err(|err| HealthError::load(None, format!("invalid YAML: {err}"), err))?;
        config.source.source_map = SourceMap::scan(text);
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> HealthResult<Self> {
        let mut config: Self = toml::from_str(text)
            .map_err(|err| HealthError::load(None, format!("invalid TOML: {err}"), err))?;
        config.source.source_map = SourceMap::scan(text);
        Ok(config)
    }

    /// Apply `HEALTHMON_ENABLED` and `HEALTHMON_HEARTBEAT_INTERVAL`
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(enabled) = std::env::var("HEALTHMON_ENABLED") {
            if let Ok(enabled) = enabled.trim().parse::<bool>() {
                debug!(enabled, "HEALTHMON_ENABLED override");
                self.enabled = enabled;
            }
        }
        if let Ok(interval) = std::env::var("HEALTHMON_HEARTBEAT_INTERVAL") {
            match Interval::parse(&interval) {
                Some(interval) => self.heartbeat_interval = interval,
                None => warn!(value = %interval, "Ignoring invalid HEALTHMON_HEARTBEAT_INTERVAL"),
            }
        }
        self
    }

    pub fn event_mapping(&self, name: &str) -> Option<&EventMappingSettings> {
        self.event_mappings.iter().find(|m| m.name == name)
    }

    pub fn profile(&self, name: &str) -> Option<&ProfileSettings> {
        self.profiles.iter().find(|p| p.name == name)
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderSettings> {
        self.providers.iter().find(|p| p.name == name)
    }

    pub fn rule(&self, name: &str) -> Option<&RuleSettings> {
        self.rules.iter().find(|r| r.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_snapshot_parses_all_collections() {
        let config = HealthMonitoringConfig::from_yaml_str(
            r#"
heartbeatInterval: "00:00:30"
eventMappings:
  - name: Errors
    type: WebBaseErrorEvent
    startEventCode: 100
    endEventCode: 199
providers:
  - name: Log
    type: MemoryEventProvider
    maxEvents: 50
profiles:
  - name: Throttled
    minInstances: 2
    maxLimit: Infinite
    minInterval: "00:01:00"
rules:
  - name: R1
    eventName: Errors
    provider: Log
    profile: Throttled
    minInterval: 5
"#,
        )
        .unwrap();

        assert!(config.enabled);
        assert_eq!(config.heartbeat_interval, Interval::from_secs(30));

        let mapping = config.event_mapping("Errors").unwrap();
        assert_eq!(mapping.start_event_code, 100);
        assert_eq!(mapping.end_event_code, IntOrInfinite(199));

        let provider = config.provider("Log").unwrap();
        assert_eq!(provider.provider_type, "MemoryEventProvider");
        assert_eq!(provider.string_parameters().get("maxEvents").map(String::as_str), Some("50"));

        let profile = config.profile("Throttled").unwrap();
        assert_eq!(profile.min_instances, 2);
        assert!(profile.max_limit.is_infinite());
        assert_eq!(profile.min_interval, Interval::from_secs(60));

        let rule = config.rule("R1").unwrap();
        assert_eq!(rule.min_interval, Some(Interval::from_secs(5)));
        assert_eq!(rule.min_instances, None);
        assert_eq!(rule.max_limit, None);
        assert!(!config.source.source_map.is_empty());
    }

    #[test]
    fn oversized_interval_is_a_load_error() {
        let err = HealthMonitoringConfig::from_yaml_str("heartbeatInterval: \"99999999999999.00:00:00\"\n")
            .unwrap_err();
        assert!(matches!(err, HealthError::ConfigurationLoad { .. }));
    }

    #[test]
    fn toml_snapshot_parses() {
        let config = HealthMonitoringConfig::from_toml_str(
            r#"
enabled = false

[[eventMappings]]
name = "Errors"
type = "WebBaseErrorEvent"

[[rules]]
name = "R1"
eventName = "Errors"
maxLimit = 10
"#,
        )
        .unwrap();

        assert!(!config.enabled);
        let mapping = config.event_mapping("Errors").unwrap();
        assert_eq!(mapping.start_event_code, 0);
        assert!(mapping.end_event_code.is_infinite());
        assert_eq!(config.rule("R1").unwrap().max_limit, Some(IntOrInfinite(10)));
    }

    #[test]
    fn malformed_text_is_a_load_error() {
        let err = HealthMonitoringConfig::from_yaml_str("rules: [name: ").unwrap_err();
        assert_eq!(err.category(), "configuration_load");
    }

    #[test]
    fn builtin_defaults_reference_their_own_elements() {
        let config = HealthMonitoringConfig::with_builtin_defaults();
        for rule in &config.rules {
            assert!(config.event_mapping(&rule.event_name).is_some());
            assert!(config.provider(rule.provider.as_deref().unwrap()).is_some());
            assert!(config.profile(rule.profile.as_deref().unwrap()).is_some());
        }
        let default_profile = config.profile("Default").unwrap();
        assert_eq!(default_profile.min_interval, Interval::from_secs(60));
        assert!(default_profile.max_limit.is_infinite());
    }
}
