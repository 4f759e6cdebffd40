//! Error handling for the health monitoring engine
//!
//! Configuration problems are fatal and always carry a [`ConfigLocation`]
//! naming the element and attribute at fault. Provider and evaluator
//! failures keep the original error as their `source()`.

use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Shared, cloneable error cause
pub type ErrorSource = Arc<dyn StdError + Send + Sync + 'static>;

/// Where in the configuration snapshot an error was found
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLocation {
    /// File the snapshot was loaded from, if any
    pub file: Option<PathBuf>,
    /// Best-effort line of the element within `file`
    pub line: Option<usize>,
    /// Element path, e.g. `rules["All Errors Default"]`
    pub element: String,
    /// Offending attribute, e.g. `eventName`
    pub attribute: Option<String>,
}

impl ConfigLocation {
    pub fn element(element: impl Into<String>) -> Self {
        Self { element: element.into(), ..Default::default() }
    }

    pub fn attribute(element: impl Into<String>, attribute: &str) -> Self {
        Self {
            element: element.into(),
            attribute: Some(attribute.to_string()),
            ..Default::default()
        }
    }

    pub fn in_file(mut self, file: Option<PathBuf>, line: Option<usize>) -> Self {
        self.file = file;
        self.line = line;
        self
    }
}

impl fmt::Display for ConfigLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.element)?;
        if let Some(attribute) = &self.attribute {
            write!(f, ".{attribute}")?;
        }
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, " ({}:{line})", file.display()),
            (Some(file), None) => write!(f, " ({})", file.display()),
            _ => Ok(()),
        }
    }
}

/// Error type for health monitoring operations
#[derive(Error, Debug, Clone)]
pub enum HealthError {
    /// Invalid or inconsistent configuration
    #[error("Configuration error at {location}: {message}")]
    Configuration {
        message: String,
        location: ConfigLocation,
        #[source]
        source: Option<ErrorSource>,
    },

    /// Configuration text could not be read or parsed
    #[error("Configuration load error: {message}")]
    ConfigurationLoad {
        message: String,
        file: Option<PathBuf>,
        #[source]
        source: Option<ErrorSource>,
    },

    /// Application tried to raise an event with a reserved code
    #[error("Event code {event_code} is reserved; custom events must use codes >= {minimum}")]
    ReservedEventCode { event_code: i32, minimum: i32 },

    /// Event type is not part of the monitor's taxonomy
    #[error("Unknown event type {event_type}")]
    UnknownEventType { event_type: String },

    /// Named provider is not configured
    #[error("Provider '{name}' was not found")]
    ProviderNotFound { name: String },

    /// Internal invariant violated
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Low => write!(f, "LOW"),
            ErrorSeverity::Medium => write!(f, "MEDIUM"),
            ErrorSeverity::High => write!(f, "HIGH"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Result type alias for health monitoring operations
pub type HealthResult<T> = Result<T, HealthError>;

impl HealthError {
    /// Error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            HealthError::Configuration { .. } => "configuration",
            HealthError::ConfigurationLoad { .. } => "configuration_load",
            HealthError::ReservedEventCode { .. } => "event_code",
            HealthError::UnknownEventType { .. } => "event_type",
            HealthError::ProviderNotFound { .. } => "provider",
            HealthError::Internal { .. } => "internal",
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            HealthError::Configuration { .. } => ErrorSeverity::Critical,
            HealthError::ConfigurationLoad { .. } => ErrorSeverity::Critical,
            HealthError::ReservedEventCode { .. } => ErrorSeverity::Medium,
            HealthError::UnknownEventType { .. } => ErrorSeverity::Medium,
            HealthError::ProviderNotFound { .. } => ErrorSeverity::Low,
            HealthError::Internal { .. } => ErrorSeverity::High,
        }
    }

    /// Configuration errors stay until the configuration is fixed
    pub fn is_recoverable(&self) -> bool {
        match self {
            HealthError::Configuration { .. } => false,
            HealthError::ConfigurationLoad { .. } => false,
            HealthError::ReservedEventCode { .. } => true,
            HealthError::UnknownEventType { .. } => true,
            HealthError::ProviderNotFound { .. } => true,
            HealthError::Internal { .. } => false,
        }
    }

    /// Location of a configuration error
    pub fn location(&self) -> Option<&ConfigLocation> {
        match self {
            HealthError::Configuration { location, .. } => Some(location),
            _ => None,
        }
    }

    /// Create a configuration error
    pub fn configuration(location: ConfigLocation, message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into(), location, source: None }
    }

    /// Create a configuration error wrapping the failure that caused it
    pub fn configuration_caused_by(
        location: ConfigLocation,
        message: impl Into<String>,
        cause: anyhow::Error,
    ) -> Self {
        let boxed: Box<dyn StdError + Send + Sync + 'static> = cause.into();
        Self::Configuration { message: message.into(), location, source: Some(Arc::from(boxed)) }
    }

    /// Create a load error for unreadable or unparsable configuration text
    pub fn load(
        file: Option<PathBuf>,
        message: impl Into<String>,
        cause: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::ConfigurationLoad { message: message.into(), file, source: Some(Arc::new(cause)) }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }
}

/// Text of a panic payload caught with `catch_unwind`
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Extension trait for attaching file context to configuration errors
pub trait ResultExt<T> {
    /// Fill in the file and line of a configuration error's location
    fn with_file_context(
        self,
        file: Option<&PathBuf>,
        line_of: impl Fn(&ConfigLocation) -> Option<usize>,
    ) -> HealthResult<T>;
}

impl<T> ResultExt<T> for HealthResult<T> {
    fn with_file_context(
        self,
        file: Option<&PathBuf>,
        line_of: impl Fn(&ConfigLocation) -> Option<usize>,
    ) -> HealthResult<T> {
        self.map_err(|mut err| {
            if let HealthError::Configuration { location, .. } = &mut err {
                if location.file.is_none() {
                    location.file = file.cloned();
                }
                if location.line.is_none() {
                    location.line = line_of(location);
                }
            }
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_display_includes_attribute_and_file() {
        let location = ConfigLocation::attribute("rules[\"R1\"]", "eventName")
            .in_file(Some(PathBuf::from("web.yaml")), Some(12));
        assert_eq!(location.to_string(), "rules[\"R1\"].eventName (web.yaml:12)");

        let bare = ConfigLocation::element("profiles[\"Default\"]");
        assert_eq!(bare.to_string(), "profiles[\"Default\"]");
    }

    #[test]
    fn configuration_errors_are_fatal() {
        let err = HealthError::configuration(ConfigLocation::element("rules"), "bad");
        assert_eq!(err.category(), "configuration");
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(!err.is_recoverable());
        assert!(err.location().is_some());
    }

    #[test]
    fn wrapped_cause_is_exposed_as_source() {
        let err = HealthError::configuration_caused_by(
            ConfigLocation::attribute("providers[\"Log\"]", "type"),
            "provider failed to initialize",
            anyhow::anyhow!("disk full"),
        );
        let source = err.source().expect("source");
        assert_eq!(source.to_string(), "disk full");
    }

    #[test]
    fn file_context_fills_missing_fields() {
        let result: HealthResult<()> =
            Err(HealthError::configuration(ConfigLocation::element("rules[\"R1\"]"), "bad"));
        let path = PathBuf::from("health.toml");
        let err = result.with_file_context(Some(&path), |_| Some(4)).unwrap_err();
        let location = err.location().unwrap();
        assert_eq!(location.file.as_ref(), Some(&path));
        assert_eq!(location.line, Some(4));
    }
}
