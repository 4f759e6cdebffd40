#![allow(missing_docs)]
//! Rule matching and provider dispatch for health monitoring events.
//!
//! A configuration snapshot binds event types and code ranges (event
//! mappings) to providers through rules, with firing policy shared through
//! profiles. This crate validates such a snapshot, resolves it into a rule
//! list ordered by event type specificity, and answers "which rules fire for
//! this event" from a per-signature cache on the hot path.

/// Configuration snapshot, loading and validation
pub mod config;
/// Per-signature cache of matched rules
pub mod dispatch_cache;
/// Error types and file/line context for configuration errors
pub mod error;
/// Application hooks vetoing rule firings
pub mod evaluator;
/// Periodic heartbeat events
pub mod heartbeat;
/// Active monitor across reloads
pub mod host;
/// Event raising and dispatch
pub mod monitor;
/// Event sinks and their registry
pub mod provider;
/// Resolved, specificity-ordered rules
pub mod rule_index;
/// Per-rule firing state
pub mod throttle;

pub use config::HealthMonitoringConfig;
pub use dispatch_cache::{DispatchCacheStats, EventDispatchCache, FiringRuleInfo, FiringRules};
pub use error::{ConfigLocation, HealthError, HealthResult, ResultExt};
pub use evaluator::{CustomEvaluator, EvaluatorTypeRegistry};
pub use host::HealthMonitorHost;
pub use monitor::{DispatchOutcome, HealthMonitor, SkipReason};
pub use provider::{
    EventBuffer, EventProvider, MemoryEventProvider, ProviderRegistry, ProviderTrust,
    ProviderTypeRegistry, TraceEventProvider,
};
pub use rule_index::{RuleIndex, RuleInfo};
pub use throttle::RuleThrottleState;

pub use healthmon_types::{BuiltinEventType, EventTaxonomy, EventTypeId, WebEvent, codes};
