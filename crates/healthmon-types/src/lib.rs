//! Healthmon Types
//!
//! Shared definitions for the health monitoring engine: the event type
//! taxonomy, the framework's reserved event codes, and the [`WebEvent`]
//! record delivered to providers.

/// Reserved event codes and their built-in event types
pub mod codes;
/// The event record
pub mod event;
/// Event type hierarchy
pub mod taxonomy;

pub use event::WebEvent;
pub use taxonomy::{BuiltinEventType, EventTaxonomy, EventTypeId, TaxonomyError};
