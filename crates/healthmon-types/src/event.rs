//! The event record handed to providers

use crate::codes::{self, UNDEFINED_EVENT_DETAIL_CODE};
use crate::taxonomy::{BuiltinEventType, EventTypeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A raised health monitoring event.
///
/// `sequence` and `occurrence` are assigned by the monitor when the event is
/// raised; they stay zero on events that were never raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebEvent {
    pub event_id: Uuid,
    pub event_type: EventTypeId,
    pub event_code: i32,
    pub event_detail_code: i32,
    pub message: String,
    pub source: Option<String>,
    pub event_time: DateTime<Utc>,
    /// Position of this event among all events raised by the monitor
    pub sequence: u64,
    /// How many events with this code the monitor has raised, this one included
    pub occurrence: u64,
    /// Error description for error and failure-audit events
    pub error: Option<String>,
}

impl WebEvent {
    /// Create an event of `event_type` with the given code
    pub fn new(event_type: EventTypeId, event_code: i32, message: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            event_code,
            event_detail_code: UNDEFINED_EVENT_DETAIL_CODE,
            message: message.into(),
            source: None,
            event_time: Utc::now(),
            sequence: 0,
            occurrence: 0,
            error: None,
        }
    }

    /// Create the event the framework raises for a system code
    pub fn system(event_code: i32) -> Option<Self> {
        let event_type = codes::system_event_type(event_code)?;
        Some(Self::new(event_type.id(), event_code, codes::default_message(event_code)))
    }

    pub fn with_detail_code(mut self, event_detail_code: i32) -> Self {
        self.event_detail_code = event_detail_code;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// True when the code lies in the framework-reserved range
    pub fn is_system_event(&self) -> bool {
        codes::is_system_code(self.event_code)
    }

    /// Built-in type of the event, if it is one
    pub fn builtin_type(&self) -> Option<BuiltinEventType> {
        BuiltinEventType::ALL.into_iter().find(|b| b.id() == self.event_type)
    }
}
