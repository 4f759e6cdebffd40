//! Event type taxonomy
//!
//! Every raised event carries an [`EventTypeId`]. The taxonomy records the
//! single-parent hierarchy between those types so rules bound to a general
//! type also match events of any derived type, and so rules can be ordered
//! by how specific their bound type is.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Identity of an event type registered in an [`EventTaxonomy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventTypeId(u32);

impl EventTypeId {
    /// Position of the type in its taxonomy arena
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EventTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Event types shipped with the framework.
///
/// Built-ins are registered first and in declaration order, so their ids are
/// stable across every taxonomy created with [`EventTaxonomy::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinEventType {
    WebBaseEvent,
    WebManagementEvent,
    WebHeartbeatEvent,
    WebApplicationLifetimeEvent,
    WebRequestEvent,
    WebBaseErrorEvent,
    WebErrorEvent,
    WebRequestErrorEvent,
    WebAuditEvent,
    WebSuccessAuditEvent,
    WebAuthenticationSuccessAuditEvent,
    WebFailureAuditEvent,
    WebAuthenticationFailureAuditEvent,
    WebViewStateFailureAuditEvent,
}

impl BuiltinEventType {
    /// All built-in types, parents before children
    pub const ALL: [BuiltinEventType; 14] = [
        BuiltinEventType::WebBaseEvent,
        BuiltinEventType::WebManagementEvent,
        BuiltinEventType::WebHeartbeatEvent,
        BuiltinEventType::WebApplicationLifetimeEvent,
        BuiltinEventType::WebRequestEvent,
        BuiltinEventType::WebBaseErrorEvent,
        BuiltinEventType::WebErrorEvent,
        BuiltinEventType::WebRequestErrorEvent,
        BuiltinEventType::WebAuditEvent,
        BuiltinEventType::WebSuccessAuditEvent,
        BuiltinEventType::WebAuthenticationSuccessAuditEvent,
        BuiltinEventType::WebFailureAuditEvent,
        BuiltinEventType::WebAuthenticationFailureAuditEvent,
        BuiltinEventType::WebViewStateFailureAuditEvent,
    ];

    /// Type name as it appears in configuration
    pub fn name(self) -> &'static str {
        match self {
            BuiltinEventType::WebBaseEvent => "WebBaseEvent",
            BuiltinEventType::WebManagementEvent => "WebManagementEvent",
            BuiltinEventType::WebHeartbeatEvent => "WebHeartbeatEvent",
            BuiltinEventType::WebApplicationLifetimeEvent => "WebApplicationLifetimeEvent",
            BuiltinEventType::WebRequestEvent => "WebRequestEvent",
            BuiltinEventType::WebBaseErrorEvent => "WebBaseErrorEvent",
            BuiltinEventType::WebErrorEvent => "WebErrorEvent",
            BuiltinEventType::WebRequestErrorEvent => "WebRequestErrorEvent",
            BuiltinEventType::WebAuditEvent => "WebAuditEvent",
            BuiltinEventType::WebSuccessAuditEvent => "WebSuccessAuditEvent",
            BuiltinEventType::WebAuthenticationSuccessAuditEvent => {
                "WebAuthenticationSuccessAuditEvent"
            }
            BuiltinEventType::WebFailureAuditEvent => "WebFailureAuditEvent",
            BuiltinEventType::WebAuthenticationFailureAuditEvent => {
                "WebAuthenticationFailureAuditEvent"
            }
            BuiltinEventType::WebViewStateFailureAuditEvent => "WebViewStateFailureAuditEvent",
        }
    }

    /// Direct base type, `None` for the root
    pub fn parent(self) -> Option<BuiltinEventType> {
        use BuiltinEventType::*;
        match self {
            WebBaseEvent => None,
            WebManagementEvent => Some(WebBaseEvent),
            WebHeartbeatEvent | WebApplicationLifetimeEvent | WebRequestEvent
            | WebBaseErrorEvent | WebAuditEvent => Some(WebManagementEvent),
            WebErrorEvent | WebRequestErrorEvent => Some(WebBaseErrorEvent),
            WebSuccessAuditEvent | WebFailureAuditEvent => Some(WebAuditEvent),
            WebAuthenticationSuccessAuditEvent => Some(WebSuccessAuditEvent),
            WebAuthenticationFailureAuditEvent | WebViewStateFailureAuditEvent => {
                Some(WebFailureAuditEvent)
            }
        }
    }

    /// Id of this type in any taxonomy built by [`EventTaxonomy::new`]
    pub fn id(self) -> EventTypeId {
        EventTypeId(self as u32)
    }
}

/// Errors raised while registering event types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaxonomyError {
    #[error("event type '{name}' is already registered")]
    DuplicateType { name: String },

    #[error("event type '{name}' names unknown base type {parent}")]
    UnknownParent { name: String, parent: EventTypeId },

    #[error("event type name must not be empty")]
    EmptyName,
}

#[derive(Debug, Clone)]
struct TypeNode {
    name: String,
    parent: Option<EventTypeId>,
    depth: u32,
}

/// Arena of event types with single inheritance.
///
/// Built once during application start-up and then shared read-only.
#[derive(Debug, Clone)]
pub struct EventTaxonomy {
    nodes: Vec<TypeNode>,
    by_name: HashMap<String, EventTypeId>,
}

impl Default for EventTaxonomy {
    fn default() -> Self {
        Self::new()
    }
}

impl EventTaxonomy {
    /// Create a taxonomy holding the framework's built-in hierarchy
    pub fn new() -> Self {
        let mut taxonomy = Self { nodes: Vec::with_capacity(32), by_name: HashMap::new() };
        for builtin in BuiltinEventType::ALL {
            let parent = builtin.parent().map(BuiltinEventType::id);
            let id = taxonomy.insert(builtin.name(), parent);
            debug_assert_eq!(id, builtin.id());
        }
        taxonomy
    }

    /// The root type every event derives from
    pub fn root(&self) -> EventTypeId {
        BuiltinEventType::WebBaseEvent.id()
    }

    /// Register an application event type deriving from `parent`
    pub fn register(
        &mut self,
        name: impl Into<String>,
        parent: EventTypeId,
    ) -> Result<EventTypeId, TaxonomyError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(TaxonomyError::EmptyName);
        }
        if self.by_name.contains_key(&name) {
            return Err(TaxonomyError::DuplicateType { name });
        }
        if parent.index() >= self.nodes.len() {
            return Err(TaxonomyError::UnknownParent { name, parent });
        }
        Ok(self.insert(&name, Some(parent)))
    }

    fn insert(&mut self, name: &str, parent: Option<EventTypeId>) -> EventTypeId {
        let id = EventTypeId(self.nodes.len() as u32);
        let depth = parent.map_or(0, |p| self.nodes[p.index()].depth + 1);
        self.nodes.push(TypeNode { name: name.to_string(), parent, depth });
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Look up a type by its configured name
    pub fn resolve(&self, name: &str) -> Option<EventTypeId> {
        self.by_name.get(name.trim()).copied()
    }

    /// Whether `id` belongs to this taxonomy
    pub fn contains(&self, id: EventTypeId) -> bool {
        id.index() < self.nodes.len()
    }

    /// Name of a registered type
    pub fn name(&self, id: EventTypeId) -> Option<&str> {
        self.nodes.get(id.index()).map(|n| n.name.as_str())
    }

    /// Direct base type
    pub fn parent(&self, id: EventTypeId) -> Option<EventTypeId> {
        self.nodes.get(id.index()).and_then(|n| n.parent)
    }

    /// Distance from the root; the root has depth 0
    pub fn depth(&self, id: EventTypeId) -> u32 {
        self.nodes.get(id.index()).map_or(0, |n| n.depth)
    }

    /// True when `sub` equals `base` or derives from it
    pub fn is_assignable(&self, sub: EventTypeId, base: EventTypeId) -> bool {
        if !self.contains(sub) || !self.contains(base) {
            return false;
        }
        let base_depth = self.depth(base);
        let mut current = sub;
        // Walk up only as far as the base's depth
        while self.depth(current) > base_depth {
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
        current == base
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false; a taxonomy holds at least the root
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
