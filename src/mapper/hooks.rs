//! Lifecycle hook registration and dispatch types.
//!
//! Hooks are registered explicitly at mapper-construction time; there is
//! no name-based reflection. Relationship cascades are delivered as
//! [`RelationshipEvent`] values carrying the bound endpoint, so no closure
//! captures a loop variable.

use crate::connection::RawResult;
use crate::entity::{EntityRef, PropertyValue};
use crate::error::Result;
use std::collections::BTreeMap;

/// The operation a lifecycle hook is observing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// The entity is being created
    Create,
    /// The entity is being updated
    Update,
    /// The entity is being deleted
    Delete,
}

/// Which end of a relationship an entity occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelEnd {
    /// The relationship's start node
    Start,
    /// The relationship's end node
    End,
}

/// A relationship-cascade notification.
///
/// Endpoint invocations carry the node in `entity` and its end; the
/// relationship mapper's own invocation carries the relationship itself
/// and no end.
pub struct RelationshipEvent {
    /// The entity the hook was registered on
    pub entity: EntityRef,
    /// The relationship that was saved or removed
    pub relationship: EntityRef,
    /// Which end `entity` occupies, if it is an endpoint
    pub end: Option<RelEnd>,
}

/// Hook that observes an entity before its query executes.
pub type LifecycleHook = Box<dyn Fn(&EntityRef) -> Result<()>>;

/// Hook that observes an entity and its unit's response after execution.
pub type AfterHook = Box<dyn Fn(&EntityRef, &RawResult) -> Result<()>>;

/// Hook fired for one recorded property change: entity, field, old, new.
pub type PropertyChangedHook =
    Box<dyn Fn(&EntityRef, &str, &PropertyValue, &PropertyValue) -> Result<()>>;

/// Hook fired for relationship-cascade events.
pub type RelationshipHook = Box<dyn Fn(&RelationshipEvent) -> Result<()>>;

/// The hook table of one entity mapper.
///
/// Built through [`EntityMapperBuilder`](crate::mapper::EntityMapperBuilder);
/// the unit of work dispatches into it during batch execution.
#[derive(Default)]
pub struct Hooks {
    pub(crate) before_create: Vec<LifecycleHook>,
    pub(crate) after_create: Vec<AfterHook>,
    pub(crate) before_update: Vec<LifecycleHook>,
    pub(crate) after_update: Vec<AfterHook>,
    pub(crate) before_delete: Vec<LifecycleHook>,
    pub(crate) after_delete: Vec<AfterHook>,
    pub(crate) finals: Vec<LifecycleHook>,
    pub(crate) property_changed: BTreeMap<String, Vec<PropertyChangedHook>>,
    pub(crate) relationship_added: BTreeMap<String, Vec<RelationshipHook>>,
    pub(crate) relationship_updated: Vec<RelationshipHook>,
    pub(crate) relationship_removed: Vec<RelationshipHook>,
}

impl Hooks {
    /// Before-hooks for the given operation, in registration order.
    pub(crate) fn before(&self, op: Operation) -> &[LifecycleHook] {
        match op {
            Operation::Create => &self.before_create,
            Operation::Update => &self.before_update,
            Operation::Delete => &self.before_delete,
        }
    }

    /// After-hooks for the given operation, in registration order.
    pub(crate) fn after(&self, op: Operation) -> &[AfterHook] {
        match op {
            Operation::Create => &self.after_create,
            Operation::Update => &self.after_update,
            Operation::Delete => &self.after_delete,
        }
    }

    /// Handlers registered for changes of one field.
    pub(crate) fn property_changed(&self, field: &str) -> &[PropertyChangedHook] {
        self.property_changed
            .get(field)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Handlers registered for additions of one relationship type.
    pub(crate) fn relationship_added(&self, rel_type: &str) -> &[RelationshipHook] {
        self.relationship_added
            .get(rel_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
