//! Core entity types: nodes, relationships, identity, and change tracking.

use super::property::{PropertyMap, PropertyValue};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Persisted identifier assigned by the graph database.
pub type EntityId = i64;

/// Shared handle to an entity.
///
/// The caller, a pending unit of work, and relationship endpoints may all
/// hold the same entity; rehydration after a batch executes must be visible
/// through every handle. A unit of work is never shared across threads, so
/// single-threaded shared ownership is the contract.
pub type EntityRef = Rc<RefCell<Entity>>;

/// Whether an entity is a node or a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Graph node; carries labels and properties
    Node,
    /// Typed, directed edge between two nodes
    Relationship,
}

/// Direction for relationship traversal queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Follow outgoing relationships (from the start node)
    Outgoing,
    /// Follow incoming relationships (to the start node)
    Incoming,
    /// Follow relationships in both directions
    Both,
}

/// One recorded property mutation relative to the hydration baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyChange {
    /// Baseline value at hydration time
    pub from: PropertyValue,
    /// Latest value written since
    pub to: PropertyValue,
}

/// A relationship endpoint supplied by the caller.
///
/// A raw persisted id is normalized into an anonymous identified node.
pub enum Endpoint {
    /// An entity handle, new or persisted
    Ref(EntityRef),
    /// A bare persisted node id
    Id(EntityId),
}

impl From<EntityRef> for Endpoint {
    fn from(value: EntityRef) -> Self {
        Endpoint::Ref(value)
    }
}

impl From<&EntityRef> for Endpoint {
    fn from(value: &EntityRef) -> Self {
        Endpoint::Ref(value.clone())
    }
}

impl From<EntityId> for Endpoint {
    fn from(value: EntityId) -> Self {
        Endpoint::Id(value)
    }
}

impl Endpoint {
    fn into_ref(self) -> EntityRef {
        match self {
            Endpoint::Ref(entity) => entity,
            Endpoint::Id(id) => Entity::node(&[]).with_id(id).into_ref(),
        }
    }
}

/// One graph node or relationship held in memory.
///
/// Tracks a three-way diff against the hydration baseline: current data,
/// the initial snapshot, and explicitly deleted fields. The diff drives
/// lifecycle hooks; it does not narrow compiled SET clauses.
#[derive(Debug, Clone)]
pub struct Entity {
    id: Option<EntityId>,
    kind: EntityKind,
    labels: Vec<String>,
    data: PropertyMap,
    initial: PropertyMap,
    deleted: PropertyMap,
    changes: BTreeMap<String, PropertyChange>,
    start: Option<EntityRef>,
    end: Option<EntityRef>,
    query_variable: Option<String>,
}

impl Entity {
    /// Create a new, unpersisted node with the given labels.
    pub fn node(labels: &[&str]) -> Self {
        Self {
            id: None,
            kind: EntityKind::Node,
            labels: normalize_labels(labels),
            data: PropertyMap::new(),
            initial: PropertyMap::new(),
            deleted: PropertyMap::new(),
            changes: BTreeMap::new(),
            start: None,
            end: None,
            query_variable: None,
        }
    }

    /// Create a new, unpersisted relationship of the given type.
    pub fn relationship(
        rel_type: &str,
        start: Option<Endpoint>,
        end: Option<Endpoint>,
    ) -> Self {
        Self {
            id: None,
            kind: EntityKind::Relationship,
            labels: normalize_labels(&[rel_type]),
            data: PropertyMap::new(),
            initial: PropertyMap::new(),
            deleted: PropertyMap::new(),
            changes: BTreeMap::new(),
            start: start.map(Endpoint::into_ref),
            end: end.map(Endpoint::into_ref),
            query_variable: None,
        }
    }

    /// Assign a persisted identifier (builder style).
    pub fn with_id(mut self, id: EntityId) -> Self {
        self.id = Some(id);
        self
    }

    /// Hydrate with initial properties, re-baselining the diff (builder style).
    pub fn with_properties(mut self, properties: PropertyMap) -> Self {
        self.hydrate(properties, true);
        self
    }

    /// Wrap into a shared handle.
    pub fn into_ref(self) -> EntityRef {
        Rc::new(RefCell::new(self))
    }

    /// Persisted identifier, if the entity exists in storage.
    pub fn id(&self) -> Option<EntityId> {
        self.id
    }

    /// Assign the persisted identifier after execution.
    pub fn set_id(&mut self, id: Option<EntityId>) {
        self.id = id;
    }

    /// Node or relationship.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Sorted, deduplicated type labels.
    ///
    /// A relationship carries exactly one label, its type.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Replace the labels, re-normalizing (sorted, deduplicated).
    pub fn set_labels(&mut self, labels: &[&str]) {
        self.labels = normalize_labels(labels);
    }

    /// Relationship type label. Empty for untyped entities.
    pub fn rel_type(&self) -> &str {
        self.labels.first().map(String::as_str).unwrap_or("")
    }

    /// Current property data.
    pub fn data(&self) -> &PropertyMap {
        &self.data
    }

    /// Baseline snapshot taken at the last hydration.
    pub fn initial(&self) -> &PropertyMap {
        &self.initial
    }

    /// Properties explicitly removed since the baseline.
    pub fn deleted(&self) -> &PropertyMap {
        &self.deleted
    }

    /// Recorded mutations relative to the baseline.
    pub fn changes(&self) -> &BTreeMap<String, PropertyChange> {
        &self.changes
    }

    /// Start node of a relationship.
    pub fn start(&self) -> Option<EntityRef> {
        self.start.clone()
    }

    /// End node of a relationship.
    pub fn end(&self) -> Option<EntityRef> {
        self.end.clone()
    }

    /// Attach the start node.
    pub fn set_start(&mut self, start: impl Into<Endpoint>) {
        self.start = Some(start.into().into_ref());
    }

    /// Attach the end node.
    pub fn set_end(&mut self, end: impl Into<Endpoint>) {
        self.end = Some(end.into().into_ref());
    }

    /// Compilation-scoped query alias, if one is currently assigned.
    pub fn query_variable(&self) -> Option<&str> {
        self.query_variable.as_deref()
    }

    /// Assign or clear the compilation-scoped query alias.
    pub fn set_query_variable(&mut self, variable: Option<String>) {
        self.query_variable = variable;
    }

    /// Apply properties to the entity.
    ///
    /// With `reset` the property bag is replaced and the diff re-baselined:
    /// recorded changes and deletions are cleared. Without it, each key is
    /// applied as an individual [`set`](Self::set), so changes accumulate
    /// against the existing baseline.
    pub fn hydrate(&mut self, properties: PropertyMap, reset: bool) {
        if reset {
            self.initial = properties.clone();
            self.data = properties;
            self.deleted = PropertyMap::new();
            self.changes.clear();
        } else {
            for (key, value) in properties.iter() {
                self.set(key.clone(), value.clone());
            }
        }
    }

    /// Get a property value.
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.data.get(name)
    }

    /// Set a property value, recording a change entry when the field exists
    /// in the baseline and the value differs from it. Reverting a field to
    /// its baseline value removes the entry, so net-zero edits are invisible
    /// to hooks.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        let name = name.into();
        let value = value.into();

        if let Some(baseline) = self.initial.get(&name) {
            if *baseline != value {
                self.changes.insert(
                    name.clone(),
                    PropertyChange {
                        from: baseline.clone(),
                        to: value.clone(),
                    },
                );
            } else {
                self.changes.remove(&name);
            }
        }

        self.data.insert(name, value);
    }

    /// Remove a property, recording it into the deleted set.
    pub fn delete(&mut self, name: &str) {
        if let Some(value) = self.data.remove(name) {
            self.deleted.insert(name, value);
        }
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.labels == other.labels && self.data == other.data
    }
}

/// Sort and deduplicate a label list.
pub fn normalize_labels(labels: &[&str]) -> Vec<String> {
    let mut labels: Vec<String> = labels
        .iter()
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect();
    labels.sort();
    labels.dedup();
    labels
}

/// Normalized registry key for a label set.
pub fn labels_key(labels: &[String]) -> String {
    labels.join(":")
}
