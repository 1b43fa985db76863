//! In-memory entity model: nodes, relationships, properties, change tracking.

mod property;
mod types;

pub use property::{PropertyMap, PropertyValue};
pub use types::{
    labels_key, normalize_labels, Direction, Endpoint, Entity, EntityId, EntityKind, EntityRef,
    PropertyChange,
};
