//! Materialization of driver records back into entities.
//!
//! Rows map query variables to [`RawValue`]s; each graph-shaped value is
//! rebuilt into a hydrated entity through the registry so it carries its
//! type's defaults and coercions. Plain maps infer their kind from the
//! reserved [`KIND_FIELD`] marker.

use crate::connection::{RawResult, RawValue, KIND_FIELD};
use crate::entity::{Endpoint, Entity, EntityId, EntityRef, PropertyMap, PropertyValue};
use crate::error::Result;
use crate::mapper::Registry;
use crate::schema::Representation;

/// Entities materialized from one or more executed queries.
#[derive(Debug)]
pub struct Response {
    entities: Vec<EntityRef>,
    raw: RawResult,
}

impl Response {
    /// Materialize every graph-shaped value in the result.
    ///
    /// Scalar values are skipped here but remain accessible through
    /// [`raw`](Self::raw).
    pub fn from_result(registry: &Registry, raw: RawResult) -> Result<Self> {
        let mut entities = Vec::new();

        for row in &raw.rows {
            for value in row.values() {
                if let Some(entity) = entity_from_raw(registry, value)? {
                    entities.push(entity);
                }
            }
        }

        Ok(Self { entities, raw })
    }

    /// The materialized entities, in row order.
    pub fn entities(&self) -> &[EntityRef] {
        &self.entities
    }

    /// The first materialized entity, if any.
    pub fn first(&self) -> Option<EntityRef> {
        self.entities.first().cloned()
    }

    /// Number of materialized entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether nothing was materialized.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// The underlying raw result, including scalar values.
    pub fn raw(&self) -> &RawResult {
        &self.raw
    }
}

/// Rebuild one entity from a driver value, if it is graph-shaped.
pub(crate) fn entity_from_raw(
    registry: &Registry,
    value: &RawValue,
) -> Result<Option<EntityRef>> {
    match value {
        RawValue::Node {
            id,
            labels,
            properties,
        } => {
            let label_refs: Vec<&str> = labels.iter().map(String::as_str).collect();
            let entity = Entity::node(&label_refs).with_id(*id);
            Ok(Some(hydrated(registry, entity, properties)?))
        }
        RawValue::Relationship {
            id,
            start,
            end,
            rel_type,
            properties,
        } => {
            let entity = Entity::relationship(
                rel_type,
                Some(Endpoint::Id(*start)),
                Some(Endpoint::Id(*end)),
            )
            .with_id(*id);
            Ok(Some(hydrated(registry, entity, properties)?))
        }
        RawValue::Map(map) => {
            let (kind, id, labels, properties) = split_map(map);
            let label_refs: Vec<&str> = labels.iter().map(String::as_str).collect();

            let mut entity = match kind {
                MapKind::Relationship => Entity::relationship(
                    label_refs.first().copied().unwrap_or(""),
                    None,
                    None,
                ),
                MapKind::Node => Entity::node(&label_refs),
            };
            if let Some(id) = id {
                entity = entity.with_id(id);
            }
            Ok(Some(hydrated(registry, entity, &properties)?))
        }
        RawValue::Value(_) => Ok(None),
    }
}

/// Extract the persisted id and stored properties of a graph-shaped value.
///
/// Used by the unit of work to refresh entities from their own response.
pub(crate) fn id_and_properties(value: &RawValue) -> Option<(EntityId, PropertyMap)> {
    match value {
        RawValue::Node { id, properties, .. } => Some((*id, properties.clone())),
        RawValue::Relationship { id, properties, .. } => Some((*id, properties.clone())),
        RawValue::Map(map) => {
            let (_, id, _, properties) = split_map(map);
            id.map(|id| (id, properties))
        }
        RawValue::Value(_) => None,
    }
}

enum MapKind {
    Node,
    Relationship,
}

fn split_map(map: &PropertyMap) -> (MapKind, Option<EntityId>, Vec<String>, PropertyMap) {
    let kind = match map.get_string(KIND_FIELD) {
        Some("relationship") => MapKind::Relationship,
        _ => MapKind::Node,
    };
    let id = map.get_int("id");

    let labels = match map.get("labels") {
        Some(PropertyValue::List(items)) => items
            .iter()
            .filter_map(|v| match v {
                PropertyValue::String(s) => Some(s.clone()),
                _ => None,
            })
            .collect(),
        Some(PropertyValue::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    };

    let mut properties = map.clone();
    properties.remove(KIND_FIELD);
    properties.remove("id");
    properties.remove("labels");

    (kind, id, labels, properties)
}

fn hydrated(
    registry: &Registry,
    entity: Entity,
    properties: &PropertyMap,
) -> Result<EntityRef> {
    let data = registry
        .mapper_for(&entity)
        .entity_data(properties, Representation::Native, false, None)?;
    Ok(entity.with_properties(data).into_ref())
}
