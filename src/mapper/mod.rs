//! Entity type configuration, the mapper registry, and the graph facade.
//!
//! An [`EntityMapper`] is the per-type configuration: its schema (built
//! from an explicit composition list), declared relationships, the
//! undefined-field policy, and the lifecycle hook table. The [`Registry`]
//! holds one mapper per label set plus generic fallbacks. [`GraphMapper`]
//! is the operation surface consumed by controllers and commands; no
//! caller constructs compiled query text directly.

mod hooks;

pub use hooks::{
    AfterHook, Hooks, LifecycleHook, Operation, PropertyChangedHook, RelEnd, RelationshipEvent,
    RelationshipHook,
};

use crate::connection::Connection;
use crate::entity::{
    labels_key, normalize_labels, Direction, Endpoint, Entity, EntityId, EntityKind, EntityRef,
    PropertyMap, PropertyValue,
};
use crate::error::{MapperError, Result};
use crate::query::{by_id_query, by_ids_query, QueryBuilder, RelatedQuery};
use crate::response::Response;
use crate::schema::{PropertyDef, Representation, Schema};
use crate::work::Work;
use log::debug;
use std::collections::BTreeMap;

/// Declared relationship of an entity type.
#[derive(Debug, Clone)]
pub struct RelationshipDef {
    /// Relationship type label
    pub rel_type: String,
    /// Traversal direction from the declaring type
    pub direction: Direction,
    /// Whether saves through this definition merge instead of create
    pub ensure_unique: bool,
}

impl RelationshipDef {
    /// Declare an outgoing, non-unique relationship of the given type.
    pub fn new(rel_type: impl Into<String>) -> Self {
        Self {
            rel_type: rel_type.into(),
            direction: Direction::Outgoing,
            ensure_unique: false,
        }
    }

    /// Set the traversal direction.
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Enforce uniqueness when saving through this definition.
    pub fn unique(mut self) -> Self {
        self.ensure_unique = true;
        self
    }
}

/// Per-type configuration: schema, relationships, policy, hooks.
pub struct EntityMapper {
    kind: EntityKind,
    labels: Vec<String>,
    schema: Schema,
    relationships: BTreeMap<String, RelationshipDef>,
    allow_undefined: bool,
    hooks: Hooks,
}

impl EntityMapper {
    /// Start building a node mapper for the given labels.
    pub fn node(labels: &[&str]) -> EntityMapperBuilder {
        EntityMapperBuilder::new(EntityKind::Node, normalize_labels(labels))
    }

    /// Start building a relationship mapper for the given type.
    pub fn relationship(rel_type: &str) -> EntityMapperBuilder {
        EntityMapperBuilder::new(EntityKind::Relationship, normalize_labels(&[rel_type]))
    }

    /// The entity kind this mapper configures.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// The labels this mapper is registered under.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// The property schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Whether undefined properties are tolerated.
    pub fn allow_undefined(&self) -> bool {
        self.allow_undefined
    }

    /// Unique-constrained field names, sorted.
    pub fn unique_fields(&self) -> Vec<&str> {
        self.schema.unique_fields()
    }

    /// Look up a declared relationship by name.
    pub fn relationship_def(&self, name: &str) -> Option<&RelationshipDef> {
        self.relationships.get(name)
    }

    pub(crate) fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Resolve property data against this mapper's schema and policy.
    pub fn entity_data(
        &self,
        data: &PropertyMap,
        rep: Representation,
        unique_only: bool,
        baseline: Option<&PropertyMap>,
    ) -> Result<PropertyMap> {
        self.schema
            .entity_data(data, rep, unique_only, self.allow_undefined, baseline)
    }

    /// Wire-form data for an entity, defaulted and coerced for parameter
    /// binding.
    pub(crate) fn wire_data(&self, entity: &Entity, unique_only: bool) -> Result<PropertyMap> {
        self.entity_data(
            entity.data(),
            Representation::Wire,
            unique_only,
            Some(entity.initial()),
        )
    }
}

/// Builder for [`EntityMapper`] configuration.
pub struct EntityMapperBuilder {
    kind: EntityKind,
    labels: Vec<String>,
    schema: Schema,
    relationships: BTreeMap<String, RelationshipDef>,
    allow_undefined: bool,
    hooks: Hooks,
}

impl EntityMapperBuilder {
    fn new(kind: EntityKind, labels: Vec<String>) -> Self {
        Self {
            kind,
            labels,
            schema: Schema::new(),
            relationships: BTreeMap::new(),
            allow_undefined: true,
            hooks: Hooks::default(),
        }
    }

    /// Merge a base schema into this mapper's schema.
    ///
    /// Composition replaces inheritance: call once per base in order;
    /// later definitions override earlier ones and fields declared with
    /// [`property`](Self::property) afterwards win over every base.
    pub fn compose(mut self, base: &Schema) -> Self {
        self.schema.merge(base);
        self
    }

    /// Declare one property.
    pub fn property(mut self, name: impl Into<String>, def: PropertyDef) -> Self {
        self.schema = self.schema.field(name, def);
        self
    }

    /// Declare one named relationship.
    pub fn relationship(mut self, name: impl Into<String>, def: RelationshipDef) -> Self {
        self.relationships.insert(name.into(), def);
        self
    }

    /// Whether undefined properties are accepted (default) or dropped.
    pub fn allow_undefined(mut self, allow: bool) -> Self {
        self.allow_undefined = allow;
        self
    }

    /// Register a hook to run before entities of this type are created.
    pub fn on_before_create(mut self, hook: impl Fn(&EntityRef) -> Result<()> + 'static) -> Self {
        self.hooks.before_create.push(Box::new(hook));
        self
    }

    /// Register a hook to run after entities of this type are created.
    pub fn on_after_create(
        mut self,
        hook: impl Fn(&EntityRef, &crate::connection::RawResult) -> Result<()> + 'static,
    ) -> Self {
        self.hooks.after_create.push(Box::new(hook));
        self
    }

    /// Register a hook to run before entities of this type are updated.
    pub fn on_before_update(mut self, hook: impl Fn(&EntityRef) -> Result<()> + 'static) -> Self {
        self.hooks.before_update.push(Box::new(hook));
        self
    }

    /// Register a hook to run after entities of this type are updated.
    pub fn on_after_update(
        mut self,
        hook: impl Fn(&EntityRef, &crate::connection::RawResult) -> Result<()> + 'static,
    ) -> Self {
        self.hooks.after_update.push(Box::new(hook));
        self
    }

    /// Register a hook to run before entities of this type are deleted.
    pub fn on_before_delete(mut self, hook: impl Fn(&EntityRef) -> Result<()> + 'static) -> Self {
        self.hooks.before_delete.push(Box::new(hook));
        self
    }

    /// Register a hook to run after entities of this type are deleted.
    pub fn on_after_delete(
        mut self,
        hook: impl Fn(&EntityRef, &crate::connection::RawResult) -> Result<()> + 'static,
    ) -> Self {
        self.hooks.after_delete.push(Box::new(hook));
        self
    }

    /// Register a hook to run once after a whole batch completes.
    pub fn on_final(mut self, hook: impl Fn(&EntityRef) -> Result<()> + 'static) -> Self {
        self.hooks.finals.push(Box::new(hook));
        self
    }

    /// Register a handler for recorded changes of one field.
    ///
    /// Runs during the update after-pipeline with the field name and both
    /// old and new values. This is how cross-cutting side effects are
    /// declared without touching CRUD call sites.
    pub fn on_property_changed(
        mut self,
        field: impl Into<String>,
        hook: impl Fn(&EntityRef, &str, &PropertyValue, &PropertyValue) -> Result<()> + 'static,
    ) -> Self {
        self.hooks
            .property_changed
            .entry(field.into())
            .or_default()
            .push(Box::new(hook));
        self
    }

    /// Register a handler fired when a relationship of the given type is
    /// added touching entities of this type.
    pub fn on_relationship_added(
        mut self,
        rel_type: impl Into<String>,
        hook: impl Fn(&RelationshipEvent) -> Result<()> + 'static,
    ) -> Self {
        self.hooks
            .relationship_added
            .entry(rel_type.into())
            .or_default()
            .push(Box::new(hook));
        self
    }

    /// Register a handler fired when relationships of this mapper's type
    /// are updated.
    pub fn on_relationship_updated(
        mut self,
        hook: impl Fn(&RelationshipEvent) -> Result<()> + 'static,
    ) -> Self {
        self.hooks.relationship_updated.push(Box::new(hook));
        self
    }

    /// Register a handler fired when relationships of this mapper's type
    /// are removed.
    pub fn on_relationship_removed(
        mut self,
        hook: impl Fn(&RelationshipEvent) -> Result<()> + 'static,
    ) -> Self {
        self.hooks.relationship_removed.push(Box::new(hook));
        self
    }

    /// Finish building the mapper.
    pub fn build(self) -> EntityMapper {
        EntityMapper {
            kind: self.kind,
            labels: self.labels,
            schema: self.schema,
            relationships: self.relationships,
            allow_undefined: self.allow_undefined,
            hooks: self.hooks,
        }
    }
}

/// Label-keyed mapper registry with generic fallbacks.
///
/// Read-only after construction; safe to share across operations because
/// mappers hold no per-operation state.
pub struct Registry {
    mappers: BTreeMap<String, EntityMapper>,
    generic_node: EntityMapper,
    generic_relationship: EntityMapper,
}

impl Registry {
    /// Create a registry containing only the generic fallbacks.
    pub fn new() -> Self {
        Self {
            mappers: BTreeMap::new(),
            generic_node: EntityMapper::node(&[]).build(),
            generic_relationship: EntityMapper::relationship("").build(),
        }
    }

    /// Register a mapper under its normalized label key.
    ///
    /// A later registration for the same labels replaces the earlier one.
    pub fn register(&mut self, mapper: EntityMapper) {
        let key = labels_key(mapper.labels());
        debug!("registering mapper for `{key}`");
        self.mappers.insert(key, mapper);
    }

    /// Mapper for an entity, falling back to the generic mapper of its
    /// kind.
    pub fn mapper_for(&self, entity: &Entity) -> &EntityMapper {
        self.lookup(entity.labels(), entity.kind())
    }

    /// Mapper for a label set and kind, falling back to the generic
    /// mapper of that kind.
    pub fn mapper_for_labels(&self, labels: &[String], kind: EntityKind) -> &EntityMapper {
        self.lookup(labels, kind)
    }

    /// Registered mapper for exactly this label key, if any.
    pub fn get(&self, key: &str) -> Option<&EntityMapper> {
        self.mappers.get(key)
    }

    fn lookup(&self, labels: &[String], kind: EntityKind) -> &EntityMapper {
        let key = labels_key(labels);
        self.mappers.get(&key).unwrap_or(match kind {
            EntityKind::Node => &self.generic_node,
            EntityKind::Relationship => &self.generic_relationship,
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// The operation surface over a mapper registry.
///
/// Controllers and commands obtain entities here, mutate them, and hand
/// them to a [`Work`] for batched execution. This type is the only entry
/// point the CRUD layer is allowed to call.
pub struct GraphMapper {
    registry: Registry,
}

impl GraphMapper {
    /// Create a facade over the given registry.
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Open a new, empty unit of work.
    pub fn work(&self) -> Work<'_> {
        Work::new(self)
    }

    /// Build a defaulted node entity of the given type.
    ///
    /// A property named `id` is treated as the persisted identifier, not
    /// as data. Undefined properties are kept or dropped per the type's
    /// policy.
    pub fn node(&self, labels: &[&str], properties: PropertyMap) -> Result<EntityRef> {
        let (id, properties) = split_id(properties);
        let labels = normalize_labels(labels);
        let mapper = self.registry.mapper_for_labels(&labels, EntityKind::Node);
        let data = mapper.entity_data(&properties, Representation::Native, false, None)?;

        let label_refs: Vec<&str> = labels.iter().map(String::as_str).collect();
        let mut entity = Entity::node(&label_refs).with_properties(data);
        entity.set_id(id);
        Ok(entity.into_ref())
    }

    /// Build a defaulted relationship entity between two endpoints.
    pub fn relationship(
        &self,
        rel_type: &str,
        properties: PropertyMap,
        start: impl Into<Endpoint>,
        end: impl Into<Endpoint>,
    ) -> Result<EntityRef> {
        let (id, properties) = split_id(properties);
        let labels = normalize_labels(&[rel_type]);
        let mapper = self
            .registry
            .mapper_for_labels(&labels, EntityKind::Relationship);
        let data = mapper.entity_data(&properties, Representation::Native, false, None)?;

        let mut entity =
            Entity::relationship(rel_type, Some(start.into()), Some(end.into()))
                .with_properties(data);
        entity.set_id(id);
        Ok(entity.into_ref())
    }

    /// Register a save for the entity into the work.
    ///
    /// Compiles nothing yet; the work executes on
    /// [`send`](crate::work::Work::send). Re-saving an entity already
    /// pending in the same work replaces its earlier unit.
    pub fn save(
        &self,
        entity: &EntityRef,
        ensure_unique: bool,
        work: &mut Work<'_>,
    ) -> Result<()> {
        work.save_with(entity, ensure_unique)
    }

    /// Register a delete for the entity into the work.
    ///
    /// Entities without an identifier register nothing.
    pub fn delete(&self, entity: &EntityRef, detach: bool, work: &mut Work<'_>) -> Result<()> {
        work.delete_with(entity, detach)
    }

    /// Load one entity by persisted identifier.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::MultipleResults`] if the lookup is
    /// ambiguous.
    pub fn get_by_id(
        &self,
        conn: &mut dyn Connection,
        kind: EntityKind,
        labels: &[&str],
        id: EntityId,
    ) -> Result<Option<EntityRef>> {
        let compiled = by_id_query(kind, &normalize_labels(labels), id);
        debug!("get_by_id: {}", compiled.query);

        let result = conn.run(&compiled.query, &compiled.params)?;
        let response = Response::from_result(&self.registry, result)?;

        if response.len() > 1 {
            return Err(MapperError::MultipleResults { id });
        }
        Ok(response.first())
    }

    /// Load entities by persisted identifiers.
    pub fn get_by_ids(
        &self,
        conn: &mut dyn Connection,
        kind: EntityKind,
        labels: &[&str],
        ids: &[EntityId],
    ) -> Result<Response> {
        let compiled = by_ids_query(kind, &normalize_labels(labels), ids);
        debug!("get_by_ids: {}", compiled.query);

        let result = conn.run(&compiled.query, &compiled.params)?;
        Response::from_result(&self.registry, result)
    }

    /// Start a fluent query over a node type.
    pub fn query(&self, labels: &[&str]) -> QueryBuilder<'_> {
        QueryBuilder::new(self, normalize_labels(labels))
    }

    /// Start a related-entity query from a start node through one of its
    /// type's declared relationships.
    ///
    /// The start entity is an explicit argument; no operation context is
    /// stashed anywhere.
    pub fn related(&self, start: &EntityRef, name: &str) -> Result<RelatedQuery<'_>> {
        let def = {
            let e = start.borrow();
            let mapper = self.registry.mapper_for(&e);
            mapper.relationship_def(name).cloned()
        };

        let def = def.ok_or_else(|| {
            MapperError::compile(format!("no relationship `{name}` declared for start entity"))
        })?;
        Ok(RelatedQuery::new(self, def, start.clone()))
    }

    /// Reload an identified entity from storage and re-baseline it.
    pub fn refresh(&self, conn: &mut dyn Connection, entity: &EntityRef) -> Result<()> {
        let (kind, labels, id) = {
            let e = entity.borrow();
            (e.kind(), e.labels().to_vec(), e.id())
        };
        let Some(id) = id else {
            return Ok(());
        };

        let label_refs: Vec<&str> = labels.iter().map(String::as_str).collect();
        if let Some(fresh) = self.get_by_id(conn, kind, &label_refs, id)? {
            let data = fresh.borrow().data().clone();
            entity.borrow_mut().hydrate(data, true);
        }
        Ok(())
    }
}

fn split_id(mut properties: PropertyMap) -> (Option<EntityId>, PropertyMap) {
    let id = match properties.remove("id") {
        Some(PropertyValue::Int(id)) => Some(id),
        Some(other) => {
            properties.insert("id", other);
            None
        }
        None => None,
    };
    (id, properties)
}
