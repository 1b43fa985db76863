//! The unit of work: an ordered batch of pending operations executed as
//! one transaction.
//!
//! Units execute in registration order. Per unit: compile, before-hooks,
//! query execution, after-hooks with that unit's own response. Final hooks
//! run once after every unit has executed. Any failure — connection,
//! constraint, or hook — rolls the transaction back, and the work resets
//! on every exit path: variables released, entity query aliases cleared.

use crate::connection::{Connection, RawResult, Transaction};
use crate::entity::{EntityKind, EntityRef};
use crate::error::{MapperError, Result};
use crate::mapper::{GraphMapper, Operation, RelEnd, RelationshipEvent};
use crate::query::{CompiledQuery, Params, QueryCompiler, VarAllocator};
use crate::response::{id_and_properties, Response};
use crate::{mapper::Registry, query::debug_query};
use log::{debug, error, trace};
use std::rc::Rc;

/// An ordered, mutable batch of pending operations.
///
/// Owned exclusively by the caller that created it until
/// [`send`](Self::send) executes it; afterwards the work is reset and may
/// be reused or dropped.
pub struct Work<'m> {
    mapper: &'m GraphMapper,
    units: Vec<Unit>,
    vars: VarAllocator,
}

enum UnitOp {
    Save { ensure_unique: bool },
    Delete { detach: bool },
    Raw { query: String, params: Params },
}

struct Unit {
    entity: Option<EntityRef>,
    op: UnitOp,
}

impl<'m> Work<'m> {
    pub(crate) fn new(mapper: &'m GraphMapper) -> Self {
        Self {
            mapper,
            units: Vec::new(),
            vars: VarAllocator::new(),
        }
    }

    /// Number of pending units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether no units are pending.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Queue a save for the entity.
    pub fn save(&mut self, entity: &EntityRef) -> Result<()> {
        self.save_with(entity, false)
    }

    /// Queue a save, merging instead of creating when `ensure_unique` is
    /// set.
    ///
    /// Re-saving an entity already pending in this work discards the
    /// earlier unit first: at most one pending unit per entity, last
    /// write wins. Relationship endpoints are validated here so a broken
    /// save fails before anything is queued.
    pub fn save_with(&mut self, entity: &EntityRef, ensure_unique: bool) -> Result<()> {
        self.remove_entity_unit(entity);

        {
            let e = entity.borrow();
            if e.kind() == EntityKind::Relationship {
                let rel_type = e.rel_type().to_string();
                for (endpoint, which) in [(e.start(), "start"), (e.end(), "end")] {
                    let endpoint = endpoint.ok_or(MapperError::MissingEndpoint {
                        end: which,
                        rel_type: rel_type.clone(),
                    })?;
                    if endpoint.borrow().kind() != EntityKind::Node {
                        return Err(MapperError::compile(format!(
                            "the {which} of relationship `{rel_type}` must be a node"
                        )));
                    }
                }
            }
        }

        self.units.push(Unit {
            entity: Some(entity.clone()),
            op: UnitOp::Save { ensure_unique },
        });
        Ok(())
    }

    /// Queue a delete for the entity.
    ///
    /// An entity without an identifier registers no unit at all.
    pub fn delete_with(&mut self, entity: &EntityRef, detach: bool) -> Result<()> {
        if entity.borrow().id().is_none() {
            trace!("skipping delete of unidentified entity");
            return Ok(());
        }

        self.remove_entity_unit(entity);
        self.units.push(Unit {
            entity: Some(entity.clone()),
            op: UnitOp::Delete { detach },
        });
        Ok(())
    }

    /// Queue a raw, pre-built query.
    pub fn add_query(&mut self, query: impl Into<String>, params: Params) {
        self.units.push(Unit {
            entity: None,
            op: UnitOp::Raw {
                query: query.into(),
                params,
            },
        });
    }

    /// Discard any pending unit for the entity (pointer identity).
    pub fn remove_entity_unit(&mut self, entity: &EntityRef) {
        self.units.retain(|unit| {
            unit.entity
                .as_ref()
                .map(|pending| !Rc::ptr_eq(pending, entity))
                .unwrap_or(true)
        });
    }

    /// Compile every pending unit in order without executing anything.
    ///
    /// A debugging and testing surface; the work can still be sent
    /// afterwards because variable assignment is idempotent.
    pub fn queries(&mut self) -> Result<Vec<CompiledQuery>> {
        let registry = self.mapper.registry();
        let mut compiled = Vec::with_capacity(self.units.len());

        for unit in &self.units {
            if let Some(prepared) = compile_unit(registry, &mut self.vars, unit, true)? {
                compiled.push(CompiledQuery {
                    query: prepared.query,
                    params: prepared.params,
                });
            }
        }
        Ok(compiled)
    }

    /// Execute the batch inside one transaction.
    ///
    /// On success the combined response is materialized into entities.
    /// On any failure the transaction is rolled back and the error
    /// propagates. The work resets either way.
    pub fn send(&mut self, conn: &mut dyn Connection) -> Result<Response> {
        let outcome = self.execute(conn);
        self.reset();
        outcome
    }

    /// Release compilation state: clear every involved entity's query
    /// alias, zero the allocator, and drop the pending units.
    pub fn reset(&mut self) {
        for unit in &self.units {
            if let Some(entity) = &unit.entity {
                clear_variables(entity);
            }
        }
        self.units.clear();
        self.vars.reset();
    }

    fn execute(&mut self, conn: &mut dyn Connection) -> Result<Response> {
        debug!("sending unit of work: {} units", self.units.len());
        let registry = self.mapper.registry();

        let mut tx = conn.begin()?;
        let run = run_units(registry, &mut self.vars, &self.units, tx.as_mut());

        match run {
            Ok(rows) => {
                tx.commit()?;
                Response::from_result(registry, rows)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    error!("rollback failed after batch error: {rollback_err}");
                }
                Err(err)
            }
        }
    }
}

fn run_units(
    registry: &Registry,
    vars: &mut VarAllocator,
    units: &[Unit],
    tx: &mut dyn Transaction,
) -> Result<RawResult> {
    let mut collected = RawResult::default();
    let mut finals: Vec<EntityRef> = Vec::new();

    for unit in units {
        let Some(prepared) = compile_unit(registry, vars, unit, false)? else {
            continue;
        };

        for event in &prepared.before {
            run_before(registry, event)?;
        }

        trace!("unit query: {}", debug_query(&prepared.query, &prepared.params));
        let result = tx
            .run(&prepared.query, &prepared.params)
            .map_err(translate_constraint)?;

        for event in &prepared.after {
            run_after(registry, event, &result)?;
        }

        finals.extend(prepared.finals);
        collected.rows.extend(result.rows);
    }

    for entity in &finals {
        let hooks = registry.mapper_for(&entity.borrow()).hooks();
        for hook in &hooks.finals {
            hook(entity)?;
        }
    }

    Ok(collected)
}

struct PreparedUnit {
    query: String,
    params: Params,
    before: Vec<Event>,
    after: Vec<Event>,
    finals: Vec<EntityRef>,
}

enum Event {
    Before { entity: EntityRef, op: Operation },
    Refresh { entity: EntityRef },
    PropertyChanges { entity: EntityRef },
    After { entity: EntityRef, op: Operation },
    RelationshipAdded { relationship: EntityRef },
    RelationshipUpdated { relationship: EntityRef },
    RelationshipRemoved { relationship: EntityRef },
}

/// Compile one unit into query text plus its event pipeline.
///
/// When a new relationship is compiled, its endpoints' before-hooks run
/// immediately (their mutations are visible to the compiled query) and
/// their after-pipelines are prepended to the unit's, start before end.
/// `dry_run` skips the endpoint before-hooks so [`Work::queries`] stays
/// side-effect free.
fn compile_unit(
    registry: &Registry,
    vars: &mut VarAllocator,
    unit: &Unit,
    dry_run: bool,
) -> Result<Option<PreparedUnit>> {
    match &unit.op {
        UnitOp::Raw { query, params } => Ok(Some(PreparedUnit {
            query: query.clone(),
            params: params.clone(),
            before: Vec::new(),
            after: Vec::new(),
            finals: Vec::new(),
        })),
        UnitOp::Delete { detach } => {
            let entity = unit.entity.as_ref().ok_or_else(|| {
                MapperError::compile("delete unit without an entity")
            })?;

            let compiled =
                QueryCompiler::new(registry, vars).compile_delete(&[entity.clone()], *detach)?;
            let Some(compiled) = compiled else {
                return Ok(None);
            };

            let is_rel = entity.borrow().kind() == EntityKind::Relationship;
            let mut after = Vec::new();
            if is_rel {
                after.push(Event::RelationshipRemoved {
                    relationship: entity.clone(),
                });
            }
            after.push(Event::After {
                entity: entity.clone(),
                op: Operation::Delete,
            });

            Ok(Some(PreparedUnit {
                query: compiled.query,
                params: compiled.params,
                before: vec![Event::Before {
                    entity: entity.clone(),
                    op: Operation::Delete,
                }],
                after,
                finals: vec![entity.clone()],
            }))
        }
        UnitOp::Save { ensure_unique } => {
            let entity = unit.entity.as_ref().ok_or_else(|| {
                MapperError::compile("save unit without an entity")
            })?;

            let (kind, is_new) = {
                let e = entity.borrow();
                (e.kind(), e.id().is_none())
            };
            let op = if is_new {
                Operation::Create
            } else {
                Operation::Update
            };

            let mut after = Vec::new();
            let mut finals = Vec::new();

            if kind == EntityKind::Relationship && is_new {
                let (start, end) = {
                    let e = entity.borrow();
                    (e.start(), e.end())
                };
                let rel_type = entity.borrow().rel_type().to_string();
                let start = start.ok_or(MapperError::MissingEndpoint {
                    end: "start",
                    rel_type: rel_type.clone(),
                })?;
                let end = end.ok_or(MapperError::MissingEndpoint {
                    end: "end",
                    rel_type,
                })?;

                for endpoint in [&start, &end] {
                    let ep_op = if endpoint.borrow().id().is_some() {
                        Operation::Update
                    } else {
                        Operation::Create
                    };

                    if !dry_run {
                        run_before(
                            registry,
                            &Event::Before {
                                entity: endpoint.clone(),
                                op: ep_op,
                            },
                        )?;
                    }
                    after.extend(after_pipeline(endpoint, ep_op, EntityKind::Node));
                    finals.push(endpoint.clone());
                }
            }

            after.extend(after_pipeline(entity, op, kind));
            finals.push(entity.clone());

            let compiled =
                QueryCompiler::new(registry, vars).compile_save(&[entity.clone()], *ensure_unique)?;

            Ok(Some(PreparedUnit {
                query: compiled.query,
                params: compiled.params,
                before: vec![Event::Before {
                    entity: entity.clone(),
                    op,
                }],
                after,
                finals,
            }))
        }
    }
}

/// After-event pipeline for one entity and operation.
///
/// Create: refresh, (relationship-added), own after hooks. Update:
/// property-change dispatch, (relationship-updated), refresh, own after
/// hooks.
fn after_pipeline(entity: &EntityRef, op: Operation, kind: EntityKind) -> Vec<Event> {
    let mut events = Vec::with_capacity(4);

    match op {
        Operation::Create => {
            events.push(Event::Refresh {
                entity: entity.clone(),
            });
            if kind == EntityKind::Relationship {
                events.push(Event::RelationshipAdded {
                    relationship: entity.clone(),
                });
            }
            events.push(Event::After {
                entity: entity.clone(),
                op,
            });
        }
        Operation::Update => {
            events.push(Event::PropertyChanges {
                entity: entity.clone(),
            });
            if kind == EntityKind::Relationship {
                events.push(Event::RelationshipUpdated {
                    relationship: entity.clone(),
                });
            }
            events.push(Event::Refresh {
                entity: entity.clone(),
            });
            events.push(Event::After {
                entity: entity.clone(),
                op,
            });
        }
        Operation::Delete => {
            events.push(Event::After {
                entity: entity.clone(),
                op,
            });
        }
    }

    events
}

fn run_before(registry: &Registry, event: &Event) -> Result<()> {
    let Event::Before { entity, op } = event else {
        return Ok(());
    };

    let hooks = registry.mapper_for(&entity.borrow()).hooks();
    for hook in hooks.before(*op) {
        hook(entity)?;
    }
    Ok(())
}

fn run_after(registry: &Registry, event: &Event, result: &RawResult) -> Result<()> {
    match event {
        Event::Before { .. } => Ok(()),
        Event::Refresh { entity } => {
            refresh_entity(entity, result);
            Ok(())
        }
        Event::PropertyChanges { entity } => {
            let changes: Vec<_> = entity
                .borrow()
                .changes()
                .iter()
                .map(|(field, change)| (field.clone(), change.clone()))
                .collect();

            let hooks = registry.mapper_for(&entity.borrow()).hooks();
            for (field, change) in &changes {
                for hook in hooks.property_changed(field) {
                    hook(entity, field, &change.from, &change.to)?;
                }
            }
            Ok(())
        }
        Event::After { entity, op } => {
            let hooks = registry.mapper_for(&entity.borrow()).hooks();
            for hook in hooks.after(*op) {
                hook(entity, result)?;
            }
            Ok(())
        }
        Event::RelationshipAdded { relationship } => {
            run_relationship_added(registry, relationship)
        }
        Event::RelationshipUpdated { relationship } => {
            let hooks = registry.mapper_for(&relationship.borrow()).hooks();
            let event = RelationshipEvent {
                entity: relationship.clone(),
                relationship: relationship.clone(),
                end: None,
            };
            for hook in &hooks.relationship_updated {
                hook(&event)?;
            }
            Ok(())
        }
        Event::RelationshipRemoved { relationship } => {
            let hooks = registry.mapper_for(&relationship.borrow()).hooks();
            let event = RelationshipEvent {
                entity: relationship.clone(),
                relationship: relationship.clone(),
                end: None,
            };
            for hook in &hooks.relationship_removed {
                hook(&event)?;
            }
            Ok(())
        }
    }
}

/// The relationship-added cascade: the start node's mapper first, then
/// the end node's, then the relationship's own mapper.
fn run_relationship_added(registry: &Registry, relationship: &EntityRef) -> Result<()> {
    let (start, end, rel_type) = {
        let r = relationship.borrow();
        (r.start(), r.end(), r.rel_type().to_string())
    };

    let cascades = [(start, RelEnd::Start), (end, RelEnd::End)];
    for (endpoint, rel_end) in cascades {
        let Some(endpoint) = endpoint else {
            continue;
        };

        let hooks = registry.mapper_for(&endpoint.borrow()).hooks();
        let event = RelationshipEvent {
            entity: endpoint.clone(),
            relationship: relationship.clone(),
            end: Some(rel_end),
        };
        for hook in hooks.relationship_added(&rel_type) {
            hook(&event)?;
        }
    }

    let hooks = registry.mapper_for(&relationship.borrow()).hooks();
    let event = RelationshipEvent {
        entity: relationship.clone(),
        relationship: relationship.clone(),
        end: None,
    };
    for hook in hooks.relationship_added(&rel_type) {
        hook(&event)?;
    }
    Ok(())
}

/// Merge a unit's response back into an entity: find its own query
/// variable in the rows, take the persisted id, re-baseline the diff, and
/// release the variable.
fn refresh_entity(entity: &EntityRef, result: &RawResult) {
    let Some(variable) = entity.borrow().query_variable().map(str::to_string) else {
        return;
    };

    for row in &result.rows {
        let Some(value) = row.get(&variable) else {
            continue;
        };
        let Some((id, properties)) = id_and_properties(value) else {
            continue;
        };

        let mut e = entity.borrow_mut();
        e.set_id(Some(id));
        e.hydrate(properties, true);
        e.set_query_variable(None);
        return;
    }
}

/// Clear the query aliases of an entity and its endpoints.
fn clear_variables(entity: &EntityRef) {
    let (start, end) = {
        let e = entity.borrow();
        (e.start(), e.end())
    };

    entity.borrow_mut().set_query_variable(None);
    if let Some(start) = start {
        start.borrow_mut().set_query_variable(None);
    }
    if let Some(end) = end {
        end.borrow_mut().set_query_variable(None);
    }
}

/// Translate a storage constraint violation into
/// [`MapperError::Constraint`], passing every other error through.
fn translate_constraint(err: MapperError) -> MapperError {
    let MapperError::Connection { message, source } = err else {
        return err;
    };

    if let Some((label, field, value)) = parse_constraint(&message) {
        return MapperError::Constraint {
            label,
            field,
            value,
        };
    }
    MapperError::Connection { message, source }
}

/// Parse the storage engine's constraint message shape:
/// `` Node(123) already exists with label `User` and property `email` = 'a@b.c' ``.
fn parse_constraint(message: &str) -> Option<(String, String, String)> {
    let (_, rest) = message.split_once("already exists with label `")?;
    let (label, rest) = rest.split_once('`')?;
    let (_, rest) = rest.split_once("property `")?;
    let (field, rest) = rest.split_once('`')?;
    let (_, rest) = rest.split_once('\'')?;
    let (value, _) = rest.rsplit_once('\'')?;

    Some((label.to_string(), field.to_string(), value.to_string()))
}
