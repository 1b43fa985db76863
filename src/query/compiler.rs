//! Compilation of entity save/delete operations into Cypher text.
//!
//! One compiler instance produces one textual query plus a flat parameter
//! table from one or more pending entities. Clause grouping is a hard
//! contract: hoisted endpoint-upsert blocks, then all MATCH clauses in
//! insertion order, then CREATE, MERGE, ON CREATE SET, ON MATCH SET, SET,
//! and finally one RETURN listing every participating variable.

use super::variable::VarAllocator;
use crate::entity::{EntityKind, EntityRef, PropertyValue};
use crate::error::{MapperError, Result};
use crate::mapper::Registry;
use log::debug;
use std::collections::BTreeMap;

/// Flat parameter table for one compiled query.
pub type Params = BTreeMap<String, PropertyValue>;

/// One compiled query with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    /// The query text
    pub query: String,
    /// Placeholder name to literal value
    pub params: Params,
}

/// Compiler for a batch of save or delete operations.
///
/// Borrows the variable allocator of the owning unit of work so that
/// entity aliases stay stable across every query compiled in the same
/// pass.
pub struct QueryCompiler<'a> {
    registry: &'a Registry,
    vars: &'a mut VarAllocator,
    params: Params,
    hoisted: Vec<String>,
    matches: Vec<String>,
    creates: Vec<String>,
    merges: Vec<String>,
    on_create_sets: Vec<String>,
    on_match_sets: Vec<String>,
    sets: Vec<String>,
    deletes: Vec<String>,
    returns: Vec<String>,
    matched: Vec<EntityRef>,
}

impl<'a> QueryCompiler<'a> {
    /// Create a compiler bound to the registry and a compile pass's
    /// variable allocator.
    pub fn new(registry: &'a Registry, vars: &'a mut VarAllocator) -> Self {
        Self {
            registry,
            vars,
            params: Params::new(),
            hoisted: Vec::new(),
            matches: Vec::new(),
            creates: Vec::new(),
            merges: Vec::new(),
            on_create_sets: Vec::new(),
            on_match_sets: Vec::new(),
            sets: Vec::new(),
            deletes: Vec::new(),
            returns: Vec::new(),
            matched: Vec::new(),
        }
    }

    /// Compile pending saves for the given entities into one query.
    pub fn compile_save(
        mut self,
        entities: &[EntityRef],
        ensure_unique: bool,
    ) -> Result<CompiledQuery> {
        for entity in entities {
            let (kind, exists) = {
                let e = entity.borrow();
                (e.kind(), e.id().is_some())
            };

            match kind {
                EntityKind::Node if exists => self.update_node(entity)?,
                EntityKind::Node => self.create_node(entity)?,
                EntityKind::Relationship => self.save_relationship(entity, ensure_unique)?,
            }
        }

        Ok(self.render_save())
    }

    /// Compile pending deletes for the given entities into one query.
    ///
    /// Unidentified entities are skipped silently; if nothing remains, no
    /// query is produced at all. Detach is forced off as soon as the batch
    /// contains a relationship delete.
    pub fn compile_delete(
        mut self,
        entities: &[EntityRef],
        detach: bool,
    ) -> Result<Option<CompiledQuery>> {
        let mut any_rel = false;

        for entity in entities {
            let (kind, id) = {
                let e = entity.borrow();
                (e.kind(), e.id())
            };
            let Some(id) = id else {
                continue;
            };

            match kind {
                EntityKind::Node => self.delete_node(entity, id),
                EntityKind::Relationship => {
                    self.delete_relationship(entity, id);
                    any_rel = true;
                }
            }
        }

        if self.deletes.is_empty() {
            return Ok(None);
        }

        Ok(Some(self.render_delete(detach && !any_rel)))
    }

    fn create_node(&mut self, entity: &EntityRef) -> Result<()> {
        let var = self.vars.define(entity);
        let labels = entity.borrow().labels().to_vec();
        let has_unique = !self.registry.mapper_for(&entity.borrow()).unique_fields().is_empty();

        if has_unique {
            let unique_props = self.properties(entity, true)?;
            let pattern = node_pattern(&var, &labels, &unique_props);
            self.merges.push(pattern);

            let full = self.properties(entity, false)?;
            for (field, param) in &full {
                let stmt = format!("{var}.`{field}` = ${param}");
                self.on_create_sets.push(stmt.clone());
                self.on_match_sets.push(stmt);
            }
        } else {
            let props = self.properties(entity, false)?;
            self.creates.push(node_pattern(&var, &labels, &props));
        }

        self.returns.push(var);
        Ok(())
    }

    fn update_node(&mut self, entity: &EntityRef) -> Result<()> {
        let var = self.vars.define(entity);

        self.update_properties(entity)?;
        let clause = self.node_by_id(entity)?;
        self.matches.push(clause);
        self.returns.push(var);
        Ok(())
    }

    fn save_relationship(&mut self, entity: &EntityRef, ensure_unique: bool) -> Result<()> {
        let (start, end, rel_type, id) = {
            let e = entity.borrow();
            (e.start(), e.end(), e.rel_type().to_string(), e.id())
        };

        let start = start.ok_or_else(|| MapperError::MissingEndpoint {
            end: "start",
            rel_type: rel_type.clone(),
        })?;
        let end = end.ok_or_else(|| MapperError::MissingEndpoint {
            end: "end",
            rel_type: rel_type.clone(),
        })?;

        for (endpoint, which) in [(&start, "start"), (&end, "end")] {
            if endpoint.borrow().kind() != EntityKind::Node {
                return Err(MapperError::compile(format!(
                    "the {which} of relationship `{rel_type}` must be a node"
                )));
            }
        }

        let rel_var = self.vars.define(entity);
        let start_ref = self.resolve_endpoint(&start)?;
        let end_ref = self.resolve_endpoint(&end)?;

        match id {
            None => {
                let props = self.properties(entity, false)?;
                let clause = format!(
                    "{start_ref}-[{rel_var}:`{rel_type}`{}]->{end_ref}",
                    props_text(&props)
                );

                if ensure_unique {
                    self.merges.push(clause);
                } else {
                    self.creates.push(clause);
                }
            }
            Some(id) => {
                let id_param =
                    bind_param(&mut self.params, &rel_var, "id", PropertyValue::Int(id));
                self.matches.push(format!(
                    "{start_ref}-[{rel_var}:`{rel_type}`]->{end_ref} WHERE id({rel_var}) = ${id_param}"
                ));
                self.update_properties(entity)?;
            }
        }

        self.returns.push(rel_var);
        Ok(())
    }

    /// Resolve one relationship endpoint to the pattern text that the
    /// relationship clause should embed.
    ///
    /// Already-matched endpoints reuse their clause; identified endpoints
    /// get a match-by-id clause; brand-new endpoints are inlined, or
    /// hoisted into a standalone upsert block when they carry
    /// unique-constrained fields.
    fn resolve_endpoint(&mut self, endpoint: &EntityRef) -> Result<String> {
        let var = self.vars.define(endpoint);

        if self.matched.iter().any(|m| std::rc::Rc::ptr_eq(m, endpoint)) {
            return Ok(format!("({var})"));
        }
        self.matched.push(endpoint.clone());

        if endpoint.borrow().id().is_some() {
            self.update_properties(endpoint)?;
            let clause = self.node_by_id(endpoint)?;
            self.matches.push(clause);
            self.returns.push(var.clone());
            return Ok(format!("({var})"));
        }

        let labels = endpoint.borrow().labels().to_vec();
        let has_unique = !self
            .registry
            .mapper_for(&endpoint.borrow())
            .unique_fields()
            .is_empty();

        if has_unique {
            let unique_props = self.properties(endpoint, true)?;
            let pattern = node_pattern(&var, &labels, &unique_props);
            let full = self.properties(endpoint, false)?;
            let set_list: Vec<String> = full
                .iter()
                .map(|(field, param)| format!("{var}.`{field}` = ${param}"))
                .collect();
            let set_list = set_list.join(", ");

            self.hoisted.push(format!(
                "MERGE {pattern} ON CREATE SET {set_list} ON MATCH SET {set_list}"
            ));
            self.returns.push(var.clone());
            return Ok(format!("({var})"));
        }

        let props = self.properties(endpoint, false)?;
        self.returns.push(var.clone());
        Ok(node_pattern(&var, &labels, &props))
    }

    fn delete_node(&mut self, entity: &EntityRef, id: i64) {
        let var = self.vars.define(entity);
        let id_param = bind_param(&mut self.params, &var, "id", PropertyValue::Int(id));

        self.matches
            .push(format!("({var}) WHERE id({var}) = ${id_param}"));
        self.deletes.push(var);
    }

    fn delete_relationship(&mut self, entity: &EntityRef, id: i64) {
        let var = self.vars.define(entity);
        let id_param = bind_param(&mut self.params, &var, "id", PropertyValue::Int(id));

        self.matches
            .push(format!("()-[{var}]-() WHERE id({var}) = ${id_param}"));
        self.deletes.push(var);
    }

    /// Bind the entity's wire-form property data, returning field/param
    /// name pairs in sorted field order.
    fn properties(
        &mut self,
        entity: &EntityRef,
        unique_only: bool,
    ) -> Result<Vec<(String, String)>> {
        let var = self.vars.define(entity);
        let data = {
            let e = entity.borrow();
            let mapper = self.registry.mapper_for(&e);
            mapper.wire_data(&e, unique_only)?
        };

        let mut bound = Vec::with_capacity(data.len());
        for (field, value) in data.iter() {
            let param = bind_param(&mut self.params, &var, field, value.clone());
            bound.push((field.clone(), param));
        }
        Ok(bound)
    }

    fn update_properties(&mut self, entity: &EntityRef) -> Result<()> {
        let var = self.vars.define(entity);
        let props = self.properties(entity, false)?;

        for (field, param) in &props {
            self.sets.push(format!("{var}.`{field}` = ${param}"));
        }
        Ok(())
    }

    fn node_by_id(&mut self, entity: &EntityRef) -> Result<String> {
        let var = self.vars.define(entity);
        let id = entity.borrow().id().ok_or_else(|| {
            MapperError::compile(format!("entity `{var}` has no identifier to match on"))
        })?;
        let id_param = bind_param(&mut self.params, &var, "id", PropertyValue::Int(id));

        Ok(format!("({var}) WHERE id({var}) = ${id_param}"))
    }

    fn render_save(self) -> CompiledQuery {
        let mut parts = self.hoisted;

        for m in &self.matches {
            parts.push(format!("MATCH {m}"));
        }
        if !self.creates.is_empty() {
            parts.push(format!("CREATE {}", self.creates.join(", ")));
        }
        if !self.merges.is_empty() {
            parts.push(format!("MERGE {}", self.merges.join(", ")));
        }
        if !self.on_create_sets.is_empty() {
            parts.push(format!("ON CREATE SET {}", self.on_create_sets.join(", ")));
        }
        if !self.on_match_sets.is_empty() {
            parts.push(format!("ON MATCH SET {}", self.on_match_sets.join(", ")));
        }
        if !self.sets.is_empty() {
            parts.push(format!("SET {}", self.sets.join(", ")));
        }
        parts.push(format!("RETURN {}", self.returns.join(", ")));

        let query = parts.join(" ");
        debug!("compiled save: {}", debug_query(&query, &self.params));

        CompiledQuery {
            query,
            params: self.params,
        }
    }

    fn render_delete(self, detach: bool) -> CompiledQuery {
        let mut parts = Vec::with_capacity(self.matches.len() + 1);

        for m in &self.matches {
            parts.push(format!("MATCH {m}"));
        }
        let keyword = if detach { "DETACH DELETE" } else { "DELETE" };
        parts.push(format!("{keyword} {}", self.deletes.join(", ")));

        let query = parts.join(" ");
        debug!("compiled delete: {}", debug_query(&query, &self.params));

        CompiledQuery {
            query,
            params: self.params,
        }
    }
}

/// Lowercase a field name and strip every non-alphanumeric character, for
/// embedding in parameter names.
pub(crate) fn normalize(field: &str) -> String {
    field
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Bind a value into the parameter table under
/// `{var}_{normalized_field}_{ordinal}`.
///
/// Re-binding an identical (variable, field, value) triple reuses the
/// existing name; the ordinal only advances on genuine collisions.
pub(crate) fn bind_param(
    params: &mut Params,
    var: &str,
    field: &str,
    value: PropertyValue,
) -> String {
    let base = format!("{}_{}", var, normalize(field));
    let mut ordinal = 0;

    let name = loop {
        let candidate = format!("{base}_{ordinal}");
        match params.get(&candidate) {
            None => break candidate,
            Some(existing) if *existing == value => return candidate,
            Some(_) => ordinal += 1,
        }
    };

    params.insert(name.clone(), value);
    name
}

/// Render a node pattern: `(var:`Label` {`field`: $param, ...})`.
fn node_pattern(var: &str, labels: &[String], props: &[(String, String)]) -> String {
    let labels_text: String = labels.iter().map(|l| format!(":`{l}`")).collect();
    format!("({var}{labels_text}{})", props_text(props))
}

fn props_text(props: &[(String, String)]) -> String {
    if props.is_empty() {
        return String::new();
    }
    let inner: Vec<String> = props
        .iter()
        .map(|(field, param)| format!("`{field}`: ${param}"))
        .collect();
    format!(" {{{}}}", inner.join(", "))
}

/// Substitute parameter values into query text for logging.
///
/// Debugging aid only; the substituted text is never sent to a connection.
pub fn debug_query(query: &str, params: &Params) -> String {
    let mut names: Vec<&String> = params.keys().collect();
    names.sort_by_key(|n| std::cmp::Reverse(n.len()));

    let mut text = query.to_string();
    for name in names {
        if let Some(value) = params.get(name) {
            text = text.replace(&format!("${name}"), &value.debug_text());
        }
    }
    text
}
