//! Relationship traversal queries from an explicit start entity.
//!
//! A [`RelatedQuery`] is built by
//! [`GraphMapper::related`](crate::mapper::GraphMapper::related) from a
//! declared [`RelationshipDef`](crate::mapper::RelationshipDef). The start
//! entity travels as a constructor argument, never as state stashed on a
//! shared mapper.

use super::compiler::{bind_param, CompiledQuery, Params};
use crate::connection::Connection;
use crate::entity::{Direction, EntityRef, PropertyMap, PropertyValue};
use crate::error::Result;
use crate::mapper::{GraphMapper, RelationshipDef};
use crate::response::Response;
use crate::work::Work;
use log::debug;

/// Traversal query over one declared relationship of a start entity.
pub struct RelatedQuery<'m> {
    mapper: &'m GraphMapper,
    def: RelationshipDef,
    start: EntityRef,
    skip: Option<u64>,
    limit: Option<u64>,
}

impl<'m> RelatedQuery<'m> {
    pub(crate) fn new(mapper: &'m GraphMapper, def: RelationshipDef, start: EntityRef) -> Self {
        Self {
            mapper,
            def,
            start,
            skip: None,
            limit: None,
        }
    }

    /// The relationship definition this query traverses.
    pub fn definition(&self) -> &RelationshipDef {
        &self.def
    }

    /// Skip the first `n` results.
    pub fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    /// Limit the number of results.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Compile the traversal without executing it.
    ///
    /// Returns the end nodes unless `return_relationship` asks for the
    /// relationships themselves.
    pub fn compile(&self, return_relationship: bool) -> CompiledQuery {
        let start_var = "n_0";
        let rel_var = "r_0";
        let end_var = "n_1";

        let rel_type = &self.def.rel_type;
        let arrow = match self.def.direction {
            Direction::Outgoing => format!("-[{rel_var}:`{rel_type}`]->"),
            Direction::Incoming => format!("<-[{rel_var}:`{rel_type}`]-"),
            Direction::Both => format!("-[{rel_var}:`{rel_type}`]-"),
        };

        let (start_id, labels) = {
            let s = self.start.borrow();
            (s.id(), s.labels().to_vec())
        };

        let mut params = Params::new();
        let start_pattern = if start_id.is_some() {
            format!("({start_var})")
        } else {
            let labels_text: String = labels.iter().map(|l| format!(":`{l}`")).collect();
            format!("({start_var}{labels_text})")
        };

        let mut query = format!("MATCH {start_pattern}{arrow}({end_var})");

        if let Some(id) = start_id {
            let id_param = bind_param(&mut params, start_var, "id", PropertyValue::Int(id));
            query.push_str(&format!(" WHERE id({start_var}) = ${id_param}"));
        }

        let returned = if return_relationship { rel_var } else { end_var };
        query.push_str(&format!(" RETURN {returned}"));

        if let Some(skip) = self.skip {
            query.push_str(&format!(" SKIP {skip}"));
        }
        if let Some(limit) = self.limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }

        CompiledQuery { query, params }
    }

    /// Fetch the related end nodes.
    pub fn fetch(&self, conn: &mut dyn Connection) -> Result<Response> {
        self.run(conn, false)
    }

    /// Fetch the relationship entities themselves.
    pub fn fetch_relationships(&self, conn: &mut dyn Connection) -> Result<Response> {
        self.run(conn, true)
    }

    /// Build (but do not queue) a relationship entity from the start to
    /// the given end node.
    pub fn connect(&self, end: &EntityRef, properties: PropertyMap) -> Result<EntityRef> {
        self.mapper
            .relationship(&self.def.rel_type, properties, &self.start, end)
    }

    /// Connect to the end node and queue the save into the work.
    ///
    /// Uniqueness follows the relationship definition.
    pub fn add(
        &self,
        work: &mut Work<'_>,
        end: &EntityRef,
        properties: PropertyMap,
    ) -> Result<EntityRef> {
        let relationship = self.connect(end, properties)?;
        work.save_with(&relationship, self.def.ensure_unique)?;
        Ok(relationship)
    }

    /// Queue the removal of one existing relationship into the work.
    pub fn remove(&self, work: &mut Work<'_>, relationship: &EntityRef) -> Result<()> {
        work.delete_with(relationship, false)
    }

    /// Replace every existing relationship with connections to the given
    /// end nodes: existing relationships are queued for deletion, then
    /// one add per end node.
    pub fn replace(
        &self,
        conn: &mut dyn Connection,
        work: &mut Work<'_>,
        ends: &[EntityRef],
    ) -> Result<()> {
        if self.start.borrow().id().is_some() {
            let existing = self.fetch_relationships(conn)?;
            for relationship in existing.entities() {
                self.remove(work, relationship)?;
            }
        }

        for end in ends {
            self.add(work, end, PropertyMap::new())?;
        }
        Ok(())
    }

    fn run(&self, conn: &mut dyn Connection, return_relationship: bool) -> Result<Response> {
        let compiled = self.compile(return_relationship);
        debug!("related fetch: {}", compiled.query);

        let result = conn.run(&compiled.query, &compiled.params)?;
        Response::from_result(self.mapper.registry(), result)
    }
}
