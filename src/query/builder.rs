//! Fluent query builder for finding entities.
//!
//! Compiles equality filters, ordering, and paging into a `MATCH … WHERE …
//! RETURN` query against a registered entity type, plus the id-lookup
//! query shapes used by [`GraphMapper::get_by_id`] and
//! [`GraphMapper::get_by_ids`].
//!
//! [`GraphMapper::get_by_id`]: crate::mapper::GraphMapper::get_by_id
//! [`GraphMapper::get_by_ids`]: crate::mapper::GraphMapper::get_by_ids

use super::compiler::{bind_param, CompiledQuery, Params};
use super::variable::VarAllocator;
use crate::connection::Connection;
use crate::entity::{Entity, EntityId, EntityKind, PropertyValue};
use crate::error::Result;
use crate::mapper::GraphMapper;
use crate::response::Response;
use crate::schema::Representation;
use log::debug;

/// Sort direction for [`QueryBuilder::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Ascending
    Asc,
    /// Descending
    Desc,
}

impl Order {
    fn keyword(self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

/// Fluent query builder scoped to one entity type.
///
/// # Examples
///
/// ```no_run
/// # use cyphermap::{GraphMapper, Registry, RecordingConnection, Order};
/// # fn example(mapper: &GraphMapper, conn: &mut RecordingConnection) -> cyphermap::Result<()> {
/// let verified = mapper
///     .query(&["User"])
///     .filter("verified", true)
///     .order_by("username", Order::Asc)
///     .limit(20)
///     .fetch(conn)?;
/// # Ok(())
/// # }
/// ```
pub struct QueryBuilder<'m> {
    mapper: &'m GraphMapper,
    labels: Vec<String>,
    filters: Vec<(String, PropertyValue)>,
    orders: Vec<(String, Order)>,
    skip: Option<u64>,
    limit: Option<u64>,
}

impl<'m> QueryBuilder<'m> {
    /// Create a builder for the given labels.
    pub fn new(mapper: &'m GraphMapper, labels: Vec<String>) -> Self {
        Self {
            mapper,
            labels,
            filters: Vec::new(),
            orders: Vec::new(),
            skip: None,
            limit: None,
        }
    }

    /// Filter by exact property match.
    pub fn filter(mut self, field: &str, value: impl Into<PropertyValue>) -> Self {
        self.filters.push((field.to_string(), value.into()));
        self
    }

    /// Order results by a property.
    pub fn order_by(mut self, field: &str, order: Order) -> Self {
        self.orders.push((field.to_string(), order));
        self
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

    /// Compile the query without executing it.
    pub fn compile(&self) -> Result<CompiledQuery> {
        self.compile_returning(ReturnMode::Entities)
    }

    /// Execute the query and materialize matching entities.
    pub fn fetch(&self, conn: &mut dyn Connection) -> Result<Response> {
        let compiled = self.compile()?;
        debug!("fetch: {}", compiled.query);
        let result = conn.run(&compiled.query, &compiled.params)?;
        Response::from_result(self.mapper.registry(), result)
    }

    /// Count matching entities without materializing them.
    pub fn count(&self, conn: &mut dyn Connection) -> Result<u64> {
        let compiled = self.compile_returning(ReturnMode::Count)?;
        let result = conn.run(&compiled.query, &compiled.params)?;

        let count = result
            .rows
            .first()
            .and_then(|row| row.values().next())
            .and_then(|value| value.as_int())
            .unwrap_or(0);
        Ok(count.max(0) as u64)
    }

    /// Check whether any entity matches (short-circuits with `LIMIT 1`).
    pub fn exists(&self, conn: &mut dyn Connection) -> Result<bool> {
        let compiled = self.compile_returning(ReturnMode::Exists)?;
        let result = conn.run(&compiled.query, &compiled.params)?;
        Ok(!result.rows.is_empty())
    }

    fn compile_returning(&self, mode: ReturnMode) -> Result<CompiledQuery> {
        let mut vars = VarAllocator::new();
        let label_refs: Vec<&str> = self.labels.iter().map(String::as_str).collect();
        let entity = Entity::node(&label_refs).into_ref();
        let var = vars.define(&entity);

        let schema = self
            .mapper
            .registry()
            .mapper_for_labels(&self.labels, EntityKind::Node)
            .schema();

        let mut params = Params::new();
        let mut wheres = Vec::with_capacity(self.filters.len());

        for (field, value) in &self.filters {
            let wire = match schema.get(field) {
                Some(def) => def.coerce(field, Some(value), Representation::Wire)?,
                None => value.clone(),
            };
            let param = bind_param(&mut params, &var, field, wire);
            wheres.push(format!("{var}.`{field}` = ${param}"));
        }

        let mut query = format!("MATCH {}", node_match(&var, &self.labels));
        if !wheres.is_empty() {
            query.push_str(&format!(" WHERE {}", wheres.join(" AND ")));
        }

        match mode {
            ReturnMode::Count => query.push_str(&format!(" RETURN count({var})")),
            _ => query.push_str(&format!(" RETURN {var}")),
        }

        match mode {
            ReturnMode::Entities => {
                if !self.orders.is_empty() {
                    let parts: Vec<String> = self
                        .orders
                        .iter()
                        .map(|(field, order)| format!("{var}.`{field}` {}", order.keyword()))
                        .collect();
                    query.push_str(&format!(" ORDER BY {}", parts.join(", ")));
                }
                if let Some(skip) = self.skip {
                    query.push_str(&format!(" SKIP {skip}"));
                }
                if let Some(limit) = self.limit {
                    query.push_str(&format!(" LIMIT {limit}"));
                }
            }
            ReturnMode::Exists => query.push_str(" LIMIT 1"),
            ReturnMode::Count => {}
        }

        Ok(CompiledQuery { query, params })
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ReturnMode {
    Entities,
    Count,
    Exists,
}

/// Compile the canonical lookup-by-id query for an entity type.
pub fn by_id_query(kind: EntityKind, labels: &[String], id: EntityId) -> CompiledQuery {
    let mut params = Params::new();

    match kind {
        EntityKind::Node => {
            let var = "n_0";
            let id_param = bind_param(&mut params, var, "id", PropertyValue::Int(id));
            CompiledQuery {
                query: format!(
                    "MATCH {} WHERE id({var}) = ${id_param} RETURN DISTINCT {var}",
                    node_match(var, labels)
                ),
                params,
            }
        }
        EntityKind::Relationship => {
            let var = "r_0";
            let id_param = bind_param(&mut params, var, "id", PropertyValue::Int(id));
            CompiledQuery {
                query: format!(
                    "MATCH ()-[{var}{}]-() WHERE id({var}) = ${id_param} RETURN DISTINCT {var}",
                    labels_text(labels)
                ),
                params,
            }
        }
    }
}

/// Compile the canonical lookup-by-ids query for an entity type.
pub fn by_ids_query(kind: EntityKind, labels: &[String], ids: &[EntityId]) -> CompiledQuery {
    let mut params = Params::new();
    let id_list = PropertyValue::List(ids.iter().map(|id| PropertyValue::Int(*id)).collect());

    match kind {
        EntityKind::Node => {
            let var = "n_0";
            let ids_param = bind_param(&mut params, var, "ids", id_list);
            CompiledQuery {
                query: format!(
                    "MATCH {} WHERE id({var}) IN ${ids_param} RETURN {var}",
                    node_match(var, labels)
                ),
                params,
            }
        }
        EntityKind::Relationship => {
            let var = "r_0";
            let ids_param = bind_param(&mut params, var, "ids", id_list);
            CompiledQuery {
                query: format!(
                    "MATCH ()-[{var}{}]-() WHERE id({var}) IN ${ids_param} RETURN {var}",
                    labels_text(labels)
                ),
                params,
            }
        }
    }
}

fn labels_text(labels: &[String]) -> String {
    labels.iter().map(|l| format!(":`{l}`")).collect()
}

fn node_match(var: &str, labels: &[String]) -> String {
    format!("({var}{})", labels_text(labels))
}
