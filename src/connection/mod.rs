//! Connection and transaction abstractions over the graph database.
//!
//! This module defines the [`Connection`] and [`Transaction`] traits plus
//! the driver-shaped record types the mapper rehydrates entities from.
//! The wire protocol itself lives outside this crate; a driver adapter
//! implements these traits and converts its native errors into
//! [`MapperError`](crate::error::MapperError). [`RecordingConnection`] is
//! an in-memory scripted implementation for tests only.

mod recording;

pub use recording::RecordingConnection;

use crate::entity::{EntityId, PropertyMap};
use crate::error::Result;
use crate::query::Params;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved field marking the entity kind in plain-map records.
///
/// Drivers that project maps instead of native graph values set this to
/// `"node"` or `"relationship"` so rehydration can infer the kind.
pub const KIND_FIELD: &str = "__cyphermap_kind__";

/// A connection to a graph database.
///
/// `run` executes a single auto-committed query; `begin` opens a
/// transaction for a unit-of-work batch.
pub trait Connection {
    /// Execute one query outside an explicit transaction.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::Connection`](crate::error::MapperError) if
    /// the query cannot be executed.
    fn run(&mut self, query: &str, params: &Params) -> Result<RawResult>;

    /// Begin a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::Connection`](crate::error::MapperError) if a
    /// transaction cannot be opened.
    fn begin(&mut self) -> Result<Box<dyn Transaction + '_>>;
}

/// An open transaction; consumed by commit or rollback.
pub trait Transaction {
    /// Execute one query inside this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::Connection`](crate::error::MapperError) if
    /// the query fails; the caller is responsible for rolling back.
    fn run(&mut self, query: &str, params: &Params) -> Result<RawResult>;

    /// Commit the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::Connection`](crate::error::MapperError) if
    /// the commit fails.
    fn commit(self: Box<Self>) -> Result<()>;

    /// Roll the transaction back, discarding every query run inside it.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::Connection`](crate::error::MapperError) if
    /// the rollback fails.
    fn rollback(self: Box<Self>) -> Result<()>;
}

/// One result row: query variable name to returned value.
pub type Row = BTreeMap<String, RawValue>;

/// Raw result of one executed query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    /// Result rows in driver order
    pub rows: Vec<Row>,
}

impl RawResult {
    /// Build a single-row result binding one variable, for scripting
    /// responses in tests.
    pub fn single(variable: impl Into<String>, value: RawValue) -> Self {
        let mut row = Row::new();
        row.insert(variable.into(), value);
        Self { rows: vec![row] }
    }

    /// Build a single-row result binding several variables.
    pub fn row(values: impl IntoIterator<Item = (String, RawValue)>) -> Self {
        Self {
            rows: vec![values.into_iter().collect()],
        }
    }
}

/// One driver-returned value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
    /// A native node record
    Node {
        /// Persisted identifier
        id: EntityId,
        /// Node labels
        labels: Vec<String>,
        /// Stored properties
        properties: PropertyMap,
    },
    /// A native relationship record
    Relationship {
        /// Persisted identifier
        id: EntityId,
        /// Start node identifier
        start: EntityId,
        /// End node identifier
        end: EntityId,
        /// Relationship type
        rel_type: String,
        /// Stored properties
        properties: PropertyMap,
    },
    /// A plain projected map; kind inferred from [`KIND_FIELD`] if present
    Map(PropertyMap),
    /// A scalar value
    Value(crate::entity::PropertyValue),
}

impl RawValue {
    /// Extract an integer from a scalar value (used for count results).
    pub fn as_int(&self) -> Option<i64> {
        match self {
            RawValue::Value(crate::entity::PropertyValue::Int(i)) => Some(*i),
            RawValue::Value(crate::entity::PropertyValue::Float(f)) => Some(*f as i64),
            _ => None,
        }
    }
}
