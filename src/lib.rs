//! # cyphermap
//!
//! An object-graph mapper core that compiles entity operations into
//! parameterized Cypher queries and executes them as transactional
//! batches.
//!
//! ## Core Principles
//!
//! - **Driver Agnostic**: the wire protocol lives behind the
//!   [`Connection`] trait; this crate only produces Cypher-shaped text
//! - **Precise Change Tracking**: entities carry a three-way diff that
//!   drives selective lifecycle hooks, not partial updates
//! - **No Hidden State**: query-variable allocation and operation context
//!   are owned by each unit of work, never process-wide
//! - **Explicit Hooks**: lifecycle handlers are registered by name at
//!   mapper construction, no runtime reflection
//!
//! ## Architecture
//!
//! ```text
//! Controllers / commands
//!     ↓
//! GraphMapper (create, save, delete, get_by_id, query, related)
//!     ↓
//! Work (ordered units, one transaction, hook pipeline)
//!     ↓
//! QueryCompiler (entities → Cypher text + parameters)
//!     ↓
//! Connection (driver adapter, external)
//! ```
//!
//! ## Example
//!
//! ```
//! use cyphermap::{
//!     EntityMapper, GraphMapper, PropertyDef, PropertyMap, RecordingConnection, Registry,
//! };
//!
//! # fn main() -> cyphermap::Result<()> {
//! let mut registry = Registry::new();
//! registry.register(
//!     EntityMapper::node(&["User"])
//!         .property("username", PropertyDef::string().unique())
//!         .property("date_created", PropertyDef::timestamp())
//!         .build(),
//! );
//!
//! let mapper = GraphMapper::new(registry);
//! let user = mapper.node(&["User"], PropertyMap::new().with("username", "mark"))?;
//!
//! let mut work = mapper.work();
//! work.save(&user)?;
//!
//! // A real driver adapter would execute this against the database.
//! let mut conn = RecordingConnection::new();
//! work.send(&mut conn)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod entity;
pub mod error;
pub mod mapper;
pub mod query;
pub mod response;
pub mod schema;
pub mod work;

// Re-export main types
pub use connection::{Connection, RawResult, RawValue, RecordingConnection, Transaction, KIND_FIELD};
pub use entity::{
    Direction, Endpoint, Entity, EntityId, EntityKind, EntityRef, PropertyChange, PropertyMap,
    PropertyValue,
};
pub use error::{MapperError, Result};
pub use mapper::{
    EntityMapper, EntityMapperBuilder, GraphMapper, Operation, Registry, RelEnd, RelationshipDef,
    RelationshipEvent,
};
pub use query::{CompiledQuery, Order, Params, QueryBuilder, QueryCompiler, RelatedQuery, VarAllocator};
pub use response::Response;
pub use schema::{PropertyDef, PropertyKind, Representation, Schema};
pub use work::Work;
