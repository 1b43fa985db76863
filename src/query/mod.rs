//! Query compilation: variable allocation, the operation compiler, the
//! fluent builder, and related-entity traversal.

mod builder;
mod compiler;
mod related;
mod variable;

pub use builder::{by_id_query, by_ids_query, Order, QueryBuilder};
pub use compiler::{debug_query, CompiledQuery, Params, QueryCompiler};
pub use related::RelatedQuery;
pub use variable::VarAllocator;
