//! Query variable allocation for compiled entities.
//!
//! Every entity referenced in compiled query text needs a unique, stable
//! alias (`n_0`, `r_1`, ...). The allocator is a plain value owned by each
//! unit of work's compile context, so concurrent compilations cannot
//! collide and nothing needs a process-wide reset.

use crate::entity::{EntityKind, EntityRef};

/// Per-compilation-pass allocator of entity query aliases.
#[derive(Debug, Clone, Default)]
pub struct VarAllocator {
    nodes: usize,
    rels: usize,
}

impl VarAllocator {
    /// Create a fresh allocator with both counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a query variable to the entity, minting one if needed.
    ///
    /// Idempotent: an entity that already carries a variable keeps it, and
    /// the matching counter advances past its numeric suffix so later
    /// allocations cannot collide.
    pub fn define(&mut self, entity: &EntityRef) -> String {
        if let Some(existing) = entity.borrow().query_variable() {
            let existing = existing.to_string();
            self.advance_past(&existing);
            return existing;
        }

        let kind = entity.borrow().kind();
        let variable = match kind {
            EntityKind::Node => {
                let v = format!("n_{}", self.nodes);
                self.nodes += 1;
                v
            }
            EntityKind::Relationship => {
                let v = format!("r_{}", self.rels);
                self.rels += 1;
                v
            }
        };

        entity
            .borrow_mut()
            .set_query_variable(Some(variable.clone()));
        variable
    }

    /// Zero both counters.
    pub fn reset(&mut self) {
        self.nodes = 0;
        self.rels = 0;
    }

    fn advance_past(&mut self, variable: &str) {
        let Some((prefix, suffix)) = variable.split_once('_') else {
            return;
        };
        let Ok(seq) = suffix.parse::<usize>() else {
            return;
        };

        match prefix {
            "n" if self.nodes <= seq => self.nodes = seq + 1,
            "r" if self.rels <= seq => self.rels = seq + 1,
            _ => {}
        }
    }
}
