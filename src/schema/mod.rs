//! Property schemas: descriptor sets, composition, and data resolution.
//!
//! A [`Schema`] is the set of property descriptors an entity type declares.
//! Schemas are merged through an explicit composition list with documented
//! precedence: later definitions override earlier, most-derived wins.

mod property;

pub use property::{DefaultValue, PropertyDef, PropertyKind, Representation};

use crate::entity::{PropertyMap, PropertyValue};
use crate::error::Result;
use std::collections::BTreeMap;

/// Ordered field-name to descriptor map for one entity type.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: BTreeMap<String, PropertyDef>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field (builder style). Redeclaring a name overrides the
    /// earlier definition.
    pub fn field(mut self, name: impl Into<String>, def: PropertyDef) -> Self {
        self.fields.insert(name.into(), def);
        self
    }

    /// Merge another schema into this one; the other schema's definitions
    /// win on conflict.
    pub fn merge(&mut self, other: &Schema) {
        for (name, def) in &other.fields {
            self.fields.insert(name.clone(), def.clone());
        }
    }

    /// Look up a declared descriptor.
    pub fn get(&self, name: &str) -> Option<&PropertyDef> {
        self.fields.get(name)
    }

    /// Iterate declared fields in sorted name order.
    pub fn fields(&self) -> impl Iterator<Item = (&String, &PropertyDef)> {
        self.fields.iter()
    }

    /// Number of declared fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema declares no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Names of unique-constrained fields, in sorted order.
    ///
    /// Sort order is load-bearing: it determines deterministic clause text
    /// for upsert compilation.
    pub fn unique_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, def)| def.is_unique())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Resolve an entity's property data against this schema.
    ///
    /// Declared fields are defaulted when absent, then every field is
    /// coerced into the requested representation. Undefined fields are
    /// accepted with inferred descriptors only when `allow_undefined` is
    /// set, and dropped otherwise. Immutable fields keep their baseline
    /// value once one exists; options whitelists reject non-members back
    /// to the baseline or default.
    pub fn entity_data(
        &self,
        data: &PropertyMap,
        rep: Representation,
        unique_only: bool,
        allow_undefined: bool,
        baseline: Option<&PropertyMap>,
    ) -> Result<PropertyMap> {
        let mut merged = PropertyMap::new();

        for (name, def) in &self.fields {
            merged.insert(name.clone(), def.default_raw());
        }

        for (name, value) in data.iter() {
            merged.insert(name.clone(), value.clone());
        }

        let mut resolved = PropertyMap::new();
        let null = PropertyValue::Null;

        for (name, value) in merged.iter() {
            let inferred;
            let def = match self.fields.get(name) {
                Some(def) => def,
                None if allow_undefined => {
                    inferred = PropertyDef::infer(value);
                    &inferred
                }
                None => continue,
            };

            if unique_only && !def.is_unique() {
                continue;
            }

            let base = baseline.and_then(|b| b.get(name));
            let mut effective = value;

            if def.is_immutable() {
                if let Some(base) = base {
                    effective = base;
                }
            }

            if !def.accepts(effective) {
                effective = match base {
                    Some(base) if def.accepts(base) => base,
                    _ => &null,
                };
            }

            let coerced = def.coerce(name, Some(effective), rep)?;
            resolved.insert(name.clone(), coerced);
        }

        Ok(resolved)
    }
}
