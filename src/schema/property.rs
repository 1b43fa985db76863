//! Typed property descriptors: defaults, coercion, uniqueness, immutability.
//!
//! A descriptor is a stateless contract for one named field across all
//! instances of an entity type. Every kind defines a native-form and a
//! wire-form coercion; coercion never fails except for date/datetime parse
//! failures, which surface as [`MapperError::Validation`] — date errors are
//! user-input errors, not storage-layer noise.

use crate::entity::PropertyValue;
use crate::error::{MapperError, Result};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Which representation a coercion should produce.
///
/// Native values are what application code reads; wire values are what the
/// compiler binds into query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    /// In-memory form (datetimes as datetimes, JSON as documents)
    Native,
    /// Query-parameter form (datetimes as epoch floats, JSON as text)
    Wire,
}

/// The value kind a descriptor enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// UTF-8 text; invalid input coerces to `""`
    Text,
    /// 64-bit integer; invalid input coerces to `0`
    Integer,
    /// Integer that increments by one on every wire-form read, for
    /// allocating sequence numbers at compile time
    Increment,
    /// 64-bit float; invalid input coerces to `0.0`
    Float,
    /// Boolean; string forms `"true"`/`"false"` are parsed, other input
    /// coerces by truthiness
    Boolean,
    /// Point in time; wire form is epoch seconds, parse failures are
    /// validation errors
    DateTime,
    /// JSON document; wire form is serialized text
    Json,
    /// No coercion; values pass through unchanged (used for fields
    /// synthesized under the allow-undefined policy)
    Any,
}

/// Default value resolution for a descriptor.
#[derive(Debug, Clone)]
pub enum DefaultValue {
    /// No default; the kind's zero value applies
    None,
    /// A fixed default
    Static(PropertyValue),
    /// A default computed at resolution time
    Computed(fn() -> PropertyValue),
}

/// Typed contract for one named field.
#[derive(Debug, Clone)]
pub struct PropertyDef {
    kind: PropertyKind,
    default: DefaultValue,
    immutable: bool,
    ensure_unique: bool,
    options: Vec<PropertyValue>,
    undefined: bool,
}

impl PropertyDef {
    fn new(kind: PropertyKind) -> Self {
        Self {
            kind,
            default: DefaultValue::None,
            immutable: false,
            ensure_unique: false,
            options: Vec::new(),
            undefined: false,
        }
    }

    /// Text field.
    pub fn string() -> Self {
        Self::new(PropertyKind::Text)
    }

    /// Integer field.
    pub fn integer() -> Self {
        Self::new(PropertyKind::Integer)
    }

    /// Auto-incrementing integer field; every wire-form read yields the
    /// stored value plus one.
    pub fn increment() -> Self {
        Self::new(PropertyKind::Increment)
    }

    /// Float field.
    pub fn float() -> Self {
        Self::new(PropertyKind::Float)
    }

    /// Boolean field.
    pub fn boolean() -> Self {
        Self::new(PropertyKind::Boolean)
    }

    /// Datetime field.
    pub fn datetime() -> Self {
        Self::new(PropertyKind::DateTime)
    }

    /// Creation timestamp: a datetime that defaults to now and rejects
    /// later changes.
    pub fn timestamp() -> Self {
        Self::new(PropertyKind::DateTime)
            .computed(|| PropertyValue::DateTime(OffsetDateTime::now_utc()))
            .immutable()
    }

    /// JSON document field.
    pub fn json() -> Self {
        Self::new(PropertyKind::Json)
    }

    /// Pass-through field without coercion.
    pub fn any() -> Self {
        Self::new(PropertyKind::Any)
    }

    /// Synthesize a descriptor for an undefined field from a concrete value.
    pub fn infer(value: &PropertyValue) -> Self {
        let mut def = match value {
            PropertyValue::String(_) => Self::string(),
            PropertyValue::Int(_) => Self::integer(),
            PropertyValue::Float(_) => Self::float(),
            PropertyValue::Bool(_) => Self::boolean(),
            PropertyValue::DateTime(_) => Self::datetime(),
            PropertyValue::Json(_) => Self::json(),
            _ => Self::any(),
        };
        def.undefined = true;
        def
    }

    /// Mark the field as participating in uniqueness-based upsert.
    pub fn unique(mut self) -> Self {
        self.ensure_unique = true;
        self
    }

    /// Reject value changes once a baseline value exists.
    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    /// Set a fixed default value.
    pub fn default_value(mut self, value: impl Into<PropertyValue>) -> Self {
        self.default = DefaultValue::Static(value.into());
        self
    }

    /// Set a lazily computed default value.
    pub fn computed(mut self, default: fn() -> PropertyValue) -> Self {
        self.default = DefaultValue::Computed(default);
        self
    }

    /// Restrict accepted values to a whitelist.
    pub fn options(mut self, options: impl IntoIterator<Item = PropertyValue>) -> Self {
        self.options = options.into_iter().collect();
        self
    }

    /// Whether this field drives upsert-by-match.
    pub fn is_unique(&self) -> bool {
        self.ensure_unique
    }

    /// Whether this field rejects changes to an established value.
    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    /// Whether this descriptor was synthesized for an undefined field.
    pub fn is_undefined(&self) -> bool {
        self.undefined
    }

    /// Whether the candidate value passes the options whitelist.
    pub fn accepts(&self, value: &PropertyValue) -> bool {
        self.options.is_empty() || self.options.contains(value)
    }

    /// Resolve the raw default: static value, computed value, or null.
    pub fn default_raw(&self) -> PropertyValue {
        match &self.default {
            DefaultValue::None => PropertyValue::Null,
            DefaultValue::Static(value) => value.clone(),
            DefaultValue::Computed(f) => f(),
        }
    }

    /// Coerce a raw value into this field's representation.
    ///
    /// A missing or null value resolves through the default first. Only
    /// [`PropertyKind::DateTime`] can fail.
    pub fn coerce(
        &self,
        field: &str,
        value: Option<&PropertyValue>,
        rep: Representation,
    ) -> Result<PropertyValue> {
        let raw = match value {
            None | Some(PropertyValue::Null) => self.default_raw(),
            Some(value) => value.clone(),
        };

        match self.kind {
            PropertyKind::Text => Ok(coerce_text(&raw)),
            PropertyKind::Integer => Ok(PropertyValue::Int(coerce_int(&raw))),
            PropertyKind::Increment => {
                let n = coerce_int(&raw);
                Ok(PropertyValue::Int(match rep {
                    Representation::Native => n,
                    Representation::Wire => n + 1,
                }))
            }
            PropertyKind::Float => Ok(PropertyValue::Float(coerce_float(&raw))),
            PropertyKind::Boolean => Ok(PropertyValue::Bool(coerce_bool(&raw))),
            PropertyKind::DateTime => coerce_datetime(field, &raw, rep),
            PropertyKind::Json => Ok(coerce_json(&raw, rep)),
            PropertyKind::Any => Ok(raw),
        }
    }
}

fn coerce_text(raw: &PropertyValue) -> PropertyValue {
    let text = match raw {
        PropertyValue::Null => String::new(),
        PropertyValue::String(s) => s.clone(),
        PropertyValue::Int(i) => i.to_string(),
        PropertyValue::Float(f) => f.to_string(),
        PropertyValue::Bool(b) => b.to_string(),
        PropertyValue::DateTime(dt) => dt.format(&Rfc3339).unwrap_or_default(),
        PropertyValue::Json(v) => v.to_string(),
        PropertyValue::List(_) => json_text(raw),
    };
    PropertyValue::String(text)
}

fn coerce_int(raw: &PropertyValue) -> i64 {
    match raw {
        PropertyValue::Int(i) => *i,
        PropertyValue::Float(f) => *f as i64,
        PropertyValue::String(s) => s.trim().parse::<f64>().map(|f| f as i64).unwrap_or(0),
        PropertyValue::Bool(b) => i64::from(*b),
        PropertyValue::DateTime(dt) => dt.unix_timestamp(),
        _ => 0,
    }
}

fn coerce_float(raw: &PropertyValue) -> f64 {
    match raw {
        PropertyValue::Float(f) => *f,
        PropertyValue::Int(i) => *i as f64,
        PropertyValue::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        PropertyValue::Bool(b) => f64::from(u8::from(*b)),
        PropertyValue::DateTime(dt) => epoch_seconds(*dt),
        _ => 0.0,
    }
}

fn coerce_bool(raw: &PropertyValue) -> bool {
    match raw {
        PropertyValue::Bool(b) => *b,
        PropertyValue::String(s) => match s.trim().to_lowercase().as_str() {
            "true" => true,
            "false" | "" => false,
            _ => true,
        },
        PropertyValue::Int(i) => *i != 0,
        PropertyValue::Float(f) => *f != 0.0,
        PropertyValue::Null => false,
        PropertyValue::Json(v) => !matches!(v, serde_json::Value::Null),
        PropertyValue::List(l) => !l.is_empty(),
        PropertyValue::DateTime(_) => true,
    }
}

fn coerce_datetime(field: &str, raw: &PropertyValue, rep: Representation) -> Result<PropertyValue> {
    let parsed = match raw {
        PropertyValue::DateTime(dt) => *dt,
        PropertyValue::Null => OffsetDateTime::UNIX_EPOCH,
        PropertyValue::Int(i) => {
            OffsetDateTime::from_unix_timestamp(*i).map_err(|e| MapperError::Validation {
                field: field.to_string(),
                message: e.to_string(),
            })?
        }
        PropertyValue::Float(f) => OffsetDateTime::from_unix_timestamp(*f as i64).map_err(|e| {
            MapperError::Validation {
                field: field.to_string(),
                message: e.to_string(),
            }
        })?,
        PropertyValue::String(s) => {
            OffsetDateTime::parse(s, &Rfc3339).map_err(|e| MapperError::Validation {
                field: field.to_string(),
                message: e.to_string(),
            })?
        }
        other => {
            return Err(MapperError::Validation {
                field: field.to_string(),
                message: format!("cannot interpret {other:?} as a datetime"),
            })
        }
    };

    Ok(match rep {
        Representation::Native => PropertyValue::DateTime(parsed),
        Representation::Wire => PropertyValue::Float(epoch_seconds(parsed)),
    })
}

fn coerce_json(raw: &PropertyValue, rep: Representation) -> PropertyValue {
    match rep {
        Representation::Native => match raw {
            PropertyValue::Json(v) => PropertyValue::Json(v.clone()),
            PropertyValue::String(s) => PropertyValue::Json(
                serde_json::from_str(s)
                    .unwrap_or_else(|_| serde_json::Value::Object(Default::default())),
            ),
            PropertyValue::Null => PropertyValue::Json(serde_json::Value::Object(Default::default())),
            other => other.clone(),
        },
        Representation::Wire => match raw {
            PropertyValue::String(s) => PropertyValue::String(s.clone()),
            PropertyValue::Json(v) => PropertyValue::String(v.to_string()),
            PropertyValue::Null => PropertyValue::String("{}".to_string()),
            other => PropertyValue::String(json_text(other)),
        },
    }
}

fn json_text(value: &PropertyValue) -> String {
    to_json(value).to_string()
}

fn to_json(value: &PropertyValue) -> serde_json::Value {
    match value {
        PropertyValue::Null => serde_json::Value::Null,
        PropertyValue::String(s) => serde_json::Value::String(s.clone()),
        PropertyValue::Int(i) => serde_json::Value::from(*i),
        PropertyValue::Float(f) => serde_json::Value::from(*f),
        PropertyValue::Bool(b) => serde_json::Value::Bool(*b),
        PropertyValue::DateTime(dt) => serde_json::Value::from(epoch_seconds(*dt)),
        PropertyValue::Json(v) => v.clone(),
        PropertyValue::List(l) => serde_json::Value::Array(l.iter().map(to_json).collect()),
    }
}

fn epoch_seconds(dt: OffsetDateTime) -> f64 {
    dt.unix_timestamp() as f64 + f64::from(dt.nanosecond()) / 1_000_000_000.0
}
