//! Error types for mapper operations.
//!
//! All fallible operations return [`Result<T>`] with context-rich error messages.

use thiserror::Error;

/// Result type alias for mapper operations.
pub type Result<T> = std::result::Result<T, MapperError>;

/// Comprehensive error type for all mapper operations.
///
/// Compilation problems fail fast and abort the whole batch; connection
/// errors propagate unmodified except uniqueness-constraint violations,
/// which are translated once into [`MapperError::Constraint`] at the
/// unit-of-work boundary.
#[derive(Error, Debug)]
pub enum MapperError {
    /// A relationship was saved without a resolvable start or end node.
    #[error("Missing {end} node for relationship `{rel_type}`")]
    MissingEndpoint {
        /// Which end was missing ("start" or "end")
        end: &'static str,
        /// Type label of the relationship being compiled
        rel_type: String,
    },

    /// An entity could not be compiled for its declared role.
    #[error("Compile error: {message}")]
    Compile {
        /// Description of what went wrong
        message: String,
    },

    /// A uniqueness constraint was violated in storage.
    ///
    /// Carries the offending label/field/value so callers can build a
    /// field-level user-facing message.
    #[error("Constraint violation on label `{label}`: property `{field}` = '{value}' already exists")]
    Constraint {
        /// Label of the conflicting entity
        label: String,
        /// Property that violated the constraint
        field: String,
        /// The duplicate value
        value: String,
    },

    /// A field failed validation during coercion.
    ///
    /// Only date/datetime parse failures surface here; every other
    /// coercion falls back to its type default.
    #[error("Invalid value for field '{field}': {message}")]
    Validation {
        /// The offending field name
        field: String,
        /// Parse failure details
        message: String,
    },

    /// Connection or transport error from the graph database.
    #[error("Connection error: {message}")]
    Connection {
        /// Detailed error message
        message: String,
        /// Optional source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A lookup by id matched more than one entity.
    #[error("More than one result for id: {id}")]
    MultipleResults {
        /// The ambiguous identifier
        id: i64,
    },

    /// No mapper is registered for the requested labels.
    #[error("No mapper registered for `{labels}`")]
    NotRegistered {
        /// Normalized label key that missed
        labels: String,
    },
}

impl MapperError {
    /// Create a connection error from a message and optional source.
    pub fn connection<E>(message: impl Into<String>, source: Option<E>) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Connection {
            message: message.into(),
            source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
        }
    }

    /// Create a compile error from a message.
    pub fn compile(message: impl Into<String>) -> Self {
        Self::Compile {
            message: message.into(),
        }
    }
}
