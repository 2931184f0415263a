use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ValidationError / ValidationErrors
// ---------------------------------------------------------------------------

/// A single property-level validation failure.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub path: String,
    pub expected: String,
    pub received: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"Validation failed at "{}": expected {}, received {}"#,
            self.path, self.expected, self.received
        )
    }
}

impl std::error::Error for ValidationError {}

/// A collection of one or more `ValidationError`s.
#[derive(Debug, Clone)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validation failed:")?;
        for e in &self.0 {
            write!(f, "\n  - {}: expected {}, received {}", e.path, e.expected, e.received)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

// ---------------------------------------------------------------------------
// SchemaError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("Invalid schema definition: {0}")]
    InvalidDefinition(String),

    #[error(
        "Schema version {requested} is older than the stored schema version {stored}"
    )]
    VersionMismatch { stored: u32, requested: u32 },
}

// ---------------------------------------------------------------------------
// StorageError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(
        "Constraint violation: a \"{record_type}\" record with primary key {primary_key} already exists"
    )]
    ConstraintViolation {
        record_type: String,
        primary_key: String,
    },

    #[error("Cannot {operation} outside of a write scope. Wrap the call in write().")]
    NotInWriteScope { operation: &'static str },

    #[error("Record type \"{0}\" is not declared in the schema")]
    UnknownRecordType(String),

    #[error("Expected records of type \"{expected}\", found a \"{found}\" record")]
    TypeMismatch { expected: String, found: String },

    #[error("Invalid primary key for \"{record_type}\": {reason}")]
    InvalidPrimaryKey { record_type: String, reason: String },

    #[error("Storage corruption in {record_type}/{primary_key}: {reason}")]
    Corruption {
        record_type: String,
        primary_key: String,
        reason: String,
    },

    #[error("Transaction error: {message}")]
    Transaction {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

// ---------------------------------------------------------------------------
// QueryError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Invalid predicate \"{predicate}\": {reason}")]
    InvalidPredicate { predicate: String, reason: String },

    #[error("Predicate \"{predicate}\" references ${index} but only {provided} argument(s) were bound")]
    MissingArgument {
        predicate: String,
        index: usize,
        provided: usize,
    },

    #[error("Record type \"{record_type}\" has no property \"{field}\"")]
    UnknownField { record_type: String, field: String },
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("Invalid configuration value for \"{field}\": {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

// ---------------------------------------------------------------------------
// HarkDbError: top-level rollup
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum HarkDbError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Listener failed: {0}")]
    Listener(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HarkDbError {
    /// Wrap an arbitrary error raised inside a change listener.
    ///
    /// Returning it from a listener aborts the remaining dispatch and, inside
    /// `write()`, rolls the transaction back.
    pub fn listener(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Listener(err.into())
    }
}

/// Convenience alias: the default error type is `HarkDbError`.
pub type Result<T, E = HarkDbError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
