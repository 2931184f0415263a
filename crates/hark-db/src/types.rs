use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConfigError, Result};

/// Caller-supplied context forwarded verbatim to every listener.
pub type Context = Vec<Value>;

// ============================================================================
// Record
// ============================================================================

/// A snapshot of one persisted record.
///
/// `values` holds every declared property of the record type. A `Record` is a
/// value: editing it does not touch the store (see `Database::save`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    record_type: String,
    primary_key: String,
    values: Map<String, Value>,
}

impl Record {
    pub fn new(
        record_type: impl Into<String>,
        primary_key: impl Into<String>,
        values: Map<String, Value>,
    ) -> Self {
        Self {
            record_type: record_type.into(),
            primary_key: primary_key.into(),
            values,
        }
    }

    /// Name of the record type this record belongs to.
    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    /// Name of the primary key field.
    pub fn primary_key_field(&self) -> &str {
        &self.primary_key
    }

    /// The primary key value, or `Value::Null` if the snapshot lacks one.
    pub fn primary_key(&self) -> &Value {
        self.values.get(&self.primary_key).unwrap_or(&Value::Null)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Convenience accessor for string properties.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.values.get(field).and_then(Value::as_str)
    }

    /// Overwrite one property on this snapshot only.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(field.into(), value.into());
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_values(self) -> Map<String, Value> {
        self.values
    }

    /// The property map as a JSON object.
    pub fn to_json(&self) -> Value {
        Value::Object(self.values.clone())
    }

    /// Deserialize the property map into a user type.
    pub fn to_model<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.to_json())?)
    }

    /// A copy carrying only the primary key, used for delete notifications
    /// where the real record is about to disappear.
    pub fn shadow(&self) -> Record {
        let mut values = Map::new();
        values.insert(self.primary_key.clone(), self.primary_key().clone());
        Record {
            record_type: self.record_type.clone(),
            primary_key: self.primary_key.clone(),
            values,
        }
    }
}

// ============================================================================
// AsRecord: deletion capability
// ============================================================================

/// Anything that can be handed to `Database::delete`.
///
/// `teardown` is an optional pre-deletion hook: the default does nothing, and
/// wrapper types that own resources tied to a record override it. It runs once
/// per record, before that record's delete notification.
pub trait AsRecord {
    fn as_record(&self) -> &Record;

    fn teardown(&self) -> Result<()> {
        Ok(())
    }
}

impl AsRecord for Record {
    fn as_record(&self) -> &Record {
        self
    }
}

// ============================================================================
// CreateMode
// ============================================================================

/// How the store treats an existing record with the same primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// Fail with a constraint violation.
    Insert,
    /// Overwrite the supplied properties of the existing record.
    Upsert,
}

// ============================================================================
// DatabaseOptions
// ============================================================================

const DEFAULT_FETCH_PAGE_SIZE: usize = 64;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Options for opening a store.
///
/// Every field has a default, so a configuration file only needs the keys it
/// changes:
///
/// ```
/// use hark_db::types::DatabaseOptions;
///
/// let opts = DatabaseOptions::from_json_str(r#"{ "fetch_page_size": 16 }"#).unwrap();
/// assert_eq!(opts.fetch_page_size, 16);
/// assert!(opts.path.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseOptions {
    /// Database file; `None` opens an in-memory database.
    pub path: Option<PathBuf>,
    /// Number of records a lazy `Results` iterator loads per round trip.
    pub fetch_page_size: usize,
    /// How long a writer waits for a lock held by another connection.
    pub busy_timeout_ms: u64,
    /// Use write-ahead logging for file-backed databases.
    pub wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            path: None,
            fetch_page_size: DEFAULT_FETCH_PAGE_SIZE,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            wal: true,
        }
    }
}

impl DatabaseOptions {
    /// Options for a file-backed database at `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let opts: Self = serde_json::from_str(json).map_err(ConfigError::Parse)?;
        opts.validate()?;
        Ok(opts)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "fetch_page_size",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
