//! Settings: a string key/value facade over a [`Database`].
//!
//! Settings live as `Setting` records (`key` primary key, `value` string
//! defaulting to `""`) in whatever database the caller hands in, so writes go
//! through the usual change notification. Include [`setting_type()`] in an
//! application schema to share a database, or use [`Settings::standalone`].

use std::fmt::Display;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::database::Database;
use crate::error::{Result, SchemaError};
use crate::schema::{p, record_type, RecordTypeDef, Schema};
use crate::storage::traits::Store;

#[cfg(feature = "sqlite")]
use crate::{storage::sqlite::SqliteStore, types::DatabaseOptions};

/// Record type name settings are stored under.
pub const SETTING_TYPE: &str = "Setting";
const KEY_FIELD: &str = "key";
const VALUE_FIELD: &str = "value";

/// The `Setting` record type.
pub fn setting_type() -> RecordTypeDef {
    record_type(SETTING_TYPE)
        .primary_key(KEY_FIELD)
        .property(KEY_FIELD, p::string())
        .property(VALUE_FIELD, p::string().with_default(""))
        .build()
}

/// A version 1 schema holding only the `Setting` record type.
pub fn settings_schema() -> Result<Schema, SchemaError> {
    Schema::new(1, vec![setting_type()])
}

/// Key/value settings stored in a shared database.
pub struct Settings<S: Store> {
    db: Arc<Database<S>>,
}

impl<S: Store> Clone for Settings<S> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}

impl<S: Store> Settings<S> {
    /// Wrap `db`, whose schema must declare the `Setting` record type.
    pub fn new(db: Arc<Database<S>>) -> Result<Self> {
        let def = db.schema().get(SETTING_TYPE).ok_or_else(|| {
            SchemaError::InvalidDefinition(format!(
                "settings need a \"{SETTING_TYPE}\" record type in the schema"
            ))
        })?;
        if def.primary_key != KEY_FIELD || def.property(VALUE_FIELD).is_none() {
            return Err(SchemaError::InvalidDefinition(format!(
                "\"{SETTING_TYPE}\" must have primary key \"{KEY_FIELD}\" and a \"{VALUE_FIELD}\" property"
            ))
            .into());
        }
        Ok(Self { db })
    }

    pub fn database(&self) -> &Arc<Database<S>> {
        &self.db
    }

    /// Store `value` (in its `Display` form) under `key`, replacing any
    /// previous value.
    pub fn set(&self, key: &str, value: impl Display) -> Result<()> {
        let mut properties = Map::new();
        properties.insert(KEY_FIELD.to_string(), json!(key));
        properties.insert(VALUE_FIELD.to_string(), Value::String(value.to_string()));
        self.db
            .write(|db| db.update(SETTING_TYPE, properties, &[]).map(|_| ()))?;
        tracing::debug!(key, "setting stored");
        Ok(())
    }

    /// The value stored under `key`, or `""` when there is none.
    pub fn get(&self, key: &str) -> Result<String> {
        let value = self
            .lookup(key)?
            .and_then(|r| r.get_str(VALUE_FIELD).map(str::to_string))
            .unwrap_or_default();
        Ok(value)
    }

    /// Remove `key`. Missing keys are ignored.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.db.write(|db| {
            if let Some(record) = self.lookup(key)? {
                db.delete(SETTING_TYPE, [&record], &[])?;
                tracing::debug!(key, "setting deleted");
            }
            Ok(())
        })
    }

    /// Every stored setting in store order.
    pub fn entries(&self) -> Result<Vec<(String, String)>> {
        self.db
            .objects(SETTING_TYPE)?
            .iter()
            .map(|r| {
                let r = r?;
                Ok((
                    r.get_str(KEY_FIELD).unwrap_or_default().to_string(),
                    r.get_str(VALUE_FIELD).unwrap_or_default().to_string(),
                ))
            })
            .collect()
    }

    fn lookup(&self, key: &str) -> Result<Option<crate::types::Record>> {
        self.db
            .objects(SETTING_TYPE)?
            .filtered("key == $0", &[json!(key)])?
            .first()
    }
}

#[cfg(feature = "sqlite")]
impl Settings<SqliteStore> {
    /// Settings in a database of their own.
    pub fn standalone(options: &DatabaseOptions) -> Result<Self> {
        let db = Database::open(settings_schema()?, options)?;
        Self::new(Arc::new(db))
    }
}
