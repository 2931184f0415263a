//! Database<S>: a [`Store`] with change notification.
//!
//! Every mutation made through a `Database` is reported synchronously to the
//! registered listeners before the call returns. Persistence, transactions and
//! queries belong to the store; this layer only forwards them and fans out
//! [`ChangeEvent`]s carrying the caller's context.
//!
//! # Example
//!
//! ```
//! use hark_db::database::SqliteDatabase;
//! use hark_db::schema::{p, record_type, Schema};
//! use serde_json::json;
//!
//! let schema = Schema::new(1, vec![
//!     record_type("User").property("id", p::string()).property("username", p::string()).build(),
//! ]).unwrap();
//! let db = SqliteDatabase::open_in_memory(schema).unwrap();
//!
//! db.add_listener(|event| {
//!     println!("{} {:?}", event.kind(), event.record_type());
//!     Ok(())
//! });
//!
//! let user = db.write(|db| {
//!     let props = json!({ "id": "1", "username": "ada" });
//!     db.create("User", props.as_object().cloned().unwrap_or_default(), &[])
//! }).unwrap();
//! assert_eq!(user.get_str("username"), Some("ada"));
//! assert_eq!(db.get("User", "1").unwrap(), Some(user));
//! ```

use serde_json::{Map, Value};

use crate::error::{Result, StorageError};
use crate::query::results::Results;
use crate::reactive::{ChangeEvent, ListenerId, ListenerRegistry};
use crate::schema::{RecordTypeDef, Schema};
use crate::storage::traits::Store;
use crate::types::{AsRecord, CreateMode, Record};

#[cfg(feature = "sqlite")]
use crate::{storage::sqlite::SqliteStore, types::DatabaseOptions};

/// A database backed by the bundled SQLite store.
#[cfg(feature = "sqlite")]
pub type SqliteDatabase = Database<SqliteStore>;

/// A [`Store`] plus the listeners notified of its mutations.
///
/// `Database<S>` is `Send + Sync` whenever `S` is. Listeners run on the
/// thread that made the mutation, inside its write scope, and may call back
/// into the database.
pub struct Database<S: Store> {
    store: S,
    listeners: ListenerRegistry<ChangeEvent>,
}

/// `true` for keys that can never identify a record.
fn is_blank_key(key: &Value) -> bool {
    match key {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

impl<S: Store> Database<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            listeners: ListenerRegistry::new(),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn schema(&self) -> &Schema {
        self.store.schema()
    }

    /// `true` iff the store holds no records of any type.
    pub fn is_empty(&self) -> Result<bool> {
        self.store.is_empty()
    }

    // -----------------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------------

    /// Register `callback` to be called with every subsequent change.
    ///
    /// Returning `Err` from the callback stops the notification and fails the
    /// mutation that triggered it, rolling back the enclosing write scope.
    pub fn add_listener(
        &self,
        callback: impl Fn(&ChangeEvent) -> Result<()> + Send + Sync + 'static,
    ) -> ListenerId {
        let id = self.listeners.add(callback);
        tracing::debug!(listener = %id, "listener added");
        id
    }

    /// Unregister a listener. Unknown ids are ignored.
    pub fn remove_listener(&self, id: ListenerId) {
        if self.listeners.remove(id) {
            tracing::debug!(listener = %id, "listener removed");
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Deliver `event` to every listener registered right now.
    pub fn notify(&self, event: &ChangeEvent) -> Result<()> {
        tracing::trace!(
            kind = %event.kind(),
            record_type = event.record_type().unwrap_or("*"),
            listeners = self.listeners.len(),
            "dispatching change"
        );
        self.listeners.emit(event)
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Insert a new record. Fails if one with the same primary key exists.
    pub fn create(
        &self,
        record_type: &str,
        properties: Map<String, Value>,
        context: &[Value],
    ) -> Result<Record> {
        let record = self.store.create(record_type, properties, CreateMode::Insert)?;
        self.notify(&ChangeEvent::Create {
            record_type: record_type.to_string(),
            record: record.clone(),
            context: context.to_vec(),
        })?;
        Ok(record)
    }

    /// Insert or overwrite a record. Always reported as an UPDATE.
    pub fn update(
        &self,
        record_type: &str,
        properties: Map<String, Value>,
        context: &[Value],
    ) -> Result<Record> {
        let record = self.store.create(record_type, properties, CreateMode::Upsert)?;
        self.notify(&ChangeEvent::Update {
            record_type: record_type.to_string(),
            record: record.clone(),
            context: context.to_vec(),
        })?;
        Ok(record)
    }

    /// Report an edit the caller made to `record` without going through the
    /// store. Nothing is persisted.
    pub fn save(&self, record_type: &str, record: &Record, context: &[Value]) -> Result<()> {
        self.check_type(record_type, record)?;
        self.notify(&ChangeEvent::Update {
            record_type: record_type.to_string(),
            record: record.clone(),
            context: context.to_vec(),
        })
    }

    /// Delete `records`, all of `record_type`.
    ///
    /// Each record's teardown hook runs and its DELETE is reported before the
    /// store removes the batch, so listeners still see the records in the
    /// store. DELETE events carry a copy holding only the primary key.
    pub fn delete<'r, R, I>(&self, record_type: &str, records: I, context: &[Value]) -> Result<()>
    where
        R: AsRecord + 'r,
        I: IntoIterator<Item = &'r R>,
    {
        let records: Vec<&R> = records.into_iter().collect();
        if records.is_empty() {
            return Ok(());
        }
        if !self.store.in_write_scope() {
            return Err(StorageError::NotInWriteScope { operation: "delete" }.into());
        }
        for r in &records {
            self.check_type(record_type, r.as_record())?;
        }

        let mut shadows = Vec::with_capacity(records.len());
        for r in records {
            r.teardown()?;
            let shadow = r.as_record().shadow();
            self.notify(&ChangeEvent::Delete {
                record_type: record_type.to_string(),
                record: shadow.clone(),
                context: context.to_vec(),
            })?;
            shadows.push(shadow);
        }
        self.store.delete(&shadows)
    }

    /// Remove every record of every type, then report a single WIPE.
    pub fn delete_all(&self, context: &[Value]) -> Result<()> {
        self.store.delete_all()?;
        self.notify(&ChangeEvent::Wipe {
            context: context.to_vec(),
        })
    }

    /// Run `f` in a write scope: everything it does commits when it returns
    /// `Ok` and rolls back when it (or a listener it triggered) fails.
    pub fn write<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        self.store.write(|| f(self))
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// A lazy view over every record of `record_type`.
    pub fn objects(&self, record_type: &str) -> Result<Results<'_, S>> {
        self.store.objects(record_type)
    }

    /// Look a record up by its primary key. `null` and `""` find nothing.
    pub fn get(&self, record_type: &str, key: impl Into<Value>) -> Result<Option<Record>> {
        let field = self.type_def(record_type)?.primary_key.clone();
        self.get_by(record_type, key, &field)
    }

    /// The first record whose `field` equals `key`. `null` and `""` find
    /// nothing without querying the store.
    pub fn get_by(
        &self,
        record_type: &str,
        key: impl Into<Value>,
        field: &str,
    ) -> Result<Option<Record>> {
        let key = key.into();
        if is_blank_key(&key) {
            return Ok(None);
        }
        self.objects(record_type)?
            .filtered(&format!("{field} == $0"), &[key])?
            .first()
    }

    /// Look a record up by primary key, creating it when missing.
    pub fn get_or_create(
        &self,
        record_type: &str,
        key: impl Into<Value>,
        context: &[Value],
    ) -> Result<Option<Record>> {
        let field = self.type_def(record_type)?.primary_key.clone();
        self.get_or_create_by(record_type, key, &field, context)
    }

    /// The first record whose `field` equals `key`, or a new one with only
    /// `field` set (other properties take their defaults). Creating needs a
    /// write scope, and `field` must then be the primary key unless the
    /// schema can fill the key in some other way.
    pub fn get_or_create_by(
        &self,
        record_type: &str,
        key: impl Into<Value>,
        field: &str,
        context: &[Value],
    ) -> Result<Option<Record>> {
        let key = key.into();
        if is_blank_key(&key) {
            return Ok(None);
        }
        if let Some(existing) = self.get_by(record_type, key.clone(), field)? {
            return Ok(Some(existing));
        }
        let mut properties = Map::new();
        properties.insert(field.to_string(), key);
        self.create(record_type, properties, context).map(Some)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Drop every listener and close the store, reporting close failures.
    pub fn close(self) -> Result<()> {
        self.listeners.clear();
        self.store.close()
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn type_def(&self, record_type: &str) -> Result<&RecordTypeDef> {
        self.schema()
            .get(record_type)
            .ok_or_else(|| StorageError::UnknownRecordType(record_type.to_string()).into())
    }

    fn check_type(&self, record_type: &str, record: &Record) -> Result<()> {
        if record.record_type() != record_type {
            return Err(StorageError::TypeMismatch {
                expected: record_type.to_string(),
                found: record.record_type().to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(feature = "sqlite")]
impl Database<SqliteStore> {
    /// Open a SQLite-backed database.
    pub fn open(schema: Schema, options: &DatabaseOptions) -> Result<Self> {
        Ok(Self::new(SqliteStore::open(schema, options)?))
    }

    pub fn open_in_memory(schema: Schema) -> Result<Self> {
        Ok(Self::new(SqliteStore::open_in_memory(schema)?))
    }
}
