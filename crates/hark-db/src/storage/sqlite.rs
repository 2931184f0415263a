//! SQLite store for hark-db.
//!
//! Implements [`Store`] using rusqlite (bundled). Every record lives in one
//! `records` table keyed by `(record_type, pk)` with its properties as a JSON
//! document; filters become `json_extract` comparisons.
//!
//! The connection is protected by a `parking_lot::ReentrantMutex` so that a
//! write scope can hold the lock for its whole duration while the closure it
//! runs (and any listener that closure triggers) re-acquires it for individual
//! statements. The write-scope depth lives behind the same lock, so one
//! thread never sees another thread's scope.

use std::cell::{Cell, RefCell};
use std::time::Duration;

use parking_lot::ReentrantMutex;
use rusqlite::{params, params_from_iter, OptionalExtension};
use serde_json::{Map, Value};

use crate::error::{HarkDbError, QueryError, Result, SchemaError, StorageError};
use crate::query::types::{CompareOp, ObjectsQuery};
use crate::schema::validate::{is_valid_name, prepare_new, prepare_overwrite, primary_key_text};
use crate::schema::{RecordTypeDef, Schema};
use crate::types::{CreateMode, DatabaseOptions, Record};

use super::traits::Store;

/// Meta key holding the last schema version the database was opened with.
const META_SCHEMA_VERSION: &str = "schema:version";

// ============================================================================
// Value helpers
// ============================================================================

/// Convert a `serde_json::Value` to a `rusqlite::types::Value` for query params.
fn json_value_to_sql(v: &Value) -> rusqlite::types::Value {
    match v {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(b) => rusqlite::types::Value::Integer(if *b { 1 } else { 0 }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                rusqlite::types::Value::Integer(i)
            } else {
                rusqlite::types::Value::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => rusqlite::types::Value::Text(s.clone()),
        other => rusqlite::types::Value::Text(other.to_string()),
    }
}

/// Map a rusqlite error to a `HarkDbError`.
fn storage_err(e: rusqlite::Error) -> HarkDbError {
    HarkDbError::Storage(StorageError::Sqlite(e))
}

/// Translate `query` into a WHERE clause and its bound parameters.
fn where_clause(query: &ObjectsQuery) -> Result<(String, Vec<rusqlite::types::Value>)> {
    let mut conditions = vec!["record_type = ?".to_string()];
    let mut params = vec![rusqlite::types::Value::Text(query.record_type.clone())];

    for c in &query.conditions {
        // Field names are spliced into the JSON path, so only identifiers pass.
        if !is_valid_name(&c.field) {
            return Err(QueryError::UnknownField {
                record_type: query.record_type.clone(),
                field: c.field.clone(),
            }
            .into());
        }
        let path = format!("json_extract(data, '$.{}')", c.field);
        let value = json_value_to_sql(&c.value);
        match c.op {
            CompareOp::Eq => {
                conditions.push(format!("{path} IS ?"));
                params.push(value);
            }
            CompareOp::Ne => {
                conditions.push(format!("{path} IS NOT ?"));
                params.push(value);
            }
            CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
                conditions.push(format!("{path} {} ?", c.op.symbol()));
                params.push(value);
            }
            CompareOp::BeginsWith => {
                conditions.push(format!("substr({path}, 1, length(?)) = ?"));
                params.extend([value.clone(), value]);
            }
            CompareOp::EndsWith => {
                conditions.push(format!(
                    "({path} IS NOT NULL AND (length(?) = 0 OR substr({path}, -length(?)) = ?))"
                ));
                params.extend([value.clone(), value.clone(), value]);
            }
            CompareOp::Contains => {
                conditions.push(format!("instr({path}, ?) > 0"));
                params.push(value);
            }
        }
    }

    Ok((conditions.join(" AND "), params))
}

// ============================================================================
// Connection state
// ============================================================================

struct ConnState {
    conn: RefCell<rusqlite::Connection>,
    /// Number of nested write scopes currently open.
    write_depth: Cell<usize>,
}

/// An open savepoint. Rolls back on drop unless committed, so a panicking
/// write closure leaves no partial writes behind.
struct WriteScope<'g> {
    state: &'g ConnState,
    name: String,
    depth: usize,
    finished: bool,
}

impl<'g> WriteScope<'g> {
    fn begin(state: &'g ConnState) -> Result<Self> {
        let depth = state.write_depth.get();
        let name = format!("hark_write_{depth}");
        state
            .conn
            .borrow()
            .execute_batch(&format!("SAVEPOINT {name}"))
            .map_err(storage_err)?;
        state.write_depth.set(depth + 1);
        Ok(Self {
            state,
            name,
            depth,
            finished: false,
        })
    }

    fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.state.write_depth.set(self.depth);
        let released = self
            .state
            .conn
            .borrow()
            .execute_batch(&format!("RELEASE SAVEPOINT {}", self.name));
        match released {
            Ok(()) => Ok(()),
            Err(e) => {
                self.undo();
                Err(StorageError::Transaction {
                    message: format!("failed to commit write scope {}", self.name),
                    source: Some(Box::new(e)),
                }
                .into())
            }
        }
    }

    fn rollback(mut self) {
        self.finished = true;
        self.state.write_depth.set(self.depth);
        self.undo();
    }

    fn undo(&self) {
        let sql = format!(
            "ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name}",
            name = self.name
        );
        if let Err(e) = self.state.conn.borrow().execute_batch(&sql) {
            tracing::warn!(
                savepoint = %self.name,
                error = %e,
                "failed to roll back write scope"
            );
        }
    }
}

impl Drop for WriteScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.state.write_depth.set(self.depth);
            self.undo();
        }
    }
}

// ============================================================================
// SqliteStore
// ============================================================================

/// SQLite-backed [`Store`].
pub struct SqliteStore {
    state: ReentrantMutex<ConnState>,
    schema: Schema,
    page_size: usize,
}

impl SqliteStore {
    /// Open (or create) the database described by `options`.
    pub fn open(schema: Schema, options: &DatabaseOptions) -> Result<Self> {
        options.validate()?;
        let conn = match &options.path {
            Some(path) => rusqlite::Connection::open(path),
            None => rusqlite::Connection::open_in_memory(),
        }
        .map_err(storage_err)?;

        conn.busy_timeout(Duration::from_millis(options.busy_timeout_ms))
            .map_err(storage_err)?;
        if options.wal && options.path.is_some() {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA synchronous=NORMAL;",
            )
            .map_err(storage_err)?;
        }

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                record_type TEXT NOT NULL,
                pk          TEXT NOT NULL,
                data        TEXT NOT NULL DEFAULT '{}',
                PRIMARY KEY (record_type, pk)
            );
            CREATE TABLE IF NOT EXISTS meta (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
        .map_err(storage_err)?;

        Self::check_schema_version(&conn, &schema)?;

        tracing::debug!(
            path = ?options.path,
            schema_version = schema.version(),
            record_types = schema.types().len(),
            "opened sqlite store"
        );

        Ok(Self {
            state: ReentrantMutex::new(ConnState {
                conn: RefCell::new(conn),
                write_depth: Cell::new(0),
            }),
            schema,
            page_size: options.fetch_page_size,
        })
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory(schema: Schema) -> Result<Self> {
        Self::open(schema, &DatabaseOptions::default())
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    /// Record the schema version, refusing to open with an older one.
    fn check_schema_version(conn: &rusqlite::Connection, schema: &Schema) -> Result<()> {
        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![META_SCHEMA_VERSION],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err)?;
        let stored = stored
            .map(|s| {
                s.parse::<u32>().map_err(|_| {
                    HarkDbError::Internal(format!("invalid schema version stored in meta: {s:?}"))
                })
            })
            .transpose()?;

        match stored {
            Some(v) if v > schema.version() => {
                return Err(SchemaError::VersionMismatch {
                    stored: v,
                    requested: schema.version(),
                }
                .into())
            }
            Some(v) if v == schema.version() => return Ok(()),
            Some(v) => tracing::debug!(from = v, to = schema.version(), "schema version changed"),
            None => {}
        }
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![META_SCHEMA_VERSION, schema.version().to_string()],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    fn type_def(&self, record_type: &str) -> Result<&RecordTypeDef> {
        self.schema
            .get(record_type)
            .ok_or_else(|| StorageError::UnknownRecordType(record_type.to_string()).into())
    }

    fn require_write(state: &ConnState, operation: &'static str) -> Result<()> {
        if state.write_depth.get() == 0 {
            return Err(StorageError::NotInWriteScope { operation }.into());
        }
        Ok(())
    }

    fn key_text(def: &RecordTypeDef, value: &Value) -> Result<String> {
        primary_key_text(def, value).map_err(|reason| {
            StorageError::InvalidPrimaryKey {
                record_type: def.name.clone(),
                reason,
            }
            .into()
        })
    }

    /// Parse a stored JSON document back into a `Record`.
    fn decode(def: &RecordTypeDef, pk: &str, data: &str) -> Result<Record> {
        match serde_json::from_str::<Value>(data) {
            Ok(Value::Object(values)) => Ok(Record::new(&def.name, &def.primary_key, values)),
            Ok(other) => Err(StorageError::Corruption {
                record_type: def.name.clone(),
                primary_key: pk.to_string(),
                reason: format!("expected a JSON object, found {other}"),
            }
            .into()),
            Err(e) => Err(StorageError::Corruption {
                record_type: def.name.clone(),
                primary_key: pk.to_string(),
                reason: e.to_string(),
            }
            .into()),
        }
    }

    fn load(
        conn: &rusqlite::Connection,
        def: &RecordTypeDef,
        pk: &str,
    ) -> Result<Option<Map<String, Value>>> {
        let data: Option<String> = conn
            .prepare_cached("SELECT data FROM records WHERE record_type = ?1 AND pk = ?2")
            .map_err(storage_err)?
            .query_row(params![def.name, pk], |row| row.get(0))
            .optional()
            .map_err(storage_err)?;
        data.map(|d| Self::decode(def, pk, &d).map(Record::into_values))
            .transpose()
    }
}

// ============================================================================
// Store implementation
// ============================================================================

impl Store for SqliteStore {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn create(
        &self,
        record_type: &str,
        properties: Map<String, Value>,
        mode: CreateMode,
    ) -> Result<Record> {
        let def = self.type_def(record_type)?;
        let guard = self.state.lock();
        Self::require_write(&guard, "create")?;

        let key_value = properties.get(&def.primary_key).cloned().unwrap_or(Value::Null);
        let pk = Self::key_text(def, &key_value)?;

        let conn = guard.conn.borrow();
        let values = match (Self::load(&conn, def, &pk)?, mode) {
            (Some(_), CreateMode::Insert) => {
                return Err(StorageError::ConstraintViolation {
                    record_type: def.name.clone(),
                    primary_key: key_value.to_string(),
                }
                .into())
            }
            (Some(existing), CreateMode::Upsert) => prepare_overwrite(def, existing, properties),
            (None, _) => prepare_new(def, properties),
        }
        .map_err(SchemaError::Validation)?;

        let data = serde_json::to_string(&values)?;
        conn.prepare_cached(
            "INSERT INTO records (record_type, pk, data) VALUES (?1, ?2, ?3) \
             ON CONFLICT(record_type, pk) DO UPDATE SET data = excluded.data",
        )
        .map_err(storage_err)?
        .execute(params![def.name, pk, data])
        .map_err(storage_err)?;

        tracing::trace!(record_type = %def.name, pk = %pk, ?mode, "wrote record");
        Ok(Record::new(&def.name, &def.primary_key, values))
    }

    fn delete(&self, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let guard = self.state.lock();
        Self::require_write(&guard, "delete")?;

        let conn = guard.conn.borrow();
        let mut stmt = conn
            .prepare_cached("DELETE FROM records WHERE record_type = ?1 AND pk = ?2")
            .map_err(storage_err)?;
        for record in records {
            let def = self.type_def(record.record_type())?;
            let pk = Self::key_text(def, record.primary_key())?;
            let removed = stmt.execute(params![def.name, pk]).map_err(storage_err)?;
            if removed == 0 {
                tracing::trace!(record_type = %def.name, pk = %pk, "record already gone");
            }
        }
        Ok(())
    }

    fn delete_all(&self) -> Result<()> {
        let guard = self.state.lock();
        Self::require_write(&guard, "delete all records")?;
        let removed = guard
            .conn
            .borrow()
            .execute("DELETE FROM records", [])
            .map_err(storage_err)?;
        tracing::debug!(removed, "wiped all records");
        Ok(())
    }

    fn count(&self, query: &ObjectsQuery) -> Result<usize> {
        let (clause, params) = where_clause(query)?;
        let sql = format!("SELECT COUNT(*) FROM records WHERE {clause}");
        let guard = self.state.lock();
        let conn = guard.conn.borrow();
        let n: i64 = conn
            .prepare_cached(&sql)
            .map_err(storage_err)?
            .query_row(params_from_iter(params), |row| row.get(0))
            .map_err(storage_err)?;
        Ok(n as usize)
    }

    fn fetch(&self, query: &ObjectsQuery, offset: usize, limit: usize) -> Result<Vec<Record>> {
        let def = self.type_def(&query.record_type)?;
        let (clause, mut params) = where_clause(query)?;
        let sql = format!("SELECT pk, data FROM records WHERE {clause} ORDER BY rowid LIMIT ? OFFSET ?");
        params.push(rusqlite::types::Value::Integer(limit as i64));
        params.push(rusqlite::types::Value::Integer(offset as i64));

        let guard = self.state.lock();
        let conn = guard.conn.borrow();
        let mut stmt = conn.prepare_cached(&sql).map_err(storage_err)?;
        let rows = stmt
            .query_map(params_from_iter(params), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(storage_err)?;

        let mut records = Vec::new();
        for row in rows {
            let (pk, data) = row.map_err(storage_err)?;
            records.push(Self::decode(def, &pk, &data)?);
        }
        Ok(records)
    }

    fn is_empty(&self) -> Result<bool> {
        let guard = self.state.lock();
        let conn = guard.conn.borrow();
        let any: i64 = conn
            .query_row("SELECT EXISTS(SELECT 1 FROM records)", [], |row| row.get(0))
            .map_err(storage_err)?;
        Ok(any == 0)
    }

    fn write<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        // Held for the whole scope: same-thread calls re-enter, other threads wait.
        let guard = self.state.lock();
        let scope = WriteScope::begin(&guard)?;
        match f() {
            Ok(v) => {
                scope.commit()?;
                Ok(v)
            }
            Err(e) => {
                scope.rollback();
                Err(e)
            }
        }
    }

    fn in_write_scope(&self) -> bool {
        self.state.lock().write_depth.get() > 0
    }

    fn close(self) -> Result<()> {
        let state = self.state.into_inner();
        state
            .conn
            .into_inner()
            .close()
            .map_err(|(_, e)| storage_err(e))?;
        tracing::debug!("closed sqlite store");
        Ok(())
    }

    fn page_size(&self) -> usize {
        self.page_size
    }
}
