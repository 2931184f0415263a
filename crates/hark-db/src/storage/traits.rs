//! Store capability consumed by `Database`.
//!
//! A `Store` owns all persisted records: schema-typed create/upsert, delete,
//! wipe, paged queries and transactional write scopes. `Database` adds the
//! change-notification layer on top and never persists anything itself.

use serde_json::{Map, Value};

use crate::error::{Result, StorageError};
use crate::query::results::Results;
use crate::query::types::ObjectsQuery;
use crate::schema::Schema;
use crate::types::{CreateMode, Record};

/// Default number of records a `Results` iterator loads per page.
pub const DEFAULT_PAGE_SIZE: usize = 64;

/// Transactional object store.
///
/// Implementors must be `Send + Sync` so a `Database` can be shared across
/// threads. Mutations (`create`, `delete`, `delete_all`) must fail with
/// [`StorageError::NotInWriteScope`] when called outside [`Store::write`].
pub trait Store: Send + Sync {
    /// The schema the store was opened with.
    fn schema(&self) -> &Schema;

    /// Create a record of `record_type` from `properties`.
    ///
    /// With [`CreateMode::Insert`] an existing primary key fails with
    /// [`StorageError::ConstraintViolation`]; with [`CreateMode::Upsert`] the
    /// supplied properties overwrite the existing record's.
    fn create(
        &self,
        record_type: &str,
        properties: Map<String, Value>,
        mode: CreateMode,
    ) -> Result<Record>;

    /// Remove `records`, located by record type and primary key.
    /// Records no longer in the store are skipped.
    fn delete(&self, records: &[Record]) -> Result<()>;

    /// Remove every record of every type.
    fn delete_all(&self) -> Result<()>;

    /// Count records matching `query`.
    fn count(&self, query: &ObjectsQuery) -> Result<usize>;

    /// Load at most `limit` records matching `query`, skipping `offset`, in a
    /// stable store order.
    fn fetch(&self, query: &ObjectsQuery, offset: usize, limit: usize) -> Result<Vec<Record>>;

    /// `true` iff the store holds no records of any type.
    fn is_empty(&self) -> Result<bool>;

    /// Run `f` inside a write scope: commit when it returns `Ok`, roll back
    /// everything it did when it returns `Err`. Scopes may nest.
    fn write<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>;

    /// Whether the calling thread is inside a write scope.
    fn in_write_scope(&self) -> bool;

    /// Release the store handle, reporting failures.
    fn close(self) -> Result<()>
    where
        Self: Sized;

    /// Page size used by lazy `Results` iteration.
    fn page_size(&self) -> usize {
        DEFAULT_PAGE_SIZE
    }

    /// A lazy view over every record of `record_type`.
    fn objects(&self, record_type: &str) -> Result<Results<'_, Self>>
    where
        Self: Sized,
    {
        if self.schema().get(record_type).is_none() {
            return Err(StorageError::UnknownRecordType(record_type.to_string()).into());
        }
        Ok(Results::new(self, ObjectsQuery::all(record_type)))
    }
}
