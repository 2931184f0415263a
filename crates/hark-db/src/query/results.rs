//! Results: a lazy, filterable, re-iterable view over one record type.
//!
//! Building or narrowing a `Results` never touches the store. Records are
//! loaded only when `len`, `get` or an iterator asks for them, and iterators
//! pull one page (`Store::page_size`) at a time.

use std::collections::VecDeque;

use serde_json::Value;

use crate::error::{QueryError, Result, StorageError};
use crate::storage::traits::Store;
use crate::types::Record;

use super::predicate::parse_predicate;
use super::types::ObjectsQuery;

/// Lazy view returned by `objects()`.
pub struct Results<'s, S: Store> {
    store: &'s S,
    query: ObjectsQuery,
}

impl<'s, S: Store> Clone for Results<'s, S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store,
            query: self.query.clone(),
        }
    }
}

impl<'s, S: Store> std::fmt::Debug for Results<'s, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Results").field("query", &self.query).finish()
    }
}

impl<'s, S: Store> Results<'s, S> {
    pub fn new(store: &'s S, query: ObjectsQuery) -> Self {
        Self { store, query }
    }

    pub fn record_type(&self) -> &str {
        &self.query.record_type
    }

    pub fn query(&self) -> &ObjectsQuery {
        &self.query
    }

    /// A narrower view: this view's conditions AND the ones in `template`.
    ///
    /// `$N` placeholders bind to `args[N]`. Fails on malformed templates,
    /// unbound placeholders and properties the record type does not declare.
    pub fn filtered(&self, template: &str, args: &[Value]) -> Result<Results<'s, S>> {
        let conditions = parse_predicate(template, args)?;
        let def = self
            .store
            .schema()
            .get(&self.query.record_type)
            .ok_or_else(|| StorageError::UnknownRecordType(self.query.record_type.clone()))?;
        if let Some(unknown) = conditions.iter().find(|c| def.property(&c.field).is_none()) {
            return Err(QueryError::UnknownField {
                record_type: def.name.clone(),
                field: unknown.field.clone(),
            }
            .into());
        }
        Ok(Results {
            store: self.store,
            query: self.query.and(conditions),
        })
    }

    /// Number of matching records, counted by the store.
    pub fn len(&self) -> Result<usize> {
        self.store.count(&self.query)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.store.fetch(&self.query, 0, 1)?.is_empty())
    }

    /// The record at `index` in store order, loading only that record.
    pub fn get(&self, index: usize) -> Result<Option<Record>> {
        Ok(self.store.fetch(&self.query, index, 1)?.into_iter().next())
    }

    pub fn first(&self) -> Result<Option<Record>> {
        self.get(0)
    }

    /// A fresh iterator starting at the first match.
    pub fn iter(&self) -> ResultsIter<'_, S> {
        ResultsIter {
            store: self.store,
            query: &self.query,
            page_size: self.store.page_size().max(1),
            offset: 0,
            page: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Load every matching record.
    pub fn to_vec(&self) -> Result<Vec<Record>> {
        self.iter().collect()
    }
}

impl<'r, 's, S: Store> IntoIterator for &'r Results<'s, S> {
    type Item = Result<Record>;
    type IntoIter = ResultsIter<'r, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Page-at-a-time iterator over a [`Results`] view.
///
/// Yields `Err` once and then stops if the store fails mid-iteration.
pub struct ResultsIter<'r, S: Store> {
    store: &'r S,
    query: &'r ObjectsQuery,
    page_size: usize,
    offset: usize,
    page: VecDeque<Record>,
    exhausted: bool,
}

impl<'r, S: Store> Iterator for ResultsIter<'r, S> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.page.is_empty() && !self.exhausted {
            match self.store.fetch(self.query, self.offset, self.page_size) {
                Ok(records) => {
                    tracing::trace!(
                        record_type = %self.query.record_type,
                        offset = self.offset,
                        loaded = records.len(),
                        "loaded results page"
                    );
                    self.exhausted = records.len() < self.page_size;
                    self.offset += records.len();
                    self.page = records.into();
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }
        self.page.pop_front().map(Ok)
    }
}
