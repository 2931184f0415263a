//! Filterable, lazily loaded views over the records of one type.
//!
//! - [`types`]: [`ObjectsQuery`], [`Comparison`], [`CompareOp`].
//! - [`predicate`]: parses `"username == $0 AND age >= $1"` templates.
//! - [`results`]: [`Results`], the lazy view returned by `objects()`.

pub mod predicate;
pub mod results;
pub mod types;

pub use predicate::parse_predicate;
pub use results::{Results, ResultsIter};
pub use types::{CompareOp, Comparison, ObjectsQuery};
