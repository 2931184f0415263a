//! Schema input for the store: record types, their primary keys and the
//! typed properties each record carries.
//!
//! - [`node`]: [`PropertyKind`] / [`PropertyDef`] and the `p` constructors.
//! - [`record_type`]: [`RecordTypeDef`] and the fluent [`record_type()`] builder.
//! - [`validate`]: write-time value checks and default filling.

pub mod node;
pub mod record_type;
pub mod validate;

pub use node::{p, PropertyDef, PropertyKind};
pub use record_type::{record_type, RecordTypeBuilder, RecordTypeDef, Schema, DEFAULT_PRIMARY_KEY};
