//! Record type definitions with a fluent builder, and the versioned [`Schema`]
//! handed to a store at open time.
//!
//! The builder never fails; [`Schema::new`] checks names, primary keys and
//! duplicates so that every problem surfaces in one place.

use std::collections::BTreeMap;

use crate::error::SchemaError;

use super::node::PropertyDef;
use super::validate::validate_name;

/// Primary key field used when a record type does not name one.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

// ============================================================================
// RecordTypeDef
// ============================================================================

/// A single record type: name, primary key field and property definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordTypeDef {
    pub name: String,
    pub primary_key: String,
    pub properties: BTreeMap<String, PropertyDef>,
}

impl RecordTypeDef {
    /// Look up a property definition by name.
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.get(name)
    }

    /// The definition of the primary key property.
    ///
    /// Always present for definitions accepted by [`Schema::new`].
    pub fn primary_key_def(&self) -> Option<&PropertyDef> {
        self.properties.get(&self.primary_key)
    }

    fn check(&self) -> Result<(), SchemaError> {
        validate_name("record type", &self.name)?;
        for name in self.properties.keys() {
            validate_name("property", name)?;
        }
        let pk = self.primary_key_def().ok_or_else(|| {
            SchemaError::InvalidDefinition(format!(
                "record type \"{}\" declares primary key \"{}\" but has no such property",
                self.name, self.primary_key
            ))
        })?;
        if !pk.kind.is_key_kind() {
            return Err(SchemaError::InvalidDefinition(format!(
                "primary key \"{}.{}\" must be a string or int property, got {}",
                self.name,
                self.primary_key,
                pk.kind.name()
            )));
        }
        if pk.optional {
            return Err(SchemaError::InvalidDefinition(format!(
                "primary key \"{}.{}\" cannot be optional",
                self.name, self.primary_key
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Start building a record type named `name`.
///
/// ```
/// use hark_db::schema::{p, record_type};
///
/// let user = record_type("User")
///     .property("id", p::string())
///     .property("username", p::string())
///     .build();
/// assert_eq!(user.primary_key, "id");
/// ```
pub fn record_type(name: impl Into<String>) -> RecordTypeBuilder {
    RecordTypeBuilder {
        name: name.into(),
        primary_key: DEFAULT_PRIMARY_KEY.to_string(),
        properties: BTreeMap::new(),
    }
}

/// Fluent builder returned by [`record_type()`].
pub struct RecordTypeBuilder {
    name: String,
    primary_key: String,
    properties: BTreeMap<String, PropertyDef>,
}

impl RecordTypeBuilder {
    /// Use `field` instead of `id` as the primary key.
    pub fn primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key = field.into();
        self
    }

    /// Declare a property. Declaring the same name twice keeps the last one.
    pub fn property(mut self, name: impl Into<String>, def: PropertyDef) -> Self {
        self.properties.insert(name.into(), def);
        self
    }

    pub fn build(self) -> RecordTypeDef {
        RecordTypeDef {
            name: self.name,
            primary_key: self.primary_key,
            properties: self.properties,
        }
    }
}

// ============================================================================
// Schema
// ============================================================================

/// An ordered collection of record types plus a schema version.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    version: u32,
    types: Vec<RecordTypeDef>,
}

impl Schema {
    /// Validate and assemble a schema.
    pub fn new(version: u32, types: Vec<RecordTypeDef>) -> Result<Self, SchemaError> {
        for (i, def) in types.iter().enumerate() {
            def.check()?;
            if types[..i].iter().any(|other| other.name == def.name) {
                return Err(SchemaError::InvalidDefinition(format!(
                    "record type \"{}\" is declared more than once",
                    def.name
                )));
            }
        }
        Ok(Self { version, types })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Record types in declaration order.
    pub fn types(&self) -> &[RecordTypeDef] {
        &self.types
    }

    /// Look up a record type by name.
    pub fn get(&self, name: &str) -> Option<&RecordTypeDef> {
        self.types.iter().find(|t| t.name == name)
    }
}
