use serde_json::Value;

// ============================================================================
// PropertyKind
// ============================================================================

/// The storage type of a single record property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    String,
    /// Signed 64-bit integer.
    Int,
    Float,
    Bool,
    /// ISO 8601 timestamp stored as a string.
    Date,
    /// Any JSON value, stored verbatim.
    Json,
}

impl PropertyKind {
    /// Human-readable name used in validation messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Date => "date",
            Self::Json => "json",
        }
    }

    /// Value a required property takes when neither the caller nor the schema
    /// supplies one.
    pub fn zero_value(self) -> Value {
        match self {
            Self::String => Value::String(String::new()),
            Self::Int => Value::from(0),
            Self::Float => Value::from(0.0),
            Self::Bool => Value::Bool(false),
            Self::Date | Self::Json => Value::Null,
        }
    }

    /// Kinds that may serve as a primary key.
    pub fn is_key_kind(self) -> bool {
        matches!(self, Self::String | Self::Int)
    }
}

// ============================================================================
// PropertyDef
// ============================================================================

/// A property definition: kind plus optional/default metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDef {
    pub kind: PropertyKind,
    pub optional: bool,
    pub default: Option<Value>,
}

impl PropertyDef {
    pub fn new(kind: PropertyKind) -> Self {
        Self {
            kind,
            optional: false,
            default: None,
        }
    }

    /// Attach a default applied when a record is created without this property.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Value used for this property on a freshly created record.
    pub fn initial_value(&self) -> Value {
        match &self.default {
            Some(v) => v.clone(),
            None if self.optional => Value::Null,
            None => self.kind.zero_value(),
        }
    }
}

// ============================================================================
// Schema Builder API (`p` module)
// ============================================================================

/// Property builder helpers. Usage: `p::string()`, `p::int()`,
/// `p::optional(p::date())`, `p::string().with_default("guest")`.
pub mod p {
    use super::{PropertyDef, PropertyKind};

    pub fn string() -> PropertyDef {
        PropertyDef::new(PropertyKind::String)
    }

    pub fn int() -> PropertyDef {
        PropertyDef::new(PropertyKind::Int)
    }

    pub fn float() -> PropertyDef {
        PropertyDef::new(PropertyKind::Float)
    }

    pub fn boolean() -> PropertyDef {
        PropertyDef::new(PropertyKind::Bool)
    }

    pub fn date() -> PropertyDef {
        PropertyDef::new(PropertyKind::Date)
    }

    pub fn json() -> PropertyDef {
        PropertyDef::new(PropertyKind::Json)
    }

    pub fn optional(mut inner: PropertyDef) -> PropertyDef {
        inner.optional = true;
        inner
    }
}
