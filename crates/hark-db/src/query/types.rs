//! Query type definitions: comparison operators, conditions and the
//! per-record-type query description handed to a store.

use serde_json::Value;

// ============================================================================
// Operators
// ============================================================================

/// A comparison operator usable in predicate templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BeginsWith,
    EndsWith,
    Contains,
}

impl CompareOp {
    /// Operators that only make sense with a string operand.
    pub fn is_string_op(self) -> bool {
        matches!(self, Self::BeginsWith | Self::EndsWith | Self::Contains)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::BeginsWith => "BEGINSWITH",
            Self::EndsWith => "ENDSWITH",
            Self::Contains => "CONTAINS",
        }
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// One `field OP value` condition with its operand already bound.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub field: String,
    pub op: CompareOp,
    pub value: Value,
}

/// Everything a store needs to answer `objects(type).filtered(...)`:
/// the record type plus a conjunction of conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectsQuery {
    pub record_type: String,
    pub conditions: Vec<Comparison>,
}

impl ObjectsQuery {
    /// Every record of `record_type`.
    pub fn all(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            conditions: Vec::new(),
        }
    }

    /// This query narrowed by additional conditions.
    pub fn and(&self, more: Vec<Comparison>) -> Self {
        let mut conditions = self.conditions.clone();
        conditions.extend(more);
        Self {
            record_type: self.record_type.clone(),
            conditions,
        }
    }
}
