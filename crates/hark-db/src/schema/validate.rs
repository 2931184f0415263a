use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{SchemaError, ValidationError, ValidationErrors};

use super::node::{PropertyDef, PropertyKind};
use super::record_type::RecordTypeDef;

// ============================================================================
// Regexes
// ============================================================================

/// Record type and property names end up inside JSON paths, so they are
/// restricted to plain identifiers.
fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("name regex is valid"))
}

fn iso_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}(?:\.[0-9]{1,9})?(?:Z|[+-][0-9]{2}:[0-9]{2})?$")
            .expect("ISO date regex is valid")
    })
}

/// Returns `true` when `name` is a valid record type or property identifier.
pub fn is_valid_name(name: &str) -> bool {
    name_regex().is_match(name)
}

pub(crate) fn validate_name(what: &str, name: &str) -> Result<(), SchemaError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(SchemaError::InvalidDefinition(format!(
            "invalid {what} name {name:?}: must match [a-zA-Z_][a-zA-Z0-9_]*"
        )))
    }
}

/// Validate ISO 8601 format, then semantic correctness via chrono.
fn is_valid_iso_date(s: &str) -> bool {
    if !iso_date_regex().is_match(s) {
        return false;
    }
    let has_offset = s.ends_with('Z') || s[10..].contains('+') || s[19..].contains('-');
    let normalised = if has_offset {
        s.to_string()
    } else {
        format!("{s}Z")
    };
    chrono::DateTime::parse_from_rfc3339(&normalised).is_ok()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Single-value checks
// ============================================================================

/// Check one property value against its definition, recording a failure in
/// `errors` under `path`.
fn check_value(path: &str, def: &PropertyDef, value: &Value, errors: &mut Vec<ValidationError>) {
    if value.is_null() && (def.optional || def.kind == PropertyKind::Json) {
        return;
    }
    let ok = match def.kind {
        PropertyKind::String => value.is_string(),
        PropertyKind::Int => value.is_i64(),
        PropertyKind::Float => value.is_number(),
        PropertyKind::Bool => value.is_boolean(),
        PropertyKind::Date => value.as_str().is_some_and(is_valid_iso_date),
        PropertyKind::Json => true,
    };
    if !ok {
        let expected = match (def.kind, def.optional) {
            (PropertyKind::Date, false) => "ISO 8601 date string".to_string(),
            (PropertyKind::Date, true) => "ISO 8601 date string or null".to_string(),
            (kind, false) => kind.name().to_string(),
            (kind, true) => format!("{} or null", kind.name()),
        };
        errors.push(ValidationError {
            path: path.to_string(),
            expected,
            received: type_name(value).to_string(),
        });
    }
}

/// Check every supplied property: it must be declared and well-typed.
fn check_supplied(def: &RecordTypeDef, supplied: &Map<String, Value>) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for (name, value) in supplied {
        let path = format!("{}.{}", def.name, name);
        match def.property(name) {
            Some(prop) => check_value(&path, prop, value, &mut errors),
            None => errors.push(ValidationError {
                path,
                expected: "a declared property".to_string(),
                received: "undeclared property".to_string(),
            }),
        }
    }
    errors
}

// ============================================================================
// Public API
// ============================================================================

/// Build the full property map of a new record from the caller's properties.
///
/// Supplied values are type-checked; unsupplied properties take their default,
/// `null` when optional, or the kind's zero value. The primary key must be
/// supplied.
pub fn prepare_new(
    def: &RecordTypeDef,
    supplied: Map<String, Value>,
) -> Result<Map<String, Value>, ValidationErrors> {
    let mut errors = check_supplied(def, &supplied);
    if !supplied.contains_key(&def.primary_key) {
        errors.push(ValidationError {
            path: format!("{}.{}", def.name, def.primary_key),
            expected: "primary key value".to_string(),
            received: "nothing".to_string(),
        });
    }
    if !errors.is_empty() {
        return Err(ValidationErrors(errors));
    }

    let mut supplied = supplied;
    let mut values = Map::new();
    for (name, prop) in &def.properties {
        let value = supplied.remove(name).unwrap_or_else(|| prop.initial_value());
        values.insert(name.clone(), value);
    }
    Ok(values)
}

/// Overlay the caller's properties onto an existing record's values.
///
/// Only supplied properties change; the primary key value is never rewritten
/// because it is what located `existing` in the first place.
pub fn prepare_overwrite(
    def: &RecordTypeDef,
    existing: Map<String, Value>,
    supplied: Map<String, Value>,
) -> Result<Map<String, Value>, ValidationErrors> {
    let errors = check_supplied(def, &supplied);
    if !errors.is_empty() {
        return Err(ValidationErrors(errors));
    }
    let mut values = existing;
    for (name, value) in supplied {
        values.insert(name, value);
    }
    Ok(values)
}

/// Render a primary key value as the text the store indexes it by.
///
/// Strings are used as-is; integers use their decimal form. Anything else is
/// rejected with a description of what was received.
pub fn primary_key_text(def: &RecordTypeDef, value: &Value) -> Result<String, String> {
    let kind = def
        .primary_key_def()
        .map(|p| p.kind)
        .unwrap_or(PropertyKind::String);
    match (kind, value) {
        (PropertyKind::String, Value::String(s)) => Ok(s.clone()),
        (PropertyKind::Int, Value::Number(n)) if n.is_i64() => Ok(n.to_string()),
        (kind, other) => Err(format!(
            "expected {} value for \"{}\", received {}",
            kind.name(),
            def.primary_key,
            type_name(other)
        )),
    }
}
