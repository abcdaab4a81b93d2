//! Declarative payload schemas
//!
//! A [`PhaseSchema`] is a tree of [`FieldSpec`]s. Checking walks the whole
//! payload and collects every violation instead of stopping at the first.

use crate::result::SchemaViolation;
use quill_types::{PhaseKind, StructuredValue};

/// Expected shape of a value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// String with a minimum trimmed length (in chars)
    Text {
        /// Minimum length
        min_len: usize,
    },
    /// String drawn from a fixed set (case-insensitive)
    Enum(&'static [&'static str]),
    /// Number within optional bounds
    Number {
        /// Inclusive lower bound
        min: Option<f64>,
        /// Inclusive upper bound
        max: Option<f64>,
    },
    /// Boolean
    Bool,
    /// Homogeneous list
    List {
        /// Item shape
        item: Box<FieldKind>,
        /// Minimum number of items
        min_items: usize,
    },
    /// Map with named fields
    Object(Vec<FieldSpec>),
}

impl FieldKind {
    /// Text with minimum length
    #[inline]
    #[must_use]
    pub fn text(min_len: usize) -> Self {
        Self::Text { min_len }
    }

    /// List of `item` with at least `min_items` entries
    #[inline]
    #[must_use]
    pub fn list_of(item: FieldKind, min_items: usize) -> Self {
        Self::List {
            item: Box::new(item),
            min_items,
        }
    }

    /// Non-negative integer-ish number
    #[inline]
    #[must_use]
    pub fn non_negative() -> Self {
        Self::Number {
            min: Some(0.0),
            max: None,
        }
    }
}

/// A named field within an object
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Key name
    pub name: &'static str,
    /// Expected shape
    pub kind: FieldKind,
    /// Whether absence (or null) is a violation
    pub required: bool,
}

impl FieldSpec {
    /// Required field
    #[inline]
    #[must_use]
    pub fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    /// Optional field
    #[inline]
    #[must_use]
    pub fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

/// Schema for one structured phase
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSchema {
    /// Phase the schema belongs to
    pub phase: PhaseKind,
    /// Top-level fields; the payload root must be a map
    pub fields: Vec<FieldSpec>,
}

impl PhaseSchema {
    /// Create a schema
    #[must_use]
    pub fn new(phase: PhaseKind, fields: Vec<FieldSpec>) -> Self {
        Self { phase, fields }
    }

    /// Check a payload; returns every violation found
    #[must_use]
    pub fn check(&self, payload: &StructuredValue) -> Vec<SchemaViolation> {
        let mut violations = Vec::new();
        check_object(payload, &self.fields, "$", &mut violations);
        violations
    }
}

fn check_object(
    value: &StructuredValue,
    fields: &[FieldSpec],
    path: &str,
    out: &mut Vec<SchemaViolation>,
) {
    let Some(map) = value.as_map() else {
        out.push(SchemaViolation::new(
            path,
            format!("expected map, got {}", value.kind_name()),
        ));
        return;
    };

    for field in fields {
        let field_path = format!("{path}.{}", field.name);
        match map.get(field.name) {
            None | Some(StructuredValue::Null) => {
                if field.required {
                    out.push(SchemaViolation::new(field_path, "is required"));
                }
            }
            Some(inner) => check_value(inner, &field.kind, &field_path, out),
        }
    }
}

fn check_value(
    value: &StructuredValue,
    kind: &FieldKind,
    path: &str,
    out: &mut Vec<SchemaViolation>,
) {
    match kind {
        FieldKind::Text { min_len } => match value.as_str() {
            Some(text) => {
                let len = text.trim().chars().count();
                if len < *min_len {
                    out.push(SchemaViolation::new(
                        path,
                        format!("must be at least {min_len} characters (got {len})"),
                    ));
                }
            }
            None => out.push(type_mismatch(path, "string", value)),
        },
        FieldKind::Enum(allowed) => match value.as_str() {
            Some(text) => {
                let text = text.trim();
                if !allowed.iter().any(|a| a.eq_ignore_ascii_case(text)) {
                    out.push(SchemaViolation::new(
                        path,
                        format!("must be one of [{}] (got '{text}')", allowed.join(", ")),
                    ));
                }
            }
            None => out.push(type_mismatch(path, "string", value)),
        },
        FieldKind::Number { min, max } => match value.as_f64() {
            Some(n) => {
                if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
                    let (low, high) = (fmt_bound(*min), fmt_bound(*max));
                    out.push(SchemaViolation::new(
                        path,
                        format!("must be within [{low}, {high}] (got {n})"),
                    ));
                }
            }
            None => out.push(type_mismatch(path, "number", value)),
        },
        FieldKind::Bool => {
            if value.as_bool().is_none() {
                out.push(type_mismatch(path, "bool", value));
            }
        }
        FieldKind::List { item, min_items } => match value.as_list() {
            Some(items) => {
                if items.len() < *min_items {
                    out.push(SchemaViolation::new(
                        path,
                        format!("must contain at least {min_items} item(s) (got {})", items.len()),
                    ));
                }
                for (i, element) in items.iter().enumerate() {
                    check_value(element, item, &format!("{path}[{i}]"), out);
                }
            }
            None => out.push(type_mismatch(path, "list", value)),
        },
        FieldKind::Object(fields) => check_object(value, fields, path, out),
    }
}

fn type_mismatch(path: &str, expected: &str, value: &StructuredValue) -> SchemaViolation {
    SchemaViolation::new(path, format!("expected {expected}, got {}", value.kind_name()))
}

fn fmt_bound(bound: Option<f64>) -> String {
    bound.map_or_else(|| "∞".to_string(), |b| b.to_string())
}
