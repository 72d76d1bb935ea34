//! Declarative request validation.
//!
//! Each operation declares its field constraints once; `check` walks the
//! whole declaration and collects every violation instead of stopping at
//! the first, so clients always see the complete list.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub constraint: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, constraint: &str, message: String) -> Self {
        Self {
            field: field.to_string(),
            constraint: constraint.to_string(),
            message,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Rule {
    Str { non_empty: bool },
    Int { min: i64, max: i64 },
    Bool,
    Enum(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub required: bool,
    pub rule: Rule,
}

/// Constraint declarations, one per operation.
pub mod specs {
    use super::{Field, Rule};

    pub const FILE_LIST: &[Field] = &[
        Field { name: "path", required: false, rule: Rule::Str { non_empty: false } },
        Field { name: "max", required: false, rule: Rule::Int { min: 1, max: 1000 } },
    ];

    pub const FILE_CONTENT: &[Field] = &[
        Field { name: "path", required: true, rule: Rule::Str { non_empty: true } },
        Field { name: "revision", required: false, rule: Rule::Int { min: i64::MIN, max: i64::MAX } },
    ];

    pub const FILE_HISTORY: &[Field] = &[
        Field { name: "path", required: true, rule: Rule::Str { non_empty: true } },
        Field { name: "max", required: false, rule: Rule::Int { min: 1, max: 100 } },
    ];

    pub const CHANGE_LIST: &[Field] = &[
        Field { name: "max", required: false, rule: Rule::Int { min: 1, max: 100 } },
        Field { name: "status", required: false, rule: Rule::Enum(&["pending", "submitted"]) },
        Field { name: "user", required: false, rule: Rule::Str { non_empty: false } },
    ];

    pub const SYNC: &[Field] = &[
        Field { name: "path", required: false, rule: Rule::Str { non_empty: false } },
        Field { name: "force", required: false, rule: Rule::Bool },
    ];
}

#[derive(Debug, Clone)]
enum Parsed {
    Str(String),
    Int(i64),
    Bool(bool),
}

/// Typed view over a parameter set that passed validation.
#[derive(Debug, Default)]
pub struct Validated {
    values: HashMap<&'static str, Parsed>,
}

impl Validated {
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(Parsed::Str(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn str_or(&self, name: &str, default: &str) -> String {
        self.get_str(name).unwrap_or(default).to_string()
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(Parsed::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn int_or(&self, name: &str, default: i64) -> i64 {
        self.get_int(name).unwrap_or(default)
    }

    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        match self.values.get(name) {
            Some(Parsed::Bool(value)) => *value,
            _ => default,
        }
    }
}

/// Validate `params` against `fields`, collecting every violation.
pub fn check(params: &Map<String, Value>, fields: &[Field]) -> Result<Validated, Vec<FieldError>> {
    let mut validated = Validated::default();
    let mut errors = Vec::new();

    for field in fields {
        let value = match params.get(field.name) {
            Some(Value::Null) | None => {
                if field.required {
                    errors.push(FieldError::new(
                        field.name,
                        "required",
                        format!("'{}' is required", field.name),
                    ));
                }
                continue;
            }
            Some(value) => value,
        };

        match field.rule {
            Rule::Str { non_empty } => match value.as_str() {
                Some(text) if non_empty && text.trim().is_empty() => {
                    errors.push(FieldError::new(
                        field.name,
                        "non_empty",
                        format!("'{}' must be a non-empty string", field.name),
                    ));
                }
                Some(text) => {
                    validated
                        .values
                        .insert(field.name, Parsed::Str(text.to_string()));
                }
                None => {
                    errors.push(FieldError::new(
                        field.name,
                        "string",
                        format!("'{}' must be a string", field.name),
                    ));
                }
            },
            Rule::Int { min, max } => match parse_int(value) {
                Some(number) if number < min || number > max => {
                    errors.push(FieldError::new(
                        field.name,
                        "range",
                        format!("'{}' must be between {} and {}", field.name, min, max),
                    ));
                }
                Some(number) => {
                    validated.values.insert(field.name, Parsed::Int(number));
                }
                None => {
                    errors.push(FieldError::new(
                        field.name,
                        "integer",
                        format!("'{}' must be an integer", field.name),
                    ));
                }
            },
            Rule::Bool => match parse_bool(value) {
                Some(flag) => {
                    validated.values.insert(field.name, Parsed::Bool(flag));
                }
                None => {
                    errors.push(FieldError::new(
                        field.name,
                        "boolean",
                        format!("'{}' must be a boolean", field.name),
                    ));
                }
            },
            Rule::Enum(allowed) => match value.as_str() {
                Some(text) if allowed.contains(&text) => {
                    validated
                        .values
                        .insert(field.name, Parsed::Str(text.to_string()));
                }
                _ => {
                    errors.push(FieldError::new(
                        field.name,
                        "enum",
                        format!("'{}' must be one of: {}", field.name, allowed.join(", ")),
                    ));
                }
            },
        }
    }

    if errors.is_empty() {
        Ok(validated)
    } else {
        Err(errors)
    }
}

// Query-string values arrive as strings; JSON bodies as native types.
// Both spellings are accepted for scalar rules.
fn parse_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => match text.trim().to_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
