//! Schema projection and validation.
//!
//! A [`Schema`] describes the shape of a tool's input or output. It serves
//! two purposes: projection into TypeScript surface syntax for the generated
//! stubs and the prompt catalog, and structural validation of the untyped
//! JSON arguments arriving from the sandbox. Projection is total (unknown
//! or unconstrained shapes project as `any`) while validation reports every
//! mismatch with a path into the value.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Schema
// =============================================================================

/// Structural schema for tool inputs and outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schema {
    /// Any string.
    String,
    /// Any JSON number.
    Number,
    /// `true` or `false`.
    Boolean,
    /// Exactly this JSON value (`"lit"`, `5`, ...).
    Literal(Value),
    /// Homogeneous array of the element schema.
    Array(Box<Schema>),
    /// Object with a fixed field set; unknown keys are rejected.
    Object(Vec<Field>),
    /// One of a fixed set of string literals.
    Enum(Vec<String>),
    /// Any of the member schemas.
    Union(Vec<Schema>),
    /// `T | undefined`; the value may be absent.
    Optional(Box<Schema>),
    /// `T | null`.
    Nullable(Box<Schema>),
    /// The top type; every value validates.
    Any,
}

/// A single named field of an object schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub schema: Schema,
    #[serde(default)]
    pub optional: bool,
}

impl Field {
    pub fn required(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            optional: false,
        }
    }

    pub fn optional(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            optional: true,
        }
    }
}

impl Schema {
    /// Object schema from field list.
    pub fn object(fields: Vec<Field>) -> Self {
        Schema::Object(fields)
    }

    /// Array schema with the given element type.
    pub fn array(element: Schema) -> Self {
        Schema::Array(Box::new(element))
    }

    /// String enumeration schema.
    pub fn string_enum<S: Into<String>>(variants: impl IntoIterator<Item = S>) -> Self {
        Schema::Enum(variants.into_iter().map(Into::into).collect())
    }

    /// Project this schema into TypeScript surface syntax.
    ///
    /// Total: every schema renders to some type expression.
    pub fn render(&self) -> String {
        match self {
            Schema::String => "string".to_string(),
            Schema::Number => "number".to_string(),
            Schema::Boolean => "boolean".to_string(),
            Schema::Literal(value) => {
                // serde_json renders strings quoted and scalars bare, which
                // is exactly the TS literal-type syntax.
                serde_json::to_string(value).unwrap_or_else(|_| "any".to_string())
            }
            Schema::Array(element) => {
                let inner = element.render();
                if element.is_compound() {
                    format!("({})[]", inner)
                } else {
                    format!("{}[]", inner)
                }
            }
            Schema::Object(fields) => {
                if fields.is_empty() {
                    return "{}".to_string();
                }
                let parts: Vec<String> = fields
                    .iter()
                    .map(|f| {
                        let marker = if f.optional { "?" } else { "" };
                        format!("{}{}: {}", f.name, marker, f.schema.render())
                    })
                    .collect();
                format!("{{ {} }}", parts.join("; "))
            }
            Schema::Enum(variants) => {
                if variants.is_empty() {
                    return "never".to_string();
                }
                variants
                    .iter()
                    .map(|v| format!("{:?}", v))
                    .collect::<Vec<_>>()
                    .join(" | ")
            }
            Schema::Union(members) => {
                if members.is_empty() {
                    return "never".to_string();
                }
                members
                    .iter()
                    .map(Schema::render)
                    .collect::<Vec<_>>()
                    .join(" | ")
            }
            Schema::Optional(inner) => format!("{} | undefined", inner.render()),
            Schema::Nullable(inner) => format!("{} | null", inner.render()),
            Schema::Any => "any".to_string(),
        }
    }

    /// Whether the rendered type needs parentheses inside `T[]`.
    fn is_compound(&self) -> bool {
        matches!(
            self,
            Schema::Union(_) | Schema::Optional(_) | Schema::Nullable(_) | Schema::Enum(_)
        )
    }

    /// Validate a JSON value against this schema.
    ///
    /// Returns a list of failures (empty = valid). Every failure carries the
    /// path of the offending value so the agent can repair its call site.
    pub fn validate(&self, value: &Value) -> Vec<ValidationFailure> {
        let mut failures = Vec::new();
        self.validate_at(value, "$", &mut failures);
        failures
    }

    fn validate_at(&self, value: &Value, path: &str, out: &mut Vec<ValidationFailure>) {
        match self {
            Schema::Any => {}

            Schema::String => {
                if !value.is_string() {
                    out.push(ValidationFailure::mismatch(path, "string", value));
                }
            }

            Schema::Number => {
                if !value.is_number() {
                    out.push(ValidationFailure::mismatch(path, "number", value));
                }
            }

            Schema::Boolean => {
                if !value.is_boolean() {
                    out.push(ValidationFailure::mismatch(path, "boolean", value));
                }
            }

            Schema::Literal(expected) => {
                if value != expected {
                    out.push(ValidationFailure {
                        path: path.to_string(),
                        expected: self.render(),
                        received: received_text(value),
                        message: format!(
                            "expected the literal value {}",
                            serde_json::to_string(expected).unwrap_or_default()
                        ),
                    });
                }
            }

            Schema::Array(element) => match value.as_array() {
                Some(items) => {
                    for (i, item) in items.iter().enumerate() {
                        element.validate_at(item, &format!("{}[{}]", path, i), out);
                    }
                }
                None => out.push(ValidationFailure::mismatch(path, &self.render(), value)),
            },

            Schema::Object(fields) => {
                let Some(map) = value.as_object() else {
                    out.push(ValidationFailure::mismatch(path, "object", value));
                    return;
                };

                for field in fields {
                    match map.get(&field.name) {
                        None => {
                            if !field.optional {
                                out.push(ValidationFailure {
                                    path: format!("{}.{}", path, field.name),
                                    expected: field.schema.render(),
                                    received: "missing".to_string(),
                                    message: format!("missing required field '{}'", field.name),
                                });
                            }
                        }
                        // JSON cannot express `undefined`, so an explicit null
                        // at an optional field counts as absent.
                        Some(Value::Null) if field.optional => {}
                        Some(v) => {
                            field
                                .schema
                                .validate_at(v, &format!("{}.{}", path, field.name), out);
                        }
                    }
                }

                let known: std::collections::HashSet<&str> =
                    fields.iter().map(|f| f.name.as_str()).collect();
                for key in map.keys() {
                    if !known.contains(key.as_str()) {
                        out.push(ValidationFailure {
                            path: format!("{}.{}", path, key),
                            expected: "no such field".to_string(),
                            received: received_text(&map[key]),
                            message: format!("unknown field '{}'", key),
                        });
                    }
                }
            }

            Schema::Enum(variants) => match value.as_str() {
                Some(s) if variants.iter().any(|v| v == s) => {}
                _ => {
                    out.push(ValidationFailure {
                        path: path.to_string(),
                        expected: self.render(),
                        received: received_text(value),
                        message: format!("expected one of: {}", variants.join(", ")),
                    });
                }
            },

            Schema::Union(members) => {
                let matches_any = members.iter().any(|m| m.validate(value).is_empty());
                if !matches_any {
                    out.push(ValidationFailure {
                        path: path.to_string(),
                        expected: self.render(),
                        received: received_text(value),
                        message: "value matches none of the union members".to_string(),
                    });
                }
            }

            Schema::Optional(inner) => {
                if !value.is_null() {
                    inner.validate_at(value, path, out);
                }
            }

            Schema::Nullable(inner) => {
                if !value.is_null() {
                    inner.validate_at(value, path, out);
                }
            }
        }
    }
}

// =============================================================================
// Validation failures
// =============================================================================

/// One structural mismatch found during validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    /// Path into the value, e.g. `$.items[2].name`.
    pub path: String,
    /// The projected type that was expected at the path.
    pub expected: String,
    /// What was actually there.
    pub received: String,
    /// Human-readable explanation.
    pub message: String,
}

impl ValidationFailure {
    fn mismatch(path: &str, expected: &str, value: &Value) -> Self {
        Self {
            path: path.to_string(),
            expected: expected.to_string(),
            received: received_text(value),
            message: format!("expected {}, got {}", expected, value_type_name(value)),
        }
    }
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} (expected {}, received {})",
            self.path, self.message, self.expected, self.received
        )
    }
}

fn value_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Short rendering of the received value for error messages. Long values are
/// truncated so one bad argument cannot blow up the error response.
fn received_text(v: &Value) -> String {
    let mut text = serde_json::to_string(v).unwrap_or_else(|_| value_type_name(v).to_string());
    if text.len() > 80 {
        let mut cut = 77;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("...");
    }
    text
}

// =============================================================================
// Tests
// =============================================================================
