//! A purpose-built JSON-Schema subset: `type`, `properties`, `required`,
//! `items`, `enum`, `const`, `pattern`, `format`, length and numeric bounds,
//! and `$defs`/`$ref`. Enough for manifest contracts without dragging in a
//! full draft implementation.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `type` may be a single name or a list of alternatives.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeSet {
    One(String),
    Many(Vec<String>),
}

impl TypeSet {
    pub fn contains(&self, name: &str) -> bool {
        match self {
            Self::One(t) => t == name,
            Self::Many(ts) => ts.iter().any(|t| t == name),
        }
    }
}

/// `additionalProperties`: a bare boolean or a nested schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdditionalProperties {
    Allowed(bool),
    Schema(Box<JsonSchema>),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonSchema {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<TypeSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, JsonSchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<JsonSchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(rename = "const", skip_serializing_if = "Option::is_none")]
    pub const_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(rename = "minLength", skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(rename = "maxLength", skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(rename = "additionalProperties", skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<AdditionalProperties>,
    #[serde(rename = "$ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(rename = "$defs", skip_serializing_if = "Option::is_none")]
    pub defs: Option<BTreeMap<String, JsonSchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// A single validation failure, addressed by JSON-pointer-ish path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaViolation {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})?$").unwrap());
static DATE_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}[Tt ]\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})?$").unwrap()
});
static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .unwrap()
});
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());
static URI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*:").unwrap());
static ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9@/_.:-]+$").unwrap());

/// Check a string against a named format. Unknown formats pass (the
/// constrained-string rule separately restricts which formats are allowed in
/// agent-visible schemas).
pub fn matches_format(format: &str, value: &str) -> bool {
    match format {
        "date" => DATE_RE.is_match(value),
        "time" => TIME_RE.is_match(value),
        "date-time" => DATE_TIME_RE.is_match(value),
        "uuid" => UUID_RE.is_match(value),
        "email" => EMAIL_RE.is_match(value),
        "uri" | "url" => URI_RE.is_match(value),
        "id" => ID_RE.is_match(value),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                "integer"
            } else {
                "number"
            }
        }
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_accepts(expected: &str, value: &Value) -> bool {
    match expected {
        // Every integer is a number.
        "number" => matches!(value, Value::Number(_)),
        "integer" => matches!(value, Value::Number(n) if n.is_i64() || n.is_u64()),
        other => type_name(value) == other,
    }
}

impl JsonSchema {
    /// Validate `value` against this schema. Returns every violation found.
    pub fn validate(&self, value: &Value) -> Vec<SchemaViolation> {
        let mut violations = Vec::new();
        self.validate_at(self, value, "root", &mut violations);
        violations
    }

    pub fn is_valid(&self, value: &Value) -> bool {
        self.validate(value).is_empty()
    }

    fn resolve<'a>(&'a self, root: &'a JsonSchema) -> &'a JsonSchema {
        if let Some(reference) = &self.reference {
            if let Some(name) = reference.strip_prefix("#/$defs/") {
                if let Some(defs) = &root.defs {
                    if let Some(resolved) = defs.get(name) {
                        return resolved;
                    }
                }
            }
        }
        self
    }

    fn validate_at(
        &self,
        root: &JsonSchema,
        value: &Value,
        path: &str,
        violations: &mut Vec<SchemaViolation>,
    ) {
        let schema = self.resolve(root);

        if let Some(type_set) = &schema.schema_type {
            let ok = match type_set {
                TypeSet::One(t) => type_accepts(t, value),
                TypeSet::Many(ts) => ts.iter().any(|t| type_accepts(t, value)),
            };
            if !ok {
                violations.push(SchemaViolation {
                    path: path.to_string(),
                    message: format!("expected type {type_set:?}, got {}", type_name(value)),
                });
                return;
            }
        }

        if let Some(expected) = &schema.const_value {
            if value != expected {
                violations.push(SchemaViolation {
                    path: path.to_string(),
                    message: format!("expected const {expected}"),
                });
            }
        }

        if let Some(allowed) = &schema.enum_values {
            if !allowed.contains(value) {
                violations.push(SchemaViolation {
                    path: path.to_string(),
                    message: format!("value is not one of the allowed enum values: {value}"),
                });
            }
        }

        match value {
            Value::String(s) => {
                if let Some(min) = schema.min_length {
                    if (s.chars().count() as u64) < min {
                        violations.push(SchemaViolation {
                            path: path.to_string(),
                            message: format!("string shorter than minLength {min}"),
                        });
                    }
                }
                if let Some(max) = schema.max_length {
                    if (s.chars().count() as u64) > max {
                        violations.push(SchemaViolation {
                            path: path.to_string(),
                            message: format!("string longer than maxLength {max}"),
                        });
                    }
                }
                if let Some(pattern) = &schema.pattern {
                    match Regex::new(pattern) {
                        Ok(re) => {
                            if !re.is_match(s) {
                                violations.push(SchemaViolation {
                                    path: path.to_string(),
                                    message: format!("string does not match pattern {pattern}"),
                                });
                            }
                        }
                        Err(_) => violations.push(SchemaViolation {
                            path: path.to_string(),
                            message: format!("schema pattern is not a valid regex: {pattern}"),
                        }),
                    }
                }
                if let Some(format) = &schema.format {
                    if !matches_format(format, s) {
                        violations.push(SchemaViolation {
                            path: path.to_string(),
                            message: format!("string does not match format {format}"),
                        });
                    }
                }
            }
            Value::Number(n) => {
                let as_f64 = n.as_f64().unwrap_or(f64::NAN);
                if let Some(min) = schema.minimum {
                    if as_f64 < min {
                        violations.push(SchemaViolation {
                            path: path.to_string(),
                            message: format!("number below minimum {min}"),
                        });
                    }
                }
                if let Some(max) = schema.maximum {
                    if as_f64 > max {
                        violations.push(SchemaViolation {
                            path: path.to_string(),
                            message: format!("number above maximum {max}"),
                        });
                    }
                }
            }
            Value::Object(map) => {
                if let Some(required) = &schema.required {
                    for name in required {
                        if !map.contains_key(name) {
                            violations.push(SchemaViolation {
                                path: path.to_string(),
                                message: format!("missing required property \"{name}\""),
                            });
                        }
                    }
                }
                if let Some(properties) = &schema.properties {
                    for (name, prop_schema) in properties {
                        if let Some(prop_value) = map.get(name) {
                            prop_schema.validate_at(
                                root,
                                prop_value,
                                &format!("{path}.{name}"),
                                violations,
                            );
                        }
                    }
                }
                match &schema.additional_properties {
                    Some(AdditionalProperties::Allowed(false)) => {
                        let declared = schema.properties.as_ref();
                        for name in map.keys() {
                            let known =
                                declared.map(|p| p.contains_key(name)).unwrap_or(false);
                            if !known {
                                violations.push(SchemaViolation {
                                    path: format!("{path}.{name}"),
                                    message: "unexpected additional property".to_string(),
                                });
                            }
                        }
                    }
                    Some(AdditionalProperties::Schema(extra_schema)) => {
                        let declared = schema.properties.as_ref();
                        for (name, prop_value) in map {
                            let known =
                                declared.map(|p| p.contains_key(name)).unwrap_or(false);
                            if !known {
                                extra_schema.validate_at(
                                    root,
                                    prop_value,
                                    &format!("{path}.{name}"),
                                    violations,
                                );
                            }
                        }
                    }
                    _ => {}
                }
            }
            Value::Array(elements) => {
                if let Some(item_schema) = &schema.items {
                    for (index, element) in elements.iter().enumerate() {
                        item_schema.validate_at(
                            root,
                            element,
                            &format!("{path}[{index}]"),
                            violations,
                        );
                    }
                }
            }
            _ => {}
        }
    }
}
