//! Schema compilation and input validation.
//!
//! `compile` turns one `OpenAPI` schema node into a [`ValidationNode`] tree. It never
//! fails: anything it cannot understand (unresolvable references, cycles, unknown
//! types) degrades to [`ValidationNode::Any`] so the rest of the tool set stays
//! available.

use crate::document::OpenApiDocument;
use crate::resolver;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};

/// Policy for object keys not listed in `properties`.
#[derive(Debug, Clone)]
pub enum AdditionalKeys {
    /// Unknown keys are rejected.
    Deny,
    /// Unknown keys are accepted with any value.
    Allow,
    /// Unknown keys are accepted when their value is a primitive (string, number,
    /// boolean or null). Used for query objects, where documents are frequently
    /// incomplete about optional filters.
    Primitive,
    /// Unknown keys must conform to the given schema.
    Schema(Box<ValidationNode>),
}

/// One declared object property.
#[derive(Debug, Clone)]
pub struct Property {
    pub node: ValidationNode,
    pub required: bool,
}

/// A compiled runtime validation schema.
#[derive(Debug, Clone)]
pub enum ValidationNode {
    /// Accepts any value. The graceful-degradation sink for unresolvable input.
    Any,
    Bool,
    Str {
        min_length: Option<u64>,
        max_length: Option<u64>,
        pattern: Option<Regex>,
        /// Descriptive only (`date`, `date-time`); no parsing conversion is applied.
        format: Option<String>,
    },
    Num {
        integer: bool,
        minimum: Option<f64>,
        maximum: Option<f64>,
        exclusive_minimum: Option<f64>,
        exclusive_maximum: Option<f64>,
    },
    Array {
        items: Box<ValidationNode>,
        min_items: Option<u64>,
        max_items: Option<u64>,
    },
    Object {
        properties: BTreeMap<String, Property>,
        additional: AdditionalKeys,
    },
    /// Closed choice over literal values.
    Enum(Vec<Value>),
    /// Accepts null in addition to whatever the inner node accepts.
    Nullable(Box<ValidationNode>),
}

impl ValidationNode {
    /// Plain string with no constraints attached.
    #[must_use]
    pub fn string() -> Self {
        Self::Str {
            min_length: None,
            max_length: None,
            pattern: None,
            format: None,
        }
    }

    /// Validates `value`, collecting every violation instead of stopping at the
    /// first one.
    ///
    /// # Errors
    ///
    /// Returns the list of violations, each prefixed with a `$`-rooted path.
    pub fn validate(&self, value: &Value) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();
        self.check(value, "$", &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn check(&self, value: &Value, path: &str, errors: &mut Vec<String>) {
        match self {
            Self::Any => {}
            Self::Bool => {
                if !value.is_boolean() {
                    errors.push(format!("{path}: expected a boolean"));
                }
            }
            Self::Str {
                min_length,
                max_length,
                pattern,
                ..
            } => {
                let Some(s) = value.as_str() else {
                    errors.push(format!("{path}: expected a string"));
                    return;
                };
                let len = s.chars().count() as u64;
                if let Some(min) = min_length {
                    if len < *min {
                        errors.push(format!("{path}: shorter than minLength {min}"));
                    }
                }
                if let Some(max) = max_length {
                    if len > *max {
                        errors.push(format!("{path}: longer than maxLength {max}"));
                    }
                }
                if let Some(re) = pattern {
                    if !re.is_match(s) {
                        errors.push(format!("{path}: does not match pattern '{}'", re.as_str()));
                    }
                }
            }
            Self::Num {
                integer,
                minimum,
                maximum,
                exclusive_minimum,
                exclusive_maximum,
            } => {
                let Some(n) = value.as_f64() else {
                    errors.push(format!("{path}: expected a number"));
                    return;
                };
                if *integer && n.fract() != 0.0 {
                    errors.push(format!("{path}: expected an integer"));
                }
                if let Some(min) = minimum {
                    if n < *min {
                        errors.push(format!("{path}: below minimum {min}"));
                    }
                }
                if let Some(max) = maximum {
                    if n > *max {
                        errors.push(format!("{path}: above maximum {max}"));
                    }
                }
                if let Some(min) = exclusive_minimum {
                    if n <= *min {
                        errors.push(format!("{path}: must be greater than {min}"));
                    }
                }
                if let Some(max) = exclusive_maximum {
                    if n >= *max {
                        errors.push(format!("{path}: must be less than {max}"));
                    }
                }
            }
            Self::Array {
                items,
                min_items,
                max_items,
            } => {
                let Some(arr) = value.as_array() else {
                    errors.push(format!("{path}: expected an array"));
                    return;
                };
                let len = arr.len() as u64;
                if let Some(min) = min_items {
                    if len < *min {
                        errors.push(format!("{path}: fewer than minItems {min}"));
                    }
                }
                if let Some(max) = max_items {
                    if len > *max {
                        errors.push(format!("{path}: more than maxItems {max}"));
                    }
                }
                for (i, item) in arr.iter().enumerate() {
                    items.check(item, &format!("{path}[{i}]"), errors);
                }
            }
            Self::Object {
                properties,
                additional,
            } => {
                let Some(obj) = value.as_object() else {
                    errors.push(format!("{path}: expected an object"));
                    return;
                };
                for (name, prop) in properties {
                    match obj.get(name) {
                        Some(v) => prop.node.check(v, &format!("{path}.{name}"), errors),
                        None if prop.required => {
                            errors.push(format!("{path}: missing required key '{name}'"));
                        }
                        None => {}
                    }
                }
                for (name, v) in obj {
                    if properties.contains_key(name) {
                        continue;
                    }
                    match additional {
                        AdditionalKeys::Deny => {
                            errors.push(format!("{path}: unexpected key '{name}'"));
                        }
                        AdditionalKeys::Allow => {}
                        AdditionalKeys::Primitive => {
                            if v.is_object() || v.is_array() {
                                errors.push(format!(
                                    "{path}.{name}: extra keys must have primitive values",
                                ));
                            }
                        }
                        AdditionalKeys::Schema(node) => {
                            node.check(v, &format!("{path}.{name}"), errors);
                        }
                    }
                }
            }
            Self::Enum(values) => {
                if !values.contains(value) {
                    let allowed = values
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ");
                    errors.push(format!("{path}: must be one of [{allowed}]"));
                }
            }
            Self::Nullable(inner) => {
                if !value.is_null() {
                    inner.check(value, path, errors);
                }
            }
        }
    }

    /// Renders the node as a JSON Schema fragment for tool listings.
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        match self {
            Self::Any => json!({}),
            Self::Bool => json!({"type": "boolean"}),
            Self::Str {
                min_length,
                max_length,
                pattern,
                format,
            } => {
                let mut out = Map::new();
                out.insert("type".into(), json!("string"));
                if let Some(min) = min_length {
                    out.insert("minLength".into(), json!(min));
                }
                if let Some(max) = max_length {
                    out.insert("maxLength".into(), json!(max));
                }
                if let Some(re) = pattern {
                    out.insert("pattern".into(), json!(re.as_str()));
                }
                if let Some(f) = format {
                    out.insert("format".into(), json!(f));
                }
                Value::Object(out)
            }
            Self::Num {
                integer,
                minimum,
                maximum,
                exclusive_minimum,
                exclusive_maximum,
            } => {
                let mut out = Map::new();
                out.insert(
                    "type".into(),
                    json!(if *integer { "integer" } else { "number" }),
                );
                if let Some(min) = minimum {
                    out.insert("minimum".into(), json!(min));
                }
                if let Some(max) = maximum {
                    out.insert("maximum".into(), json!(max));
                }
                if let Some(min) = exclusive_minimum {
                    out.insert("exclusiveMinimum".into(), json!(min));
                }
                if let Some(max) = exclusive_maximum {
                    out.insert("exclusiveMaximum".into(), json!(max));
                }
                Value::Object(out)
            }
            Self::Array {
                items,
                min_items,
                max_items,
            } => {
                let mut out = Map::new();
                out.insert("type".into(), json!("array"));
                out.insert("items".into(), items.to_json_schema());
                if let Some(min) = min_items {
                    out.insert("minItems".into(), json!(min));
                }
                if let Some(max) = max_items {
                    out.insert("maxItems".into(), json!(max));
                }
                Value::Object(out)
            }
            Self::Object {
                properties,
                additional,
            } => {
                let mut props = Map::new();
                let mut required = Vec::new();
                for (name, prop) in properties {
                    props.insert(name.clone(), prop.node.to_json_schema());
                    if prop.required {
                        required.push(json!(name));
                    }
                }
                let mut out = Map::new();
                out.insert("type".into(), json!("object"));
                out.insert("properties".into(), Value::Object(props));
                if !required.is_empty() {
                    out.insert("required".into(), Value::Array(required));
                }
                let additional_schema = match additional {
                    AdditionalKeys::Deny => json!(false),
                    AdditionalKeys::Allow => json!(true),
                    AdditionalKeys::Primitive => {
                        json!({"type": ["string", "number", "boolean", "null"]})
                    }
                    AdditionalKeys::Schema(node) => node.to_json_schema(),
                };
                out.insert("additionalProperties".into(), additional_schema);
                Value::Object(out)
            }
            Self::Enum(values) => json!({"enum": values}),
            Self::Nullable(inner) => {
                json!({"anyOf": [inner.to_json_schema(), {"type": "null"}]})
            }
        }
    }
}

/// Compiles an `OpenAPI` schema node into a validation tree.
///
/// `None` (no schema declared) compiles to accept-anything.
#[must_use]
pub fn compile(node: Option<&Value>, doc: &OpenApiDocument) -> ValidationNode {
    let mut visiting = HashSet::new();
    compile_node(node, doc, &mut visiting)
}

fn compile_node(
    node: Option<&Value>,
    doc: &OpenApiDocument,
    visiting: &mut HashSet<String>,
) -> ValidationNode {
    let Some(node) = node else {
        return ValidationNode::Any;
    };

    if let Some(target) = resolver::reference(node) {
        // The guard is scoped to the current compilation chain: siblings may reuse
        // the same reference, only true cycles collapse to Any.
        if visiting.contains(target) {
            return ValidationNode::Any;
        }
        let Some(resolved) = resolver::lookup(doc, target) else {
            tracing::warn!("unresolvable reference '{target}', accepting any value");
            return ValidationNode::Any;
        };
        visiting.insert(target.to_string());
        let compiled = compile_node(Some(resolved), doc, visiting);
        visiting.remove(target);
        return compiled;
    }

    let Some(obj) = node.as_object() else {
        return ValidationNode::Any;
    };

    let nullable = obj.get("nullable").and_then(Value::as_bool).unwrap_or(false)
        || matches!(obj.get("type"), Some(Value::Array(types))
            if types.iter().any(|t| t.as_str() == Some("null")));

    let inner = compile_typed(obj, doc, visiting);
    if nullable {
        ValidationNode::Nullable(Box::new(inner))
    } else {
        inner
    }
}

fn compile_typed(
    obj: &Map<String, Value>,
    doc: &OpenApiDocument,
    visiting: &mut HashSet<String>,
) -> ValidationNode {
    if let Some(values) = obj.get("enum").and_then(Value::as_array) {
        return ValidationNode::Enum(values.clone());
    }

    let declared = match obj.get("type") {
        Some(Value::String(s)) => Some(s.as_str()),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null"),
        _ => None,
    };
    let ty = declared.or_else(|| {
        if obj.contains_key("properties") {
            Some("object")
        } else if obj.contains_key("items") {
            Some("array")
        } else {
            None
        }
    });

    match ty {
        Some("string") => {
            let pattern = obj
                .get("pattern")
                .and_then(Value::as_str)
                .and_then(|p| match Regex::new(p) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        tracing::warn!("ignoring invalid pattern '{p}': {e}");
                        None
                    }
                });
            ValidationNode::Str {
                min_length: obj.get("minLength").and_then(Value::as_u64),
                max_length: obj.get("maxLength").and_then(Value::as_u64),
                pattern,
                format: obj
                    .get("format")
                    .and_then(Value::as_str)
                    .filter(|f| *f == "date" || *f == "date-time")
                    .map(String::from),
            }
        }
        Some(t @ ("integer" | "number")) => {
            let minimum = obj.get("minimum").and_then(Value::as_f64);
            let maximum = obj.get("maximum").and_then(Value::as_f64);
            // 3.0 expresses exclusive bounds as booleans qualifying minimum/maximum,
            // 3.1 as standalone numbers.
            let (minimum, exclusive_minimum) = match obj.get("exclusiveMinimum") {
                Some(Value::Bool(true)) => (None, minimum),
                Some(v) if v.is_number() => (minimum, v.as_f64()),
                _ => (minimum, None),
            };
            let (maximum, exclusive_maximum) = match obj.get("exclusiveMaximum") {
                Some(Value::Bool(true)) => (None, maximum),
                Some(v) if v.is_number() => (maximum, v.as_f64()),
                _ => (maximum, None),
            };
            ValidationNode::Num {
                integer: t == "integer",
                minimum,
                maximum,
                exclusive_minimum,
                exclusive_maximum,
            }
        }
        Some("boolean") => ValidationNode::Bool,
        Some("array") => ValidationNode::Array {
            items: Box::new(compile_node(obj.get("items"), doc, visiting)),
            min_items: obj.get("minItems").and_then(Value::as_u64),
            max_items: obj.get("maxItems").and_then(Value::as_u64),
        },
        Some("object") => {
            let required: HashSet<&str> = obj
                .get("required")
                .and_then(Value::as_array)
                .map(|names| names.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            let mut properties = BTreeMap::new();
            if let Some(props) = obj.get("properties").and_then(Value::as_object) {
                for (name, schema) in props {
                    properties.insert(
                        name.clone(),
                        Property {
                            node: compile_node(Some(schema), doc, visiting),
                            required: required.contains(name.as_str()),
                        },
                    );
                }
            }
            let additional = match obj.get("additionalProperties") {
                None | Some(Value::Bool(false)) | Some(Value::Null) => AdditionalKeys::Deny,
                Some(Value::Bool(true)) => AdditionalKeys::Allow,
                Some(schema) => {
                    AdditionalKeys::Schema(Box::new(compile_node(Some(schema), doc, visiting)))
                }
            };
            ValidationNode::Object {
                properties,
                additional,
            }
        }
        _ => ValidationNode::Any,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> OpenApiDocument {
        OpenApiDocument::from_value(value).expect("document")
    }

    fn empty_doc() -> OpenApiDocument {
        doc(json!({}))
    }

    #[test]
    fn absent_schema_accepts_anything() {
        let node = compile(None, &empty_doc());
        assert!(node.validate(&json!({"anything": [1, null]})).is_ok());
    }

    #[test]
    fn self_referential_schema_compiles_and_terminates() {
        let doc = doc(json!({
            "components": {
                "schemas": {
                    "Node": {
                        "type": "object",
                        "required": ["name"],
                        "properties": {
                            "name": {"type": "string"},
                            "parent": {"$ref": "#/components/schemas/Node"}
                        }
                    }
                }
            }
        }));
        let schema = json!({"$ref": "#/components/schemas/Node"});
        let node = compile(Some(&schema), &doc);

        // The cyclic branch accepts anything, the rest still validates.
        assert!(node
            .validate(&json!({"name": "a", "parent": {"bogus": true}}))
            .is_ok());
        assert!(node.validate(&json!({"parent": null})).is_err());
    }

    #[test]
    fn siblings_may_share_a_reference() {
        let doc = doc(json!({
            "components": {
                "schemas": {
                    "Id": {"type": "integer"}
                }
            }
        }));
        let schema = json!({
            "type": "object",
            "properties": {
                "a": {"$ref": "#/components/schemas/Id"},
                "b": {"$ref": "#/components/schemas/Id"}
            }
        });
        let node = compile(Some(&schema), &doc);
        assert!(node.validate(&json!({"a": 1, "b": 2})).is_ok());
        assert!(node.validate(&json!({"a": 1, "b": "two"})).is_err());
    }

    #[test]
    fn enum_is_a_closed_choice() {
        let schema = json!({"type": "string", "enum": ["asc", "desc"]});
        let node = compile(Some(&schema), &empty_doc());
        assert!(node.validate(&json!("asc")).is_ok());
        let errors = node.validate(&json!("sideways")).expect_err("rejected");
        assert!(errors[0].contains("asc"));
    }

    #[test]
    fn nullable_wraps_the_computed_type() {
        let schema = json!({"type": "string", "nullable": true});
        let node = compile(Some(&schema), &empty_doc());
        assert!(node.validate(&json!(null)).is_ok());
        assert!(node.validate(&json!("x")).is_ok());
        assert!(node.validate(&json!(3)).is_err());

        let schema = json!({"type": ["integer", "null"]});
        let node = compile(Some(&schema), &empty_doc());
        assert!(node.validate(&json!(null)).is_ok());
        assert!(node.validate(&json!(5)).is_ok());
    }

    #[test]
    fn type_is_inferred_from_structure() {
        let node = compile(
            Some(&json!({"properties": {"a": {"type": "string"}}})),
            &empty_doc(),
        );
        assert!(matches!(node, ValidationNode::Object { .. }));

        let node = compile(Some(&json!({"items": {"type": "integer"}})), &empty_doc());
        assert!(matches!(node, ValidationNode::Array { .. }));
    }

    #[test]
    fn integer_rejects_fractional_values() {
        let node = compile(Some(&json!({"type": "integer"})), &empty_doc());
        assert!(node.validate(&json!(3)).is_ok());
        assert!(node.validate(&json!(3.5)).is_err());
    }

    #[test]
    fn numeric_bounds_are_enforced() {
        let schema = json!({"type": "number", "minimum": 0, "exclusiveMaximum": 10});
        let node = compile(Some(&schema), &empty_doc());
        assert!(node.validate(&json!(0)).is_ok());
        assert!(node.validate(&json!(9.9)).is_ok());
        assert!(node.validate(&json!(-1)).is_err());
        assert!(node.validate(&json!(10)).is_err());
    }

    #[test]
    fn string_constraints_are_enforced() {
        let schema = json!({
            "type": "string",
            "minLength": 2,
            "maxLength": 4,
            "pattern": "^[a-z]+$"
        });
        let node = compile(Some(&schema), &empty_doc());
        assert!(node.validate(&json!("abc")).is_ok());
        assert!(node.validate(&json!("a")).is_err());
        assert!(node.validate(&json!("abcde")).is_err());
        assert!(node.validate(&json!("AB1")).is_err());
    }

    #[test]
    fn invalid_pattern_is_ignored() {
        let schema = json!({"type": "string", "pattern": "(["});
        let node = compile(Some(&schema), &empty_doc());
        assert!(node.validate(&json!("anything")).is_ok());
    }

    #[test]
    fn object_rejects_unknown_keys_by_default() {
        let schema = json!({
            "type": "object",
            "properties": {"a": {"type": "string"}}
        });
        let node = compile(Some(&schema), &empty_doc());
        assert!(node.validate(&json!({"a": "x"})).is_ok());
        let errors = node
            .validate(&json!({"a": "x", "b": 1}))
            .expect_err("rejected");
        assert!(errors[0].contains("'b'"));
    }

    #[test]
    fn additional_properties_schema_constrains_unknown_keys() {
        let schema = json!({
            "type": "object",
            "properties": {},
            "additionalProperties": {"type": "integer"}
        });
        let node = compile(Some(&schema), &empty_doc());
        assert!(node.validate(&json!({"x": 1})).is_ok());
        assert!(node.validate(&json!({"x": "one"})).is_err());
    }

    #[test]
    fn primitive_additional_keys_reject_structured_values() {
        let node = ValidationNode::Object {
            properties: BTreeMap::new(),
            additional: AdditionalKeys::Primitive,
        };
        assert!(node.validate(&json!({"limit": 10, "q": "x"})).is_ok());
        assert!(node.validate(&json!({"filter": {"a": 1}})).is_err());
    }

    #[test]
    fn json_schema_rendering_includes_constraints() {
        let schema = json!({
            "type": "object",
            "required": ["id"],
            "properties": {
                "id": {"type": "integer", "minimum": 1},
                "tags": {"type": "array", "items": {"type": "string"}}
            }
        });
        let rendered = compile(Some(&schema), &empty_doc()).to_json_schema();
        assert_eq!(rendered["type"], "object");
        assert_eq!(rendered["required"], json!(["id"]));
        assert_eq!(rendered["properties"]["id"]["minimum"], json!(1.0));
        assert_eq!(rendered["properties"]["tags"]["items"]["type"], "string");
        assert_eq!(rendered["additionalProperties"], json!(false));
    }
}
