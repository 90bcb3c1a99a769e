//! Operation normalization.
//!
//! Walks the document's path table and produces a flat, deterministic list of
//! [`Operation`] records, one per recognized method+path pair.

use crate::document::OpenApiDocument;
use crate::resolver;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Methods that become tools. Anything else under a path item (summary, servers,
/// vendor extensions) is ignored.
pub const RECOGNIZED_METHODS: [&str; 7] =
    ["get", "post", "put", "patch", "delete", "options", "head"];

/// One declared parameter, schema left uncompiled.
#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub name: String,
    pub required: bool,
    pub schema: Option<Value>,
}

/// Parameters grouped by location.
#[derive(Debug, Clone, Default)]
pub struct ParameterSet {
    pub path: Vec<ParameterSpec>,
    pub query: Vec<ParameterSpec>,
    pub header: Vec<ParameterSpec>,
    pub cookie: Vec<ParameterSpec>,
}

/// Request body descriptor with JSON-shaped content types listed first.
#[derive(Debug, Clone)]
pub struct RequestBodyInfo {
    pub required: bool,
    pub content_types: Vec<String>,
    pub schema: Option<Value>,
}

/// One HTTP method bound to one path, normalized from the document.
#[derive(Debug, Clone)]
pub struct Operation {
    pub id: String,
    pub method: String,
    pub path: String,
    pub summary: String,
    pub description: String,
    pub parameters: ParameterSet,
    pub request_body: Option<RequestBodyInfo>,
    pub requires_auth: bool,
}

/// Produces the ordered operation list for a document.
///
/// Deterministic for a given document: paths in key order, methods in the fixed
/// [`RECOGNIZED_METHODS`] order. Malformed path entries are skipped with a warning
/// rather than failing the whole load.
#[must_use]
pub fn normalize(doc: &OpenApiDocument) -> Vec<Operation> {
    let Some(paths) = doc.root().get("paths").and_then(Value::as_object) else {
        return Vec::new();
    };

    let global_auth = doc
        .root()
        .get("security")
        .and_then(Value::as_array)
        .is_some_and(|reqs| !reqs.is_empty());

    let mut ids = IdAllocator::default();
    let mut operations = Vec::new();

    for (path, item) in paths {
        let Some(item) = resolver::resolve(item, doc).and_then(Value::as_object) else {
            tracing::warn!("skipping malformed path item '{path}'");
            continue;
        };

        let shared = collect_parameters(item.get("parameters"), doc);

        for method in RECOGNIZED_METHODS {
            let Some(op) = item.get(method) else {
                continue;
            };
            let Some(op) = op.as_object() else {
                tracing::warn!("skipping malformed operation {method} {path}");
                continue;
            };

            let mut specs = shared.clone();
            specs.extend(collect_parameters(op.get("parameters"), doc));

            let base = op
                .get("operationId")
                .and_then(Value::as_str)
                .map_or_else(|| canonical_name(method, path), String::from);

            let requires_auth = match op.get("security").and_then(Value::as_array) {
                Some(reqs) => !reqs.is_empty(),
                None => global_auth,
            };

            operations.push(Operation {
                id: ids.reserve(&base),
                method: method.to_string(),
                path: path.clone(),
                summary: text_field(op, "summary"),
                description: text_field(op, "description"),
                parameters: group_by_location(specs),
                request_body: request_body(op.get("requestBody"), doc),
                requires_auth,
            });
        }
    }

    operations
}

fn text_field(op: &serde_json::Map<String, Value>, key: &str) -> String {
    op.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Raw (location, spec) pairs for one `parameters` array, references resolved.
fn collect_parameters(
    node: Option<&Value>,
    doc: &OpenApiDocument,
) -> Vec<(String, ParameterSpec)> {
    let Some(params) = node.and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for param in params {
        let Some(param) = resolver::resolve(param, doc).and_then(Value::as_object) else {
            tracing::warn!("skipping unresolvable parameter entry");
            continue;
        };
        let Some(name) = param.get("name").and_then(Value::as_str) else {
            tracing::warn!("skipping parameter without a name");
            continue;
        };
        // Unrecognized or missing locations default to query.
        let location = match param.get("in").and_then(Value::as_str) {
            Some(l @ ("path" | "query" | "header" | "cookie")) => l.to_string(),
            _ => "query".to_string(),
        };
        // Path parameters are always required, whatever the document claims.
        let required = location == "path"
            || param.get("required").and_then(Value::as_bool).unwrap_or(false);
        out.push((
            location,
            ParameterSpec {
                name: name.to_string(),
                required,
                schema: param.get("schema").cloned(),
            },
        ));
    }
    out
}

fn group_by_location(specs: Vec<(String, ParameterSpec)>) -> ParameterSet {
    let mut set = ParameterSet::default();
    for (location, spec) in specs {
        match location.as_str() {
            "path" => set.path.push(spec),
            "header" => set.header.push(spec),
            "cookie" => set.cookie.push(spec),
            _ => set.query.push(spec),
        }
    }
    set
}

fn request_body(node: Option<&Value>, doc: &OpenApiDocument) -> Option<RequestBodyInfo> {
    let body = resolver::resolve(node?, doc)?.as_object()?;
    let required = body.get("required").and_then(Value::as_bool).unwrap_or(false);

    let mut content_types: Vec<String> = body
        .get("content")
        .and_then(Value::as_object)
        .map(|content| content.keys().cloned().collect())
        .unwrap_or_default();
    // JSON-shaped content types first, otherwise document order.
    content_types.sort_by_key(|ct| !ct.contains("json"));

    let schema = content_types.first().and_then(|ct| {
        body.get("content")?
            .get(ct)?
            .get("schema")
            .cloned()
    });

    Some(RequestBodyInfo {
        required,
        content_types,
        schema,
    })
}

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9]+").expect("valid pattern"));

/// Synthesizes a tool name from method+path when the document declares no
/// `operationId`, e.g. `GET /users/{id}` becomes `get_users_id`.
fn canonical_name(method: &str, path: &str) -> String {
    let raw = format!("{}_{}", method.to_lowercase(), path);
    let mut name = NON_ALNUM.replace_all(&raw, "_").trim_matches('_').to_string();
    if name.len() > 64 {
        name.truncate(64);
        name = name.trim_end_matches('_').to_string();
    }
    name
}

/// Hands out unique ids: first occurrence keeps the bare name, later collisions get
/// `_2`, `_3` and so on in first-seen order.
#[derive(Debug, Default)]
struct IdAllocator {
    taken: HashSet<String>,
}

impl IdAllocator {
    fn reserve(&mut self, base: &str) -> String {
        if self.taken.insert(base.to_string()) {
            return base.to_string();
        }
        let mut counter = 2;
        loop {
            let candidate = format!("{base}_{counter}");
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            counter += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> OpenApiDocument {
        OpenApiDocument::from_value(value).expect("document")
    }

    #[test]
    fn canonical_names_come_from_method_and_path() {
        assert_eq!(canonical_name("GET", "/users"), "get_users");
        assert_eq!(canonical_name("post", "/items/{id}/sub"), "post_items_id_sub");
        assert_eq!(canonical_name("get", "/"), "get");
    }

    #[test]
    fn colliding_ids_get_numeric_suffixes_in_order() {
        let doc = doc(json!({
            "paths": {
                "/users": {"get": {}},
                "/users/": {"get": {}},
                "//users": {"get": {}}
            }
        }));
        let ids: Vec<_> = normalize(&doc).into_iter().map(|op| op.id).collect();
        assert_eq!(ids, vec!["get_users", "get_users_2", "get_users_3"]);
    }

    #[test]
    fn normalization_is_stable_across_runs() {
        let doc = doc(json!({
            "paths": {
                "/users": {"get": {}, "post": {}},
                "/users/": {"get": {}},
                "/pets/{petId}": {"get": {"operationId": "getPet"}, "delete": {}}
            }
        }));
        let fingerprint = |ops: Vec<Operation>| -> Vec<(String, String, String)> {
            ops.into_iter()
                .map(|op| (op.id, op.method, op.path))
                .collect()
        };
        let first = fingerprint(normalize(&doc));
        let second = fingerprint(normalize(&doc));
        assert_eq!(first, second);
        // Collision suffixes land on the same operations every time.
        assert!(first
            .iter()
            .any(|(id, _, path)| id == "get_users_2" && path == "/users/"));
    }

    #[test]
    fn operation_id_wins_over_synthesis() {
        let doc = doc(json!({
            "paths": {
                "/pets": {
                    "get": {"operationId": "listPets", "summary": "List pets"}
                }
            }
        }));
        let ops = normalize(&doc);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].id, "listPets");
        assert_eq!(ops[0].summary, "List pets");
    }

    #[test]
    fn path_level_parameters_are_shared_and_additive() {
        let doc = doc(json!({
            "paths": {
                "/items/{id}": {
                    "parameters": [
                        {"name": "id", "in": "path", "schema": {"type": "integer"}}
                    ],
                    "get": {
                        "parameters": [
                            {"name": "verbose", "in": "query", "schema": {"type": "boolean"}}
                        ]
                    },
                    "delete": {}
                }
            }
        }));
        let ops = normalize(&doc);
        assert_eq!(ops.len(), 2);

        let get = ops.iter().find(|op| op.method == "get").expect("get");
        assert_eq!(get.parameters.path.len(), 1);
        assert_eq!(get.parameters.query.len(), 1);
        assert!(get.parameters.path[0].required);

        let delete = ops.iter().find(|op| op.method == "delete").expect("delete");
        assert_eq!(delete.parameters.path.len(), 1);
        assert!(delete.parameters.query.is_empty());
    }

    #[test]
    fn unknown_parameter_location_defaults_to_query() {
        let doc = doc(json!({
            "paths": {
                "/x": {
                    "get": {
                        "parameters": [
                            {"name": "mystery", "in": "matrix"},
                            {"name": "plain"}
                        ]
                    }
                }
            }
        }));
        let ops = normalize(&doc);
        assert_eq!(ops[0].parameters.query.len(), 2);
    }

    #[test]
    fn json_content_type_is_preferred() {
        let doc = doc(json!({
            "paths": {
                "/upload": {
                    "post": {
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/xml": {"schema": {"type": "string"}},
                                "application/json": {"schema": {"type": "object"}}
                            }
                        }
                    }
                }
            }
        }));
        let ops = normalize(&doc);
        let body = ops[0].request_body.as_ref().expect("body");
        assert!(body.required);
        assert_eq!(body.content_types[0], "application/json");
        assert_eq!(body.schema, Some(json!({"type": "object"})));
    }

    #[test]
    fn auth_requirement_honors_operation_override() {
        let doc = doc(json!({
            "security": [{"apiKey": []}],
            "paths": {
                "/public": {"get": {"security": []}},
                "/private": {"get": {}}
            }
        }));
        let ops = normalize(&doc);
        let private = ops.iter().find(|op| op.path == "/private").expect("op");
        let public = ops.iter().find(|op| op.path == "/public").expect("op");
        assert!(private.requires_auth);
        assert!(!public.requires_auth);
    }

    #[test]
    fn malformed_entries_are_skipped_not_fatal() {
        let doc = doc(json!({
            "paths": {
                "/bad": "not an object",
                "/worse": {"get": 42},
                "/good": {"get": {}}
            }
        }));
        let ops = normalize(&doc);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].path, "/good");
    }

    #[test]
    fn unrecognized_methods_are_ignored() {
        let doc = doc(json!({
            "paths": {
                "/x": {"trace": {}, "summary": "ignored", "get": {}}
            }
        }));
        let ops = normalize(&doc);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].method, "get");
    }
}
