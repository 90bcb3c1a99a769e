//! Tool registry: one validated, callable MCP tool per operation.

use crate::document::OpenApiDocument;
use crate::error::{ApiLinkError, Result};
use crate::operations::{self, Operation};
use crate::schema::{self, AdditionalKeys, Property, ValidationNode};
use rmcp::model::{JsonObject, Tool, ToolAnnotations};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One operation together with its compiled input contract.
#[derive(Debug, Clone)]
pub struct RegisteredTool {
    pub operation: Operation,
    pub contract: ValidationNode,
    pub input_schema: Value,
    pub description: String,
}

/// The full tool set compiled from one document. Read-only after construction and
/// safe to share across sessions.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    /// Compiles the registry from a loaded document.
    ///
    /// # Errors
    ///
    /// Returns a startup error when the document yields zero recognized operations;
    /// a server with no tools is useless and should not start.
    pub fn from_document(doc: &OpenApiDocument) -> Result<Self> {
        let operations = operations::normalize(doc);
        if operations.is_empty() {
            return Err(ApiLinkError::Startup(format!(
                "Document '{}' contains no recognized operations",
                doc.location(),
            )));
        }

        let tools = operations
            .into_iter()
            .map(|operation| {
                let contract = build_contract(&operation, doc);
                let input_schema = input_schema(&operation, &contract);
                let description = describe(&operation);
                RegisteredTool {
                    operation,
                    contract,
                    input_schema,
                    description,
                }
            })
            .collect();

        Ok(Self { tools })
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|t| t.operation.id == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    #[must_use]
    pub fn tools(&self) -> &[RegisteredTool] {
        &self.tools
    }

    /// Renders the tool set for `tools/list`.
    #[must_use]
    pub fn list_tools(&self) -> Vec<Tool> {
        self.tools
            .iter()
            .map(|t| {
                let schema_obj = t
                    .input_schema
                    .as_object()
                    .cloned()
                    .unwrap_or_else(JsonObject::new);
                let mut tool = Tool::new(
                    t.operation.id.clone(),
                    t.description.clone(),
                    Arc::new(schema_obj),
                );
                tool.annotations = Some(annotations_for_method(&t.operation.method));
                tool
            })
            .collect()
    }

    /// One line per operation, in registry order. Used as server instructions.
    #[must_use]
    pub fn summary(&self) -> String {
        self.tools
            .iter()
            .map(|t| {
                let op = &t.operation;
                let summary = if op.summary.is_empty() {
                    "(no summary)"
                } else {
                    op.summary.as_str()
                };
                format!(
                    "{} [{}] {} {}",
                    op.id,
                    op.method.to_uppercase(),
                    op.path,
                    summary,
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// MCP tool annotations derived from RFC 9110 method semantics.
///
/// `openWorldHint` is always true: these tools talk to an external system. Unknown
/// methods only get that hint.
#[must_use]
pub fn annotations_for_method(method: &str) -> ToolAnnotations {
    let open_world_hint = Some(true);

    match method {
        "get" | "head" | "options" => ToolAnnotations {
            title: None,
            read_only_hint: Some(true),
            destructive_hint: Some(false),
            idempotent_hint: Some(true),
            open_world_hint,
        },
        "post" => ToolAnnotations {
            title: None,
            read_only_hint: Some(false),
            destructive_hint: Some(false),
            idempotent_hint: Some(false),
            open_world_hint,
        },
        "put" | "delete" => ToolAnnotations {
            title: None,
            read_only_hint: Some(false),
            destructive_hint: Some(true),
            idempotent_hint: Some(true),
            open_world_hint,
        },
        "patch" => ToolAnnotations {
            title: None,
            read_only_hint: Some(false),
            destructive_hint: Some(true),
            idempotent_hint: None,
            open_world_hint,
        },
        _ => ToolAnnotations {
            title: None,
            read_only_hint: None,
            destructive_hint: None,
            idempotent_hint: None,
            open_world_hint,
        },
    }
}

/// Human description for one tool: summary, else description, else a method+path
/// label, with an auth note appended when the operation requires credentials.
#[must_use]
pub fn describe(op: &Operation) -> String {
    let mut text = if !op.summary.is_empty() {
        op.summary.clone()
    } else if !op.description.is_empty() {
        op.description.clone()
    } else {
        format!("Calls {} {}", op.method.to_uppercase(), op.path)
    };
    if op.requires_auth {
        text.push_str(" (requires authentication)");
    }
    text
}

/// Builds the strict top-level input contract for one operation.
///
/// `baseUrl`, `token` and `headers` are always present as optional overrides;
/// `pathParams`, `query`, `body` and `contentType` appear only when the operation
/// declares them. Unknown top-level keys are rejected.
#[must_use]
pub fn build_contract(op: &Operation, doc: &OpenApiDocument) -> ValidationNode {
    let mut properties = BTreeMap::new();

    properties.insert(
        "baseUrl".to_string(),
        Property {
            node: ValidationNode::string(),
            required: false,
        },
    );
    properties.insert(
        "token".to_string(),
        Property {
            node: ValidationNode::string(),
            required: false,
        },
    );
    properties.insert(
        "headers".to_string(),
        Property {
            node: ValidationNode::Object {
                properties: BTreeMap::new(),
                additional: AdditionalKeys::Schema(Box::new(ValidationNode::string())),
            },
            required: false,
        },
    );

    if !op.parameters.path.is_empty() {
        let mut path_props = BTreeMap::new();
        for param in &op.parameters.path {
            path_props.insert(
                param.name.clone(),
                Property {
                    node: schema::compile(param.schema.as_ref(), doc),
                    required: param.required,
                },
            );
        }
        let any_required = op.parameters.path.iter().any(|p| p.required);
        properties.insert(
            "pathParams".to_string(),
            Property {
                node: ValidationNode::Object {
                    properties: path_props,
                    additional: AdditionalKeys::Deny,
                },
                required: any_required,
            },
        );
    }

    if !op.parameters.query.is_empty() {
        let mut query_props = BTreeMap::new();
        for param in &op.parameters.query {
            query_props.insert(
                param.name.clone(),
                Property {
                    node: schema::compile(param.schema.as_ref(), doc),
                    required: param.required,
                },
            );
        }
        // Documents are frequently incomplete about optional filters, so extra
        // primitive-valued keys pass through.
        properties.insert(
            "query".to_string(),
            Property {
                node: ValidationNode::Object {
                    properties: query_props,
                    additional: AdditionalKeys::Primitive,
                },
                required: false,
            },
        );
    }

    if let Some(body) = &op.request_body {
        properties.insert(
            "body".to_string(),
            Property {
                node: schema::compile(body.schema.as_ref(), doc),
                required: body.required,
            },
        );
        properties.insert(
            "contentType".to_string(),
            Property {
                node: ValidationNode::string(),
                required: false,
            },
        );
    }

    ValidationNode::Object {
        properties,
        additional: AdditionalKeys::Deny,
    }
}

/// JSON Schema rendering of the contract with per-field descriptions attached.
fn input_schema(op: &Operation, contract: &ValidationNode) -> Value {
    let mut rendered = contract.to_json_schema();

    let descriptions: &[(&str, String)] = &[
        (
            "baseUrl",
            "Override the configured base URL for this call".to_string(),
        ),
        ("token", "Override the configured credential".to_string()),
        ("headers", "Extra headers to send".to_string()),
        ("pathParams", "Values for path placeholders".to_string()),
        (
            "query",
            "Query parameters; undeclared primitive-valued keys are allowed".to_string(),
        ),
        ("body", "Request body".to_string()),
        (
            "contentType",
            format!(
                "Request content type (default: {})",
                op.request_body
                    .as_ref()
                    .and_then(|b| b.content_types.first().cloned())
                    .unwrap_or_else(|| "application/json".to_string()),
            ),
        ),
    ];

    if let Some(props) = rendered
        .get_mut("properties")
        .and_then(Value::as_object_mut)
    {
        for (name, text) in descriptions {
            if let Some(prop) = props.get_mut(*name).and_then(Value::as_object_mut) {
                prop.insert("description".to_string(), json!(text));
            }
        }
    }

    rendered
}
