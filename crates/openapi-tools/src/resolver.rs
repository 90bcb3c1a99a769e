//! `$ref` resolution against the loaded document.
//!
//! Only document-internal references (`#/components/...`) are supported; external
//! file or URL references resolve to `None` and the caller degrades gracefully.

use crate::document::OpenApiDocument;
use serde_json::Value;
use std::collections::HashSet;

/// Returns the `$ref` target of `node`, if it is a reference object.
#[must_use]
pub fn reference(node: &Value) -> Option<&str> {
    node.as_object()?.get("$ref")?.as_str()
}

/// Looks up an internal reference like `#/components/schemas/Pet` in the document.
///
/// Returns `None` for external references and for pointers with no target.
#[must_use]
pub fn lookup<'a>(doc: &'a OpenApiDocument, reference: &str) -> Option<&'a Value> {
    let pointer = reference.strip_prefix('#')?;
    doc.root().pointer(pointer)
}

/// Follows a chain of `$ref` objects until a non-reference node is reached.
///
/// Returns `None` when a link is external, dangling, or part of a reference cycle.
#[must_use]
pub fn resolve<'a>(node: &'a Value, doc: &'a OpenApiDocument) -> Option<&'a Value> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut current = node;
    while let Some(target) = reference(current) {
        if !seen.insert(target) {
            tracing::warn!("reference cycle detected at '{target}'");
            return None;
        }
        current = lookup(doc, target)?;
    }
    Some(current)
}
