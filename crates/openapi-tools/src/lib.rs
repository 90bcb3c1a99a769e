//! OpenAPI -> MCP tooling.
//!
//! This crate turns an `OpenAPI` (Swagger-family) document into a set of MCP tools:
//! one validated, callable tool per operation, plus the executor that performs the
//! outbound HTTP request for `tools/call`.
//!
//! It intentionally contains **no** transport logic; the `apilink-server` crate owns
//! the stdio and streamable-HTTP bindings.

pub mod config;
pub mod document;
pub mod error;
pub mod executor;
pub mod operations;
pub mod registry;
pub mod resolver;
pub mod schema;
