//! MCP server binding for `apilink-openapi-tools`.
//!
//! Owns the two transports (stdio, streamable HTTP), the per-session lifecycle and
//! the anti-rebinding checks. Everything tool-related lives in the core crate.

pub mod http;
pub mod service;
pub mod session;
pub mod stdio;

pub use service::ApiLinkService;
