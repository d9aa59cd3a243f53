//! MCP (Model Context Protocol) implementation
//!
//! JSON-RPC 2.0 over HTTP with tool registration and dispatch.

pub mod errors;
pub mod server;
pub mod tools;
pub mod types;

pub use errors::{McpError, McpErrorCode};
pub use server::{configure_routes, McpServer};
pub use tools::{ToolHandler, ToolRegistry};
pub use types::*;
