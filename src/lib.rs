//! authgate - authentication gateway for MCP over HTTP
//!
//! Requests to the MCP endpoint must carry a valid bearer token, except for the
//! bootstrap `login`, `logout` and `verify-login` tools which obtain and manage
//! that token through the OAuth 2.0 device authorization grant.

pub mod auth;
pub mod config;
pub mod error;
pub mod mcp;
pub mod startup;

pub use config::Config;
pub use error::{GatewayError, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
