//! Configuration module for the gateway
//!
//! Precedence, lowest first: built-in defaults, `.env` files, the YAML file,
//! `MCP_*` environment variables, command line flags.

mod config;
pub mod environment;

pub use config::{AuthConfig, CliOverrides, Config, LoggingConfig, ProviderConfig, ServerConfig};
pub use environment::{EnvVars, EnvironmentOverrides};
