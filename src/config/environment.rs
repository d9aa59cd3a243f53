//! Environment variable integration for gateway configuration

use crate::config::Config;
use crate::error::{GatewayError, Result};
use secrecy::Secret;
use std::env;
use tracing::{debug, info, warn};

/// Environment variable names used by the gateway
pub struct EnvVars;

impl EnvVars {
    pub const HOST: &'static str = "MCP_HOST";
    pub const PORT: &'static str = "MCP_PORT";
    pub const TIMEOUT: &'static str = "MCP_TIMEOUT";
    pub const ENABLE_AUTH_TOOLS: &'static str = "MCP_ENABLE_AUTH_TOOLS";
    pub const OAUTH_CLIENT_ID: &'static str = "MCP_OAUTH_CLIENT_ID";
    pub const OAUTH_CLIENT_SECRET: &'static str = "MCP_OAUTH_CLIENT_SECRET";
    pub const OAUTH_TENANT: &'static str = "MCP_OAUTH_TENANT";
    pub const LOG_LEVEL: &'static str = "MCP_LOG_LEVEL";
    pub const LOG_FORMAT: &'static str = "MCP_LOG_FORMAT";
}

/// Environment configuration overrides
#[derive(Debug, Clone, Default)]
pub struct EnvironmentOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub timeout: Option<u64>,
    pub enable_auth_tools: Option<bool>,
    pub client_id: Option<String>,
    pub client_secret: Option<Secret<String>>,
    pub tenant: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

impl EnvironmentOverrides {
    /// Load environment variable overrides from the process environment
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load overrides through an arbitrary lookup; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut overrides = EnvironmentOverrides::default();

        overrides.host = get(EnvVars::HOST);

        if let Some(port_str) = get(EnvVars::PORT) {
            overrides.port = Some(port_str.parse().map_err(|e| {
                GatewayError::config(format!("Invalid {} environment variable: {}", EnvVars::PORT, e))
            })?);
        }

        if let Some(timeout_str) = get(EnvVars::TIMEOUT) {
            overrides.timeout = Some(timeout_str.parse().map_err(|e| {
                GatewayError::config(format!("Invalid {} environment variable: {}", EnvVars::TIMEOUT, e))
            })?);
        }

        if let Some(flag) = get(EnvVars::ENABLE_AUTH_TOOLS) {
            match flag.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => {
                    debug!("Environment override: {}=true", EnvVars::ENABLE_AUTH_TOOLS);
                    overrides.enable_auth_tools = Some(true);
                }
                "false" | "0" | "no" | "off" => {
                    debug!("Environment override: {}=false", EnvVars::ENABLE_AUTH_TOOLS);
                    overrides.enable_auth_tools = Some(false);
                }
                _ => {
                    warn!("Invalid {}: {} (expected: true/false)", EnvVars::ENABLE_AUTH_TOOLS, flag);
                    return Err(GatewayError::config(format!(
                        "Invalid {}: {} (valid options: true, false)",
                        EnvVars::ENABLE_AUTH_TOOLS,
                        flag
                    )));
                }
            }
        }

        overrides.client_id = get(EnvVars::OAUTH_CLIENT_ID);
        overrides.client_secret = get(EnvVars::OAUTH_CLIENT_SECRET).map(Secret::new);
        overrides.tenant = get(EnvVars::OAUTH_TENANT);
        overrides.log_level = get(EnvVars::LOG_LEVEL);
        overrides.log_format = get(EnvVars::LOG_FORMAT).map(|f| f.to_lowercase());

        Ok(overrides)
    }

    /// Apply environment overrides to a config
    pub fn apply_to_config(&self, config: &mut Config) {
        if let Some(ref host) = self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(timeout) = self.timeout {
            config.server.timeout = timeout;
        }

        if let Some(enabled) = self.enable_auth_tools {
            if config.auth.enable_auth_tools != enabled {
                info!(
                    "Environment override: auth.enable_auth_tools changed from {} to {}",
                    config.auth.enable_auth_tools, enabled
                );
            }
            config.auth.enable_auth_tools = enabled;
        }

        if let Some(ref client_id) = self.client_id {
            config.auth.provider.client_id = client_id.clone();
        }
        if let Some(ref secret) = self.client_secret {
            config.auth.provider.client_secret = Some(secret.clone());
        }
        if let Some(ref tenant) = self.tenant {
            if config.auth.provider.set_microsoft_tenant(tenant) {
                info!("Environment override: using Microsoft tenant '{}'", tenant);
            }
        }

        if let Some(ref level) = self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(ref format) = self.log_format {
            config.logging.format = format.clone();
        }
    }

    /// Check if any environment overrides are active
    pub fn has_overrides(&self) -> bool {
        !self.get_override_summary().is_empty()
    }

    /// Get summary of active overrides for logging; secrets are redacted
    pub fn get_override_summary(&self) -> Vec<String> {
        let mut summary = Vec::new();

        if let Some(ref host) = self.host {
            summary.push(format!("{}={}", EnvVars::HOST, host));
        }
        if let Some(port) = self.port {
            summary.push(format!("{}={}", EnvVars::PORT, port));
        }
        if let Some(timeout) = self.timeout {
            summary.push(format!("{}={}", EnvVars::TIMEOUT, timeout));
        }
        if let Some(enabled) = self.enable_auth_tools {
            summary.push(format!("{}={}", EnvVars::ENABLE_AUTH_TOOLS, enabled));
        }
        if let Some(ref client_id) = self.client_id {
            summary.push(format!("{}={}", EnvVars::OAUTH_CLIENT_ID, client_id));
        }
        if self.client_secret.is_some() {
            summary.push(format!("{}=***", EnvVars::OAUTH_CLIENT_SECRET));
        }
        if let Some(ref tenant) = self.tenant {
            summary.push(format!("{}={}", EnvVars::OAUTH_TENANT, tenant));
        }
        if let Some(ref level) = self.log_level {
            summary.push(format!("{}={}", EnvVars::LOG_LEVEL, level));
        }
        if let Some(ref format) = self.log_format {
            summary.push(format!("{}={}", EnvVars::LOG_FORMAT, format));
        }

        summary
    }
}
