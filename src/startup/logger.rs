//! Startup logging: resolved configuration and active endpoints

use crate::config::{Config, EnvironmentOverrides};
use std::path::PathBuf;
use tracing::{info, warn};

/// Facts gathered while booting, reported once before serving
pub struct StartupInfo {
    pub config_path: Option<PathBuf>,
    pub env_overrides: EnvironmentOverrides,
    pub tools_loaded: usize,
}

impl StartupInfo {
    pub fn new(config_path: Option<PathBuf>, env_overrides: EnvironmentOverrides) -> Self {
        Self {
            config_path,
            env_overrides,
            tools_loaded: 0,
        }
    }

    pub fn with_tools_loaded(mut self, count: usize) -> Self {
        self.tools_loaded = count;
        self
    }
}

/// Startup logger for the gateway
pub struct StartupLogger;

impl StartupLogger {
    pub fn display_startup_info(config: &Config, version: &str, info: &StartupInfo) {
        info!("authgate v{} starting", version);

        Self::display_configuration(info);
        if info.env_overrides.has_overrides() {
            Self::display_environment_overrides(info);
        }
        Self::display_auth_status(config, info);
        Self::display_server_information(config);
    }

    fn display_configuration(info: &StartupInfo) {
        match &info.config_path {
            Some(path) => info!(config_file = %path.display(), "Configuration loaded"),
            None => info!("Configuration: built-in defaults (no config file found)"),
        }
    }

    fn display_environment_overrides(info: &StartupInfo) {
        for summary in info.env_overrides.get_override_summary() {
            info!("Environment override: {}", summary);
        }
    }

    fn display_auth_status(config: &Config, info: &StartupInfo) {
        let provider = &config.auth.provider;
        info!(
            device_authorization_endpoint = %provider.device_authorization_endpoint,
            token_endpoint = %provider.token_endpoint,
            scopes = %provider.scopes.join(" "),
            "Device code provider"
        );

        match (&provider.introspection_endpoint, &provider.user_info_endpoint) {
            (Some(endpoint), _) => info!(endpoint = %endpoint, "Bearer tokens validated by introspection"),
            (None, Some(endpoint)) => info!(endpoint = %endpoint, "Bearer tokens validated by user info lookup"),
            (None, None) => warn!("No introspection or user info endpoint: only the cached token is accepted"),
        }

        if config.auth.enable_auth_tools {
            info!(tools = info.tools_loaded, "Auth tools enabled: login, logout and verify-login bypass bearer validation");
        } else {
            warn!("Auth tools disabled: every request requires a bearer token");
        }
    }

    fn display_server_information(config: &Config) {
        info!("MCP endpoint: http://{}:{}/mcp", config.server.host, config.server.port);
        info!("Health check: http://{}:{}/health", config.server.host, config.server.port);
    }
}

/// One-line banner with the version
pub fn display_startup_banner(version: &str) {
    info!("authgate v{} - device code authentication gateway for MCP", version);
}
