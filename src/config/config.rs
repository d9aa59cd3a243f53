//! Configuration structures and loading for the gateway

use crate::config::environment::EnvironmentOverrides;
use crate::error::{GatewayError, Result};
use secrecy::Secret;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const MICROSOFT_LOGIN_BASE: &str = "https://login.microsoftonline.com/";

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Outbound request timeout in seconds
    pub timeout: u64,
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Let `login`, `logout` and `verify-login` through without a bearer token
    pub enable_auth_tools: bool,
    /// Device-code identity provider
    pub provider: ProviderConfig,
}

/// OAuth device-code provider settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret, omitted for public clients
    #[serde(deserialize_with = "option_secret_string::deserialize")]
    pub client_secret: Option<Secret<String>>,
    /// Scopes requested during device authorization
    pub scopes: Vec<String>,
    /// RFC 8628 device authorization endpoint
    pub device_authorization_endpoint: String,
    /// Token endpoint polled during the exchange
    pub token_endpoint: String,
    /// User profile endpoint, also used to validate foreign bearer tokens
    pub user_info_endpoint: Option<String>,
    /// RFC 7662 introspection endpoint
    pub introspection_endpoint: Option<String>,
    /// Polling interval when the provider does not send one
    pub polling_interval_secs: u64,
    /// Lifetime assumed when the token response omits `expires_in`
    pub default_token_lifetime_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json, text)
    pub format: String,
}

mod option_secret_string {
    use secrecy::Secret;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Secret<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt_s = Option::<String>::deserialize(deserializer)?;
        Ok(opt_s.filter(|s| !s.is_empty()).map(Secret::new))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            timeout: 30,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enable_auth_tools: true,
            provider: ProviderConfig::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::microsoft("", "common")
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl ProviderConfig {
    /// Microsoft identity platform endpoints for the given tenant
    pub fn microsoft(client_id: &str, tenant: &str) -> Self {
        let base = format!("{}{}/oauth2/v2.0", MICROSOFT_LOGIN_BASE, tenant);
        Self {
            client_id: client_id.to_string(),
            client_secret: None,
            scopes: vec!["User.Read".to_string(), "offline_access".to_string()],
            device_authorization_endpoint: format!("{}/devicecode", base),
            token_endpoint: format!("{}/token", base),
            user_info_endpoint: Some("https://graph.microsoft.com/v1.0/me".to_string()),
            introspection_endpoint: None,
            polling_interval_secs: 5,
            default_token_lifetime_secs: 3600,
        }
    }

    /// Re-point the Microsoft endpoints at another tenant, keeping everything else.
    ///
    /// Endpoints that do not belong to the Microsoft identity platform are left
    /// untouched; returns whether the tenant was applied.
    pub fn set_microsoft_tenant(&mut self, tenant: &str) -> bool {
        let is_microsoft = |endpoint: &str| endpoint.starts_with(MICROSOFT_LOGIN_BASE);
        if !is_microsoft(&self.device_authorization_endpoint) || !is_microsoft(&self.token_endpoint) {
            tracing::warn!(
                tenant,
                device_authorization_endpoint = %self.device_authorization_endpoint,
                token_endpoint = %self.token_endpoint,
                "Ignoring Microsoft tenant: provider endpoints are not Microsoft identity platform endpoints"
            );
            return false;
        }

        let template = Self::microsoft(&self.client_id, tenant);
        self.device_authorization_endpoint = template.device_authorization_endpoint;
        self.token_endpoint = template.token_endpoint;
        true
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_secs)
    }

    /// Validate provider configuration
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(GatewayError::config(
                "auth.provider.client_id is required (or set MCP_OAUTH_CLIENT_ID)",
            ));
        }

        Self::validate_url("device_authorization_endpoint", &self.device_authorization_endpoint)?;
        Self::validate_url("token_endpoint", &self.token_endpoint)?;
        if let Some(ref endpoint) = self.user_info_endpoint {
            Self::validate_url("user_info_endpoint", endpoint)?;
        }
        if let Some(ref endpoint) = self.introspection_endpoint {
            Self::validate_url("introspection_endpoint", endpoint)?;
        }

        if self.polling_interval_secs == 0 {
            return Err(GatewayError::config("auth.provider.polling_interval_secs must be greater than 0"));
        }
        if self.default_token_lifetime_secs == 0 {
            return Err(GatewayError::config(
                "auth.provider.default_token_lifetime_secs must be greater than 0",
            ));
        }

        Ok(())
    }

    fn validate_url(field: &str, value: &str) -> Result<()> {
        url::Url::parse(value).map_err(|e| {
            GatewayError::config(format!("Invalid auth.provider.{} '{}': {}", field, value, e))
        })?;
        Ok(())
    }
}

impl Config {
    /// Load .env files: `.env`, then `.env.<environment>`, then `.env.local`
    fn load_env_files() {
        let env = std::env::var("MCP_ENV")
            .or_else(|_| std::env::var("ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let env_specific_file = format!(".env.{}", env);
        let env_files = [".env", env_specific_file.as_str(), ".env.local"];

        for env_file in env_files {
            match dotenvy::from_filename(env_file) {
                Ok(_) => {
                    tracing::info!("Loaded environment variables from {}", env_file);
                }
                Err(e) if e.not_found() => {
                    tracing::debug!("No {} file found, skipping", env_file);
                }
                Err(e) => {
                    tracing::warn!("Failed to load {}: {}", env_file, e);
                }
            }
        }

        tracing::debug!("Environment: {}", env);
    }

    /// Load configuration from file with environment variables and CLI overrides
    pub fn load<P: AsRef<Path>>(path: P, cli: CliOverrides) -> Result<Self> {
        Self::load_env_files();

        let mut config = Self::from_file(path)?;

        // .env < file < env < CLI
        EnvironmentOverrides::load()?.apply_to_config(&mut config);
        cli.apply_to_config(&mut config);

        config.validate()?;
        Ok(config)
    }

    /// Read the YAML file, falling back to defaults when it does not exist
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        if !path.as_ref().exists() {
            tracing::warn!("Config file {:?} not found, using defaults", path.as_ref());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| GatewayError::config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| GatewayError::config(format!("Failed to parse config file: {}", e)))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(GatewayError::config("server.host cannot be empty"));
        }
        if self.server.port == 0 {
            return Err(GatewayError::config("server.port must be greater than 0"));
        }
        if self.server.timeout == 0 {
            return Err(GatewayError::config("server.timeout must be greater than 0"));
        }

        match self.logging.format.as_str() {
            "json" | "text" => {}
            other => {
                return Err(GatewayError::config(format!(
                    "Invalid logging.format '{}' (valid options: json, text)",
                    other
                )))
            }
        }

        self.auth.provider.validate()
    }
}

/// Values taken from the command line, applied last
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub enable_auth_tools: Option<bool>,
    pub log_level: Option<String>,
}

impl CliOverrides {
    pub fn apply_to_config(&self, config: &mut Config) {
        if let Some(ref host) = self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(enabled) = self.enable_auth_tools {
            config.auth.enable_auth_tools = enabled;
        }
        if let Some(ref level) = self.log_level {
            config.logging.level = level.clone();
        }
    }
}
