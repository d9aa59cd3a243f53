//! Device Code Flow implementation (RFC 8628)
//!
//! The user authorizes on a second device with a browser while the gateway
//! polls the token endpoint. Tokens presented by other clients are checked
//! through RFC 7662 introspection when configured, else by calling the user
//! info endpoint with the token.

use crate::auth::provider::{DeviceCodeChallenge, ExchangeHandle, IdentityProvider, MAX_POLL_INTERVAL};
use crate::auth::token_cache::Credential;
use crate::config::ProviderConfig;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Floor for the provider-supplied polling interval
const MIN_POLLING_INTERVAL: Duration = Duration::from_secs(1);

/// Device Code Flow handler backed by an OAuth provider's HTTP endpoints
#[derive(Debug, Clone)]
pub struct DeviceCodeFlow {
    provider_config: ProviderConfig,
    client: Client,
    /// Upper bound on token polls, on top of the code expiry
    max_polling_attempts: u32,
    min_polling_interval: Duration,
}

/// Device authorization request to start the Device Code Flow
#[derive(Debug, Serialize)]
struct DeviceAuthorizationRequest<'a> {
    client_id: &'a str,
    scope: String,
}

/// Device authorization response from the authorization server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceAuthorizationResponse {
    /// Device verification code for polling
    pub device_code: String,
    /// Human-readable user code
    pub user_code: String,
    /// URI where the user should go to authorize
    #[serde(alias = "verification_url")]
    pub verification_uri: String,
    pub verification_uri_complete: Option<String>,
    /// Device code lifetime in seconds
    pub expires_in: u64,
    /// Polling interval in seconds
    pub interval: Option<u64>,
    /// Ready-made instructions (Microsoft identity platform sends these)
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
struct TokenPollRequest<'a> {
    grant_type: &'static str,
    device_code: &'a str,
    client_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_secret: Option<&'a str>,
}

/// Result of a single token poll
#[derive(Debug, Clone, PartialEq)]
pub enum TokenPollResult {
    Success(DeviceTokenResponse),
    /// User has not finished yet
    Pending,
    /// Provider asks for a longer interval
    SlowDown,
    Denied,
    Expired,
    Error(String),
}

/// Token endpoint success body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceTokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: Option<u64>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Token endpoint error body
#[derive(Debug, Deserialize)]
pub struct DeviceCodeErrorResponse {
    pub error: String,
    pub error_description: Option<String>,
    pub error_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    #[serde(default)]
    active: bool,
}

impl DeviceCodeFlow {
    /// Create a new Device Code Flow handler
    pub fn new(provider_config: ProviderConfig, timeout: Duration) -> Result<Self> {
        provider_config.validate()?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!(
                "{}/{} OAuth2-DeviceCode",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| GatewayError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            provider_config,
            client,
            max_polling_attempts: 360,
            min_polling_interval: MIN_POLLING_INTERVAL,
        })
    }

    /// Override the maximum number of token polls per exchange
    pub fn with_max_polling_attempts(mut self, max_polling_attempts: u32) -> Self {
        self.max_polling_attempts = max_polling_attempts;
        self
    }

    /// Override the floor applied to the provider's polling interval
    pub fn with_min_polling_interval(mut self, min_polling_interval: Duration) -> Self {
        self.min_polling_interval = min_polling_interval;
        self
    }

    /// Step 1: POST to the device authorization endpoint
    pub async fn initiate_device_authorization(&self) -> Result<DeviceAuthorizationResponse> {
        let config = &self.provider_config;
        debug!(
            "Initiating device authorization with client {} for scopes: {:?}",
            config.client_id, config.scopes
        );

        let request = DeviceAuthorizationRequest {
            client_id: &config.client_id,
            scope: config.scopes.join(" "),
        };

        let response = self
            .client
            .post(&config.device_authorization_endpoint)
            .header("Accept", "application/json")
            .form(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to send device authorization request: {}", e);
                GatewayError::exchange_failed("Failed to initiate device authorization")
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!("Device authorization request failed with status {}: {}", status, error_text);
            return Err(GatewayError::exchange_failed(format!(
                "Device authorization request failed with status {}",
                status
            )));
        }

        let auth_response: DeviceAuthorizationResponse = response.json().await.map_err(|e| {
            error!("Failed to parse device authorization response: {}", e);
            GatewayError::exchange_failed("Invalid device authorization response")
        })?;

        info!(
            user_code = %auth_response.user_code,
            expires_in = auth_response.expires_in,
            "Device authorization initiated"
        );

        Ok(auth_response)
    }

    /// Step 2: one POST to the token endpoint with the device code
    pub async fn poll_for_token(&self, device_code: &str) -> Result<TokenPollResult> {
        let config = &self.provider_config;
        let request = TokenPollRequest {
            grant_type: DEVICE_CODE_GRANT_TYPE,
            device_code,
            client_id: &config.client_id,
            client_secret: config.client_secret.as_ref().map(|s| s.expose_secret().as_str()),
        };

        let response = self
            .client
            .post(&config.token_endpoint)
            .header("Accept", "application/json")
            .form(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        Ok(Self::interpret_token_response(status, &body))
    }

    /// Some providers (GitHub) answer pending polls with 200 and an `error`
    /// field, others use 400; both shapes are accepted.
    fn interpret_token_response(status: StatusCode, body: &str) -> TokenPollResult {
        let value: Value = match serde_json::from_str(body) {
            Ok(value) => value,
            Err(_) => {
                error!("Unparseable token response (status {}): {}", status, body);
                return TokenPollResult::Error(format!("HTTP {}: unparseable token response", status));
            }
        };

        if status.is_success() && value.get("access_token").is_some() {
            return match serde_json::from_value::<DeviceTokenResponse>(value) {
                Ok(token) => TokenPollResult::Success(token),
                Err(e) => {
                    error!("Failed to parse successful token response: {}", e);
                    TokenPollResult::Error("Invalid token response".to_string())
                }
            };
        }

        match serde_json::from_value::<DeviceCodeErrorResponse>(value) {
            Ok(err) => match err.error.as_str() {
                "authorization_pending" => TokenPollResult::Pending,
                "slow_down" => TokenPollResult::SlowDown,
                "access_denied" | "authorization_declined" => TokenPollResult::Denied,
                "expired_token" | "code_expired" => TokenPollResult::Expired,
                other => TokenPollResult::Error(match err.error_description {
                    Some(description) => format!("{}: {}", other, description),
                    None => other.to_string(),
                }),
            },
            Err(_) => TokenPollResult::Error(format!("HTTP {}: unexpected token response", status)),
        }
    }

    /// Poll until the user finishes, the code expires or the provider refuses
    pub async fn complete_device_flow(&self, handle: &ExchangeHandle) -> Result<DeviceTokenResponse> {
        let mut attempts = 0u32;
        let mut current_interval = handle.interval;

        info!(
            "Starting device code polling (max attempts: {}, interval: {}s)",
            self.max_polling_attempts,
            current_interval.as_secs()
        );

        loop {
            if attempts >= self.max_polling_attempts {
                error!("Device code polling gave up after {} attempts", attempts);
                return Err(GatewayError::exchange_failed(
                    "Device code flow timeout - maximum polling attempts reached",
                ));
            }

            let next_poll = Instant::now().checked_add(current_interval);
            if next_poll.map_or(true, |next| next >= handle.deadline) {
                warn!("Device code expired before authorization completed");
                return Err(GatewayError::exchange_failed("Device code expired"));
            }
            tokio::time::sleep(current_interval).await;
            attempts += 1;

            let result = match self.poll_for_token(handle.device_code.expose_secret()).await {
                Ok(result) => result,
                Err(e) if e.is_retryable() => {
                    warn!("Token poll failed, retrying: {}", e);
                    continue;
                }
                Err(e) => return Err(GatewayError::exchange_failed(e.to_string())),
            };

            match result {
                TokenPollResult::Success(token) => {
                    info!("Device code flow completed after {} attempts", attempts);
                    return Ok(token);
                }
                TokenPollResult::Pending => {
                    debug!("Authorization pending (attempt {})", attempts);
                }
                TokenPollResult::SlowDown => {
                    current_interval = (current_interval + Duration::from_secs(5)).min(MAX_POLL_INTERVAL);
                    debug!(
                        "Server requested slow down - new interval: {}s (attempt {})",
                        current_interval.as_secs(),
                        attempts
                    );
                }
                TokenPollResult::Denied => {
                    info!("User denied device authorization");
                    return Err(GatewayError::exchange_failed("User denied device authorization"));
                }
                TokenPollResult::Expired => {
                    info!("Device code expired during polling");
                    return Err(GatewayError::exchange_failed("Device code expired"));
                }
                TokenPollResult::Error(message) => {
                    error!("Device code polling error: {}", message);
                    return Err(GatewayError::exchange_failed(format!(
                        "Device code polling error: {}",
                        message
                    )));
                }
            }
        }
    }

    /// User-facing instructions for a device authorization
    pub fn get_user_instructions(auth_response: &DeviceAuthorizationResponse) -> String {
        if let Some(ref message) = auth_response.message {
            if !message.trim().is_empty() {
                return message.clone();
            }
        }

        let go_to = match auth_response.verification_uri_complete {
            Some(ref complete_uri) => format!("Go to: {}", complete_uri),
            None => format!(
                "Go to: {} and enter code: {}",
                auth_response.verification_uri, auth_response.user_code
            ),
        };

        format!(
            "Device Authorization Required\n\n{}\n\nCode expires in {} minutes.",
            go_to,
            (auth_response.expires_in / 60).max(1)
        )
    }

    async fn introspect_rfc7662(&self, endpoint: &str, token: &str) -> Result<bool> {
        let config = &self.provider_config;
        let mut request = self
            .client
            .post(endpoint)
            .header("Accept", "application/json")
            .form(&[("token", token), ("token_type_hint", "access_token")]);

        request = match config.client_secret {
            Some(ref secret) => request.basic_auth(&config.client_id, Some(secret.expose_secret())),
            None => request.basic_auth(&config.client_id, None::<&str>),
        };

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(GatewayError::auth(format!(
                "Introspection endpoint returned {}",
                response.status()
            )));
        }

        let body: IntrospectionResponse = response.json().await?;
        Ok(body.active)
    }

    async fn get_user_info(&self, endpoint: &str, token: &str) -> Result<Option<Value>> {
        let response = self
            .client
            .get(endpoint)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(Some(response.json().await?)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status => Err(GatewayError::auth(format!("User info endpoint returned {}", status))),
        }
    }
}

#[async_trait]
impl IdentityProvider for DeviceCodeFlow {
    fn name(&self) -> &str {
        "device_code"
    }

    async fn begin_device_code_flow(&self) -> Result<DeviceCodeChallenge> {
        let auth_response = self.initiate_device_authorization().await?;
        let interval = auth_response
            .interval
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.provider_config.polling_interval())
            .max(self.min_polling_interval);

        Ok(DeviceCodeChallenge {
            instructions: Self::get_user_instructions(&auth_response),
            user_code: auth_response.user_code.clone(),
            verification_uri: auth_response.verification_uri.clone(),
            handle: ExchangeHandle::new(
                auth_response.device_code,
                interval,
                Duration::from_secs(auth_response.expires_in),
            ),
        })
    }

    async fn await_token(&self, handle: ExchangeHandle) -> Result<Credential> {
        let token = self.complete_device_flow(&handle).await?;
        let expires_in = token
            .expires_in
            .unwrap_or(self.provider_config.default_token_lifetime_secs);

        let mut credential = Credential::from_device_code(token.access_token, expires_in, token.scope);
        credential.token_type = token.token_type;
        Ok(credential)
    }

    async fn introspect(&self, token: &str) -> Result<bool> {
        if let Some(ref endpoint) = self.provider_config.introspection_endpoint {
            return self.introspect_rfc7662(endpoint, token).await;
        }
        if let Some(ref endpoint) = self.provider_config.user_info_endpoint {
            return Ok(self.get_user_info(endpoint, token).await?.is_some());
        }
        debug!("No introspection or user info endpoint configured, rejecting foreign token");
        Ok(false)
    }

    async fn user_profile(&self, token: &str) -> Result<Option<Value>> {
        match self.provider_config.user_info_endpoint {
            Some(ref endpoint) => self.get_user_info(endpoint, token).await,
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_provider_config() -> ProviderConfig {
        let mut config = ProviderConfig::microsoft("test_client_id", "common");
        config.scopes = vec!["User.Read".to_string()];
        config
    }

    fn auth_response() -> DeviceAuthorizationResponse {
        DeviceAuthorizationResponse {
            device_code: "device-123".to_string(),
            user_code: "ABCD-EFGH".to_string(),
            verification_uri: "https://example.com/device".to_string(),
            verification_uri_complete: None,
            expires_in: 900,
            interval: Some(5),
            message: None,
        }
    }

    #[test]
    fn test_device_code_flow_creation() {
        let flow = DeviceCodeFlow::new(create_test_provider_config(), Duration::from_secs(30));
        assert!(flow.is_ok());
    }

    #[test]
    fn test_device_code_flow_requires_client_id() {
        let mut config = create_test_provider_config();
        config.client_id = String::new();

        let flow = DeviceCodeFlow::new(config, Duration::from_secs(30));
        assert!(flow.unwrap_err().to_string().contains("client_id"));
    }

    #[test]
    fn test_invalid_endpoint_urls() {
        let mut config = create_test_provider_config();
        config.device_authorization_endpoint = "invalid-url".to_string();

        let flow = DeviceCodeFlow::new(config, Duration::from_secs(30));
        assert!(flow.unwrap_err().to_string().contains("device_authorization_endpoint"));
    }

    #[test]
    fn test_user_instructions() {
        let instructions = DeviceCodeFlow::get_user_instructions(&auth_response());
        assert!(instructions.contains("Go to: https://example.com/device and enter code: ABCD-EFGH"));
        assert!(instructions.contains("Code expires in 15 minutes."));

        let mut complete = auth_response();
        complete.verification_uri_complete = Some("https://example.com/device?code=ABCD-EFGH".to_string());
        let instructions = DeviceCodeFlow::get_user_instructions(&complete);
        assert!(instructions.contains("Go to: https://example.com/device?code=ABCD-EFGH"));
    }

    #[test]
    fn test_provider_message_used_verbatim() {
        let mut response = auth_response();
        response.message = Some("To sign in, use a web browser to open the page".to_string());
        assert_eq!(
            DeviceCodeFlow::get_user_instructions(&response),
            "To sign in, use a web browser to open the page"
        );
    }

    #[test]
    fn test_interpret_token_response() {
        let ok = DeviceCodeFlow::interpret_token_response(
            StatusCode::OK,
            r#"{"access_token":"tok","token_type":"Bearer","expires_in":3599}"#,
        );
        match ok {
            TokenPollResult::Success(token) => {
                assert_eq!(token.access_token, "tok");
                assert_eq!(token.expires_in, Some(3599));
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let cases = [
            (StatusCode::BAD_REQUEST, r#"{"error":"authorization_pending"}"#, TokenPollResult::Pending),
            (StatusCode::OK, r#"{"error":"authorization_pending"}"#, TokenPollResult::Pending),
            (StatusCode::BAD_REQUEST, r#"{"error":"slow_down"}"#, TokenPollResult::SlowDown),
            (StatusCode::BAD_REQUEST, r#"{"error":"access_denied"}"#, TokenPollResult::Denied),
            (StatusCode::BAD_REQUEST, r#"{"error":"authorization_declined"}"#, TokenPollResult::Denied),
            (StatusCode::BAD_REQUEST, r#"{"error":"expired_token"}"#, TokenPollResult::Expired),
        ];
        for (status, body, expected) in cases {
            assert_eq!(DeviceCodeFlow::interpret_token_response(status, body), expected, "body {}", body);
        }

        let unknown = DeviceCodeFlow::interpret_token_response(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_client","error_description":"bad secret"}"#,
        );
        assert_eq!(unknown, TokenPollResult::Error("invalid_client: bad secret".to_string()));

        assert!(matches!(
            DeviceCodeFlow::interpret_token_response(StatusCode::BAD_GATEWAY, "<html>"),
            TokenPollResult::Error(_)
        ));
    }
}
