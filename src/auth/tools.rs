//! `login`, `logout` and `verify-login` tools
//!
//! Authentication failures are returned as error-shaped tool results so the
//! client sees them as data, never as transport errors.

use crate::auth::authenticator::DeviceCodeAuthenticator;
use crate::auth::gate::BootstrapOperation;
use crate::error::Result;
use crate::mcp::tools::{ToolHandler, ToolRegistry};
use crate::mcp::types::{Tool, ToolCall, ToolResult};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Register the three bootstrap tools on `registry`
pub fn register_auth_tools(registry: &mut ToolRegistry, authenticator: DeviceCodeAuthenticator) {
    registry.register_operation(
        BootstrapOperation::Login.as_str(),
        Arc::new(LoginTool::new(authenticator.clone())),
    );
    registry.register_operation(
        BootstrapOperation::Logout.as_str(),
        Arc::new(LogoutTool::new(authenticator.clone())),
    );
    registry.register_operation(
        BootstrapOperation::VerifyLogin.as_str(),
        Arc::new(VerifyLoginTool::new(authenticator)),
    );
}

/// Starts a device-code login and returns the sign-in instructions
pub struct LoginTool {
    authenticator: DeviceCodeAuthenticator,
}

impl LoginTool {
    pub fn new(authenticator: DeviceCodeAuthenticator) -> Self {
        Self { authenticator }
    }
}

#[async_trait]
impl ToolHandler for LoginTool {
    fn definition(&self) -> Tool {
        Tool::new(
            BootstrapOperation::Login.as_str(),
            "Sign in with a device code. Returns instructions to complete sign-in in a browser.",
            json!({
                "type": "object",
                "properties": {
                    "force": {
                        "type": "boolean",
                        "description": "Start a new sign-in even when already logged in",
                        "default": false
                    }
                }
            }),
        )
    }

    async fn call(&self, call: &ToolCall) -> Result<ToolResult> {
        let force = call.bool_argument("force", false);

        if !force {
            let status = self.authenticator.test_login().await;
            if status.success {
                info!("Login requested while already logged in");
                let mut body = serde_json::to_value(&status)?;
                body["status"] = json!("Already logged in");
                return Ok(ToolResult::json(body));
            }
        }

        match self.authenticator.begin_login(force).await {
            Ok(pending) => {
                info!(
                    exchange_id = %pending.exchange_id,
                    joined = pending.joined,
                    force,
                    "Returning device code instructions"
                );
                Ok(ToolResult::text(pending.instructions))
            }
            Err(e) => {
                warn!(error = %e, category = e.category(), "Login failed");
                Ok(ToolResult::error(format!("Authentication failed: {}", e)))
            }
        }
    }
}

/// Clears the cached credential
pub struct LogoutTool {
    authenticator: DeviceCodeAuthenticator,
}

impl LogoutTool {
    pub fn new(authenticator: DeviceCodeAuthenticator) -> Self {
        Self { authenticator }
    }
}

#[async_trait]
impl ToolHandler for LogoutTool {
    fn definition(&self) -> Tool {
        Tool::without_arguments(
            BootstrapOperation::Logout.as_str(),
            "Sign out and discard the cached access token",
        )
    }

    async fn call(&self, _call: &ToolCall) -> Result<ToolResult> {
        self.authenticator.logout();
        Ok(ToolResult::json(json!({ "message": "Logged out successfully" })))
    }
}

/// Reports whether a valid credential is cached
pub struct VerifyLoginTool {
    authenticator: DeviceCodeAuthenticator,
}

impl VerifyLoginTool {
    pub fn new(authenticator: DeviceCodeAuthenticator) -> Self {
        Self { authenticator }
    }
}

#[async_trait]
impl ToolHandler for VerifyLoginTool {
    fn definition(&self) -> Tool {
        Tool::without_arguments(
            BootstrapOperation::VerifyLogin.as_str(),
            "Check whether the server holds a valid sign-in",
        )
    }

    async fn call(&self, _call: &ToolCall) -> Result<ToolResult> {
        let result = self.authenticator.test_login().await;
        Ok(ToolResult::json(serde_json::to_value(&result)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::authenticator::AuthState;
    use crate::auth::test_helpers::ScriptedProvider;
    use crate::auth::token_cache::TokenCache;
    use serde_json::Value;

    fn setup(provider: ScriptedProvider) -> (ToolRegistry, DeviceCodeAuthenticator, Arc<ScriptedProvider>) {
        let provider = Arc::new(provider);
        let authenticator = DeviceCodeAuthenticator::new(provider.clone(), Arc::new(TokenCache::new()));
        let mut registry = ToolRegistry::new();
        register_auth_tools(&mut registry, authenticator.clone());
        (registry, authenticator, provider)
    }

    async fn call(registry: &ToolRegistry, name: &str, arguments: Value) -> ToolResult {
        registry
            .get(name)
            .unwrap()
            .call(&ToolCall::new(name, arguments))
            .await
            .unwrap()
    }

    fn text_json(result: &ToolResult) -> Value {
        serde_json::from_str(result.first_text().unwrap()).unwrap()
    }

    #[test]
    fn test_registers_bootstrap_tools() {
        let (registry, _, _) = setup(ScriptedProvider::new("x"));
        let names: Vec<String> = registry.list().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["login", "logout", "verify-login"]);
    }

    #[tokio::test]
    async fn test_login_returns_instructions() {
        let (registry, authenticator, _) = setup(ScriptedProvider::new("login instructions").held());

        let result = call(&registry, "login", json!({})).await;
        assert!(!result.is_error);
        assert_eq!(result.first_text(), Some("login instructions"));
        assert_eq!(authenticator.state(), AuthState::CodePending);
    }

    #[tokio::test]
    async fn test_login_when_already_logged_in() {
        let (registry, authenticator, provider) = setup(ScriptedProvider::new("code"));
        authenticator.acquire_token_by_device_code(|_| {}).await.unwrap();

        let result = call(&registry, "login", json!({})).await;
        let body = text_json(&result);
        assert_eq!(body["status"], "Already logged in");
        assert_eq!(body["success"], true);
        assert_eq!(provider.begin_calls(), 1);

        let forced = call(&registry, "login", json!({ "force": true })).await;
        assert_eq!(forced.first_text(), Some("code"));
        assert_eq!(provider.begin_calls(), 2);
    }

    #[tokio::test]
    async fn test_login_failure_is_error_shaped() {
        let (registry, _, _) = setup(ScriptedProvider::new("x").failing_begin("tenant not found"));

        let result = call(&registry, "login", json!({})).await;
        assert!(result.is_error);
        let body = text_json(&result);
        let message = body["error"].as_str().unwrap();
        assert!(message.starts_with("Authentication failed:"));
        assert!(message.contains("tenant not found"));
    }

    #[tokio::test]
    async fn test_verify_login_and_logout() {
        let (registry, authenticator, _) = setup(ScriptedProvider::new("code"));

        let before = call(&registry, "verify-login", json!({})).await;
        assert!(!before.is_error);
        assert_eq!(text_json(&before)["success"], false);

        authenticator.acquire_token_by_device_code(|_| {}).await.unwrap();
        let during = call(&registry, "verify-login", json!({})).await;
        assert_eq!(text_json(&during)["success"], true);
        assert_eq!(during.structured_content.as_ref().unwrap()["message"], "Login successful");

        let logout = call(&registry, "logout", json!({})).await;
        assert_eq!(text_json(&logout)["message"], "Logged out successfully");

        let after = call(&registry, "verify-login", json!({})).await;
        assert_eq!(text_json(&after)["success"], false);

        let again = call(&registry, "logout", json!({})).await;
        assert!(!again.is_error);
    }
}
