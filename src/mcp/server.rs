//! MCP JSON-RPC endpoint with the authentication gate in front of it

use crate::auth::authenticator::DeviceCodeAuthenticator;
use crate::auth::gate::RequestGate;
use crate::auth::middleware::BearerValidationMiddleware;
use crate::auth::provider::IdentityProvider;
use crate::auth::token_cache::TokenCache;
use crate::auth::tools::register_auth_tools;
use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::mcp::errors::{McpError, McpErrorCode};
use crate::mcp::tools::{ToolHandler, ToolRegistry};
use crate::mcp::types::{McpRequest, McpResponse, ToolCall, ToolResult, PROTOCOL_VERSION};
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// MCP server: gate, bearer check and tool dispatch
pub struct McpServer {
    registry: ToolRegistry,
    gate: RequestGate,
    bearer: BearerValidationMiddleware,
    authenticator: DeviceCodeAuthenticator,
}

impl McpServer {
    /// Server with the `login`, `logout` and `verify-login` tools registered
    pub fn new(provider: Arc<dyn IdentityProvider>, enable_auth_tools: bool) -> Self {
        let cache = Arc::new(TokenCache::new());
        let authenticator = DeviceCodeAuthenticator::new(Arc::clone(&provider), Arc::clone(&cache));

        let mut registry = ToolRegistry::new();
        register_auth_tools(&mut registry, authenticator.clone());

        Self {
            registry,
            gate: RequestGate::new(enable_auth_tools),
            bearer: BearerValidationMiddleware::new(cache, provider),
            authenticator,
        }
    }

    pub fn from_config(config: &Config, provider: Arc<dyn IdentityProvider>) -> Self {
        Self::new(provider, config.auth.enable_auth_tools)
    }

    /// Expose another operation behind the bearer check
    pub fn register_operation<S: Into<String>>(&mut self, name: S, handler: Arc<dyn ToolHandler>) {
        self.registry.register_operation(name, handler);
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn authenticator(&self) -> &DeviceCodeAuthenticator {
        &self.authenticator
    }

    /// Gate, authenticate, parse and dispatch one HTTP request body
    pub async fn handle_http(&self, req: &HttpRequest, body: &[u8]) -> HttpResponse {
        let decision = self.gate.decide(body);
        if !decision.bypass {
            if let Err(response) = self.bearer.check(req).await {
                return response;
            }
        } else {
            debug!(operation = ?decision.operation, "Bootstrap operation bypassed bearer check");
        }

        let request = match Self::parse_request(body) {
            Ok(request) => request,
            Err(response) => return HttpResponse::Ok().json(response),
        };

        match self.handle_mcp_request(request).await {
            Some(response) => HttpResponse::Ok().json(response),
            None => HttpResponse::Accepted().finish(),
        }
    }

    fn parse_request(body: &[u8]) -> std::result::Result<McpRequest, McpResponse> {
        let value: Value = serde_json::from_slice(body).map_err(|e| {
            McpResponse::error(Value::Null, McpError::parse_error(format!("Parse error: {}", e)))
        })?;

        let id = value.get("id").cloned().unwrap_or(Value::Null);
        if !value.is_object() {
            return Err(McpResponse::error(
                id,
                McpError::from(GatewayError::malformed("Request must be a single JSON-RPC object")),
            ));
        }

        let request: McpRequest = serde_json::from_value(value).map_err(|e| {
            McpResponse::error(
                id.clone(),
                McpError::from(GatewayError::malformed(format!("Invalid JSON-RPC request: {}", e))),
            )
        })?;

        if request.jsonrpc != "2.0" {
            return Err(McpResponse::error_code(
                id,
                McpErrorCode::InvalidRequest,
                "Unsupported JSON-RPC version, expected 2.0",
            ));
        }

        Ok(request)
    }

    /// Dispatch one parsed request; `None` for notifications
    pub async fn handle_mcp_request(&self, request: McpRequest) -> Option<McpResponse> {
        debug!(method = %request.method, "Handling MCP request");

        let id = match request.id {
            Some(id) => id,
            None => {
                debug!(method = %request.method, "Notification received");
                return None;
            }
        };

        let response = match request.method.as_str() {
            "initialize" => McpResponse::success(id, self.initialize_result()),
            "ping" => McpResponse::success(id, json!({})),
            "tools/list" => McpResponse::success(id, json!({ "tools": self.registry.list() })),
            "tools/call" => match self.call_tool(request.params).await {
                Ok(result) => match serde_json::to_value(&result) {
                    Ok(value) => McpResponse::success(id, value),
                    Err(e) => McpResponse::error(id, GatewayError::from(e).into()),
                },
                Err(error) => McpResponse::error(id, error),
            },
            other => McpResponse::error(id, McpError::method_not_found(other.to_string())),
        };

        Some(response)
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false }
            },
            "serverInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION")
            }
        })
    }

    async fn call_tool(&self, params: Option<Value>) -> std::result::Result<ToolResult, McpError> {
        let params = params.ok_or_else(|| McpError::invalid_params("Missing params for tools/call".to_string()))?;
        let call: ToolCall = serde_json::from_value(params)
            .map_err(|e| McpError::invalid_params(format!("Invalid tools/call params: {}", e)))?;

        let handler = self
            .registry
            .get(&call.name)
            .ok_or_else(|| McpError::tool_not_found(call.name.clone()))?;

        info!(tool = %call.name, "Tool call");
        match handler.call(&call).await {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool handler failed");
                Ok(ToolResult::error(format!("Tool '{}' failed: {}", call.name, e)))
            }
        }
    }

    /// Bind and serve until shutdown
    pub async fn start(self, host: &str, port: u16) -> Result<()> {
        info!("Starting MCP server on {}:{}", host, port);
        let server = web::Data::new(Arc::new(self));

        HttpServer::new(move || {
            App::new()
                .app_data(server.clone())
                .wrap(Logger::default())
                .configure(configure_routes)
        })
        .bind((host, port))?
        .run()
        .await?;

        info!("MCP server stopped");
        Ok(())
    }
}

/// Mount `/mcp` and `/health`; expects `web::Data<Arc<McpServer>>` in app data
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/mcp", web::post().to(mcp_handler));
}

/// Health check endpoint, never gated
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME")
    }))
}

/// MCP JSON-RPC 2.0 endpoint
pub async fn mcp_handler(
    req: HttpRequest,
    body: web::Bytes,
    mcp_server: web::Data<Arc<McpServer>>,
) -> HttpResponse {
    mcp_server.handle_http(&req, &body).await
}
