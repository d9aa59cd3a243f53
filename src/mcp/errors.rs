//! JSON-RPC 2.0 error codes and error objects for MCP responses

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// JSON-RPC / MCP error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpErrorCode {
    // Standard JSON-RPC error codes
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,

    // MCP-specific error codes
    ToolNotFound = -32000,
    AuthenticationFailed = -31994,
    ConfigurationError = -31992,
    SerializationError = -31986,
}

impl McpErrorCode {
    pub fn code(&self) -> i32 {
        *self as i32
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl McpError {
    pub fn new(code: McpErrorCode, message: String) -> Self {
        Self {
            code: code.code(),
            message,
            data: None,
        }
    }

    pub fn with_data(code: McpErrorCode, message: String, data: Value) -> Self {
        Self {
            code: code.code(),
            message,
            data: Some(data),
        }
    }

    pub fn parse_error(message: String) -> Self {
        Self::new(McpErrorCode::ParseError, message)
    }

    pub fn invalid_request(message: String) -> Self {
        Self::new(McpErrorCode::InvalidRequest, message)
    }

    pub fn method_not_found(method: String) -> Self {
        Self::with_data(
            McpErrorCode::MethodNotFound,
            format!("Method '{}' not found", method),
            json!({ "method": method }),
        )
    }

    pub fn invalid_params(message: String) -> Self {
        Self::new(McpErrorCode::InvalidParams, message)
    }

    pub fn internal_error(message: String) -> Self {
        Self::new(McpErrorCode::InternalError, message)
    }

    pub fn tool_not_found(tool_name: String) -> Self {
        Self::with_data(
            McpErrorCode::ToolNotFound,
            format!("Tool '{}' not found", tool_name),
            json!({ "tool_name": tool_name }),
        )
    }
}

impl From<GatewayError> for McpError {
    fn from(error: GatewayError) -> Self {
        let category = error.category();
        match error {
            GatewayError::Config { message } => {
                McpError::with_data(McpErrorCode::ConfigurationError, message, json!({ "category": category }))
            }
            GatewayError::Unauthorized { message }
            | GatewayError::Auth { message }
            | GatewayError::AuthExchangeFailed { message } => {
                McpError::with_data(McpErrorCode::AuthenticationFailed, message, json!({ "category": category }))
            }
            GatewayError::AlreadyInProgress => McpError::with_data(
                McpErrorCode::AuthenticationFailed,
                "Login already in progress".to_string(),
                json!({ "category": category }),
            ),
            GatewayError::MalformedRequest { message } => McpError::invalid_request(message),
            GatewayError::Serde(e) => McpError::new(McpErrorCode::SerializationError, e.to_string()),
            other => McpError::internal_error(other.to_string()),
        }
    }
}
