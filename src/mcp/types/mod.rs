//! MCP types and structures

use crate::mcp::errors::{McpError, McpErrorCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Protocol revision announced during `initialize`
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// MCP Tool definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Tool name (unique identifier)
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    /// JSON Schema for input parameters
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl Tool {
    pub fn new<S: Into<String>>(name: S, description: S, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema,
        }
    }

    /// Tool without parameters
    pub fn without_arguments<S: Into<String>>(name: S, description: S) -> Self {
        Self::new(name, description, json!({ "type": "object", "properties": {} }))
    }
}

/// `tools/call` parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name to call
    pub name: String,
    /// Arguments for the tool
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new<S: Into<String>>(name: S, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Read a boolean argument, `default` when absent or not a boolean
    pub fn bool_argument(&self, key: &str, default: bool) -> bool {
        self.arguments.get(key).and_then(Value::as_bool).unwrap_or(default)
    }
}

/// MCP content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
}

impl ToolContent {
    pub fn text<S: Into<String>>(text: S) -> Self {
        ToolContent::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ToolContent::Text { text } => Some(text),
        }
    }
}

/// Result of a `tools/call`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<ToolContent>,
    /// Failure reported as data rather than a JSON-RPC error
    #[serde(rename = "isError")]
    pub is_error: bool,
    #[serde(rename = "structuredContent", skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
}

impl ToolResult {
    /// Successful result with a single text item
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            content: vec![ToolContent::text(text)],
            is_error: false,
            structured_content: None,
        }
    }

    /// Successful result carrying JSON both as text and as structured content
    pub fn json(data: Value) -> Self {
        Self {
            content: vec![ToolContent::text(data.to_string())],
            is_error: false,
            structured_content: Some(data),
        }
    }

    /// Error-shaped result: `isError` set, `{"error": message}` as text
    pub fn error<S: Into<String>>(message: S) -> Self {
        let body = json!({ "error": message.into() });
        Self {
            content: vec![ToolContent::text(body.to_string())],
            is_error: true,
            structured_content: None,
        }
    }

    pub fn first_text(&self) -> Option<&str> {
        self.content.first().and_then(ToolContent::as_text)
    }
}

/// JSON-RPC request envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request ID, absent for notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl McpRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

impl McpResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, error: McpError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn error_code(id: Value, code: McpErrorCode, message: &str) -> Self {
        Self::error(id, McpError::new(code, message.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_shapes() {
        let value = serde_json::to_value(ToolResult::text("login instructions")).unwrap();
        assert_eq!(value["content"][0]["type"], "text");
        assert_eq!(value["content"][0]["text"], "login instructions");
        assert_eq!(value["isError"], false);
        assert!(value.get("structuredContent").is_none());

        let error = ToolResult::error("Authentication failed: denied");
        assert!(error.is_error);
        let text: Value = serde_json::from_str(error.first_text().unwrap()).unwrap();
        assert_eq!(text, json!({ "error": "Authentication failed: denied" }));

        let structured = ToolResult::json(json!({ "success": true }));
        assert_eq!(structured.structured_content, Some(json!({ "success": true })));
        assert_eq!(structured.first_text(), Some(r#"{"success":true}"#));
    }

    #[test]
    fn test_tool_call_arguments() {
        let call: ToolCall = serde_json::from_value(json!({ "name": "login" })).unwrap();
        assert_eq!(call.arguments, Value::Null);
        assert!(!call.bool_argument("force", false));

        let call = ToolCall::new("login", json!({ "force": true }));
        assert!(call.bool_argument("force", false));

        let call = ToolCall::new("login", json!({ "force": "yes" }));
        assert!(!call.bool_argument("force", false));
    }

    #[test]
    fn test_request_notification() {
        let request: McpRequest =
            serde_json::from_value(json!({ "jsonrpc": "2.0", "method": "notifications/initialized" })).unwrap();
        assert!(request.is_notification());
        assert!(request.params.is_none());
    }

    #[test]
    fn test_response_serialization() {
        let ok = serde_json::to_value(McpResponse::success(json!(1), json!({}))).unwrap();
        assert_eq!(ok, json!({ "jsonrpc": "2.0", "id": 1, "result": {} }));

        let err = serde_json::to_value(McpResponse::error_code(Value::Null, McpErrorCode::ParseError, "Parse error")).unwrap();
        assert_eq!(err["error"]["code"], -32700);
        assert_eq!(err["id"], Value::Null);
    }
}
