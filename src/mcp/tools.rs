//! Tool registration and dispatch

use crate::error::Result;
use crate::mcp::types::{Tool, ToolCall, ToolResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// An operation callable through `tools/call`
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Definition advertised by `tools/list`
    fn definition(&self) -> Tool;

    /// Run the tool. Domain failures should come back as an error-shaped
    /// [`ToolResult`]; `Err` is reserved for faults of the handler itself.
    async fn call(&self, call: &ToolCall) -> Result<ToolResult>;
}

/// Named operations exposed by the MCP endpoint
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn ToolHandler>>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous registration
    pub fn register_operation<S: Into<String>>(&mut self, name: S, handler: Arc<dyn ToolHandler>) {
        let name = name.into();
        if self.tools.insert(name.clone(), handler).is_some() {
            warn!(tool = %name, "Replacing previously registered tool");
        } else {
            debug!(tool = %name, "Registered tool");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Definitions of every registered tool, named as registered
    pub fn list(&self) -> Vec<Tool> {
        self.tools
            .iter()
            .map(|(name, handler)| {
                let mut tool = handler.definition();
                tool.name = name.clone();
                tool
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
