//! Local tool execution.
//!
//! The adapter never interprets tools. When a [`ToolExecutor`] is installed
//! it is handed each completed tool call and its result is fed back through
//! `send_tool_result`; otherwise the embedding UI does that itself.

pub mod tool;

pub use tool::{FnTool, Tool};

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Result, TetherError};
use crate::types::ToolDefinition;

/// A tool call whose arguments finished streaming.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub tool_call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

/// Executes tool calls on behalf of the adapter.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, call: &ToolInvocation) -> Result<Value>;
}

/// A named collection of tools, dispatched by name.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, replacing any existing tool with the same name.
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.insert(Arc::new(tool));
        self
    }

    pub fn insert(&mut self, tool: Arc<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.tools.iter().map(|t| t.name()))
            .finish()
    }
}

#[async_trait]
impl ToolExecutor for ToolSet {
    async fn execute(&self, call: &ToolInvocation) -> Result<Value> {
        let tool = self.get(&call.tool_name).ok_or_else(|| {
            TetherError::tool(call.tool_name.clone(), "no tool registered with this name")
        })?;
        tool.execute(&call.arguments).await
    }
}
