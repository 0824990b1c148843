//! The [`Tool`] trait and the append-only [`ToolRegistry`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;

use crate::ToolSchema;

/// Boxed future returned by [`Tool::execute`].
///
/// Keeps the trait dyn-compatible so the registry can store erased
/// handles.
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = ToolOutcome> + Send + 'a>>;

/// The result of one tool execution.
///
/// Tools report failures through `success = false` rather than panicking;
/// the agent wraps either outcome into a tool-result block the model can
/// react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    pub success: bool,
    pub output: String,
}

impl ToolOutcome {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: message.into(),
        }
    }
}

/// A capability the model can invoke by name.
///
/// Parameters arrive as a loosely-typed JSON object; each tool performs
/// its own validation (usually by deserializing into a typed argument
/// struct via [`parse_args`]).
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the tool's parameters.
    fn schema(&self) -> serde_json::Value;

    /// Execute with the given parameters.
    fn execute(&self, params: &serde_json::Value) -> ToolFuture<'_>;
}

/// Deserialize a tool's JSON parameters into a typed argument struct.
///
/// Returns a message suitable for feeding straight back to the model as
/// an error result, so it can correct itself and retry.
pub fn parse_args<T: DeserializeOwned>(params: &serde_json::Value) -> Result<T, String> {
    serde_json::from_value(params.clone()).map_err(|e| format!("invalid parameters: {e}"))
}

/// Append-only collection of tools, dispatched by exact name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool (replaces any existing tool with the same name).
    pub fn register(&self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools
            .write()
            .expect("tool registry lock poisoned")
            .insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>, String> {
        self.tools
            .read()
            .expect("tool registry lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| format!("tool not found: {name}"))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .read()
            .expect("tool registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools
            .read()
            .expect("tool registry lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Project the registered set into provider-neutral advertisements,
    /// sorted by name for a stable wire order.
    pub fn to_provider_tools(&self) -> Vec<ToolSchema> {
        let guard = self.tools.read().expect("tool registry lock poisoned");
        let mut schemas: Vec<ToolSchema> = guard
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }
}
