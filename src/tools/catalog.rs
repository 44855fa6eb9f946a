//! ToolCatalog - name-keyed registry of tools
//!
//! The catalog is consulted by name only. Unknown names return a structured
//! error result rather than raising.

use std::collections::HashMap;

use crate::provider::{ToolCallRequest, ToolSpec};

use super::builtin::{
    GlobTool, GrepTool, HandoffTool, ListDirectoryTool, ReadFileTool, RunCommandTool, WriteFileTool,
};
use super::{Tool, ToolContext, ToolResult};

/// Registry of named tools callable by agents
pub struct ToolCatalog {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolCatalog {
    /// Catalog with the standard tool set
    pub fn standard() -> Self {
        let mut tools: HashMap<String, Box<dyn Tool>> = HashMap::new();

        tools.insert("read_file".into(), Box::new(ReadFileTool));
        tools.insert("write_file".into(), Box::new(WriteFileTool));
        tools.insert("list_directory".into(), Box::new(ListDirectoryTool));
        tools.insert("glob".into(), Box::new(GlobTool));
        tools.insert("grep".into(), Box::new(GrepTool));
        tools.insert("run_command".into(), Box::new(RunCommandTool));
        tools.insert("handoff".into(), Box::new(HandoffTool));

        Self { tools }
    }

    /// Empty catalog (for testing)
    pub fn empty() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn add_tool(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Specs for every registered tool
    pub fn definitions(&self) -> Vec<ToolSpec> {
        self.tools
            .values()
            .map(|t| ToolSpec::new(t.name(), t.description(), t.input_schema()))
            .collect()
    }

    /// Specs for a named subset, e.g. a role's tool set
    pub fn definitions_for(&self, tool_names: &[String]) -> Vec<ToolSpec> {
        tool_names
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| ToolSpec::new(t.name(), t.description(), t.input_schema()))
            .collect()
    }

    /// Execute a tool call; unknown tools return a structured error
    pub async fn execute(&self, call: &ToolCallRequest, ctx: &ToolContext) -> ToolResult {
        let input: serde_json::Value = serde_json::from_str(&call.arguments).unwrap_or_else(|_| serde_json::json!({}));
        match self.tools.get(&call.name) {
            Some(tool) => tool.execute(input, ctx).await,
            None => ToolResult::error(format!("Unknown tool: {}", call.name)),
        }
    }
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AgentRole;
    use tempfile::tempdir;

    #[test]
    fn test_standard_catalog_has_core_tools() {
        let catalog = ToolCatalog::standard();
        for name in ["read_file", "write_file", "list_directory", "glob", "grep", "run_command", "handoff"] {
            assert!(catalog.has_tool(name), "missing tool {}", name);
        }
    }

    #[test]
    fn test_definitions_for_subset() {
        let catalog = ToolCatalog::standard();
        let defs = catalog.definitions_for(&["read_file".to_string(), "write_file".to_string()]);
        assert_eq!(defs.len(), 2);
        // Unknown names are silently skipped
        let defs = catalog.definitions_for(&["read_file".to_string(), "nope".to_string()]);
        assert_eq!(defs.len(), 1);
    }

    #[tokio::test]
    async fn test_execute_unknown_tool_is_structured_error() {
        let catalog = ToolCatalog::standard();
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "t".into(), AgentRole::Developer);

        let call = ToolCallRequest {
            id: "call_1".into(),
            name: "teleport".into(),
            arguments: "{}".into(),
        };
        let result = catalog.execute(&call, &ctx).await;
        assert!(result.is_error);
        assert!(result.content.contains("Unknown tool"));
    }

    #[tokio::test]
    async fn test_execute_malformed_arguments_fall_back_to_empty() {
        let catalog = ToolCatalog::standard();
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "t".into(), AgentRole::Developer);

        // Malformed JSON decodes to {} and the tool reports its missing field
        let call = ToolCallRequest {
            id: "call_1".into(),
            name: "read_file".into(),
            arguments: "not json at all".into(),
        };
        let result = catalog.execute(&call, &ctx).await;
        assert!(result.is_error);
        assert!(result.content.contains("path"));
    }
}
