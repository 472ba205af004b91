use agproxy_protocol::gemini::generate_content::types::FunctionDeclaration;
use serde_json::{Map, Value as JsonValue, json};

/// Tool name used for results whose call cannot be resolved.
pub const DEFAULT_TOOL_NAME: &str = "run_command";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinTool {
    pub name: &'static str,
    pub description: &'static str,
    /// Every parameter is a string.
    pub parameters: &'static [&'static str],
}

pub const DEFAULT_BUILTIN_TOOLS: &[BuiltinTool] = &[
    BuiltinTool {
        name: "ls",
        description: "List files in a directory",
        parameters: &["path"],
    },
    BuiltinTool {
        name: "read_file",
        description: "Read content of a file",
        parameters: &["path"],
    },
    BuiltinTool {
        name: "write_file",
        description: "Write content to a file",
        parameters: &["path", "content"],
    },
    BuiltinTool {
        name: "run_command",
        description: "Run a shell command",
        parameters: &["command"],
    },
    BuiltinTool {
        name: "Agent",
        description: "Run a subagent task",
        parameters: &["prompt"],
    },
];

/// Declarations for tools the conversation references but the client never declared.
#[derive(Debug, Clone, Copy)]
pub struct ToolCatalog {
    builtins: &'static [BuiltinTool],
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_BUILTIN_TOOLS)
    }
}

impl ToolCatalog {
    pub const fn new(builtins: &'static [BuiltinTool]) -> Self {
        Self { builtins }
    }

    pub fn declaration_for(&self, name: &str) -> FunctionDeclaration {
        match self.builtins.iter().find(|tool| tool.name == name) {
            Some(tool) => {
                let properties: Map<String, JsonValue> = tool
                    .parameters
                    .iter()
                    .map(|param| (param.to_string(), json!({ "type": "string" })))
                    .collect();
                FunctionDeclaration {
                    name: tool.name.to_string(),
                    description: Some(tool.description.to_string()),
                    parameters: Some(json!({ "type": "object", "properties": properties })),
                }
            }
            None => FunctionDeclaration {
                name: name.to_string(),
                description: Some(format!("Helper tool {name}")),
                parameters: Some(json!({ "type": "object", "properties": {} })),
            },
        }
    }
}
