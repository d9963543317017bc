//! Tool manifest generation.
//!
//! Agents discover the VFS surface as a tool manifest. Three wire formats
//! are supported: a generic JSON envelope, MCP (`input_schema` per tool),
//! and OpenAI function calling (`{"type": "function", "function": {...}}`).

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{VfsError, VfsResult};
use crate::vfs::Vfs;

/// One parameter of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    pub description: String,
    /// JSON-schema type (string, integer, boolean, ...).
    #[serde(rename = "type")]
    pub param_type: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ToolParameter {
    fn required(name: &str, description: &str, param_type: &str) -> Self {
        ToolParameter {
            name: name.to_string(),
            description: description.to_string(),
            param_type: param_type.to_string(),
            required: true,
            enum_values: None,
            default: None,
        }
    }

    fn optional(name: &str, description: &str, param_type: &str, default: Value) -> Self {
        ToolParameter {
            name: name.to_string(),
            description: description.to_string(),
            param_type: param_type.to_string(),
            required: false,
            enum_values: None,
            default: Some(default),
        }
    }
}

/// A callable operation, format-independent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

/// Manifest wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolFormat {
    #[default]
    Json,
    Mcp,
    OpenAi,
}

impl FromStr for ToolFormat {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ToolFormat::Json),
            "mcp" => Ok(ToolFormat::Mcp),
            "openai" => Ok(ToolFormat::OpenAi),
            _ => Err(VfsError::InvalidFormat(format!(
                "unknown format '{s}', expected json, mcp, or openai"
            ))),
        }
    }
}

/// Describe every operation the workspace supports.
///
/// The search tool only appears when a mounted backend can answer
/// semantic queries.
pub fn generate_tools(vfs: &Vfs) -> Vec<ToolDefinition> {
    let path = |desc: &str| ToolParameter::required("path", desc, "string");

    let mut tools = vec![
        ToolDefinition {
            name: "vfs_read".to_string(),
            description: "Read the contents of a file from the virtual filesystem".to_string(),
            parameters: vec![path("The path to the file to read")],
        },
        ToolDefinition {
            name: "vfs_write".to_string(),
            description: "Write content to a file, creating it and any missing parent directories"
                .to_string(),
            parameters: vec![
                path("The path to the file to write"),
                ToolParameter::required("content", "The content to write to the file", "string"),
            ],
        },
        ToolDefinition {
            name: "vfs_append".to_string(),
            description: "Append content to a file, creating it if absent".to_string(),
            parameters: vec![
                path("The path to the file to append to"),
                ToolParameter::required("content", "The content to append", "string"),
            ],
        },
        ToolDefinition {
            name: "vfs_delete".to_string(),
            description: "Delete a file, or a directory and everything under it".to_string(),
            parameters: vec![path("The path to delete")],
        },
        ToolDefinition {
            name: "vfs_list".to_string(),
            description: "List files and directories in a path".to_string(),
            parameters: vec![path("The directory path to list")],
        },
        ToolDefinition {
            name: "vfs_exists".to_string(),
            description: "Check if a path exists in the virtual filesystem".to_string(),
            parameters: vec![path("The path to check")],
        },
        ToolDefinition {
            name: "vfs_stat".to_string(),
            description: "Get metadata about a file or directory".to_string(),
            parameters: vec![path("The path to get metadata for")],
        },
        ToolDefinition {
            name: "vfs_rename".to_string(),
            description: "Move a file to a new path, possibly on a different mount".to_string(),
            parameters: vec![
                ToolParameter::required("from", "The current path of the file", "string"),
                ToolParameter::required("to", "The destination path", "string"),
            ],
        },
        ToolDefinition {
            name: "vfs_copy".to_string(),
            description: "Copy a file to a new path, possibly on a different mount".to_string(),
            parameters: vec![
                ToolParameter::required("from", "The path of the file to copy", "string"),
                ToolParameter::required("to", "The destination path", "string"),
            ],
        },
        ToolDefinition {
            name: "vfs_grep".to_string(),
            description: "Search file contents for lines containing a literal substring"
                .to_string(),
            parameters: vec![
                ToolParameter::required("pattern", "The substring to search for", "string"),
                ToolParameter::optional(
                    "path",
                    "File or directory to search",
                    "string",
                    json!("/"),
                ),
                ToolParameter::optional(
                    "recursive",
                    "Descend into subdirectories",
                    "boolean",
                    json!(false),
                ),
            ],
        },
    ];

    if vfs.has_search() {
        tools.push(ToolDefinition {
            name: "vfs_search".to_string(),
            description: "Search for files by content using semantic search".to_string(),
            parameters: vec![
                ToolParameter::required("query", "The search query", "string"),
                ToolParameter::optional(
                    "limit",
                    "Maximum number of results to return",
                    "integer",
                    json!(10),
                ),
            ],
        });
    }

    tools.push(ToolDefinition {
        name: "vfs_mounts".to_string(),
        description: "List available mount points in the virtual filesystem".to_string(),
        parameters: vec![],
    });

    tools
}

fn schema_properties(tool: &ToolDefinition, with_defaults: bool) -> (HashMap<String, Value>, Vec<String>) {
    let properties = tool
        .parameters
        .iter()
        .map(|p| {
            let mut prop = json!({
                "type": p.param_type,
                "description": p.description,
            });
            if let Some(enum_values) = &p.enum_values {
                prop["enum"] = json!(enum_values);
            }
            if with_defaults {
                if let Some(default) = &p.default {
                    prop["default"] = default.clone();
                }
            }
            (p.name.clone(), prop)
        })
        .collect();

    let required = tool
        .parameters
        .iter()
        .filter(|p| p.required)
        .map(|p| p.name.clone())
        .collect();

    (properties, required)
}

fn to_mcp_format(tools: &[ToolDefinition]) -> Value {
    let tools: Vec<Value> = tools
        .iter()
        .map(|tool| {
            let (properties, required) = schema_properties(tool, false);
            json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            })
        })
        .collect();
    json!({ "tools": tools })
}

fn to_openai_format(tools: &[ToolDefinition]) -> Value {
    let tools: Vec<Value> = tools
        .iter()
        .map(|tool| {
            let (properties, required) = schema_properties(tool, true);
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": {
                        "type": "object",
                        "properties": properties,
                        "required": required,
                    }
                }
            })
        })
        .collect();
    json!({ "tools": tools })
}

/// Render tool definitions in the requested wire format.
pub fn format_tools(tools: &[ToolDefinition], format: ToolFormat) -> Value {
    match format {
        ToolFormat::Json => json!({ "tools": tools }),
        ToolFormat::Mcp => to_mcp_format(tools),
        ToolFormat::OpenAi => to_openai_format(tools),
    }
}

impl Vfs {
    /// The workspace's tool manifest as pretty-printed JSON.
    ///
    /// `format` is one of `json`, `mcp`, or `openai`; anything else is
    /// rejected before any generation happens.
    pub fn tools(&self, format: &str) -> VfsResult<String> {
        let format = ToolFormat::from_str(format)?;
        let manifest = format_tools(&generate_tools(self), format);
        serde_json::to_string_pretty(&manifest)
            .map_err(|e| VfsError::InvalidFormat(format!("failed to render manifest: {e}")))
    }
}
