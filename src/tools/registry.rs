//! Tool definitions and the registry that maps LLM tool calls to argv.
//!
//! Each definition carries a typed parameter list (consumed by the LLM as
//! JSON Schema) and a builder that turns validated arguments into an argv
//! for the sandbox. Builders use the empty string for omitted optional
//! flags; `build_command` drops empties before anything is executed.

use serde_json::{Map, Value, json};
use std::collections::HashMap;

use crate::errors::{BurrowError, BurrowResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Boolean,
}

impl ParamKind {
    fn schema_type(self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolParameter {
    pub name: String,
    pub kind: ParamKind,
    pub description: String,
    pub required: bool,
    pub default: Option<Value>,
    pub choices: Option<Vec<String>>,
}

impl ToolParameter {
    pub fn required(name: &str, kind: ParamKind, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required: true,
            default: None,
            choices: None,
        }
    }

    pub fn optional(name: &str, kind: ParamKind, description: &str, default: Value) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required: false,
            default: Some(default),
            choices: None,
        }
    }

    pub fn with_choices(mut self, choices: &[&str]) -> Self {
        self.choices = Some(choices.iter().map(ToString::to_string).collect());
        self
    }
}

/// Builds an argv from an arguments object. Total over schema-conforming
/// input; out-of-schema keys are simply ignored.
pub type CommandBuilder = fn(&Value) -> Vec<String>;

pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
    pub builder: CommandBuilder,
    pub cacheable: bool,
    /// TTL in seconds for cached results. 0 means no time-based expiry
    /// (file-state invalidation only); `None` means the tool is uncached.
    pub cache_ttl: Option<u64>,
}

impl ToolDefinition {
    /// Render this tool in the LLM function-calling schema shape.
    pub fn to_llm_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.parameters {
            let mut prop = Map::new();
            prop.insert("type".to_string(), json!(param.kind.schema_type()));
            prop.insert("description".to_string(), json!(param.description));
            if let Some(choices) = &param.choices {
                prop.insert("enum".to_string(), json!(choices));
            }
            if let Some(default) = &param.default {
                prop.insert("default".to_string(), default.clone());
            }
            properties.insert(param.name.clone(), Value::Object(prop));
            if param.required {
                required.push(param.name.clone());
            }
        }

        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            }
        })
    }
}

/// Registry of the closed tool set.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: ToolDefinition) {
        if self.tools.contains_key(&tool.name) {
            tracing::warn!("tool registry: overwriting duplicate tool '{}'", tool.name);
        }
        self.tools.insert(tool.name.clone(), tool);
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    pub fn list_all(&self) -> Vec<&ToolDefinition> {
        let mut all: Vec<_> = self.tools.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn to_llm_schema(&self) -> Vec<Value> {
        self.list_all()
            .into_iter()
            .map(ToolDefinition::to_llm_schema)
            .collect()
    }

    /// Build the argv for a tool call, dropping the empty strings that
    /// builders emit for omitted optional flags.
    pub fn build_command(&self, name: &str, arguments: &Value) -> BurrowResult<Vec<String>> {
        let tool = self.get(name).ok_or_else(|| BurrowError::Tool {
            tool: name.to_string(),
            message: "unknown tool".to_string(),
        })?;
        let argv = (tool.builder)(arguments);
        Ok(argv.into_iter().filter(|arg| !arg.is_empty()).collect())
    }

    pub fn is_cacheable(&self, name: &str) -> bool {
        self.get(name).is_some_and(|t| t.cacheable)
    }

    pub fn get_cache_ttl(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(|t| t.cache_ttl)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }
}

fn arg_str<'a>(args: &'a Value, key: &str) -> &'a str {
    args.get(key).and_then(Value::as_str).unwrap_or("")
}

fn arg_bool(args: &Value, key: &str, default: bool) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn arg_u64(args: &Value, key: &str, default: u64) -> u64 {
    args.get(key).and_then(Value::as_u64).unwrap_or(default)
}

fn flag(on: bool, text: &str) -> String {
    if on { text.to_string() } else { String::new() }
}

/// Registry with the default inspection tools. `ls` and `wc` stay
/// uncached: their output depends on metadata (timestamps, counts) that
/// can change without file content changing.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(ToolDefinition {
        name: "grep".to_string(),
        description: "Search for a pattern in files using grep".to_string(),
        parameters: vec![
            ToolParameter::required("pattern", ParamKind::String, "The regex pattern to search for"),
            ToolParameter::required("path", ParamKind::String, "File or directory path to search"),
            ToolParameter::optional(
                "recursive",
                ParamKind::Boolean,
                "Search recursively in directories",
                json!(true),
            ),
            ToolParameter::optional(
                "ignore_case",
                ParamKind::Boolean,
                "Case insensitive search",
                json!(false),
            ),
            ToolParameter::optional(
                "line_number",
                ParamKind::Boolean,
                "Show line numbers",
                json!(true),
            ),
        ],
        builder: |args| {
            vec![
                "grep".to_string(),
                flag(arg_bool(args, "line_number", true), "-n"),
                flag(arg_bool(args, "recursive", true), "-r"),
                flag(arg_bool(args, "ignore_case", false), "-i"),
                arg_str(args, "pattern").to_string(),
                arg_str(args, "path").to_string(),
            ]
        },
        cacheable: true,
        cache_ttl: Some(300),
    });

    registry.register(ToolDefinition {
        name: "find".to_string(),
        description: "Find files by name pattern".to_string(),
        parameters: vec![
            ToolParameter::required("path", ParamKind::String, "Directory to search in"),
            ToolParameter::required(
                "name",
                ParamKind::String,
                "File name pattern (supports wildcards)",
            ),
            ToolParameter::optional(
                "type",
                ParamKind::String,
                "File type: f (file), d (directory)",
                json!("f"),
            )
            .with_choices(&["f", "d"]),
        ],
        builder: |args| {
            vec![
                "find".to_string(),
                arg_str(args, "path").to_string(),
                "-type".to_string(),
                args.get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("f")
                    .to_string(),
                "-name".to_string(),
                arg_str(args, "name").to_string(),
            ]
        },
        cacheable: true,
        cache_ttl: Some(300),
    });

    registry.register(ToolDefinition {
        name: "cat".to_string(),
        description: "Display entire file contents".to_string(),
        parameters: vec![ToolParameter::required(
            "path",
            ParamKind::String,
            "File path to read",
        )],
        builder: |args| vec!["cat".to_string(), arg_str(args, "path").to_string()],
        cacheable: true,
        cache_ttl: Some(0), // invalidate on file change only
    });

    registry.register(ToolDefinition {
        name: "head".to_string(),
        description: "Display first N lines of a file".to_string(),
        parameters: vec![
            ToolParameter::required("path", ParamKind::String, "File path to read"),
            ToolParameter::optional(
                "lines",
                ParamKind::Integer,
                "Number of lines to show",
                json!(10),
            ),
        ],
        builder: |args| {
            vec![
                "head".to_string(),
                "-n".to_string(),
                arg_u64(args, "lines", 10).to_string(),
                arg_str(args, "path").to_string(),
            ]
        },
        cacheable: true,
        cache_ttl: Some(0),
    });

    registry.register(ToolDefinition {
        name: "tail".to_string(),
        description: "Display last N lines of a file".to_string(),
        parameters: vec![
            ToolParameter::required("path", ParamKind::String, "File path to read"),
            ToolParameter::optional(
                "lines",
                ParamKind::Integer,
                "Number of lines to show",
                json!(10),
            ),
        ],
        builder: |args| {
            vec![
                "tail".to_string(),
                "-n".to_string(),
                arg_u64(args, "lines", 10).to_string(),
                arg_str(args, "path").to_string(),
            ]
        },
        cacheable: true,
        cache_ttl: Some(0),
    });

    registry.register(ToolDefinition {
        name: "ls".to_string(),
        description: "List directory contents".to_string(),
        parameters: vec![
            ToolParameter::required("path", ParamKind::String, "Directory path to list"),
            ToolParameter::optional("all", ParamKind::Boolean, "Show hidden files", json!(false)),
            ToolParameter::optional("long", ParamKind::Boolean, "Use long format", json!(false)),
        ],
        builder: |args| {
            vec![
                "ls".to_string(),
                flag(arg_bool(args, "all", false), "-a"),
                flag(arg_bool(args, "long", false), "-l"),
                arg_str(args, "path").to_string(),
            ]
        },
        cacheable: false,
        cache_ttl: None,
    });

    registry.register(ToolDefinition {
        name: "wc".to_string(),
        description: "Count lines, words, and characters in a file".to_string(),
        parameters: vec![
            ToolParameter::required("path", ParamKind::String, "File path to count"),
            ToolParameter::optional("lines", ParamKind::Boolean, "Count lines only", json!(false)),
            ToolParameter::optional("words", ParamKind::Boolean, "Count words only", json!(false)),
        ],
        builder: |args| {
            vec![
                "wc".to_string(),
                flag(arg_bool(args, "lines", false), "-l"),
                flag(arg_bool(args, "words", false), "-w"),
                arg_str(args, "path").to_string(),
            ]
        },
        cacheable: false,
        cache_ttl: None,
    });

    registry
}
