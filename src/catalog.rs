//! Tool catalog — normalization, name indexing, prompt generation.
//!
//! Owns tool metadata *and* the host-side invokers. The sandbox never sees
//! an invoker; it only sees the typed stubs projected from the schemas here.

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::schema::Schema;
use crate::types::{Error, Result};

// =============================================================================
// Tool handlers
// =============================================================================

/// Future returned by a tool invocation.
pub type ToolFuture = Pin<Box<dyn Future<Output = std::result::Result<Value, String>> + Send>>;

/// Opaque async tool implementation: validated args in, result or error out.
pub type ToolHandler = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

// =============================================================================
// Tool definitions
// =============================================================================

/// A host-side tool as supplied by the caller.
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: Schema,
    handler: ToolHandler,
}

impl Tool {
    /// Define a tool from an async closure.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Schema,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, String>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }

    /// Attach an explicit output schema, yielding a [`ToolSpec`].
    pub fn with_output_schema(self, output_schema: Schema) -> ToolSpec {
        ToolSpec::WithOutput {
            tool: self,
            output_schema,
        }
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish_non_exhaustive()
    }
}

/// Element of the heterogeneous tool collection accepted at construction:
/// either a bare tool or a wrapper supplying an explicit output schema.
#[derive(Debug, Clone)]
pub enum ToolSpec {
    Bare(Tool),
    WithOutput { tool: Tool, output_schema: Schema },
}

impl From<Tool> for ToolSpec {
    fn from(tool: Tool) -> Self {
        ToolSpec::Bare(tool)
    }
}

// =============================================================================
// Normalized entries
// =============================================================================

/// Normalized descriptor of one tool.
#[derive(Clone)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: Schema,
    pub output_schema: Option<Schema>,
    handler: ToolHandler,
}

impl ToolInfo {
    /// Invoke the real tool implementation. Arguments must already be
    /// validated against `input_schema`.
    pub fn invoke(&self, args: Value) -> ToolFuture {
        (self.handler)(args)
    }

    /// Prompt line for this tool.
    ///
    /// Format: `- name(input: <projected>) -> <projected-output>: description`
    pub fn to_prompt_line(&self) -> String {
        let output = self
            .output_schema
            .as_ref()
            .map(Schema::render)
            .unwrap_or_else(|| "any".to_string());
        format!(
            "- {}(input: {}) -> {}: {}",
            self.name,
            self.input_schema.render(),
            output,
            self.description
        )
    }
}

impl std::fmt::Debug for ToolInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolInfo")
            .field("name", &self.name)
            .field("input_schema", &self.input_schema)
            .field("output_schema", &self.output_schema)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// The normalized, indexed set of tools exposed to one execution.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tools: Vec<ToolInfo>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Normalize a tool collection. Fails on duplicate names and on names
    /// that are not valid TypeScript barewords (the stubs re-export each
    /// tool under its own name).
    pub fn new(specs: impl IntoIterator<Item = ToolSpec>) -> Result<Self> {
        let mut tools = Vec::new();
        let mut index = HashMap::new();

        for spec in specs {
            let (tool, output_schema) = match spec {
                ToolSpec::Bare(tool) => (tool, None),
                ToolSpec::WithOutput {
                    tool,
                    output_schema,
                } => (tool, Some(output_schema)),
            };

            check_bareword(&tool.name)?;
            if index.contains_key(&tool.name) {
                return Err(Error::validation(format!(
                    "duplicate tool name: {}",
                    tool.name
                )));
            }

            index.insert(tool.name.clone(), tools.len());
            tools.push(ToolInfo {
                name: tool.name,
                description: tool.description,
                input_schema: tool.input_schema,
                output_schema,
                handler: tool.handler,
            });
        }

        Ok(Self { tools, index })
    }

    /// Look up a tool by name.
    pub fn by_name(&self, name: &str) -> Option<&ToolInfo> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// All tools in registration order.
    pub fn list(&self) -> &[ToolInfo] {
        &self.tools
    }

    /// Sorted tool names, for unknown-tool error messages.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.iter().map(|t| t.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Prompt text listing every tool with projected input/output types.
    pub fn catalog_text(&self) -> String {
        if self.tools.is_empty() {
            return String::new();
        }
        let mut lines = Vec::with_capacity(self.tools.len() + 1);
        lines.push("Available tools:".to_string());
        for tool in &self.tools {
            lines.push(tool.to_prompt_line());
        }
        lines.join("\n")
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// TypeScript reserved words that cannot name a re-exported stub.
const RESERVED_WORDS: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for", "function",
    "if", "import", "in", "instanceof", "let", "new", "null", "return", "super", "switch", "this",
    "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

fn check_bareword(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        .unwrap_or(false);
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');

    if !valid_start || !valid_rest {
        return Err(Error::validation(format!(
            "tool name '{}' is not a valid identifier",
            name
        )));
    }
    if RESERVED_WORDS.contains(&name) {
        return Err(Error::validation(format!(
            "tool name '{}' is a reserved word",
            name
        )));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
