//! Tool interface and registry.
//!
//! Tools are the agent's only way to act on the world. Each implements the
//! `Tool` trait; a `ToolRegistry` maps action names to implementations,
//! built once at startup. Unknown names come back as error results, not
//! panics or lookup failures, so the model can correct itself.

mod list_directory;
mod read_file;
mod run_command;
mod write_file;

pub use list_directory::ListDirectoryTool;
pub use read_file::ReadFileTool;
pub use run_command::RunCommandTool;
pub use write_file::WriteFileTool;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ToolsConfig;

/// A tool the model can invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Action name (matches the "action" key in model replies)
    fn name(&self) -> &'static str;

    /// Human-readable description for the prompt catalog
    fn description(&self) -> &'static str;

    /// Example action object shown to the model
    fn example(&self) -> Value;

    /// Execute the tool
    async fn execute(&self, params: &Value, ctx: &ToolContext) -> Result<ToolResult, eyre::Error>;
}

/// Result from tool execution
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Execution context shared by all tools of a run.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Working directory; file operations are confined here when sandboxed.
    pub workdir: PathBuf,
    /// Default timeout for command execution.
    pub command_timeout_ms: u64,
    /// Output beyond this many characters is truncated.
    pub max_result_chars: usize,
    /// Whether path containment is enforced.
    pub sandbox: bool,
}

impl ToolContext {
    /// Create a context from configuration.
    pub fn new(config: &ToolsConfig, workdir: PathBuf) -> Self {
        Self {
            workdir,
            command_timeout_ms: config.command_timeout_ms,
            max_result_chars: config.max_result_chars,
            sandbox: config.sandbox,
        }
    }

    /// Resolve a path against the workdir, rejecting escapes when sandboxed.
    pub fn resolve_path(&self, path: &Path) -> Result<PathBuf, eyre::Error> {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workdir.join(path)
        };

        if !self.sandbox {
            return Ok(joined);
        }

        let workdir = self
            .workdir
            .canonicalize()
            .map_err(|e| eyre::eyre!("cannot canonicalize workdir: {e}"))?;
        // New files cannot be canonicalized; normalize away `..` components
        // so the containment check cannot be defeated lexically.
        let resolved = normalize_path(&joined);
        let canonical = resolved.canonicalize().unwrap_or(resolved);

        if canonical.starts_with(&workdir) {
            Ok(canonical)
        } else {
            Err(eyre::eyre!(
                "path {} escapes the working directory",
                path.display()
            ))
        }
    }
}

/// Name -> implementation map, built once at startup.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    ctx: ToolContext,
}

impl ToolRegistry {
    /// Create a registry with the standard tool set.
    pub fn standard(ctx: ToolContext) -> Self {
        let mut registry = Self::empty(ctx);
        registry.register(Box::new(RunCommandTool));
        registry.register(Box::new(ReadFileTool));
        registry.register(Box::new(WriteFileTool));
        registry.register(Box::new(ListDirectoryTool));
        registry
    }

    /// Create an empty registry (for custom tool sets).
    pub fn empty(ctx: ToolContext) -> Self {
        Self {
            tools: HashMap::new(),
            ctx,
        }
    }

    /// Register a tool under its own name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Execute an action by name. Unknown names and tool failures become
    /// error results; output is truncated to the configured bound.
    pub async fn execute(&self, name: &str, params: &Value) -> ToolResult {
        let result = match self.tools.get(name) {
            Some(tool) => match tool.execute(params, &self.ctx).await {
                Ok(result) => result,
                Err(e) => ToolResult::error(format!("Tool error: {e}")),
            },
            None => ToolResult::error(format!(
                "Unknown action '{}'. Available actions: {}",
                name,
                self.names().join(", ")
            )),
        };

        ToolResult {
            content: truncate_output(&result.content, self.ctx.max_result_chars),
            is_error: result.is_error,
        }
    }

    /// Whether a tool is registered.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Sorted tool names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// (name, description, example) triples for the prompt catalog, sorted
    /// by name.
    pub fn catalog(&self) -> Vec<(String, String, Value)> {
        let mut entries: Vec<(String, String, Value)> = self
            .tools
            .values()
            .map(|t| {
                (
                    t.name().to_string(),
                    t.description().to_string(),
                    t.example(),
                )
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// The execution context tools run with.
    pub fn context(&self) -> &ToolContext {
        &self.ctx
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
fn normalize_path(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Truncate long output, marking the cut with the original size.
fn truncate_output(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let truncated: String = content.chars().take(max_chars).collect();
    format!(
        "{}...\n[truncated, {} chars total]",
        truncated,
        content.chars().count()
    )
}
