//! list_directory tool - List files and directories in a path

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use super::{Tool, ToolContext, ToolResult};

pub struct ListDirectoryTool;

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &'static str {
        "list_directory"
    }

    fn description(&self) -> &'static str {
        "List files and directories in a path."
    }

    fn example(&self) -> Value {
        serde_json::json!({
            "action": "list_directory",
            "path": "src"
        })
    }

    async fn execute(&self, params: &Value, ctx: &ToolContext) -> Result<ToolResult, eyre::Error> {
        let path = params["path"].as_str().unwrap_or(".");
        let full_path = ctx.resolve_path(Path::new(path))?;

        let mut dir = match tokio::fs::read_dir(&full_path).await {
            Ok(dir) => dir,
            Err(e) => {
                return Ok(ToolResult::error(format!(
                    "Failed to list '{path}': {e}"
                )));
            }
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let suffix = if entry.metadata().await?.is_dir() { "/" } else { "" };
            entries.push(format!("{name}{suffix}"));
        }
        entries.sort();

        if entries.is_empty() {
            Ok(ToolResult::success("(empty directory)"))
        } else {
            Ok(ToolResult::success(entries.join("\n")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolsConfig;
    use tempfile::tempdir;

    fn ctx(dir: &Path) -> ToolContext {
        ToolContext::new(&ToolsConfig::default(), dir.to_path_buf())
    }

    #[tokio::test]
    async fn test_list_directory() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let result = ListDirectoryTool
            .execute(&serde_json::json!({}), &ctx(dir.path()))
            .await
            .unwrap();

        assert!(!result.is_error);
        assert_eq!(result.content, "a.txt\nb.txt\nsub/");
    }

    #[tokio::test]
    async fn test_list_empty_directory() {
        let dir = tempdir().unwrap();
        let result = ListDirectoryTool
            .execute(&serde_json::json!({}), &ctx(dir.path()))
            .await
            .unwrap();

        assert!(!result.is_error);
        assert_eq!(result.content, "(empty directory)");
    }

    #[tokio::test]
    async fn test_list_missing_directory_is_error_result() {
        let dir = tempdir().unwrap();
        let result = ListDirectoryTool
            .execute(&serde_json::json!({"path": "nope"}), &ctx(dir.path()))
            .await
            .unwrap();

        assert!(result.is_error);
    }
}
