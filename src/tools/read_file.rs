//! read_file tool - Read file contents

use std::path::Path;

use async_trait::async_trait;
use eyre::eyre;
use serde_json::Value;

use super::{Tool, ToolContext, ToolResult};

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read a file's contents."
    }

    fn example(&self) -> Value {
        serde_json::json!({
            "action": "read_file",
            "path": "src/main.rs"
        })
    }

    async fn execute(&self, params: &Value, ctx: &ToolContext) -> Result<ToolResult, eyre::Error> {
        let path = params["path"]
            .as_str()
            .ok_or_else(|| eyre!("path is required"))?;
        let full_path = ctx.resolve_path(Path::new(path))?;

        match tokio::fs::read_to_string(&full_path).await {
            Ok(content) => Ok(ToolResult::success(content)),
            Err(e) => Ok(ToolResult::error(format!(
                "Failed to read file '{path}': {e}"
            ))),
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
    async fn test_read_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("note.txt"), "remember this").unwrap();

        let result = ReadFileTool
            .execute(&serde_json::json!({"path": "note.txt"}), &ctx(dir.path()))
            .await
            .unwrap();

        assert!(!result.is_error);
        assert_eq!(result.content, "remember this");
    }

    #[tokio::test]
    async fn test_read_missing_file_is_error_result() {
        let dir = tempdir().unwrap();
        let result = ReadFileTool
            .execute(&serde_json::json!({"path": "absent.txt"}), &ctx(dir.path()))
            .await
            .unwrap();

        assert!(result.is_error);
        assert!(result.content.contains("absent.txt"));
    }

    #[tokio::test]
    async fn test_read_outside_workdir_rejected() {
        let dir = tempdir().unwrap();
        let result = ReadFileTool
            .execute(&serde_json::json!({"path": "/etc/hostname"}), &ctx(dir.path()))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_read_requires_path() {
        let dir = tempdir().unwrap();
        let result = ReadFileTool
            .execute(&serde_json::json!({}), &ctx(dir.path()))
            .await;
        assert!(result.is_err());
    }
}
