//! write_file tool - Write content to a file

use std::path::Path;

use async_trait::async_trait;
use eyre::eyre;
use serde_json::Value;

use super::{Tool, ToolContext, ToolResult};

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Write content to a file, creating parent directories if needed."
    }

    fn example(&self) -> Value {
        serde_json::json!({
            "action": "write_file",
            "path": "notes/summary.md",
            "content": "# Findings\n"
        })
    }

    async fn execute(&self, params: &Value, ctx: &ToolContext) -> Result<ToolResult, eyre::Error> {
        let path = params["path"]
            .as_str()
            .ok_or_else(|| eyre!("path is required"))?;
        let content = params["content"]
            .as_str()
            .ok_or_else(|| eyre!("content is required"))?;

        let full_path = ctx.resolve_path(Path::new(path))?;
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full_path, content).await?;

        Ok(ToolResult::success(format!(
            "Wrote {} bytes to {path}",
            content.len()
        )))
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
    async fn test_write_file() {
        let dir = tempdir().unwrap();
        let result = WriteFileTool
            .execute(
                &serde_json::json!({"path": "out.txt", "content": "data"}),
                &ctx(dir.path()),
            )
            .await
            .unwrap();

        assert!(!result.is_error);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out.txt")).unwrap(),
            "data"
        );
    }

    #[tokio::test]
    async fn test_write_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let result = WriteFileTool
            .execute(
                &serde_json::json!({"path": "a/b/c.txt", "content": "nested"}),
                &ctx(dir.path()),
            )
            .await
            .unwrap();

        assert!(!result.is_error);
        assert!(dir.path().join("a/b/c.txt").exists());
    }

    #[tokio::test]
    async fn test_write_outside_workdir_rejected() {
        let dir = tempdir().unwrap();
        let result = WriteFileTool
            .execute(
                &serde_json::json!({"path": "/tmp/agentr-escape.txt", "content": "x"}),
                &ctx(dir.path()),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_write_requires_content() {
        let dir = tempdir().unwrap();
        let result = WriteFileTool
            .execute(&serde_json::json!({"path": "x.txt"}), &ctx(dir.path()))
            .await;
        assert!(result.is_err());
    }
}
