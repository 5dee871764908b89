//! run_command tool - Execute shell commands in the working directory

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use eyre::eyre;
use serde_json::Value;
use tokio::process::Command;

use super::{Tool, ToolContext, ToolResult};

pub struct RunCommandTool;

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &'static str {
        "run_command"
    }

    fn description(&self) -> &'static str {
        "Execute a shell command in the working directory. Use for builds, tests, git."
    }

    fn example(&self) -> Value {
        serde_json::json!({
            "action": "run_command",
            "command": "ls -la"
        })
    }

    async fn execute(&self, params: &Value, ctx: &ToolContext) -> Result<ToolResult, eyre::Error> {
        let command = params["command"]
            .as_str()
            .ok_or_else(|| eyre!("command is required"))?;
        let timeout_ms = params["timeout_ms"]
            .as_u64()
            .unwrap_or(ctx.command_timeout_ms);

        let output = match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            Command::new("sh")
                .arg("-c")
                .arg(command)
                .current_dir(&ctx.workdir)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await
        {
            Ok(io_result) => io_result?,
            // A timed-out command is an error result, not a crashed step
            Err(_) => {
                return Ok(ToolResult::error(format!(
                    "COMMAND TIMED OUT after {timeout_ms}ms: {command}"
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let combined = if stdout.is_empty() && !stderr.is_empty() {
            stderr.to_string()
        } else if stderr.is_empty() {
            stdout.to_string()
        } else {
            format!("{stdout}\n\nSTDERR:\n{stderr}")
        };

        if output.status.success() {
            Ok(ToolResult::success(combined))
        } else {
            Ok(ToolResult::error(format!(
                "COMMAND FAILED (exit {})\n{combined}",
                output.status.code().unwrap_or(-1)
            )))
        }
    }
}
