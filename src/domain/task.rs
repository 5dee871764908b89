//! Task queue produced by the planning phase.
//!
//! Created once per run when planning triggers, mutated only by status
//! transitions and explicit task switches, discarded at run end. Resolutions
//! are kept on the tasks themselves and can be saved as JSON when a planned
//! run completes.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::id::generate_task_id;

/// Lifecycle of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// One planned unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub status: TaskStatus,
    /// Outcome recorded when the task completes or fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

/// Ordered tasks for one run, plus the prompt context they share.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskQueue {
    pub tasks: Vec<Task>,
    /// System prompt preserved for context rebuilds.
    pub combined_system_prompt: String,
    /// The user's request as originally given.
    pub original_task: String,
    /// Plan text for display.
    pub plan: String,
}

impl TaskQueue {
    /// Build a queue from planned task descriptions.
    pub fn new(
        original_task: impl Into<String>,
        combined_system_prompt: impl Into<String>,
        plan: impl Into<String>,
        descriptions: Vec<String>,
    ) -> Self {
        let tasks = descriptions
            .into_iter()
            .enumerate()
            .map(|(i, description)| Task {
                id: generate_task_id(i),
                description,
                status: TaskStatus::Pending,
                resolution: None,
            })
            .collect();
        Self {
            tasks,
            combined_system_prompt: combined_system_prompt.into(),
            original_task: original_task.into(),
            plan: plan.into(),
        }
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// True when the queue holds no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Task at an index.
    pub fn get(&self, index: usize) -> Option<&Task> {
        self.tasks.get(index)
    }

    /// Mark a task as started.
    pub fn start(&mut self, index: usize) {
        if let Some(task) = self.tasks.get_mut(index)
            && task.status == TaskStatus::Pending
        {
            task.status = TaskStatus::InProgress;
        }
    }

    /// Mark a task completed with its resolution.
    pub fn resolve(&mut self, index: usize, resolution: impl Into<String>) {
        if let Some(task) = self.tasks.get_mut(index) {
            task.status = TaskStatus::Completed;
            task.resolution = Some(resolution.into());
            log::info!("task {} completed", task.id);
        }
    }

    /// Mark a task failed with a reason.
    pub fn fail(&mut self, index: usize, reason: impl Into<String>) {
        if let Some(task) = self.tasks.get_mut(index) {
            task.status = TaskStatus::Failed;
            task.resolution = Some(reason.into());
            log::info!("task {} failed", task.id);
        }
    }

    /// Index of the next unfinished task (pending or already started),
    /// if any.
    pub fn next_unfinished(&self) -> Option<usize> {
        self.tasks
            .iter()
            .position(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::InProgress))
    }

    /// Resolve a task id like "task_2" to its index.
    pub fn index_of(&self, task_id: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == task_id)
    }

    /// True when every task is completed.
    pub fn all_completed(&self) -> bool {
        self.tasks
            .iter()
            .all(|t| t.status == TaskStatus::Completed)
    }

    /// Render queue progress for the prompt: completed, current and
    /// remaining tasks.
    pub fn status_block(&self, current: usize) -> String {
        let mut out = String::new();
        out.push_str(&format!("## Overall Plan\n{}\n\n", self.plan));
        out.push_str(&format!(
            "## Task Progress ({}/{})\n",
            current + 1,
            self.tasks.len()
        ));

        out.push_str("Completed:\n");
        let completed: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .collect();
        if completed.is_empty() {
            out.push_str("  (none yet)\n");
        } else {
            for task in completed {
                out.push_str(&format!("  [{}] {}\n", task.id, task.description));
            }
        }

        if let Some(task) = self.tasks.get(current) {
            out.push_str(&format!(
                "\nYour current task ({}): {}\n",
                task.id, task.description
            ));
        }

        let remaining: Vec<&Task> = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(i, t)| *i != current && t.status == TaskStatus::Pending)
            .map(|(_, t)| t)
            .collect();
        out.push_str("\nRemaining after this:\n");
        if remaining.is_empty() {
            out.push_str("  (none)\n");
        } else {
            for task in remaining {
                out.push_str(&format!("  [{}] {}\n", task.id, task.description));
            }
        }

        out
    }

    /// Resolutions of finished tasks, formatted for the next task's prompt.
    pub fn resolutions_context(&self) -> String {
        let resolved: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|t| t.resolution.is_some())
            .collect();
        if resolved.is_empty() {
            return "No previous task resolutions yet.".to_string();
        }
        resolved
            .iter()
            .map(|t| {
                format!(
                    "{}: {}\nResult: {}",
                    t.id,
                    t.description,
                    t.resolution.as_deref().unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Synthesize a final summary from all resolutions.
    pub fn final_summary(&self) -> String {
        let mut parts = vec![format!("Original request: {}", self.original_task)];
        for task in &self.tasks {
            let outcome = match (&task.status, &task.resolution) {
                (TaskStatus::Completed, Some(r)) => r.clone(),
                (status, Some(r)) => format!("({status}) {r}"),
                (status, None) => format!("({status})"),
            };
            parts.push(format!("{} - {}: {}", task.id, task.description, outcome));
        }
        parts.join("\n")
    }

    /// Save the queue with its resolutions as JSON.
    pub fn save(&self, path: &Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        log::info!("task resolutions saved to {}", path.display());
        Ok(())
    }
}
