//! Planning phase, run once before the main loop.
//!
//! A cheap keyword check decides whether the task has multiple components
//! at all; only then is the LLM asked to produce a plan and task list.
//! Planning failures are never fatal; the run proceeds unplanned.

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{ChatMessage, TaskQueue};
use crate::llm::{self, LlmProvider};

/// Phrases that signal a multi-component request.
const MULTI_COMPONENT_PHRASES: [&str; 7] = [
    " and then ",
    " then ",
    " after that",
    " followed by ",
    " as well as ",
    "; ",
    " finally ",
];

static NUMBERED_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:\d+[.)]|[-*])\s+\S").expect("list item regex"));

const PLAN_GENERATION_PROMPT: &str = "Break the following request into an ordered plan.\n\
     \n\
     Respond with a JSON object in ```json fences:\n\
     {\n\
       \"plan\": \"one-paragraph overview of the approach\",\n\
       \"tasks\": [\"first concrete task\", \"second concrete task\"]\n\
     }\n\
     \n\
     Include 2-5 tasks. Make each task specific and independently checkable.\n\
     \n\
     Request:\n";

/// Orchestrates the optional planning phase.
pub struct Planner {
    provider: Arc<dyn LlmProvider>,
    enabled: bool,
}

impl Planner {
    /// Create a planner.
    pub fn new(provider: Arc<dyn LlmProvider>, enabled: bool) -> Self {
        Self { provider, enabled }
    }

    /// Analyze the task and optionally generate a plan.
    ///
    /// Returns `None` when planning is disabled, the task has no
    /// multi-component phrasing, or the model's plan cannot be parsed.
    pub async fn plan(&self, description: &str, system_prompt: &str) -> Option<TaskQueue> {
        if !self.enabled || !needs_planning(description) {
            return None;
        }

        let prompt = format!("{PLAN_GENERATION_PROMPT}{description}");
        let reply = match self.provider.complete(&[ChatMessage::user(prompt)]).await {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("planning call failed ({e}), proceeding unplanned");
                return None;
            }
        };

        let parsed = match llm::parse_json_object(&reply) {
            Some(value) => value,
            None => {
                log::warn!("could not parse planning response, proceeding unplanned");
                return None;
            }
        };

        let plan = parsed
            .get("plan")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let tasks = parse_tasks(&parsed);
        if tasks.is_empty() {
            log::warn!("planning response contained no tasks, proceeding unplanned");
            return None;
        }

        log::info!("planned {} tasks", tasks.len());
        Some(TaskQueue::new(description, system_prompt, plan, tasks))
    }
}

/// Cheap check for multi-component phrasing. Single-operation requests skip
/// planning entirely.
pub fn needs_planning(description: &str) -> bool {
    let lower = description.to_lowercase();

    if MULTI_COMPONENT_PHRASES
        .iter()
        .any(|phrase| lower.contains(phrase))
    {
        return true;
    }
    if NUMBERED_ITEM_RE.is_match(description) {
        return true;
    }
    // Several coordinated clauses usually mean several tasks
    lower.matches(" and ").count() >= 2
}

/// Tasks from the parsed plan object: a JSON array of strings, or a
/// markdown list in a single string.
fn parse_tasks(parsed: &serde_json::Value) -> Vec<String> {
    match parsed.get("tasks") {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(serde_json::Value::String(text)) => parse_task_list(text),
        _ => Vec::new(),
    }
}

/// Parse a markdown task/checklist into individual task strings.
fn parse_task_list(text: &str) -> Vec<String> {
    static ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^(?:[-*]|\d+[.)])\s*(?:\[.\]\s*)?(.+)").expect("task list regex")
    });

    text.lines()
        .filter_map(|line| {
            ITEM_RE
                .captures(line.trim())
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim().to_string())
        })
        .filter(|s| !s.is_empty())
        .collect()
}
