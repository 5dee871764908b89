//! Agent prompt construction.
//!
//! Builds the system prompt from the tool registry's action catalog plus
//! the meta-action contract, and the opening user message for a run.

use std::path::Path;

use crate::tools::ToolRegistry;

/// Build the agent system prompt: workflow, the action catalog from the
/// registry, built-in meta-actions and the response rules.
pub fn build_system_prompt(registry: &ToolRegistry) -> String {
    let mut prompt = String::from(
        "You are an autonomous agent that completes tasks by taking one action at a time.\n\
         \n\
         Each of your responses must contain:\n\
         1. Brief reasoning: what you know, what you need, why you chose this action.\n\
         2. Exactly ONE JSON action wrapped in ```json fences on its own line.\n\
         \n\
         ## Available Actions\n\n",
    );

    for (name, description, example) in registry.catalog() {
        prompt.push_str(&format!(
            "### {name}\n{description}\n```json\n{}\n```\n\n",
            serde_json::to_string(&example).unwrap_or_default()
        ));
    }

    prompt.push_str(
        "### thinking\n\
         Record reasoning without acting. Use sparingly.\n\
         ```json\n{\"action\": \"thinking\", \"thought\": \"The build fails before tests run, so fix the build first.\"}\n```\n\n\
         ### resolve_task\n\
         Mark the current task in the plan as completed, with its outcome.\n\
         ```json\n{\"action\": \"resolve_task\", \"summary\": \"Auth middleware added in src/middleware.rs; all tests pass.\"}\n```\n\n\
         ### switch_task\n\
         Switch to another task in the plan, stating why.\n\
         ```json\n{\"action\": \"switch_task\", \"task_id\": \"task_3\", \"reason\": \"task_2 is blocked on missing credentials\"}\n```\n\n\
         ### done\n\
         Finish the run with a comprehensive summary of everything accomplished.\n\
         ```json\n{\"action\": \"done\", \"summary\": \"Fixed the build by pinning serde to 1.0; tests green.\", \"sources\": [\"src/lib.rs\"]}\n```\n\n\
         ## Rules\n\
         1. One action per response. Wait for the result before choosing the next action.\n\
         2. Explore before modifying; verify assumptions with actual data.\n\
         3. If an action fails, analyze the error and try a different approach. Never repeat the exact same failing action.\n\
         4. Ensure action JSON is valid and properly escaped.\n\
         5. When the task is complete, use the done action with a full summary.\n",
    );

    prompt
}

/// Build the opening user message for a run.
pub fn build_initial_user_message(task: &str, workdir: &Path) -> String {
    format!("Task: {task}\n\nWorking directory: {}", workdir.display())
}

/// Message asking the model to retry after an unparseable reply.
pub fn retry_after_parse_failure() -> String {
    "I could not parse a valid JSON action from your response. \
     Please respond with exactly one JSON action block in ```json fences."
        .to_string()
}

/// Message injected when the user supplies guidance at an intervention.
pub fn guidance_message(kind: &str, guidance: &str) -> String {
    format!(
        "The system detected that you may be stuck in a loop ({kind}). \
         The user has provided the following guidance to help you:\n\n{guidance}\n\n\
         Please take this feedback into account and try a different approach."
    )
}
