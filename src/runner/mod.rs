//! The agent orchestrator.
//!
//! Drives the iteration loop: ask the model for one action, execute it,
//! record the outcome, run loop detection, optimize the context, decide
//! what happens next. Each run owns its history, action log and task queue;
//! independent runs share nothing mutable.

pub mod intervention;
pub mod trace;

pub use intervention::{AutoContinue, ConsoleIntervention, InterventionChannel, InterventionDecision};
pub use trace::{CollectingTraceSink, IterationTrace, LogTraceSink, NullTraceSink, TraceSink};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;

use crate::config::Config;
use crate::context::{ContextOptimizer, LlmSummarizer, Summarizer};
use crate::detector::LoopDetector;
use crate::domain::{ActionLog, ChatMessage, Message, SignalKind, TaskQueue, TaskStatus};
use crate::error::Result;
use crate::id::generate_run_id;
use crate::llm::{self, LlmProvider};
use crate::planner::Planner;
use crate::prompt;
use crate::tools::ToolRegistry;

/// Synthetic action name recorded for an unparseable model reply.
const PARSE_ERROR_ACTION: &str = "unparseable_response";

/// Synthetic action name recorded for a timed-out model call.
const TIMEOUT_ACTION: &str = "llm_timeout";

/// Synthetic action name recorded for a failed model call.
const PROVIDER_ERROR_ACTION: &str = "llm_error";

/// Resolutions of a planned run are saved here, relative to the workdir.
const RESOLUTIONS_FILE: &str = ".agentr/task_resolutions.json";

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Aborted,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Aborted => write!(f, "aborted"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Final result of a run. Carries a status and summary, never the internal
/// trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub summary: String,
    /// Distinct paths/URLs touched by successful actions, plus anything the
    /// model listed in its done action.
    pub sources: Vec<String>,
    pub iterations_used: u64,
}

/// Mutable state of one run, exclusively owned by its `run` call.
struct RunState {
    iteration_count: u64,
    current_task: usize,
    history: Vec<Message>,
    log: ActionLog,
}

/// What an iteration decided about the run's future.
enum Flow {
    Continue,
    Terminate(RunStatus, String),
}

/// The agent orchestrator. Construct once, run any number of tasks; each
/// `run` call owns its state and runs independently.
pub struct AgentRunner {
    config: Config,
    provider: Arc<dyn LlmProvider>,
    registry: Arc<ToolRegistry>,
    intervention: Arc<dyn InterventionChannel>,
    summarizer: Arc<dyn Summarizer>,
    trace_sink: Arc<dyn TraceSink>,
}

impl AgentRunner {
    /// Create a runner. Summarization defaults to the same provider; traces
    /// are dropped unless a sink is attached.
    pub fn new(
        config: Config,
        provider: Arc<dyn LlmProvider>,
        registry: Arc<ToolRegistry>,
        intervention: Arc<dyn InterventionChannel>,
    ) -> Self {
        let summarizer = Arc::new(LlmSummarizer::new(provider.clone()));
        Self {
            config,
            provider,
            registry,
            intervention,
            summarizer,
            trace_sink: Arc::new(NullTraceSink),
        }
    }

    /// Use a dedicated summarizer instead of the run provider.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    /// Attach a trace sink for per-iteration observability.
    pub fn with_trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace_sink = sink;
        self
    }

    /// Run a task to a terminal status.
    pub async fn run(&self, task: &str) -> Result<RunResult> {
        let (_tx, rx) = watch::channel(false);
        self.run_with_cancel(task, rx).await
    }

    /// Run a task, aborting cleanly when the watch flag turns true. The
    /// action log and task queue are never left half-updated: appending the
    /// record is the only mutation in a step, and cancellation unwinds
    /// before it.
    pub async fn run_with_cancel(
        &self,
        task: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<RunResult> {
        let run_id = generate_run_id();
        tracing::info!(run = %run_id, task, "run starting");

        let system_prompt = prompt::build_system_prompt(&self.registry);
        let optimizer = ContextOptimizer::new(&self.config.agent, self.summarizer.clone());
        let mut detector = LoopDetector::new(&self.config.agent);

        // Planning phase; failures fall back to unplanned execution
        let planner = Planner::new(self.provider.clone(), self.config.agent.planning_enabled);
        let mut queue = match guarded(&cancel, planner.plan(task, &system_prompt)).await {
            Some(queue) => queue,
            None => return Ok(self.finish(RunStatus::Aborted, "cancelled by host", &state_empty(), None)),
        };
        if let Some(q) = &mut queue {
            q.start(0);
        }

        let workdir = self.registry.context().workdir.clone();
        let mut state = RunState {
            iteration_count: 0,
            current_task: 0,
            history: vec![
                Message::system(system_prompt),
                Message::user(prompt::build_initial_user_message(task, &workdir)),
            ],
            log: ActionLog::new(),
        };

        loop {
            if *cancel.borrow() {
                return Ok(self.finish(RunStatus::Aborted, "cancelled by host", &state, queue.as_mut()));
            }
            state.iteration_count += 1;

            // Keep the serialized history inside the token budget before
            // every model call
            let history = std::mem::take(&mut state.history);
            state.history = match guarded(&cancel, optimizer.optimize(history)).await {
                Some(history) => history,
                None => return Ok(self.finish(RunStatus::Aborted, "cancelled by host", &state, queue.as_mut())),
            };

            let flow = match self.step(&optimizer, &mut state, &mut queue, &cancel).await {
                Some(flow) => flow,
                None => return Ok(self.finish(RunStatus::Aborted, "cancelled by host", &state, queue.as_mut())),
            };
            if let Flow::Terminate(status, summary) = flow {
                self.emit_trace(&state, &[]);
                return Ok(self.finish(status, &summary, &state, queue.as_mut()));
            }

            // Loop detection, then intervention for whatever surfaces
            let flow = match self.handle_signals(&mut detector, &mut state, &cancel).await {
                Some(flow) => flow,
                None => return Ok(self.finish(RunStatus::Aborted, "cancelled by host", &state, queue.as_mut())),
            };
            if let Flow::Terminate(status, summary) = flow {
                return Ok(self.finish(status, &summary, &state, queue.as_mut()));
            }

            if queue.as_ref().is_some_and(|q| q.all_completed()) {
                let summary = queue
                    .as_ref()
                    .map(|q| q.final_summary())
                    .unwrap_or_default();
                return Ok(self.finish(RunStatus::Completed, &summary, &state, queue.as_mut()));
            }
        }
    }

    /// One iteration: model call, action parse, dispatch, record.
    /// Returns `None` on cancellation.
    async fn step(
        &self,
        optimizer: &ContextOptimizer,
        state: &mut RunState,
        queue: &mut Option<TaskQueue>,
        cancel: &watch::Receiver<bool>,
    ) -> Option<Flow> {
        let messages = self.compose_messages(optimizer, state, queue.as_ref());
        let llm_timeout = Duration::from_millis(self.config.llm.timeout_ms);

        let reply = match guarded(
            cancel,
            tokio::time::timeout(llm_timeout, self.provider.complete(&messages)),
        )
        .await?
        {
            Err(_) => {
                // A timed-out call is recorded as an error, not left pending
                let description = format!("model call timed out after {}ms", llm_timeout.as_millis());
                log::warn!("{description}");
                state
                    .log
                    .append(TIMEOUT_ACTION, Value::Object(Default::default()), &description, true);
                return Some(Flow::Continue);
            }
            Ok(Err(e)) => {
                log::warn!("model call failed: {e}");
                state.log.append(
                    PROVIDER_ERROR_ACTION,
                    Value::Object(Default::default()),
                    &e.to_string(),
                    true,
                );
                return Some(Flow::Continue);
            }
            Ok(Ok(reply)) => reply,
        };

        state.history.push(Message::assistant(reply.clone()));

        let Some(action) = llm::parse_action(&reply) else {
            log::info!("could not parse an action from the reply, asking for retry");
            state.log.append(
                PARSE_ERROR_ACTION,
                Value::Object(Default::default()),
                &reply,
                true,
            );
            state
                .history
                .push(Message::user(prompt::retry_after_parse_failure()));
            return Some(Flow::Continue);
        };

        let name = action
            .get("action")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let params = strip_action_key(&action);

        match name.as_str() {
            "thinking" => {
                // Record only; the reasoning already lives in the history
                state.log.append(&name, params, "", false);
                Some(Flow::Continue)
            }
            "done" => {
                let summary = params
                    .get("summary")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Task completed.")
                    .to_string();
                state.log.append(&name, params, &summary, false);
                Some(Flow::Terminate(RunStatus::Completed, summary))
            }
            "resolve_task" => {
                let summary = params
                    .get("summary")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Task completed.")
                    .to_string();
                state.log.append(&name, params, &summary, false);

                match queue {
                    Some(q) => {
                        q.resolve(state.current_task, &summary);
                        match q.next_unfinished() {
                            Some(next) => {
                                q.start(next);
                                state.current_task = next;
                                Some(Flow::Continue)
                            }
                            None => Some(Flow::Terminate(RunStatus::Completed, q.final_summary())),
                        }
                    }
                    // Unplanned runs have a single implicit task
                    None => Some(Flow::Terminate(RunStatus::Completed, summary)),
                }
            }
            "switch_task" => {
                let target = params
                    .get("task_id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                match queue.as_mut().and_then(|q| {
                    q.index_of(&target).map(|index| {
                        q.start(index);
                        index
                    })
                }) {
                    Some(index) => {
                        state.current_task = index;
                        state.log.append(&name, params, &format!("switched to {target}"), false);
                    }
                    None => {
                        state
                            .log
                            .append(&name, params, &format!("unknown task id '{target}'"), true);
                    }
                }
                Some(Flow::Continue)
            }
            _ => {
                // Dispatch to the tool registry; unknown names come back as
                // error results and feed the detector like any other failure
                let result = guarded(cancel, self.registry.execute(&name, &params)).await?;
                state.log.append(&name, params, &result.content, result.is_error);

                let mut result_msg = format!("Action result:\n{}", result.content);
                if result.is_error {
                    result_msg.push_str(
                        "\n\nThe action above FAILED. Do not assume it succeeded; \
                         read the error output and correct course.",
                    );
                }
                state.history.push(Message::tool_result(&name, result_msg));
                Some(Flow::Continue)
            }
        }
    }

    /// Run the detector and surface at most one signal. Returns `None` on
    /// cancellation.
    async fn handle_signals(
        &self,
        detector: &mut LoopDetector,
        state: &mut RunState,
        cancel: &watch::Receiver<bool>,
    ) -> Option<Flow> {
        let mut signals = detector.check(&state.log, state.iteration_count);
        if !self.config.agent.loop_detection_enabled {
            // The iteration cap still bounds the run
            signals.retain(|s| s.kind == SignalKind::IterationLimit);
        }

        // One trace per iteration, carrying whatever fired
        self.emit_trace(
            state,
            &signals.iter().map(|s| s.kind.to_string()).collect::<Vec<_>>(),
        );

        if signals.is_empty() {
            return Some(Flow::Continue);
        }
        let signal = &signals[0];
        if signal.kind == SignalKind::IterationLimit {
            // Continuing past the cap would void the termination guarantee
            return Some(Flow::Terminate(RunStatus::Failed, signal.description.clone()));
        }
        if !detector.should_surface(signal, state.iteration_count) {
            log::debug!("suppressing signal within intervention gap: {}", signal.kind);
            return Some(Flow::Continue);
        }

        tracing::info!(kind = %signal.kind, severity = %signal.severity, "pausing for intervention");
        detector.mark_intervention(state.iteration_count);

        let decision = match guarded(cancel, self.intervention.prompt(signal)).await? {
            Ok(decision) => decision,
            Err(e) => {
                log::warn!("intervention channel failed ({e}), aborting run");
                return Some(Flow::Terminate(
                    RunStatus::Aborted,
                    format!("intervention channel failed: {e}"),
                ));
            }
        };

        match decision {
            InterventionDecision::Guidance(guidance) => {
                state.history.push(Message::user(prompt::guidance_message(
                    &signal.kind.to_string(),
                    &guidance,
                )));
                detector.reset_counters(&state.log);
                Some(Flow::Continue)
            }
            InterventionDecision::Continue => Some(Flow::Continue),
            InterventionDecision::Abort => Some(Flow::Terminate(
                RunStatus::Aborted,
                format!("aborted at intervention: {}", signal.description),
            )),
        }
    }

    /// System prompt and optimized history, plus the live task-queue status
    /// and the resolutions of tasks finished so far.
    fn compose_messages(
        &self,
        optimizer: &ContextOptimizer,
        state: &RunState,
        queue: Option<&TaskQueue>,
    ) -> Vec<ChatMessage> {
        let mut messages = optimizer.materialize(&state.history);
        if let Some(q) = queue {
            let mut status = q.status_block(state.current_task);
            if q.tasks.iter().any(|t| t.resolution.is_some()) {
                status.push_str(&format!(
                    "\n## Previous Task Resolutions\n{}",
                    q.resolutions_context()
                ));
            }
            messages.push(ChatMessage::user(status));
        }
        messages
    }

    fn emit_trace(&self, state: &RunState, signals: &[String]) {
        if let Some(record) = state.log.last() {
            self.trace_sink.on_iteration(&IterationTrace {
                iteration: state.iteration_count,
                action: record.name.clone(),
                parameters: record.parameters.clone(),
                result_excerpt: record.result_summary.clone(),
                signals: signals.to_vec(),
            });
        }
    }

    /// Build the final result; persist the task queue of planned runs. A
    /// run that terminates under a task leaves it marked failed with the
    /// terminal summary as its resolution.
    fn finish(
        &self,
        status: RunStatus,
        summary: &str,
        state: &RunState,
        queue: Option<&mut TaskQueue>,
    ) -> RunResult {
        if let Some(q) = queue {
            if status != RunStatus::Completed
                && q.get(state.current_task)
                    .is_some_and(|t| t.status == TaskStatus::InProgress)
            {
                q.fail(state.current_task, summary);
            }
            let path = self.registry.context().workdir.join(RESOLUTIONS_FILE);
            if let Err(e) = q.save(&path) {
                log::warn!("could not save task resolutions: {e}");
            }
        }

        tracing::info!(%status, iterations = state.iteration_count, "run finished");
        RunResult {
            status,
            summary: summary.to_string(),
            sources: collect_sources(&state.log),
            iterations_used: state.iteration_count,
        }
    }
}

/// Await a future unless the cancel flag turns true first.
async fn guarded<T>(cancel: &watch::Receiver<bool>, fut: impl Future<Output = T>) -> Option<T> {
    let mut rx = cancel.clone();
    let cancelled = async move {
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender gone: cancellation can never arrive
                std::future::pending::<()>().await;
            }
        }
    };
    tokio::select! {
        _ = cancelled => None,
        result = fut => Some(result),
    }
}

/// The action object minus its "action" key.
fn strip_action_key(action: &Value) -> Value {
    match action {
        Value::Object(map) => {
            let filtered: serde_json::Map<String, Value> = map
                .iter()
                .filter(|(k, _)| k.as_str() != "action")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Value::Object(filtered)
        }
        other => other.clone(),
    }
}

/// Distinct path/URL parameter values of successful actions, plus anything
/// the done action listed under "sources".
fn collect_sources(log: &ActionLog) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    let mut push = |s: &str| {
        if !s.is_empty() && !sources.iter().any(|existing| existing == s) {
            sources.push(s.to_string());
        }
    };

    for record in log.records() {
        if record.is_error {
            continue;
        }
        for key in ["path", "url"] {
            if let Some(value) = record.parameters.get(key).and_then(|v| v.as_str()) {
                push(value);
            }
        }
        if record.name == "done"
            && let Some(listed) = record.parameters.get("sources").and_then(|v| v.as_array())
        {
            for value in listed.iter().filter_map(|v| v.as_str()) {
                push(value);
            }
        }
    }

    sources
}

fn state_empty() -> RunState {
    RunState {
        iteration_count: 0,
        current_task: 0,
        history: Vec::new(),
        log: ActionLog::new(),
    }
}
