//! Human intervention channel.
//!
//! When a loop signal surfaces, the orchestrator suspends and asks this
//! collaborator for a decision. The trait is async so hosts can resume the
//! run from a request/response exchange instead of blocking a thread.

use std::io::Write;

use async_trait::async_trait;
use colored::Colorize;

use crate::domain::{LoopSignal, Severity};
use crate::error::{AgentError, Result};

/// Outcome of an intervention prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterventionDecision {
    /// Resume with extra guidance injected into the conversation; detection
    /// counters reset.
    Guidance(String),
    /// Resume as-is; detection counters keep their values.
    Continue,
    /// Terminate the run as aborted.
    Abort,
}

/// Collaborator that turns a loop signal into a decision.
#[async_trait]
pub trait InterventionChannel: Send + Sync {
    /// Present the signal and await a decision.
    async fn prompt(&self, signal: &LoopSignal) -> Result<InterventionDecision>;
}

/// Channel for headless runs: never pauses, always continues.
pub struct AutoContinue;

#[async_trait]
impl InterventionChannel for AutoContinue {
    async fn prompt(&self, signal: &LoopSignal) -> Result<InterventionDecision> {
        log::warn!(
            "loop signal ({}) auto-continued: {}",
            signal.kind,
            signal.description
        );
        Ok(InterventionDecision::Continue)
    }
}

/// Interactive console channel used by the CLI host.
pub struct ConsoleIntervention;

#[async_trait]
impl InterventionChannel for ConsoleIntervention {
    async fn prompt(&self, signal: &LoopSignal) -> Result<InterventionDecision> {
        let header = format!("Loop detected: {} ({})", signal.kind, signal.severity);
        match signal.severity {
            Severity::Critical => eprintln!("\n{}", header.red().bold()),
            Severity::Warning => eprintln!("\n{}", header.yellow().bold()),
        }
        eprintln!("{}", signal.description);
        if !signal.suggested_actions.is_empty() {
            eprintln!("{}", "Suggested actions:".bold());
            for suggestion in &signal.suggested_actions {
                eprintln!("  - {suggestion}");
            }
        }
        eprintln!("\n1) Provide guidance  2) Continue anyway  3) Abort");

        let choice = read_line("> ").await?;
        match choice.trim() {
            "1" => {
                let guidance = read_line("Your guidance: ").await?;
                if guidance.trim().is_empty() {
                    Ok(InterventionDecision::Continue)
                } else {
                    Ok(InterventionDecision::Guidance(guidance.trim().to_string()))
                }
            }
            "3" => Ok(InterventionDecision::Abort),
            _ => Ok(InterventionDecision::Continue),
        }
    }
}

/// Read one line from stdin without blocking the runtime.
async fn read_line(prompt_text: &str) -> Result<String> {
    let prompt_text = prompt_text.to_string();
    tokio::task::spawn_blocking(move || {
        eprint!("{prompt_text}");
        std::io::stderr().flush().ok();
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok::<String, std::io::Error>(line)
    })
    .await
    .map_err(|e| AgentError::InvalidState(format!("stdin reader task failed: {e}")))?
    .map_err(AgentError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SignalKind;

    #[tokio::test]
    async fn test_auto_continue_always_continues() {
        let signal = LoopSignal::new(
            SignalKind::ActionRepetition,
            Severity::Warning,
            "repeating",
        );
        let decision = AutoContinue.prompt(&signal).await.unwrap();
        assert_eq!(decision, InterventionDecision::Continue);
    }

    #[test]
    fn test_decision_equality() {
        assert_eq!(
            InterventionDecision::Guidance("a".to_string()),
            InterventionDecision::Guidance("a".to_string())
        );
        assert_ne!(
            InterventionDecision::Continue,
            InterventionDecision::Abort
        );
    }
}
