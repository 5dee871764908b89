//! Loop signals produced by the detector.
//!
//! Signals are ephemeral: produced per check, consumed immediately by the
//! orchestrator to decide whether to pause for intervention.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classified stuck-pattern kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Iteration count reached the hard cap.
    IterationLimit,
    /// A run of consecutive error actions.
    ErrorCycle,
    /// The same action with equivalent parameters repeated.
    ActionRepetition,
    /// A sequence of action names repeating back-to-back.
    PatternCycle,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalKind::IterationLimit => "iteration_limit",
            SignalKind::ErrorCycle => "error_cycle",
            SignalKind::ActionRepetition => "action_repetition",
            SignalKind::PatternCycle => "pattern_cycle",
        };
        write!(f, "{name}")
    }
}

/// How urgent a signal is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// A detected stuck pattern with the evidence behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopSignal {
    pub kind: SignalKind,
    pub severity: Severity,
    /// Human-readable description of what was detected.
    pub description: String,
    /// Concrete suggestions shown at the intervention prompt.
    pub suggested_actions: Vec<String>,
    /// Indices of the action-log records that triggered the signal.
    pub evidence: Vec<u64>,
}

impl LoopSignal {
    /// Create a new signal.
    pub fn new(kind: SignalKind, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            description: description.into(),
            suggested_actions: Vec::new(),
            evidence: Vec::new(),
        }
    }

    /// Attach suggested actions.
    pub fn with_suggestions(mut self, suggestions: &[&str]) -> Self {
        self.suggested_actions = suggestions.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Attach evidence record indices.
    pub fn with_evidence(mut self, evidence: Vec<u64>) -> Self {
        self.evidence = evidence;
        self
    }

    /// True for Critical severity.
    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }

    /// IterationLimit is never suppressed by intervention spacing.
    pub fn is_suppressible(&self) -> bool {
        self.kind != SignalKind::IterationLimit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&SignalKind::ErrorCycle).unwrap(),
            "\"error_cycle\""
        );
        assert_eq!(
            serde_json::to_string(&SignalKind::ActionRepetition).unwrap(),
            "\"action_repetition\""
        );
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::Warning);
    }

    #[test]
    fn test_severity_display() {
        assert_eq!(Severity::Warning.to_string(), "warning");
        assert_eq!(Severity::Critical.to_string(), "critical");
    }

    #[test]
    fn test_iteration_limit_not_suppressible() {
        let signal = LoopSignal::new(SignalKind::IterationLimit, Severity::Critical, "limit");
        assert!(!signal.is_suppressible());
        assert!(signal.is_critical());
    }

    #[test]
    fn test_other_kinds_suppressible() {
        for kind in [
            SignalKind::ErrorCycle,
            SignalKind::ActionRepetition,
            SignalKind::PatternCycle,
        ] {
            let signal = LoopSignal::new(kind, Severity::Warning, "x");
            assert!(signal.is_suppressible());
        }
    }

    #[test]
    fn test_builder_methods() {
        let signal = LoopSignal::new(SignalKind::ErrorCycle, Severity::Critical, "8 errors")
            .with_suggestions(&["check the environment", "simplify the task"])
            .with_evidence(vec![3, 4, 5]);

        assert_eq!(signal.suggested_actions.len(), 2);
        assert_eq!(signal.evidence, vec![3, 4, 5]);
    }
}
