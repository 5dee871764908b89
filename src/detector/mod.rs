//! Stuck-pattern classification over the action log.
//!
//! After every executed action the detector classifies the trailing window
//! of the log into zero or more loop signals, cheapest checks first. It
//! never mutates the log; the only state it owns is its intervention
//! bookkeeping and the baseline index used to honor a "counters reset"
//! after user guidance.

use serde_json::Value;

use crate::config::AgentConfig;
use crate::domain::{ActionLog, ActionRecord, LoopSignal, Severity, SignalKind};

/// Parameter keys ignored when comparing two invocations of the same
/// action. These carry values that legitimately differ between otherwise
/// identical calls.
const VOLATILE_PARAMS: [&str; 5] = ["timestamp", "timeout_ms", "request_id", "nonce", "call_id"];

/// Detects when the agent is stuck in a repetitive loop.
pub struct LoopDetector {
    max_iterations: u64,
    window_size: usize,
    repetition_threshold: usize,
    error_threshold: usize,
    pattern_length: usize,
    escalation_factor: f64,
    pattern_critical_repeats: usize,
    min_intervention_gap: u64,
    /// Iteration at which a signal was last surfaced to the user.
    last_intervention: Option<u64>,
    /// Records before this index are ignored; advanced when the user's
    /// guidance resets the counters.
    baseline: usize,
}

impl LoopDetector {
    /// Create a detector from configuration.
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            window_size: config.loop_action_window_size,
            repetition_threshold: config.loop_repetition_threshold,
            error_threshold: config.loop_error_threshold,
            pattern_length: config.loop_pattern_length,
            escalation_factor: config.loop_escalation_factor,
            pattern_critical_repeats: config.loop_pattern_critical_repeats,
            min_intervention_gap: config.min_intervention_gap,
            last_intervention: None,
            baseline: 0,
        }
    }

    /// Classify the trailing window of the log. Returns all signals found,
    /// ordered by check cost; short or malformed history simply yields none.
    pub fn check(&self, log: &ActionLog, iteration_count: u64) -> Vec<LoopSignal> {
        let mut signals = Vec::new();

        if let Some(signal) = self.check_iteration_limit(iteration_count) {
            signals.push(signal);
        }

        let effective = &log.records()[self.baseline.min(log.len())..];

        if let Some(signal) = self.check_error_cycle(effective) {
            signals.push(signal);
        }
        if let Some(signal) = self.check_action_repetition(effective) {
            signals.push(signal);
        }
        if let Some(signal) = self.check_pattern_cycle(effective) {
            signals.push(signal);
        }

        signals
    }

    /// Whether a signal should be surfaced now. IterationLimit always
    /// surfaces; everything else honors the intervention gap.
    pub fn should_surface(&self, signal: &LoopSignal, iteration_count: u64) -> bool {
        if !signal.is_suppressible() {
            return true;
        }
        match self.last_intervention {
            None => true,
            Some(last) => iteration_count.saturating_sub(last) >= self.min_intervention_gap,
        }
    }

    /// Record that an intervention was surfaced at this iteration.
    pub fn mark_intervention(&mut self, iteration_count: u64) {
        self.last_intervention = Some(iteration_count);
    }

    /// Reset the detection counters after user guidance: records already in
    /// the log stop counting toward future signals.
    pub fn reset_counters(&mut self, log: &ActionLog) {
        self.baseline = log.len();
    }

    fn check_iteration_limit(&self, iteration_count: u64) -> Option<LoopSignal> {
        if iteration_count < self.max_iterations {
            return None;
        }
        Some(
            LoopSignal::new(
                SignalKind::IterationLimit,
                Severity::Critical,
                format!(
                    "Agent has executed {iteration_count} iterations (limit: {})",
                    self.max_iterations
                ),
            )
            .with_suggestions(&[
                "Break the task into smaller subtasks",
                "Provide more specific instructions",
                "Try a different approach",
            ]),
        )
    }

    fn check_error_cycle(&self, records: &[ActionRecord]) -> Option<LoopSignal> {
        let trailing_errors: Vec<&ActionRecord> = records
            .iter()
            .rev()
            .take_while(|r| r.is_error)
            .collect();
        if trailing_errors.len() < self.error_threshold {
            return None;
        }
        let evidence: Vec<u64> = trailing_errors.iter().rev().map(|r| r.index).collect();
        Some(
            LoopSignal::new(
                SignalKind::ErrorCycle,
                Severity::Critical,
                format!(
                    "Agent encountered {} consecutive errors",
                    trailing_errors.len()
                ),
            )
            .with_suggestions(&[
                "Review the error messages and provide guidance",
                "Check if required files or resources exist",
                "Verify the environment is properly configured",
                "Simplify the task or change the approach",
            ])
            .with_evidence(evidence),
        )
    }

    fn check_action_repetition(&self, records: &[ActionRecord]) -> Option<LoopSignal> {
        let last = records.last()?;
        let window_start = records.len().saturating_sub(self.window_size);
        let window = &records[window_start..];

        let last_params = canonical_params(&last.parameters);
        let matching: Vec<&ActionRecord> = window
            .iter()
            .filter(|r| r.name == last.name && canonical_params(&r.parameters) == last_params)
            .collect();
        if matching.len() < self.repetition_threshold {
            return None;
        }

        let severity = if matching.len() as f64
            >= self.repetition_threshold as f64 * self.escalation_factor
        {
            Severity::Critical
        } else {
            Severity::Warning
        };
        let evidence: Vec<u64> = matching.iter().map(|r| r.index).collect();
        Some(
            LoopSignal::new(
                SignalKind::ActionRepetition,
                severity,
                format!(
                    "Agent is repeating the same action: '{}' with equivalent parameters ({} times)",
                    last.name,
                    matching.len()
                ),
            )
            .with_suggestions(&[
                "Explain why this action keeps producing inadequate results",
                "Suggest an alternative action or approach",
                "Provide the information the agent is looking for directly",
            ])
            .with_evidence(evidence),
        )
    }

    fn check_pattern_cycle(&self, records: &[ActionRecord]) -> Option<LoopSignal> {
        if records.len() < self.pattern_length * 2 {
            return None;
        }
        let window_start = records.len().saturating_sub(self.window_size.max(self.pattern_length * 2));
        let window = &records[window_start..];
        let names: Vec<&str> = window.iter().map(|r| r.name.as_str()).collect();

        // Anchor at the tail: a block of `plen` names equal to the block just
        // before it means the agent is cycling right now.
        for plen in self.pattern_length..=names.len() / 2 {
            let tail = &names[names.len() - plen..];
            let mut repeats = 1;
            while names.len() >= plen * (repeats + 1) {
                let prev = &names[names.len() - plen * (repeats + 1)..names.len() - plen * repeats];
                if prev == tail {
                    repeats += 1;
                } else {
                    break;
                }
            }
            if repeats < 2 {
                continue;
            }

            let severity = if repeats >= self.pattern_critical_repeats {
                Severity::Critical
            } else {
                Severity::Warning
            };
            let evidence: Vec<u64> = window[window.len() - plen * repeats..]
                .iter()
                .map(|r| r.index)
                .collect();
            return Some(
                LoopSignal::new(
                    SignalKind::PatternCycle,
                    severity,
                    format!(
                        "Agent is repeating a sequence of {} actions {} times: [{}]",
                        plen,
                        repeats,
                        tail.join(" -> ")
                    ),
                )
                .with_suggestions(&[
                    "Identify why this sequence is not making progress",
                    "Provide missing information or context",
                    "Break the cycle by suggesting a different approach",
                ])
                .with_evidence(evidence),
            );
        }

        None
    }
}

/// Parameters with known-volatile fields stripped, for equality comparison.
/// Non-object parameters compare as-is.
fn canonical_params(params: &Value) -> Value {
    match params {
        Value::Object(map) => {
            let filtered: serde_json::Map<String, Value> = map
                .iter()
                .filter(|(k, _)| !VOLATILE_PARAMS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Value::Object(filtered)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detector() -> LoopDetector {
        LoopDetector::new(&AgentConfig::default())
    }

    fn detector_with(f: impl FnOnce(&mut AgentConfig)) -> LoopDetector {
        let mut config = AgentConfig::default();
        f(&mut config);
        LoopDetector::new(&config)
    }

    fn log_of(entries: &[(&str, Value, bool)]) -> ActionLog {
        let mut log = ActionLog::new();
        for (name, params, is_error) in entries {
            log.append(*name, params.clone(), "", *is_error);
        }
        log
    }

    #[test]
    fn test_empty_log_yields_no_signal() {
        let log = ActionLog::new();
        assert!(detector().check(&log, 0).is_empty());
    }

    #[test]
    fn test_iteration_limit_fires_at_cap() {
        let d = detector();
        let log = ActionLog::new();

        assert!(d.check(&log, 199).is_empty());

        let signals = d.check(&log, 200);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, SignalKind::IterationLimit);
        assert!(signals[0].is_critical());
        assert!(!signals[0].is_suppressible());
    }

    #[test]
    fn test_error_cycle_fires_at_threshold() {
        let entries: Vec<(&str, Value, bool)> =
            (0..8).map(|_| ("run_command", json!({"command": "x"}), true)).collect();
        let log = log_of(&entries);

        let signals = detector_with(|c| c.loop_repetition_threshold = 99).check(&log, 8);
        assert!(signals.iter().any(|s| s.kind == SignalKind::ErrorCycle));
        let signal = signals
            .iter()
            .find(|s| s.kind == SignalKind::ErrorCycle)
            .unwrap();
        assert!(signal.is_critical());
        assert_eq!(signal.evidence.len(), 8);
    }

    #[test]
    fn test_error_cycle_below_threshold_does_not_fire() {
        let entries: Vec<(&str, Value, bool)> =
            (0..7).map(|_| ("run_command", json!({"command": "x"}), true)).collect();
        let log = log_of(&entries);

        let signals = detector_with(|c| c.loop_repetition_threshold = 99).check(&log, 7);
        assert!(!signals.iter().any(|s| s.kind == SignalKind::ErrorCycle));
    }

    #[test]
    fn test_error_cycle_resets_on_success() {
        // 7 errors, one success, then 7 more errors: never reaches 8
        let mut entries: Vec<(&str, Value, bool)> =
            (0..7).map(|_| ("run_command", json!({"command": "x"}), true)).collect();
        entries.push(("read_file", json!({"path": "a"}), false));
        entries.extend((0..7).map(|_| ("run_command", json!({"command": "x"}), true)));
        let log = log_of(&entries);

        let signals = detector_with(|c| c.loop_repetition_threshold = 99).check(&log, 15);
        assert!(!signals.iter().any(|s| s.kind == SignalKind::ErrorCycle));
    }

    #[test]
    fn test_action_repetition_fires_at_threshold() {
        let entries: Vec<(&str, Value, bool)> = (0..8)
            .map(|_| ("search_code", json!({"query": "auth"}), false))
            .collect();
        let log = log_of(&entries);

        let signals = detector().check(&log, 8);
        let signal = signals
            .iter()
            .find(|s| s.kind == SignalKind::ActionRepetition)
            .expect("repetition signal");
        assert_eq!(signal.severity, Severity::Warning);
        assert_eq!(signal.evidence.len(), 8);
    }

    #[test]
    fn test_action_repetition_below_threshold_does_not_fire() {
        let entries: Vec<(&str, Value, bool)> = (0..7)
            .map(|_| ("search_code", json!({"query": "auth"}), false))
            .collect();
        let log = log_of(&entries);

        let signals = detector().check(&log, 7);
        assert!(!signals.iter().any(|s| s.kind == SignalKind::ActionRepetition));
    }

    #[test]
    fn test_action_repetition_escalates_to_critical() {
        let entries: Vec<(&str, Value, bool)> = (0..12)
            .map(|_| ("search_code", json!({"query": "auth"}), false))
            .collect();
        let log = log_of(&entries);

        let signals = detector().check(&log, 12);
        let signal = signals
            .iter()
            .find(|s| s.kind == SignalKind::ActionRepetition)
            .unwrap();
        assert_eq!(signal.severity, Severity::Critical);
    }

    #[test]
    fn test_action_repetition_ignores_volatile_params() {
        let entries: Vec<(&str, Value, bool)> = (0..8)
            .map(|i| {
                (
                    "run_command",
                    json!({"command": "make test", "timeout_ms": 1000 + i}),
                    false,
                )
            })
            .collect();
        let log = log_of(&entries);

        let signals = detector().check(&log, 8);
        assert!(signals.iter().any(|s| s.kind == SignalKind::ActionRepetition));
    }

    #[test]
    fn test_action_repetition_distinguishes_real_params() {
        let entries: Vec<(&str, Value, bool)> = (0..8)
            .map(|i| ("read_file", json!({"path": format!("file_{i}.txt")}), false))
            .collect();
        let log = log_of(&entries);

        let signals = detector().check(&log, 8);
        assert!(!signals.iter().any(|s| s.kind == SignalKind::ActionRepetition));
    }

    #[test]
    fn test_pattern_cycle_fires_on_three_repeats() {
        // Pattern of length 10 repeated 3 times
        let mut entries: Vec<(&str, Value, bool)> = Vec::new();
        let names = [
            "read_file",
            "search_code",
            "run_command",
            "list_directory",
            "read_file",
            "write_file",
            "run_command",
            "search_code",
            "list_directory",
            "read_file",
        ];
        for _ in 0..3 {
            for (i, name) in names.iter().enumerate() {
                entries.push((*name, json!({"step": i}), false));
            }
        }
        let log = log_of(&entries);

        // Params differ per position, so repetition stays quiet; a wide
        // window lets the whole pattern fit.
        let signals = detector_with(|c| c.loop_action_window_size = 40).check(&log, 30);
        let signal = signals
            .iter()
            .find(|s| s.kind == SignalKind::PatternCycle)
            .expect("pattern signal");
        assert_eq!(signal.severity, Severity::Critical);
        assert_eq!(signal.evidence.len(), 30);
    }

    #[test]
    fn test_pattern_cycle_two_repeats_is_warning() {
        // Distinct names so the repetition detector stays quiet
        let names: Vec<String> = (0..10).map(|i| format!("action_{i}")).collect();
        let mut entries: Vec<(&str, Value, bool)> = Vec::new();
        for _ in 0..2 {
            for name in &names {
                entries.push((name.as_str(), json!({}), false));
            }
        }
        let log = log_of(&entries);

        let signals = detector_with(|c| c.loop_action_window_size = 40).check(&log, 20);
        let signal = signals
            .iter()
            .find(|s| s.kind == SignalKind::PatternCycle)
            .expect("pattern signal");
        assert_eq!(signal.severity, Severity::Warning);
    }

    #[test]
    fn test_pattern_cycle_never_fires_on_distinct_sequence() {
        let entries: Vec<(String, Value, bool)> = (0..20)
            .map(|i| (format!("action_{i}"), json!({}), false))
            .collect();
        let mut log = ActionLog::new();
        for (name, params, is_error) in &entries {
            log.append(name.clone(), params.clone(), "", *is_error);
        }

        let signals = detector_with(|c| c.loop_action_window_size = 40).check(&log, 20);
        assert!(!signals.iter().any(|s| s.kind == SignalKind::PatternCycle));
    }

    #[test]
    fn test_suppression_within_gap() {
        let mut d = detector();
        let signal = LoopSignal::new(SignalKind::ErrorCycle, Severity::Critical, "x");

        assert!(d.should_surface(&signal, 10));
        d.mark_intervention(10);

        // Within the gap: suppressed
        assert!(!d.should_surface(&signal, 12));
        // At the gap: surfaced again
        assert!(d.should_surface(&signal, 15));
    }

    #[test]
    fn test_iteration_limit_never_suppressed() {
        let mut d = detector();
        d.mark_intervention(10);

        let signal = LoopSignal::new(SignalKind::IterationLimit, Severity::Critical, "x");
        assert!(d.should_surface(&signal, 11));
    }

    #[test]
    fn test_reset_counters_clears_repetition() {
        let entries: Vec<(&str, Value, bool)> = (0..8)
            .map(|_| ("search_code", json!({"query": "auth"}), false))
            .collect();
        let mut log = log_of(&entries);
        let mut d = detector();

        assert!(
            d.check(&log, 8)
                .iter()
                .any(|s| s.kind == SignalKind::ActionRepetition)
        );

        d.reset_counters(&log);
        assert!(d.check(&log, 8).is_empty());

        // Seven more of the same after the reset stays below threshold
        for _ in 0..7 {
            log.append("search_code", json!({"query": "auth"}), "", false);
        }
        assert!(
            !d.check(&log, 15)
                .iter()
                .any(|s| s.kind == SignalKind::ActionRepetition)
        );
    }

    #[test]
    fn test_canonical_params_strips_volatile() {
        let a = json!({"command": "ls", "timestamp": 1, "nonce": "x"});
        let b = json!({"command": "ls", "timestamp": 2, "nonce": "y"});
        assert_eq!(canonical_params(&a), canonical_params(&b));

        let c = json!({"command": "pwd"});
        assert_ne!(canonical_params(&a), canonical_params(&c));
    }
}
