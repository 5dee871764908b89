//! Append-only record of executed actions for one run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stored result summaries are bounded to this many characters.
const RESULT_SUMMARY_MAX: usize = 200;

/// Record of a single executed action. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Position in the log, starting at 0.
    pub index: u64,
    /// Action name as requested by the model.
    pub name: String,
    /// Action parameters (the JSON object minus the "action" key).
    pub parameters: Value,
    /// Bounded excerpt of the result.
    pub result_summary: String,
    /// Whether the action resulted in an error.
    pub is_error: bool,
    /// When the action finished.
    pub timestamp: DateTime<Utc>,
}

/// Append-only action log, scoped to one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionLog {
    records: Vec<ActionRecord>,
}

impl ActionLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record. The summary is truncated to a bounded length; the
    /// stored record never changes afterwards.
    pub fn append(
        &mut self,
        name: impl Into<String>,
        parameters: Value,
        result: &str,
        is_error: bool,
    ) -> &ActionRecord {
        let record = ActionRecord {
            index: self.records.len() as u64,
            name: name.into(),
            parameters,
            result_summary: truncate_chars(result, RESULT_SUMMARY_MAX),
            is_error,
            timestamp: Utc::now(),
        };
        log::debug!(
            "action #{}: {} (error={})",
            record.index,
            record.name,
            record.is_error
        );
        self.records.push(record);
        self.records.last().expect("record just pushed")
    }

    /// All records in append order.
    pub fn records(&self) -> &[ActionRecord] {
        &self.records
    }

    /// Up to the last `n` records.
    pub fn tail(&self, n: usize) -> &[ActionRecord] {
        let start = self.records.len().saturating_sub(n);
        &self.records[start..]
    }

    /// Most recent record.
    pub fn last(&self) -> Option<&ActionRecord> {
        self.records.last()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Truncate to at most `max` characters, marking the cut.
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max).collect();
    format!("{truncated}...")
}
