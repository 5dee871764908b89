//! ID generation utilities for Agentr
//!
//! Provides functions for generating unique identifiers for runs and tasks.

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Generate a unique run ID
///
/// Format: `run-{timestamp_ms}-{pid}`
/// Example: `run-1738300800123-4821`
pub fn generate_run_id() -> String {
    format!("run-{}-{}", now_ms(), std::process::id())
}

/// Generate a task ID given its position in the queue
///
/// Format: `task_{index+1}`
/// Example: for index 2: `task_3`
pub fn generate_task_id(index: usize) -> String {
    format!("task_{}", index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        // After 2020-01-01 and before 2100-01-01
        assert!(ts > 1_577_836_800_000);
        assert!(ts < 4_102_444_800_000);
    }

    #[test]
    fn test_generate_run_id_format() {
        let id = generate_run_id();
        assert!(id.starts_with("run-"));
        assert_eq!(id.split('-').count(), 3);
    }

    #[test]
    fn test_generate_task_id() {
        assert_eq!(generate_task_id(0), "task_1");
        assert_eq!(generate_task_id(4), "task_5");
    }
}
