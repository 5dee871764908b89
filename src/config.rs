//! Application configuration.
//!
//! Loaded once at process start from ~/.config/agentr/agentr.yml or
//! .agentr.yml and passed by value into each component. No component reads
//! ambient global state.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Immutable configuration for Agentr.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Agent loop settings.
    pub agent: AgentConfig,

    /// LLM provider settings.
    pub llm: LlmConfig,

    /// Tool execution settings.
    pub tools: ToolsConfig,
}

impl Config {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .agentr.yml in current directory
    /// 3. ~/.config/agentr/agentr.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .context(format!("Failed to load config from {}", path.display()));
        }

        let project_config = PathBuf::from(".agentr.yml");
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from .agentr.yml");
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load .agentr.yml: {}", e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("agentr").join("agentr.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.agent.max_iterations == 0 {
            eyre::bail!("agent.max_iterations must be > 0");
        }
        if self.agent.loop_action_window_size == 0 {
            eyre::bail!("agent.loop_action_window_size must be > 0");
        }
        if self.agent.loop_repetition_threshold < 2 {
            eyre::bail!("agent.loop_repetition_threshold must be >= 2");
        }
        if self.agent.loop_error_threshold == 0 {
            eyre::bail!("agent.loop_error_threshold must be > 0");
        }
        if self.agent.loop_pattern_length < 2 {
            eyre::bail!("agent.loop_pattern_length must be >= 2");
        }
        if self.agent.loop_escalation_factor < 1.0 {
            eyre::bail!("agent.loop_escalation_factor must be >= 1.0");
        }
        if self.agent.context_token_threshold == 0 {
            eyre::bail!("agent.context_token_threshold must be > 0");
        }
        if self.agent.large_message_ratio <= 0.0 || self.agent.large_message_ratio > 1.0 {
            eyre::bail!("agent.large_message_ratio must be in (0, 1]");
        }
        if self.agent.compression_max_entries == 0 {
            eyre::bail!("agent.compression_max_entries must be > 0");
        }
        if self.llm.timeout_ms == 0 {
            eyre::bail!("llm.timeout_ms must be > 0");
        }
        Ok(())
    }
}

/// Agent loop settings: iteration bounds, loop detection, context budget
/// and dictionary compression.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Hard cap on iterations per run.
    pub max_iterations: u64,

    /// Whether the planning phase runs at all.
    pub planning_enabled: bool,

    /// Whether the loop detector runs after each action.
    pub loop_detection_enabled: bool,

    /// Number of trailing actions examined by the repetition detectors.
    pub loop_action_window_size: usize,

    /// Occurrences of the same action that raise ActionRepetition.
    pub loop_repetition_threshold: usize,

    /// Consecutive error actions that raise ErrorCycle.
    pub loop_error_threshold: usize,

    /// Minimum subsequence length considered by PatternCycle.
    pub loop_pattern_length: usize,

    /// Warning escalates to Critical once repetitions reach
    /// threshold * factor.
    pub loop_escalation_factor: f64,

    /// PatternCycle escalates to Critical at this many back-to-back repeats.
    pub loop_pattern_critical_repeats: usize,

    /// Iterations to wait between surfaced interventions.
    pub min_intervention_gap: u64,

    /// Whether dictionary compression of large tool outputs is applied.
    pub compression_enabled: bool,

    /// Minimum estimated token count before compression is attempted.
    pub compression_min_tokens: usize,

    /// Minimum character count before compression is attempted.
    pub compression_min_chars: usize,

    /// Maximum number of dictionary entries per compressed message.
    pub compression_max_entries: usize,

    /// Serialized history size (estimated tokens) that triggers optimization.
    pub context_token_threshold: usize,

    /// A message is "large" when it exceeds this fraction of the threshold.
    pub large_message_ratio: f64,

    /// Most recent messages never compressed or summarized away.
    pub context_pinned_recent: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            planning_enabled: true,
            loop_detection_enabled: true,
            loop_action_window_size: 20,
            loop_repetition_threshold: 8,
            loop_error_threshold: 8,
            loop_pattern_length: 10,
            loop_escalation_factor: 1.5,
            loop_pattern_critical_repeats: 3,
            min_intervention_gap: 5,
            compression_enabled: true,
            compression_min_tokens: 1000,
            compression_min_chars: 5000,
            compression_max_entries: 100,
            context_token_threshold: 29_000,
            large_message_ratio: 0.90,
            context_pinned_recent: 4,
        }
    }
}

/// LLM provider settings for OpenAI-compatible endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the endpoint, e.g. "https://api.openai.com".
    pub base_url: String,

    /// Model name passed through to the endpoint.
    pub model: String,

    /// Environment variable holding the API key (empty string disables
    /// auth, for keyless local endpoints).
    pub api_key_env: String,

    /// Timeout per LLM call in milliseconds.
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: String::new(),
            timeout_ms: 300_000,
        }
    }
}

/// Tool execution settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Default timeout for run_command in milliseconds.
    pub command_timeout_ms: u64,

    /// Tool output longer than this is truncated before entering history.
    pub max_result_chars: usize,

    /// Whether file tools are confined to the working directory.
    pub sandbox: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: 120_000,
            max_result_chars: 30_000,
            sandbox: true,
        }
    }
}
