//! Configuration management
//!
//! This module handles loading, validation, and management of the Waypoint
//! configuration. Configuration is stored in TOML format at
//! ~/.waypoint/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Workspace path, log level, prompt language
//! - **llm**: Model-inference provider settings
//! - **agent**: Orchestration limits (step cap, repeat hint, session error cap)
//! - **loop_detection**: Duplicate-call window, history horizon, threshold
//! - **tools**: Handler deadlines, interpreter, enabled tool list
//! - **browser**: Automation backend mode and endpoint
//!
//! # Path Expansion
//!
//! The workspace path supports `~` expansion and is created and
//! canonicalized during validation.
//!
//! # Examples
//!
//! ```no_run
//! use waypoint_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Workspace: {:?}", config.core.workspace);
//! println!("Step cap: {}", config.agent.max_total_steps);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    pub core: CoreConfig,

    /// Model-inference provider configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Orchestration loop limits
    #[serde(default)]
    pub agent: AgentConfig,

    /// Loop detector tuning
    #[serde(default)]
    pub loop_detection: LoopDetectionConfig,

    /// Tool settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Browser automation backend
    #[serde(default)]
    pub browser: BrowserConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Workspace directory for file tools (supports ~ expansion)
    pub workspace: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Language passed to the model collaborator
    #[serde(default = "default_language")]
    pub language: String,
}

/// Model-inference provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Provider name (currently only "ollama")
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Base URL of the provider API
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_ollama_model")]
    pub model: String,

    /// Deadline for one next-step request
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

/// Orchestration loop limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard cap on steps per run
    #[serde(default = "default_max_total_steps")]
    pub max_total_steps: usize,

    /// Same-action run length that triggers the soft repetition hint
    #[serde(default = "default_soft_repeat_threshold")]
    pub soft_repeat_threshold: usize,

    /// Consecutive SessionNotActive results before the run stops
    #[serde(default = "default_max_consecutive_session_errors")]
    pub max_consecutive_session_errors: usize,

    /// Maximum serialized payload size fed forward
    #[serde(default = "default_max_result_bytes")]
    pub max_result_bytes: usize,
}

/// Loop detector tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopDetectionConfig {
    /// Short horizon within which identical calls are counted
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Records older than this are discarded
    #[serde(default = "default_max_history_age_ms")]
    pub max_history_age_ms: u64,

    /// Identical calls (including the current one) that trigger a block
    #[serde(default = "default_max_identical_calls")]
    pub max_identical_calls: usize,
}

/// Tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Deadline for any single handler invocation
    #[serde(default = "default_handler_timeout_secs")]
    pub handler_timeout_secs: u64,

    /// Deadline for the Python interpreter process
    #[serde(default = "default_python_timeout_secs")]
    pub python_timeout_secs: u64,

    /// Python interpreter binary
    #[serde(default = "default_python_bin")]
    pub python_bin: String,

    /// Enabled tool names (empty enables every tool)
    #[serde(default)]
    pub enabled: Vec<String>,
}

/// Browser automation backend mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BrowserMode {
    /// No remote backend; synthetic payloads
    Offline,

    /// HTTP automation backend
    Remote,
}

/// Browser automation backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_browser_mode")]
    pub mode: BrowserMode,

    /// Base URL of the remote backend
    #[serde(default = "default_browser_base_url")]
    pub base_url: String,

    /// Environment variable holding the backend API key
    #[serde(default = "default_browser_api_key_env")]
    pub api_key_env: String,

    /// Deadline for one remote primitive
    #[serde(default = "default_browser_timeout_secs")]
    pub timeout_secs: u64,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    300
}

fn default_max_total_steps() -> usize {
    25
}

fn default_soft_repeat_threshold() -> usize {
    3
}

fn default_max_consecutive_session_errors() -> usize {
    2
}

fn default_max_result_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_window_ms() -> u64 {
    5_000
}

fn default_max_history_age_ms() -> u64 {
    60_000
}

fn default_max_identical_calls() -> usize {
    3
}

fn default_handler_timeout_secs() -> u64 {
    30
}

fn default_python_timeout_secs() -> u64 {
    10
}

fn default_python_bin() -> String {
    "python3".to_string()
}

fn default_browser_mode() -> BrowserMode {
    BrowserMode::Offline
}

fn default_browser_base_url() -> String {
    "http://localhost:9222".to_string()
}

fn default_browser_api_key_env() -> String {
    "WAYPOINT_BROWSER_API_KEY".to_string()
}

fn default_browser_timeout_secs() -> u64 {
    60
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_total_steps: default_max_total_steps(),
            soft_repeat_threshold: default_soft_repeat_threshold(),
            max_consecutive_session_errors: default_max_consecutive_session_errors(),
            max_result_bytes: default_max_result_bytes(),
        }
    }
}

impl Default for LoopDetectionConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max_history_age_ms: default_max_history_age_ms(),
            max_identical_calls: default_max_identical_calls(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            handler_timeout_secs: default_handler_timeout_secs(),
            python_timeout_secs: default_python_timeout_secs(),
            python_bin: default_python_bin(),
            enabled: Vec::new(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            mode: default_browser_mode(),
            base_url: default_browser_base_url(),
            api_key_env: default_browser_api_key_env(),
            timeout_secs: default_browser_timeout_secs(),
        }
    }
}

impl ToolsConfig {
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }

    pub fn python_timeout(&self) -> Duration {
        Duration::from_secs(self.python_timeout_secs)
    }
}

impl Config {
    /// Load configuration from the default location (~/.waypoint/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, TOML parsing fails, or
    /// validation fails.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default_config();
        config.validate_and_process()?;

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.waypoint/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".waypoint").join("config.toml"))
    }

    /// Create a default configuration (workspace under ~/.waypoint)
    pub fn default_config() -> Self {
        Self::with_workspace(PathBuf::from("~/.waypoint/workspace"))
    }

    /// Create a default configuration rooted at the given workspace
    pub fn with_workspace(workspace: PathBuf) -> Self {
        Self {
            core: CoreConfig {
                workspace,
                log_level: default_log_level(),
                language: default_language(),
            },
            llm: LLMConfig::default(),
            agent: AgentConfig::default(),
            loop_detection: LoopDetectionConfig::default(),
            tools: ToolsConfig::default(),
            browser: BrowserConfig::default(),
        }
    }

    /// Validate and process configuration
    ///
    /// Validates enumerated fields and numeric relations, expands `~` in the
    /// workspace path, creates it if missing, and canonicalizes it.
    pub fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_providers = ["ollama"];
        if !valid_providers.contains(&self.llm.provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid provider '{}'. Must be one of: {}",
                self.llm.provider,
                valid_providers.join(", ")
            )));
        }

        if self.agent.max_total_steps == 0 {
            return Err(EngineError::Config(
                "agent.max_total_steps must be at least 1".to_string(),
            ));
        }

        if self.loop_detection.max_identical_calls < 2 {
            return Err(EngineError::Config(
                "loop_detection.max_identical_calls must be at least 2".to_string(),
            ));
        }

        if self.loop_detection.window_ms > self.loop_detection.max_history_age_ms {
            return Err(EngineError::Config(
                "loop_detection.window_ms must not exceed max_history_age_ms".to_string(),
            ));
        }

        if self.tools.handler_timeout_secs == 0 {
            return Err(EngineError::Config(
                "tools.handler_timeout_secs must be at least 1".to_string(),
            ));
        }

        self.core.workspace = expand_path(&self.core.workspace)?;
        self.core.workspace = canonicalize_or_create(&self.core.workspace)?;

        if !self.core.workspace.is_dir() {
            return Err(EngineError::Config(format!(
                "Workspace path is not a directory: {:?}",
                self.core.workspace
            )));
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

/// Canonicalize path, creating it if it doesn't exist
fn canonicalize_or_create(path: &Path) -> Result<PathBuf, EngineError> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| {
            EngineError::Config(format!("Failed to create directory {:?}: {}", path, e))
        })?;
    }

    path.canonicalize().map_err(|e| {
        EngineError::Config(format!("Failed to canonicalize {:?}: {}", path, e))
    })
}
