use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ZenflowError};

/// Top-level zenflow configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub model: Option<ModelConfig>,
    #[serde(default)]
    pub agents: Vec<AgentProfile>,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub schedules: Vec<ScheduleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on a single agent call, in seconds.
    #[serde(default = "default_agent_timeout")]
    pub agent_timeout_secs: u64,
    /// Delay applied by `delay` nodes that do not set `seconds`.
    #[serde(default = "default_delay_secs")]
    pub default_delay_secs: f64,
    /// Maximum node executions per run (guards against cyclic graphs).
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_workspace")]
    pub workspace: String,
    /// Runtime JSONL logging configuration.
    #[serde(default)]
    pub log: Option<LogConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            agent_timeout_secs: default_agent_timeout(),
            default_delay_secs: default_delay_secs(),
            max_steps: default_max_steps(),
            workspace: default_workspace(),
            log: None,
        }
    }
}

fn default_agent_timeout() -> u64 { 60 }
fn default_delay_secs() -> f64 { 1.0 }
fn default_max_steps() -> usize { 1_000 }
fn default_workspace() -> String { "~/.zenflow".to_string() }

/// JSONL runtime logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Enable runtime logging (default: true when section is present).
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// Directory for log files. Default: <workspace>/logs
    #[serde(default)]
    pub log_dir: Option<String>,
    /// Logging level: 1 = run summary only, 2 = per-node (default: 2).
    #[serde(default = "default_log_level")]
    pub level: u8,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_dir: None,
            level: 2,
        }
    }
}

fn default_log_enabled() -> bool { true }
fn default_log_level() -> u8 { 2 }

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path. Default: <workspace>/zenflow.db
    #[serde(default)]
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 1000 }
fn default_temperature() -> f32 { 0.7 }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: "gpt-4-turbo".to_string(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            retry: None,
        }
    }
}

/// Retry configuration for agent requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// An agent addressable from `agent` nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    pub name: String,
    /// Agent kind (e.g. "manager", "whatsapp", "social_media", "traffic").
    #[serde(default = "default_agent_kind")]
    pub kind: String,
    #[serde(default)]
    pub system_prompt: String,
    /// Per-agent model override; falls back to the top-level `[model]`.
    #[serde(default)]
    pub model: Option<ModelConfig>,
}

fn default_agent_kind() -> String { "assistant".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String { "127.0.0.1:8000".to_string() }

/// A flow fired on a cron schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub name: String,
    pub flow_id: String,
    /// Cron expression (seconds field first, as accepted by the `cron` crate).
    pub cron: String,
    /// Trigger payload passed to each run.
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| ZenflowError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded)
            .map_err(|e| ZenflowError::Config(e.to_string()))
    }

    /// Resolve the workspace directory (expand ~).
    pub fn workspace_dir(&self) -> PathBuf {
        expand_home(&self.engine.workspace)
    }

    /// Resolve the SQLite database path.
    pub fn db_path(&self) -> PathBuf {
        match &self.storage.db_path {
            Some(p) => expand_home(p),
            None => self.workspace_dir().join("zenflow.db"),
        }
    }

    /// Resolve the JSONL log directory, if runtime logging is enabled.
    pub fn log_dir(&self) -> Option<PathBuf> {
        let log = self.engine.log.as_ref().filter(|l| l.enabled)?;
        Some(match &log.log_dir {
            Some(dir) => expand_home(dir),
            None => self.workspace_dir().join("logs"),
        })
    }

    /// Model settings for an agent: its own override, else the global model.
    pub fn model_for(&self, agent: &AgentProfile) -> ModelConfig {
        agent
            .model
            .clone()
            .or_else(|| self.model.clone())
            .unwrap_or_default()
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_ZENFLOW_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_ZENFLOW_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_ZENFLOW_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_ZENFLOW_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_ZENFLOW_VAR}\"");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.engine.agent_timeout_secs, 60);
        assert_eq!(config.engine.default_delay_secs, 1.0);
        assert_eq!(config.engine.max_steps, 1_000);
        assert_eq!(config.gateway.bind, "127.0.0.1:8000");
        assert!(config.model.is_none());
        assert!(config.agents.is_empty());
        assert!(config.schedules.is_empty());
        assert!(config.log_dir().is_none());
    }

    #[test]
    fn test_agent_model_override() {
        let toml_str = r#"
[model]
model_id = "gpt-4o-mini"
api_key = "sk-test"

[[agents]]
id = "manager"
name = "Manager"
kind = "manager"
system_prompt = "You approve posts."

[[agents]]
id = "social"
name = "Social"

[agents.model]
model_id = "llama3"
base_url = "http://localhost:11434/v1/chat/completions"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.agents.len(), 2);
        assert_eq!(config.model_for(&config.agents[0]).model_id, "gpt-4o-mini");
        assert_eq!(config.model_for(&config.agents[1]).model_id, "llama3");
        assert_eq!(config.agents[1].kind, "assistant");
    }

    #[test]
    fn test_paths() {
        let toml_str = r#"
[engine]
workspace = "/srv/zenflow"

[engine.log]
level = 1
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.db_path(), PathBuf::from("/srv/zenflow/zenflow.db"));
        assert_eq!(config.log_dir(), Some(PathBuf::from("/srv/zenflow/logs")));
        assert_eq!(config.engine.log.as_ref().unwrap().level, 1);
    }

    #[test]
    fn test_schedule_payload() {
        let toml_str = r#"
[[schedules]]
name = "morning-digest"
flow_id = "flow_1"
cron = "0 0 9 * * *"
payload = { text = "daily digest" }
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        let schedule = &config.schedules[0];
        assert_eq!(schedule.flow_id, "flow_1");
        assert_eq!(
            schedule.payload,
            Some(serde_json::json!({"text": "daily digest"}))
        );
    }
}
