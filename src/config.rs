//! Configuration of operation defaults.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (CALLFLOW_MAX_CALL_DURATION_SECS,
//!    CALLFLOW_DTMF_TIMEOUT_SECS, CALLFLOW_OPERATION_DEADLINE_SECS)
//! 2. Config file (.callflow/config.yaml)
//! 3. Built-in defaults
//!
//! Config file discovery:
//! - Searches current directory and parents for .callflow/config.yaml
//! - Falls back to ~/.callflow/config.yaml

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const ENV_MAX_CALL_DURATION: &str = "CALLFLOW_MAX_CALL_DURATION_SECS";
pub const ENV_DTMF_TIMEOUT: &str = "CALLFLOW_DTMF_TIMEOUT_SECS";
pub const ENV_OPERATION_DEADLINE: &str = "CALLFLOW_OPERATION_DEADLINE_SECS";

const CONFIG_DIR: &str = ".callflow";
const CONFIG_FILE: &str = "config.yaml";

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefaultsConfig {
    pub max_call_duration_secs: Option<u64>,
    pub dtmf_timeout_secs: Option<u64>,
    pub operation_deadline_secs: Option<u64>,
}

/// Defaults applied when an operation config leaves a value unset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowDefaults {
    /// Auto-hangup delay after a call becomes active
    pub max_call_duration_secs: u64,
    /// How long DTMF capture waits for a digit
    pub dtmf_timeout_secs: u64,
    /// Deadline for every operation; `None` waits indefinitely
    pub operation_deadline_secs: Option<u64>,
}

impl Default for FlowDefaults {
    fn default() -> Self {
        Self {
            max_call_duration_secs: 1020,
            dtmf_timeout_secs: 10,
            operation_deadline_secs: None,
        }
    }
}

impl FlowDefaults {
    pub fn operation_deadline(&self) -> Option<Duration> {
        self.operation_deadline_secs.map(Duration::from_secs)
    }

    /// All durations must be positive
    pub fn validate(&self) -> Result<()> {
        if self.max_call_duration_secs == 0 {
            anyhow::bail!("max_call_duration_secs must be greater than 0");
        }
        if self.dtmf_timeout_secs == 0 {
            anyhow::bail!("dtmf_timeout_secs must be greater than 0");
        }
        if self.operation_deadline_secs == Some(0) {
            anyhow::bail!("operation_deadline_secs must be greater than 0");
        }
        Ok(())
    }
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub defaults: FlowDefaults,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

/// Search `start` and its parents for .callflow/config.yaml
pub fn find_config_file_from(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

fn find_config_file() -> Option<PathBuf> {
    if let Some(found) = std::env::current_dir()
        .ok()
        .and_then(|cwd| find_config_file_from(&cwd))
    {
        return Some(found);
    }

    let home_config = dirs::home_dir()?.join(CONFIG_DIR).join(CONFIG_FILE);
    home_config.exists().then_some(home_config)
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn env_secs(env: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<u64>> {
    match env(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} must be a whole number of seconds, got '{}'", name, raw)),
        None => Ok(None),
    }
}

/// Merge file values and environment over the built-in defaults
pub fn resolve<F>(file: Option<&ConfigFile>, env: F) -> Result<FlowDefaults>
where
    F: Fn(&str) -> Option<String>,
{
    let builtin = FlowDefaults::default();
    let from_file = file.map(|f| f.defaults.clone()).unwrap_or_default();

    let defaults = FlowDefaults {
        max_call_duration_secs: env_secs(&env, ENV_MAX_CALL_DURATION)?
            .or(from_file.max_call_duration_secs)
            .unwrap_or(builtin.max_call_duration_secs),
        dtmf_timeout_secs: env_secs(&env, ENV_DTMF_TIMEOUT)?
            .or(from_file.dtmf_timeout_secs)
            .unwrap_or(builtin.dtmf_timeout_secs),
        operation_deadline_secs: env_secs(&env, ENV_OPERATION_DEADLINE)?
            .or(from_file.operation_deadline_secs)
            .or(builtin.operation_deadline_secs),
    };

    defaults.validate()?;
    Ok(defaults)
}

/// Load configuration from an explicit file (or none) plus the process environment
pub fn load_config_at(config_file: Option<PathBuf>) -> Result<ResolvedConfig> {
    let file = config_file.as_deref().map(load_config_file).transpose()?;
    let defaults = resolve(file.as_ref(), |name| std::env::var(name).ok())?;

    Ok(ResolvedConfig {
        defaults,
        config_file,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    load_config_at(find_config_file())
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}
