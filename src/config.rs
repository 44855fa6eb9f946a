//! Configuration types and layered loading
//!
//! Load order: built-in defaults, then `.cortexos.yml` in the project, then
//! the user config, then environment variables, then CLI overrides applied
//! by the caller. Later layers win.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::provider::{ProviderChainConfig, KNOWN_VENDORS};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub providers: ProvidersConfig,
    pub agents: AgentsConfig,
    pub cost: CostConfig,
    pub quality: QualityConfig,
    pub memory: MemoryConfig,
    pub reasoning: ReasoningConfig,
    pub ipc: IpcSettings,
    pub worktree: WorktreeSettings,
    pub storage: StorageConfig,
}

impl Config {
    /// Load with the fallback chain, then apply environment variables
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_files(config_path)?;
        config.apply_env();
        Ok(config)
    }

    fn load_files(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .wrap_err_with(|| format!("failed to load config from {}", path.display()));
        }

        let local = PathBuf::from(".cortexos.yml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => return Ok(config),
                Err(e) => tracing::warn!("failed to load {}: {}", local.display(), e),
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user = config_dir.join("cortexos").join("cortexos.yml");
            if user.exists() {
                match Self::load_from_file(&user) {
                    Ok(config) => return Ok(config),
                    Err(e) => tracing::warn!("failed to load {}: {}", user.display(), e),
                }
            }
        }

        tracing::info!("no config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("failed to parse config file")?;
        tracing::info!("loaded config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Apply recognized environment variables over the loaded values
    pub fn apply_env(&mut self) {
        if let Ok(provider) = std::env::var("CORTEXOS_DEFAULT_PROVIDER")
            && !provider.is_empty()
        {
            self.providers.default = provider;
        }
    }

    /// Validate the loaded configuration; fatal at load time
    pub fn validate(&self) -> Result<()> {
        if !KNOWN_VENDORS.contains(&self.providers.default.as_str()) {
            eyre::bail!("unknown default provider: {}", self.providers.default);
        }
        for fallback in &self.providers.fallbacks {
            if !KNOWN_VENDORS.contains(&fallback.as_str()) {
                eyre::bail!("unknown fallback provider: {}", fallback);
            }
        }
        if self.cost.budget_per_run <= 0.0 {
            eyre::bail!("cost.budget-per-run must be positive");
        }
        if self.agents.max_parallel == 0 {
            eyre::bail!("agents.max-parallel must be at least 1");
        }
        Ok(())
    }

    /// Provider chain settings derived from this configuration
    pub fn provider_chain(&self) -> ProviderChainConfig {
        let mut vendors = vec![self.providers.default.clone()];
        for fallback in &self.providers.fallbacks {
            if !vendors.contains(fallback) {
                vendors.push(fallback.clone());
            }
        }
        ProviderChainConfig {
            vendors,
            model: self.providers.model.clone(),
            timeout: Duration::from_millis(self.providers.timeout_ms),
            failure_threshold: self.providers.failure_threshold,
            cooldown: Duration::from_secs(self.providers.cooldown_secs),
            requests_per_sec: self.providers.requests_per_sec,
            burst: self.providers.burst,
        }
    }

    /// Directory for run artifacts (events, context snapshots)
    pub fn runs_dir(&self) -> PathBuf {
        self.storage
            .runs_dir
            .clone()
            .unwrap_or_else(|| default_data_dir().join("runs"))
    }

    /// Path of the memory snapshot file
    pub fn memory_path(&self) -> PathBuf {
        self.storage
            .memory_file
            .clone()
            .unwrap_or_else(|| default_data_dir().join("memory.jsonl"))
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".cortexos")
}

/// Provider selection and gateway tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Default vendor name
    pub default: String,

    /// Ordered failover vendors tried after the default
    pub fallbacks: Vec<String>,

    /// Model override; vendor default when unset
    pub model: Option<String>,

    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Consecutive failures before the circuit opens
    #[serde(rename = "failure-threshold")]
    pub failure_threshold: u32,

    #[serde(rename = "cooldown-secs")]
    pub cooldown_secs: u64,

    #[serde(rename = "requests-per-sec")]
    pub requests_per_sec: f64,

    pub burst: u32,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            default: "anthropic".to_string(),
            fallbacks: Vec::new(),
            model: None,
            timeout_ms: 300_000,
            failure_threshold: 5,
            cooldown_secs: 30,
            requests_per_sec: 5.0,
            burst: 10,
        }
    }
}

/// Agent loop limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    #[serde(rename = "max-parallel")]
    pub max_parallel: usize,

    #[serde(rename = "max-iterations")]
    pub max_iterations: u32,

    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Overall per-agent timeout
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            max_iterations: 25,
            max_tokens: 4096,
            timeout_secs: 300,
        }
    }
}

/// Spend limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    /// USD cap per run
    #[serde(rename = "budget-per-run")]
    pub budget_per_run: f64,

    /// USD cap per day
    #[serde(rename = "budget-per-day")]
    pub budget_per_day: f64,

    /// Per-task API call cap
    #[serde(rename = "max-api-calls")]
    pub max_api_calls: u64,

    /// Per-task token cap
    #[serde(rename = "max-tokens")]
    pub max_tokens: u64,

    /// Per-task recursion depth cap
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Allow budgets to be rescaled at runtime
    #[serde(rename = "auto-scale")]
    pub auto_scale: bool,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            budget_per_run: 1.0,
            budget_per_day: 10.0,
            max_api_calls: 50,
            max_tokens: 200_000,
            max_depth: 5,
            auto_scale: false,
        }
    }
}

/// Quality gate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Ordered gate names from {syntax, lint, type-check, test}
    pub gates: Vec<String>,

    #[serde(rename = "auto-fix")]
    pub auto_fix: bool,

    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Shell command per gate name
    pub commands: HashMap<String, String>,

    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            gates: vec!["syntax".to_string(), "lint".to_string(), "test".to_string()],
            auto_fix: false,
            max_retries: 2,
            commands: HashMap::new(),
            timeout_secs: 600,
        }
    }
}

/// Memory settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub enabled: bool,

    #[serde(rename = "decay-half-life-days")]
    pub decay_half_life_days: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            decay_half_life_days: 30.0,
        }
    }
}

/// Reasoning-trace settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    pub enabled: bool,
}

/// IPC tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcSettings {
    #[serde(rename = "max-in-flight")]
    pub max_in_flight: usize,

    #[serde(rename = "message-timeout-ms")]
    pub message_timeout_ms: u64,
}

impl Default for IpcSettings {
    fn default() -> Self {
        Self {
            max_in_flight: 100,
            message_timeout_ms: 10_000,
        }
    }
}

/// Worktree isolation settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorktreeSettings {
    pub enabled: bool,
}

/// Artifact locations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for run artifacts; `~/.cortexos/runs` when unset
    #[serde(rename = "runs-dir")]
    pub runs_dir: Option<PathBuf>,

    /// Memory snapshot file; `~/.cortexos/memory.jsonl` when unset
    #[serde(rename = "memory-file")]
    pub memory_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.providers.default, "anthropic");
        assert_eq!(config.agents.max_parallel, 4);
        assert_eq!(config.agents.max_iterations, 25);
        assert!((config.cost.budget_per_run - 1.0).abs() < f64::EPSILON);
        assert!((config.cost.budget_per_day - 10.0).abs() < f64::EPSILON);
        assert_eq!(config.ipc.max_in_flight, 100);
        assert_eq!(config.ipc.message_timeout_ms, 10_000);
        assert!(!config.worktree.enabled);
        assert!(config.memory.enabled);
    }

    #[test]
    fn test_validate_rejects_unknown_provider() {
        let mut config = Config::default();
        config.providers.default = "acme".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let mut config = Config::default();
        config.cost.budget_per_run = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_yaml_kebab_keys() {
        let yaml = r#"
providers:
  default: openai
  fallbacks: [groq, ollama]
  timeout-ms: 60000
agents:
  max-parallel: 2
  max-iterations: 10
cost:
  budget-per-run: 0.5
quality:
  gates: [test]
  max-retries: 1
  commands:
    test: "cargo test"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.providers.default, "openai");
        assert_eq!(config.providers.fallbacks, vec!["groq", "ollama"]);
        assert_eq!(config.providers.timeout_ms, 60_000);
        assert_eq!(config.agents.max_parallel, 2);
        assert!((config.cost.budget_per_run - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.quality.gates, vec!["test"]);
        assert_eq!(config.quality.commands.get("test").unwrap(), "cargo test");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_provider_chain_dedupes_vendors() {
        let mut config = Config::default();
        config.providers.default = "openai".to_string();
        config.providers.fallbacks = vec!["groq".to_string(), "openai".to_string()];
        let chain = config.provider_chain();
        assert_eq!(chain.vendors, vec!["openai", "groq"]);
    }

    #[test]
    #[serial]
    fn test_env_overrides_default_provider() {
        // SAFETY: serialized test, no concurrent env access
        unsafe {
            std::env::set_var("CORTEXOS_DEFAULT_PROVIDER", "groq");
        }

        let mut config = Config::default();
        config.apply_env();

        unsafe {
            std::env::remove_var("CORTEXOS_DEFAULT_PROVIDER");
        }

        assert_eq!(config.providers.default, "groq");
    }

    #[test]
    #[serial]
    fn test_env_absent_keeps_config_value() {
        // SAFETY: serialized test, no concurrent env access
        unsafe {
            std::env::remove_var("CORTEXOS_DEFAULT_PROVIDER");
        }
        let mut config = Config::default();
        config.apply_env();
        assert_eq!(config.providers.default, "anthropic");
    }
}
