//! Configuration loading, validation and root folder resolution
//!
//! Every tunable the evaluation engines consume (fusion thresholds, scoring
//! weights, retry policy, retrieval depth, worker pool size) lives here so it
//! can be overridden from `symloc.toml` or the command line instead of being
//! fixed inside an engine.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the results root folder
pub const ROOT_FOLDER_ENV: &str = "SYMLOC_ROOT_FOLDER";

/// Tolerance used when checking that weights sum to 1.0
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

// ========================================
// TOML schema
// ========================================

/// Top-level `symloc.toml` contents
///
/// Every section falls back to compiled defaults, so a partial file (or no
/// file at all) is valid.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Results root folder
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_folder: Option<PathBuf>,

    /// Folder holding `diagnostic_<id>.json` reports
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_path: Option<PathBuf>,

    pub logging: LoggingConfig,
    pub fusion: FusionConfig,
    pub scoring: ScoringWeights,
    pub retry: RetryConfig,
    pub retrieval: RetrievalConfig,
    pub batch: BatchConfig,

    /// Prediction providers; empty means the compiled provider list
    pub providers: Vec<ProviderConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Knowledge fusion gate thresholds and per-snippet signal weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Quality strictly above this (and consistent) → trust
    pub trust_threshold: f64,

    /// Quality strictly above this → at least cautious
    pub cautious_threshold: f64,

    /// Diagnosis text must be longer than this many characters to count
    pub min_diagnosis_chars: usize,

    pub organ_weight: f64,
    pub locations_weight: f64,
    pub diagnosis_weight: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            trust_threshold: 0.6,
            cautious_threshold: 0.3,
            min_diagnosis_chars: 20,
            organ_weight: 0.4,
            locations_weight: 0.4,
            diagnosis_weight: 0.2,
        }
    }
}

/// Weights of the overall symptom score
///
/// `overall = f1_weight·f1 + organ_weight·class_credit - overgeneration_weight·penalty`,
/// clamped to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub f1_weight: f64,
    pub organ_weight: f64,
    pub overgeneration_weight: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            f1_weight: 0.6,
            organ_weight: 0.4,
            overgeneration_weight: 0.2,
        }
    }
}

/// Retry policy for transient provider errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first call
    pub max_attempts: u32,

    /// First backoff delay; doubles on each retry
    pub backoff_base_ms: u64,

    /// Backoff cap
    pub backoff_max_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 8000,
        }
    }
}

/// Retrieval settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

/// Worker pool settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum units waiting on external calls at once
    pub max_workers: usize,

    /// EventBus channel capacity
    pub event_capacity: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            event_capacity: 1000,
        }
    }
}

/// Wire protocol a provider endpoint speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// `POST {base_url}/chat/completions` with bearer auth
    #[default]
    OpenaiCompatible,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenaiCompatible => "openai_compatible",
        }
    }
}

/// One chat completion provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name used in reports (e.g. "deepseek")
    pub name: String,

    #[serde(default)]
    pub kind: ProviderKind,

    /// API base URL, without the `/chat/completions` suffix
    pub base_url: String,

    pub model: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f64 {
    0.1
}

impl ProviderConfig {
    pub fn new(name: &str, base_url: &str, model: &str, api_key_env: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ProviderKind::default(),
            base_url: base_url.to_string(),
            model: model.to_string(),
            api_key_env: api_key_env.to_string(),
            requests_per_minute: default_requests_per_minute(),
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }

    /// Providers used when the config file lists none
    pub fn compiled_defaults() -> Vec<ProviderConfig> {
        vec![
            ProviderConfig::new("deepseek", "https://api.deepseek.com/v1", "deepseek-chat", "DEEPSEEK_API_KEY"),
            ProviderConfig::new("moonshot", "https://api.moonshot.cn/v1", "moonshot-v1-8k", "MOONSHOT_API_KEY"),
            ProviderConfig::new("openai", "https://api.openai.com/v1", "gpt-4o-mini", "OPENAI_API_KEY"),
        ]
    }
}

// ========================================
// Validation
// ========================================

impl TomlConfig {
    /// Check ranges and weight invariants
    pub fn validate(&self) -> Result<()> {
        let fusion = &self.fusion;
        for (name, value) in [
            ("fusion.trust_threshold", fusion.trust_threshold),
            ("fusion.cautious_threshold", fusion.cautious_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!("{} must be within [0, 1], got {}", name, value)));
            }
        }
        if fusion.cautious_threshold >= fusion.trust_threshold {
            return Err(Error::Config(format!(
                "fusion.cautious_threshold ({}) must be below fusion.trust_threshold ({})",
                fusion.cautious_threshold, fusion.trust_threshold
            )));
        }

        let signal_weights = [fusion.organ_weight, fusion.locations_weight, fusion.diagnosis_weight];
        if signal_weights.iter().any(|w| *w < 0.0) {
            return Err(Error::Config("fusion signal weights must be non-negative".to_string()));
        }
        let sum: f64 = signal_weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(Error::Config(format!("fusion signal weights must sum to 1.0, got {}", sum)));
        }

        let scoring = &self.scoring;
        if scoring.f1_weight < 0.0 || scoring.organ_weight < 0.0 || scoring.overgeneration_weight < 0.0 {
            return Err(Error::Config("scoring weights must be non-negative".to_string()));
        }

        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".to_string()));
        }
        if self.retry.backoff_max_ms < self.retry.backoff_base_ms {
            return Err(Error::Config("retry.backoff_max_ms must be >= retry.backoff_base_ms".to_string()));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::Config("retrieval.top_k must be at least 1".to_string()));
        }
        if self.batch.max_workers == 0 {
            return Err(Error::Config("batch.max_workers must be at least 1".to_string()));
        }
        if self.batch.event_capacity == 0 {
            return Err(Error::Config("batch.event_capacity must be at least 1".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                return Err(Error::Config("provider name must not be empty".to_string()));
            }
            if !seen.insert(provider.name.as_str()) {
                return Err(Error::Config(format!("duplicate provider name: {}", provider.name)));
            }
            if provider.requests_per_minute == 0 {
                return Err(Error::Config(format!(
                    "provider {}: requests_per_minute must be at least 1",
                    provider.name
                )));
            }
        }

        Ok(())
    }

    /// Configured providers, or the compiled list when none are configured
    pub fn effective_providers(&self) -> Vec<ProviderConfig> {
        if self.providers.is_empty() {
            ProviderConfig::compiled_defaults()
        } else {
            self.providers.clone()
        }
    }
}

// ========================================
// Loading and writing
// ========================================

/// Load and validate a TOML config file
///
/// A missing file is not an error: a warning is logged and compiled defaults
/// are returned. A file that exists but fails to parse or validate is.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "Config file not found, using compiled defaults");
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)?;
    config.validate()?;

    tracing::info!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// Write a config file atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Platform config file location (`<config_dir>/symloc/symloc.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("symloc").join("symloc.toml"))
}

// ========================================
// Root folder resolution
// ========================================

/// OS-dependent compiled defaults
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let root_folder = if cfg!(target_os = "macos") {
            dirs::data_dir()
                .map(|d| d.join("symloc"))
                .unwrap_or_else(|| PathBuf::from("/Library/Application Support/symloc"))
        } else {
            dirs::data_local_dir()
                .map(|d| d.join("symloc"))
                .unwrap_or_else(|| PathBuf::from("./symloc_data"))
        };

        Self { root_folder }
    }
}

/// Results root folder resolution, priority order:
/// 1. Command-line argument (highest priority)
/// 2. `SYMLOC_ROOT_FOLDER` environment variable
/// 3. TOML config `root_folder`
/// 4. OS-dependent compiled default (fallback)
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cli_arg(mut self, cli_arg: Option<PathBuf>) -> Self {
        self.cli_arg = cli_arg;
        self
    }

    pub fn with_toml_config(mut self, config: &TomlConfig) -> Self {
        self.toml_root = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_root {
            return path.clone();
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}
