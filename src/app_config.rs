use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::path::{Path, PathBuf};

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language code (ISO)
    pub source_language: String,

    /// Target language code (ISO)
    pub target_language: String,

    /// Translation service the batches are sent to
    #[serde(default)]
    pub service: ServiceKind,

    /// Cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Adaptive concurrency tuning
    #[serde(default)]
    pub adaptive: AdaptiveTuning,

    /// Deduplication and chunking settings
    #[serde(default)]
    pub batching: BatchingConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Supported translation services
///
/// Every service carries its own concurrency profile, see
/// `translation::concurrency::ServiceProfile::for_service`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    // @service: Ollama (local)
    #[default]
    Ollama,
    // @service: OpenAI
    OpenAI,
    // @service: Anthropic
    Anthropic,
    // @service: LM Studio (OpenAI-compatible local server)
    LMStudio,
    // @service: DeepL
    DeepL,
    // @service: Google Translate
    Google,
}

impl ServiceKind {
    /// All supported services
    pub const ALL: [ServiceKind; 6] = [
        Self::Ollama,
        Self::OpenAI,
        Self::Anthropic,
        Self::LMStudio,
        Self::DeepL,
        Self::Google,
    ];

    // @returns: Capitalized service name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Ollama => "Ollama",
            Self::OpenAI => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::LMStudio => "LM Studio",
            Self::DeepL => "DeepL",
            Self::Google => "Google",
        }
    }

    // @returns: Lowercase service identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::LMStudio => "lmstudio",
            Self::DeepL => "deepl",
            Self::Google => "google",
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ServiceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "lmstudio" => Ok(Self::LMStudio),
            "deepl" => Ok(Self::DeepL),
            "google" => Ok(Self::Google),
            _ => Err(anyhow!("Invalid service type: {}", s)),
        }
    }
}

/// Translation cache configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    /// Whether caching is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Time to live after the last touch, in milliseconds
    #[serde(default = "default_cache_ttl_ms")]
    pub ttl_ms: u64,

    /// Maximum number of cached entries
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,

    /// Byte budget for the serialized cache blob
    #[serde(default = "default_cache_max_storage_bytes")]
    pub max_storage_bytes: usize,

    /// Quiet period before pending writes are flushed, in milliseconds
    #[serde(default = "default_flush_debounce_ms")]
    pub flush_debounce_ms: u64,

    /// Period of the expired-entry sweep, in milliseconds
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// SQLite database path (defaults to the user data directory)
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_ms: default_cache_ttl_ms(),
            max_entries: default_cache_max_entries(),
            max_storage_bytes: default_cache_max_storage_bytes(),
            flush_debounce_ms: default_flush_debounce_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            database_path: None,
        }
    }
}

/// Tunables of the adaptive concurrency manager
///
/// None of these values are load bearing for correctness; they only shape how
/// quickly the manager reacts.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AdaptiveTuning {
    /// Minimum time between two cooldown-path adjustments, in milliseconds
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Number of recent samples a classification looks at
    #[serde(default = "default_evaluation_window")]
    pub evaluation_window: usize,

    /// Number of samples kept in the rolling history
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// Samples required in the window before any adjustment is considered
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Interval changes smaller than this are not applied, in milliseconds
    #[serde(default = "default_interval_dead_band_ms")]
    pub interval_dead_band_ms: u64,
}

impl Default for AdaptiveTuning {
    fn default() -> Self {
        Self {
            cooldown_ms: default_cooldown_ms(),
            evaluation_window: default_evaluation_window(),
            history_size: default_history_size(),
            min_samples: default_min_samples(),
            interval_dead_band_ms: default_interval_dead_band_ms(),
        }
    }
}

/// Weights of the dispatch priority score
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PriorityWeights {
    /// Score per key sharing the text
    #[serde(default = "default_usage_weight")]
    pub usage_weight: i64,

    /// Bonus for text shorter than 50 characters
    #[serde(default = "default_short_bonus")]
    pub short_bonus: i64,

    /// Bonus for text shorter than 200 characters
    #[serde(default = "default_medium_bonus")]
    pub medium_bonus: i64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            usage_weight: default_usage_weight(),
            short_bonus: default_short_bonus(),
            medium_bonus: default_medium_bonus(),
        }
    }
}

/// Limits used to split work into dispatch batches
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChunkLimits {
    /// Cumulative characters after which a large item opens a new batch
    #[serde(default = "default_max_batch_chars")]
    pub max_batch_chars: usize,

    /// Items at least this long count as large
    #[serde(default = "default_large_item_chars")]
    pub large_item_chars: usize,
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self {
            max_batch_chars: default_max_batch_chars(),
            large_item_chars: default_large_item_chars(),
        }
    }
}

/// Deduplication and chunking settings
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct BatchingConfig {
    #[serde(default)]
    pub priority: PriorityWeights,

    #[serde(default)]
    pub chunking: ChunkLimits,
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to the `log` crate's filter
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl_ms() -> u64 {
    7 * 24 * 60 * 60 * 1000 // one week
}

fn default_cache_max_entries() -> usize {
    10_000
}

fn default_cache_max_storage_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_flush_debounce_ms() -> u64 {
    1000
}

fn default_sweep_interval_ms() -> u64 {
    60_000
}

fn default_cooldown_ms() -> u64 {
    5000
}

fn default_evaluation_window() -> usize {
    10
}

fn default_history_size() -> usize {
    50
}

fn default_min_samples() -> usize {
    3
}

fn default_interval_dead_band_ms() -> u64 {
    10
}

fn default_usage_weight() -> i64 {
    10
}

fn default_short_bonus() -> i64 {
    5
}

fn default_medium_bonus() -> i64 {
    2
}

fn default_max_batch_chars() -> usize {
    5000
}

fn default_large_item_chars() -> usize {
    500
}

impl Config {
    /// Load the configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to open config file: {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load the configuration, writing a default one when the file is missing
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::from_file(path);
        }

        log::warn!("Config file not found at '{}', creating default config.", path.display());
        let config = Config::default();
        config.save(path)?;
        Ok(config)
    }

    /// Save the configuration as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let config_json = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;
        std::fs::write(path, config_json)
            .with_context(|| format!("Failed to write config to file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        // Validate languages
        let _source_name = crate::language_utils::get_language_name(&self.source_language)?;
        let _target_name = crate::language_utils::get_language_name(&self.target_language)?;

        if self.cache.max_entries == 0 {
            return Err(anyhow!("cache.max_entries must be greater than zero"));
        }
        if self.cache.ttl_ms == 0 {
            return Err(anyhow!("cache.ttl_ms must be greater than zero"));
        }
        if self.cache.sweep_interval_ms == 0 {
            return Err(anyhow!("cache.sweep_interval_ms must be greater than zero"));
        }
        if self.adaptive.evaluation_window == 0 {
            return Err(anyhow!("adaptive.evaluation_window must be greater than zero"));
        }
        if self.adaptive.history_size < self.adaptive.evaluation_window {
            return Err(anyhow!(
                "adaptive.history_size ({}) must be at least adaptive.evaluation_window ({})",
                self.adaptive.history_size,
                self.adaptive.evaluation_window
            ));
        }
        if self.batching.chunking.max_batch_chars == 0 {
            return Err(anyhow!("batching.chunking.max_batch_chars must be greater than zero"));
        }

        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: "en".to_string(),
            target_language: "fr".to_string(),
            service: ServiceKind::default(),
            cache: CacheConfig::default(),
            adaptive: AdaptiveTuning::default(),
            batching: BatchingConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}
