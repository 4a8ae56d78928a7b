//! Configuration management for logo-scraper
//!
//! Configuration is loaded from `./config/logo_scraper.toml` (or `--config`).
//! The template embedded below is the only place defaults live; `--init`
//! writes it out.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::default_logo::ScriptCategory;
use crate::sources::SourceKind;
use crate::standardize::MinSizePolicy;

/// Configuration file path relative to working directory
pub const CONFIG_PATH: &str = "./config/logo_scraper.toml";

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = include_str!("../config/logo_scraper.toml");

/// Source images below this edge are accepted but reported as risky
const MIN_SOURCE_SIZE_WARNING: u32 = 32;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Configuration file already exists at {0}")]
    AlreadyExists(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid URL template in '{field}': {url}")]
    InvalidUrl { field: String, url: String },

    #[error("Configuration field '{field}' cannot be empty")]
    EmptyRequired { field: String },

    #[error("Configuration field '{field}' is out of range: {value} (expected {expected})")]
    OutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Exactly one source must have kind = \"primary\" (found {0})")]
    PrimarySourceCount(usize),
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub processing: ProcessingConfig,
    pub retry: RetryConfig,
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub default_logo: DefaultLogoConfig,
    #[serde(default)]
    pub output: OutputConfig,
    /// Input column filters, keyed by column name (case-insensitive)
    #[serde(default)]
    pub filters: ColumnFilters,
}

/// HTTP client configuration shared by every source
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Output geometry, batching, and parallelism
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingConfig {
    pub output_dir: PathBuf,
    pub output_size: u32,
    pub min_source_size: u32,
    #[serde(default)]
    pub min_size_policy: MinSizePolicy,
    pub batch_size: usize,
    /// Concurrent companies; 0 selects a count from available CPUs
    #[serde(default)]
    pub workers: usize,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
}

fn default_max_workers() -> usize {
    8
}

fn default_progress_interval() -> usize {
    25
}

impl ProcessingConfig {
    /// Worker count for this machine
    pub fn effective_workers(&self) -> usize {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        resolve_worker_count(self.workers, self.max_workers, available)
    }
}

/// An explicit request is honored as-is; auto-sizing leaves one CPU free and
/// stays within `max_workers`.
pub fn resolve_worker_count(requested: usize, max_workers: usize, available_cpus: usize) -> usize {
    if requested > 0 {
        return requested;
    }
    available_cpus
        .saturating_sub(1)
        .max(1)
        .min(max_workers.max(1))
}

/// Backoff strategy between retry attempts
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    Linear,
    #[default]
    Exponential,
}

/// Retry policy for transient fetch failures
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    #[serde(default)]
    pub backoff_strategy: BackoffStrategy,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Upper bound of the random extra delay, as a fraction of `base_delay_ms`
    #[serde(default)]
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_strategy: BackoffStrategy::Exponential,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter_ratio: 0.25,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based) without jitter
    pub fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.uncapped_delay_ms(attempt).min(self.max_delay_ms))
    }

    /// Delay before retry number `attempt` with jitter in `[0, jitter_ratio * base)`.
    ///
    /// The cap is applied after jitter, and jitter never exceeds the step between
    /// consecutive uncapped delays, so the sequence is non-decreasing.
    pub fn backoff_delay_with_jitter<R: rand::Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let ratio = self.jitter_ratio.clamp(0.0, 1.0);
        let jitter_ms = (rng.random::<f64>() * ratio * self.base_delay_ms as f64) as u64;
        let delay_ms = self
            .uncapped_delay_ms(attempt)
            .saturating_add(jitter_ms)
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    fn uncapped_delay_ms(&self, attempt: u32) -> u64 {
        match self.backoff_strategy {
            BackoffStrategy::Linear => self.base_delay_ms.saturating_mul(attempt as u64),
            BackoffStrategy::Exponential => self
                .base_delay_ms
                .saturating_mul(2u64.saturating_pow(attempt - 1)),
        }
    }
}

/// One entry of the ordered fallback chain
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub kind: SourceKind,
    /// URL with `{domain}` and optional `{size}` placeholders
    pub url_template: String,
    /// 0 disables rate limiting for this source
    #[serde(default)]
    pub requests_per_second: u32,
}

/// Extra font files per writing system, tried before platform fonts
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefaultLogoConfig {
    #[serde(default)]
    pub latin: Vec<PathBuf>,
    #[serde(default)]
    pub cjk: Vec<PathBuf>,
    #[serde(default)]
    pub korean: Vec<PathBuf>,
    #[serde(default)]
    pub cyrillic: Vec<PathBuf>,
    #[serde(default)]
    pub arabic: Vec<PathBuf>,
    #[serde(default)]
    pub other: Vec<PathBuf>,
}

impl DefaultLogoConfig {
    pub fn font_paths(&self, category: ScriptCategory) -> &[PathBuf] {
        match category {
            ScriptCategory::Latin => &self.latin,
            ScriptCategory::Cjk => &self.cjk,
            ScriptCategory::Korean => &self.korean,
            ScriptCategory::Cyrillic => &self.cyrillic,
            ScriptCategory::Arabic => &self.arabic,
            ScriptCategory::Other => &self.other,
        }
    }
}

/// Accepted values for one input column
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ColumnFilter {
    Equals(String),
    AnyOf(Vec<String>),
}

impl ColumnFilter {
    pub fn matches(&self, value: &str) -> bool {
        let value = value.trim();
        match self {
            ColumnFilter::Equals(expected) => expected.trim() == value,
            ColumnFilter::AnyOf(expected) => expected.iter().any(|e| e.trim() == value),
        }
    }
}

pub type ColumnFilters = BTreeMap<String, ColumnFilter>;

/// Reporting artifacts written next to the logos
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_write_ledger")]
    pub write_ledger: bool,
    #[serde(default = "default_summary_file")]
    pub summary_file: String,
    #[serde(default)]
    pub enriched_file: Option<PathBuf>,
}

fn default_write_ledger() -> bool {
    true
}

fn default_summary_file() -> String {
    "logo_summary.json".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            write_ledger: default_write_ledger(),
            summary_file: default_summary_file(),
            enriched_file: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(Path::new(CONFIG_PATH))
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// The embedded default configuration
    pub fn builtin() -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(DEFAULT_CONFIG)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.user_agent.trim().is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "http.user_agent".to_string(),
            });
        }
        if self.http.request_timeout_secs == 0 {
            return Err(ConfigError::EmptyRequired {
                field: "http.request_timeout_secs".to_string(),
            });
        }

        if self.processing.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "processing.output_dir".to_string(),
            });
        }
        if self.processing.output_size == 0 {
            return Err(out_of_range("processing.output_size", self.processing.output_size, "> 0"));
        }
        if self.processing.batch_size == 0 {
            return Err(out_of_range("processing.batch_size", self.processing.batch_size, "> 0"));
        }
        if self.processing.max_workers == 0 {
            return Err(out_of_range("processing.max_workers", self.processing.max_workers, "> 0"));
        }
        if self.processing.progress_interval == 0 {
            return Err(out_of_range(
                "processing.progress_interval",
                self.processing.progress_interval,
                "> 0",
            ));
        }

        if !(0.0..=1.0).contains(&self.retry.jitter_ratio) {
            return Err(out_of_range("retry.jitter_ratio", self.retry.jitter_ratio, "0.0 to 1.0"));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(out_of_range(
                "retry.base_delay_ms",
                self.retry.base_delay_ms,
                "<= retry.max_delay_ms",
            ));
        }

        if self.sources.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "sources".to_string(),
            });
        }
        let primaries = self
            .sources
            .iter()
            .filter(|s| s.kind == SourceKind::Primary)
            .count();
        if primaries != 1 {
            return Err(ConfigError::PrimarySourceCount(primaries));
        }

        for (i, source) in self.sources.iter().enumerate() {
            if source.name.trim().is_empty() {
                return Err(ConfigError::EmptyRequired {
                    field: format!("sources[{}].name", i),
                });
            }
            let field = format!("sources[{}].url_template", i);
            if !source.url_template.contains("{domain}") {
                return Err(ConfigError::InvalidUrl { field, url: source.url_template.clone() });
            }
            let sample = source
                .url_template
                .replace("{domain}", "example.com")
                .replace("{size}", "128");
            match url::Url::parse(&sample) {
                Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {}
                _ => return Err(ConfigError::InvalidUrl { field, url: source.url_template.clone() }),
            }
        }

        if self.filters.keys().any(|column| column.trim().is_empty()) {
            return Err(ConfigError::EmptyRequired {
                field: "filters.<column>".to_string(),
            });
        }

        Ok(())
    }

    /// Values that are legal but likely unintended
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let size = self.processing.output_size;
        if !(100..=1024).contains(&size) {
            warnings.push(format!(
                "processing.output_size = {} is outside the recommended 100-1024 range",
                size
            ));
        }
        if self.processing.min_source_size < MIN_SOURCE_SIZE_WARNING {
            warnings.push(format!(
                "processing.min_source_size = {} may be too small (below {}); small icons upscale poorly",
                self.processing.min_source_size, MIN_SOURCE_SIZE_WARNING
            ));
        }
        if self.processing.min_source_size > size {
            warnings.push(format!(
                "processing.min_source_size = {} exceeds output_size = {}",
                self.processing.min_source_size, size
            ));
        }
        for (column, filter) in &self.filters {
            if let ColumnFilter::AnyOf(values) = filter {
                if values.is_empty() {
                    warnings.push(format!("filters.{} is an empty list and matches no company", column));
                }
            }
        }
        warnings
    }

    /// Create default configuration file at the standard location
    pub fn create_default_config() -> Result<PathBuf, ConfigError> {
        Self::create_default_config_at(Path::new(CONFIG_PATH))
    }

    /// Write the default template to `path`, refusing to replace an existing file
    pub fn create_default_config_at(path: &Path) -> Result<PathBuf, ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(ConfigError::AlreadyExists(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(DEFAULT_CONFIG.as_bytes())?;

        Ok(path.to_path_buf())
    }

    /// Check if stdin is a TTY (interactive terminal)
    pub fn is_interactive() -> bool {
        io::stdin().is_terminal()
    }

    /// Prompt user to create default config (only in interactive mode)
    pub fn prompt_create_config() -> Result<Option<PathBuf>, ConfigError> {
        if !Self::is_interactive() {
            return Ok(None);
        }

        print!("Configuration file not found. Create default config? [Y/n] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();

        if input.is_empty() || input == "y" || input == "yes" {
            let path = Self::create_default_config()?;
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }
}

fn out_of_range(field: &str, value: impl ToString, expected: &str) -> ConfigError {
    ConfigError::OutOfRange {
        field: field.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    }
}
