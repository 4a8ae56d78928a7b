use clap::Parser;
use std::path::PathBuf;

use crate::config::{AppConfig, ConfigError};
use crate::input::InputFormat;
use crate::standardize::MinSizePolicy;

#[derive(Parser, Debug)]
#[command(name = "logo-scraper")]
#[command(about = "Fetch, standardize, and save a square logo for every company in a list")]
#[command(version)]
pub struct Cli {
    /// Create default configuration file at ./config/logo_scraper.toml
    #[arg(long)]
    pub init: bool,

    /// Company list to process (.csv, .json, .xlsx, .xls, or .ods)
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Directory receiving one <ID>.png per company (overrides config)
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Configuration file (defaults to ./config/logo_scraper.toml)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Companies per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Concurrent companies (0 = available CPUs minus one)
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Width and height of output images in pixels
    #[arg(long, value_name = "PIXELS")]
    pub output_size: Option<u32>,

    /// Smallest acceptable source image dimension in pixels
    #[arg(long, value_name = "PIXELS")]
    pub min_source_size: Option<u32>,

    /// How the minimum size applies: 'any' dimension or 'both'
    #[arg(long, value_name = "POLICY")]
    pub min_size_policy: Option<MinSizePolicy>,

    /// Retries for transient network failures
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Base delay between retries in milliseconds
    #[arg(long, value_name = "MS")]
    pub retry_delay_ms: Option<u64>,

    /// Process only the first N companies (after --ids filtering)
    #[arg(long, value_name = "N")]
    pub top_n: Option<usize>,

    /// Process only these company IDs (comma-separated)
    #[arg(long, value_name = "ID,...", value_delimiter = ',')]
    pub ids: Vec<String>,

    /// Write the input plus logo columns to this CSV file
    #[arg(long, value_name = "FILE")]
    pub enriched_output: Option<PathBuf>,

    /// Do not update the outcome ledger in the output directory
    #[arg(long)]
    pub no_ledger: bool,

    /// Verbose logging (use -v for INFO, -vv for DEBUG with every source attempt)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Also write logs to this file
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    pub fn validate(&self) -> Result<(), String> {
        if !self.init && self.input.is_none() {
            return Err("An input file is required (use --input, or --init to create a config)".to_string());
        }

        if let Some(input) = &self.input {
            if InputFormat::from_path(input).is_none() {
                return Err(format!(
                    "Input file must be .csv, .json, or a spreadsheet (.xlsx, .xls, .ods): {}",
                    input.display()
                ));
            }
        }

        if self.batch_size == Some(0) {
            return Err("Batch size must be greater than 0".to_string());
        }

        if self.output_size == Some(0) {
            return Err("Output size must be greater than 0".to_string());
        }

        if self.top_n == Some(0) {
            return Err("--top-n must be greater than 0".to_string());
        }

        if let Some(workers) = self.workers {
            if workers > 256 {
                return Err("Workers cannot exceed 256".to_string());
            }
        }

        Ok(())
    }

    /// Apply command-line overrides to `config` and re-validate it
    pub fn apply_to(&self, config: &mut AppConfig) -> Result<(), ConfigError> {
        if let Some(dir) = &self.output_dir {
            config.processing.output_dir = dir.clone();
        }
        if let Some(size) = self.batch_size {
            config.processing.batch_size = size;
        }
        if let Some(workers) = self.workers {
            config.processing.workers = workers;
        }
        if let Some(size) = self.output_size {
            config.processing.output_size = size;
        }
        if let Some(size) = self.min_source_size {
            config.processing.min_source_size = size;
        }
        if let Some(policy) = self.min_size_policy {
            config.processing.min_size_policy = policy;
        }
        if let Some(retries) = self.max_retries {
            config.retry.max_retries = retries;
        }
        if let Some(delay) = self.retry_delay_ms {
            config.retry.base_delay_ms = delay;
            config.retry.max_delay_ms = config.retry.max_delay_ms.max(delay);
        }
        if let Some(path) = &self.enriched_output {
            config.output.enriched_file = Some(path.clone());
        }
        if self.no_ledger {
            config.output.write_ledger = false;
        }
        config.validate()
    }
}
