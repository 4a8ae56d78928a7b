use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use logo_scraper::batch::{BatchCoordinator, BatchOptions, CancellationFlag};
use logo_scraper::cli::Cli;
use logo_scraper::config::{self, AppConfig, ConfigError};
use logo_scraper::export;
use logo_scraper::input;
use logo_scraper::ledger::OutcomeLedger;
use logo_scraper::logger::{self, ProgressReporter, VerbosityLevel};
use logo_scraper::processor::{CompanyProcessor, RunContext};
use logo_scraper::progress_store::ProgressStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle --init flag first (before any other processing)
    if cli.init {
        let path = cli.config.clone().unwrap_or_else(|| PathBuf::from(config::CONFIG_PATH));
        match AppConfig::create_default_config_at(&path) {
            Ok(path) => {
                println!("✅ Created default configuration file at: {}", path.display());
                println!("   Edit this file to customize settings, then run logo-scraper again.");
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("❌ Failed to create configuration file: {}", e);
                std::process::exit(1);
            }
        }
    }

    if let Err(e) = cli.validate() {
        eprintln!("❌ Invalid arguments: {}", e);
        std::process::exit(2);
    }

    let mut app_config = load_config(&cli);
    if let Err(e) = cli.apply_to(&mut app_config) {
        eprintln!("❌ Configuration error: {}", e);
        std::process::exit(1);
    }

    let verbosity = VerbosityLevel::from_verbose_count(cli.verbose);
    logger::init_tracing(verbosity, cli.log_file.as_deref())?;
    for warning in app_config.warnings() {
        warn!("{}", warning);
    }

    let cancel = CancellationFlag::new();
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || {
        if handler_flag.is_cancelled() {
            eprintln!("\n⚠️  Second interrupt received. Exiting immediately.");
            std::process::exit(130); // 130 = 128 + SIGINT(2)
        }
        handler_flag.cancel();
        eprintln!("\n⚠️  Interrupt received. Finishing companies in progress (press Ctrl-C again to force exit)...");
    })
    .unwrap_or_else(|e| {
        eprintln!("⚠️  Warning: Failed to set Ctrl-C handler: {}. Interrupt signals may not be handled gracefully.", e);
    });

    let input_path = cli.input.clone().context("An input file is required")?;
    let companies = input::load_companies(&input_path, &app_config.filters)?;
    let companies = input::apply_filters(companies, &cli.ids, cli.top_n);
    if companies.is_empty() {
        eprintln!("⚠️  No companies to process in {}", input_path.display());
        return Ok(());
    }

    run(app_config, companies, cancel).await
}

/// Load the configuration file, offering to create it when it is missing
fn load_config(cli: &Cli) -> AppConfig {
    let result = match &cli.config {
        Some(path) => AppConfig::load_from_path(path),
        None => AppConfig::load(),
    };

    match result {
        Ok(cfg) => cfg,
        Err(ConfigError::FileNotFound(path)) if cli.config.is_none() => {
            match AppConfig::prompt_create_config() {
                Ok(Some(created_path)) => {
                    println!("✅ Created default configuration file at: {}", created_path.display());
                    println!("   Edit this file to customize settings, then run logo-scraper again.");
                    std::process::exit(0);
                }
                Ok(None) => {
                    eprintln!("⚠️  No configuration file at {}; using built-in defaults.", path.display());
                    match AppConfig::builtin() {
                        Ok(cfg) => cfg,
                        Err(e) => {
                            eprintln!("❌ Built-in configuration is invalid: {}", e);
                            std::process::exit(1);
                        }
                    }
                }
                Err(e) => {
                    eprintln!("❌ Failed to create configuration file: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Err(e) => {
            eprintln!("❌ Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run(
    app_config: AppConfig,
    companies: Vec<logo_scraper::CompanyRecord>,
    cancel: CancellationFlag,
) -> Result<()> {
    let output_dir = app_config.processing.output_dir.clone();
    let store = ProgressStore::open(&output_dir)?;
    let context = Arc::new(RunContext::new(&app_config));
    context.rate_limits.log_config(&app_config.sources);
    let processor = CompanyProcessor::from_config(&app_config, store, context)?;

    let options = BatchOptions {
        batch_size: app_config.processing.batch_size,
        workers: app_config.processing.effective_workers(),
        progress_interval: app_config.processing.progress_interval,
    };
    info!(
        "Output {}x{} PNG to {} (min source {}px, policy {})",
        app_config.processing.output_size,
        app_config.processing.output_size,
        output_dir.display(),
        app_config.processing.min_source_size,
        app_config.processing.min_size_policy
    );

    let reporter = ProgressReporter::new(companies.len() as u64);
    let coordinator = BatchCoordinator::new(processor, options, cancel, reporter);
    let run = coordinator.run(companies.clone()).await?;

    write_reports(&app_config, &output_dir, &companies, &run)?;
    export::print_run_summary(&run.summary, &output_dir);

    if run.summary.interrupted {
        std::process::exit(130);
    }
    Ok(())
}

fn write_reports(
    app_config: &AppConfig,
    output_dir: &Path,
    companies: &[logo_scraper::CompanyRecord],
    run: &logo_scraper::BatchRun,
) -> Result<()> {
    let summary_path = output_dir.join(&app_config.output.summary_file);
    export::export_summary(&run.summary, &summary_path)?;

    if let Some(enriched) = &app_config.output.enriched_file {
        export::export_enriched_csv(companies, &run.outcomes, enriched)?;
    }

    if app_config.output.write_ledger {
        let mut ledger = OutcomeLedger::load_or_new(output_dir);
        ledger.record_all(&run.outcomes);
        if let Err(e) = ledger.save(output_dir) {
            warn!("Could not update outcome ledger: {:#}", e);
        }
    }

    Ok(())
}
