pub mod batch;
pub mod cli;
pub mod company;
pub mod config;
pub mod default_logo;
pub mod domain_utils;
pub mod export;
pub mod failed_cache;
pub mod input;
pub mod ledger;
pub mod logger;
pub mod processor;
pub mod progress_store;
pub mod rate_limit;
pub mod sources;
pub mod standardize;

pub use batch::{BatchCoordinator, BatchOptions, BatchRun, BatchSummary, CancellationFlag};
pub use company::{CompanyRecord, OutcomeStatus, ProcessingOutcome, SourceTag};
pub use config::AppConfig;
pub use processor::{CompanyProcessor, RunContext, SetupError};
pub use progress_store::ProgressStore;
