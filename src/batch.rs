//! Batch orchestration for logo acquisition
//!
//! Supports:
//! - De-duplication of company identifiers (first occurrence wins)
//! - Resume by output-directory scan: companies with an artifact are skipped
//! - Fixed-size batches processed by a bounded pool of concurrent workers
//! - Periodic progress lines with a success-rate band and a per-batch ETA
//! - Cooperative cancellation: companies not yet started are abandoned

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::company::{CompanyRecord, OutcomeStatus, ProcessingOutcome};
use crate::logger::ProgressReporter;
use crate::processor::{CompanyProcessor, SetupError};
use crate::progress_store::sanitize_id;

/// Number of recent batch durations averaged for the ETA
pub const ETA_WINDOW: usize = 5;

/// Shared interrupt flag, set from the Ctrl-C handler
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sizing of a run
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub workers: usize,
    /// Companies between progress lines
    pub progress_interval: usize,
}

/// Summary of a batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    /// Companies after de-duplication
    pub total_companies: usize,
    /// Duplicate identifiers dropped from the input
    pub duplicates_removed: usize,
    /// Companies processed this run (saved or failed)
    pub attempted: usize,
    /// Companies whose logo was saved this run
    pub succeeded: usize,
    /// Saved logos per source tag (`primary`, `favicon`, `default`)
    pub succeeded_by_source: BTreeMap<String, usize>,
    /// Saved logos that came from an external service
    pub succeeded_external: usize,
    /// Saved logos per service name
    pub succeeded_by_service: BTreeMap<String, usize>,
    /// Companies whose logo could not be written
    pub failed: usize,
    /// Companies skipped because their logo already existed
    pub skipped_existing: usize,
    /// Companies not started because the run was interrupted
    pub abandoned: usize,
    pub interrupted: bool,
    /// Number of batches dispatched
    pub batches: usize,
    pub average_batch_secs: f64,
    /// Estimate for the remaining batches when the run stopped
    pub eta_remaining_secs: Option<f64>,
    pub total_duration_secs: f64,
    /// Timestamp when the run started
    pub started_at: String,
    /// Timestamp when the run completed
    pub completed_at: String,
}

impl Default for BatchSummary {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchSummary {
    pub fn new() -> Self {
        Self {
            total_companies: 0,
            duplicates_removed: 0,
            attempted: 0,
            succeeded: 0,
            succeeded_by_source: BTreeMap::new(),
            succeeded_external: 0,
            succeeded_by_service: BTreeMap::new(),
            failed: 0,
            skipped_existing: 0,
            abandoned: 0,
            interrupted: false,
            batches: 0,
            average_batch_secs: 0.0,
            eta_remaining_secs: None,
            total_duration_secs: 0.0,
            started_at: Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            completed_at: String::new(),
        }
    }

    pub fn record(&mut self, outcome: &ProcessingOutcome) {
        match outcome.status {
            OutcomeStatus::Saved(tag) => {
                self.attempted += 1;
                self.succeeded += 1;
                *self.succeeded_by_source.entry(tag.to_string()).or_default() += 1;
                if tag.is_external() {
                    self.succeeded_external += 1;
                }
                if let Some(service) = &outcome.service {
                    *self.succeeded_by_service.entry(service.clone()).or_default() += 1;
                }
            }
            OutcomeStatus::Failed => {
                self.attempted += 1;
                self.failed += 1;
            }
            OutcomeStatus::Existing => self.skipped_existing += 1,
            OutcomeStatus::Abandoned => self.abandoned += 1,
        }
    }

    /// Logos that came from an external service this run
    pub fn external_successes(&self) -> usize {
        self.succeeded_external
    }

    /// Share of processed companies that received a logo, in percent
    pub fn success_rate(&self) -> Option<f64> {
        percent(self.succeeded, self.attempted)
    }

    /// Share of processed companies whose logo came from an external service, in percent
    pub fn external_rate(&self) -> Option<f64> {
        percent(self.external_successes(), self.attempted)
    }

    pub fn finalize(&mut self, elapsed: Duration, eta: &EtaEstimator) {
        self.completed_at = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
        self.total_duration_secs = elapsed.as_secs_f64();
        self.average_batch_secs = eta.average().map(|d| d.as_secs_f64()).unwrap_or(0.0);
    }
}

fn percent(part: usize, whole: usize) -> Option<f64> {
    if whole == 0 {
        None
    } else {
        Some(part as f64 * 100.0 / whole as f64)
    }
}

/// Running counts for the batch in flight; progress lines are per batch
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatchTally {
    /// Companies processed so far (abandoned ones are not counted)
    pub completed: usize,
    /// Companies whose logo was saved, from any source
    pub saved: usize,
    /// Saved logos that came from an external service
    pub external: usize,
}

impl BatchTally {
    pub fn record(&mut self, outcome: &ProcessingOutcome) {
        match outcome.source() {
            Some(tag) => {
                self.completed += 1;
                self.saved += 1;
                if tag.is_external() {
                    self.external += 1;
                }
            }
            None if outcome.status == OutcomeStatus::Failed => self.completed += 1,
            None => {}
        }
    }

    pub fn success_rate(&self) -> f64 {
        percent(self.saved, self.completed).unwrap_or(0.0)
    }

    pub fn external_rate(&self) -> f64 {
        percent(self.external, self.completed).unwrap_or(0.0)
    }
}

/// Moving-average ETA over recent batch durations.
///
/// Early estimates run optimistic (connection set-up, cold caches), so the
/// estimate is inflated by 1.5x after one batch and 1.2x after two.
#[derive(Debug, Clone, Default)]
pub struct EtaEstimator {
    recent: VecDeque<Duration>,
    completed: usize,
}

impl EtaEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, duration: Duration) {
        if self.recent.len() == ETA_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(duration);
        self.completed += 1;
    }

    pub fn average(&self) -> Option<Duration> {
        if self.recent.is_empty() {
            return None;
        }
        let total: Duration = self.recent.iter().sum();
        Some(total / self.recent.len() as u32)
    }

    pub fn estimate(&self, remaining_batches: usize) -> Option<Duration> {
        let average = self.average()?;
        let inflation = match self.completed {
            1 => 1.5,
            2 => 1.2,
            _ => 1.0,
        };
        Some(average.mul_f64(remaining_batches as f64 * inflation))
    }
}

/// Format as `Xh Ym`, `Xm Ys` or `Xs`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

/// Colour band for a success rate in percent
pub fn progress_band(rate: f64) -> &'static str {
    if rate >= 90.0 {
        "🟩"
    } else if rate >= 50.0 {
        "🟨"
    } else {
        "🟥"
    }
}

/// Drop repeated identifiers, keeping the first occurrence
pub fn dedup_companies(companies: Vec<CompanyRecord>) -> (Vec<CompanyRecord>, usize) {
    let before = companies.len();
    let mut seen = HashSet::new();
    let unique: Vec<CompanyRecord> = companies
        .into_iter()
        .filter(|c| seen.insert(c.id.clone()))
        .collect();
    let removed = before - unique.len();
    (unique, removed)
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct BatchRun {
    pub outcomes: Vec<ProcessingOutcome>,
    pub summary: BatchSummary,
}

pub struct BatchCoordinator {
    processor: CompanyProcessor,
    options: BatchOptions,
    cancel: CancellationFlag,
    reporter: ProgressReporter,
}

impl BatchCoordinator {
    pub fn new(
        processor: CompanyProcessor,
        options: BatchOptions,
        cancel: CancellationFlag,
        reporter: ProgressReporter,
    ) -> Self {
        Self {
            processor,
            options,
            cancel,
            reporter,
        }
    }

    pub async fn run(&self, companies: Vec<CompanyRecord>) -> Result<BatchRun, SetupError> {
        let started = Instant::now();
        let mut summary = BatchSummary::new();

        let (companies, duplicates) = dedup_companies(companies);
        if duplicates > 0 {
            warn!("Ignoring {} duplicate company identifier(s)", duplicates);
        }
        summary.total_companies = companies.len();
        summary.duplicates_removed = duplicates;

        let completed = self.processor.store().scan()?;
        let (existing, pending): (Vec<CompanyRecord>, Vec<CompanyRecord>) = companies
            .into_iter()
            .partition(|c| completed.contains(&sanitize_id(&c.id)));

        let mut outcomes = Vec::with_capacity(summary.total_companies);
        for company in &existing {
            let outcome = ProcessingOutcome::existing(company.id.clone());
            summary.record(&outcome);
            outcomes.push(outcome);
        }
        if !existing.is_empty() {
            info!("Skipping {} companies with an existing logo", existing.len());
        }

        let batch_size = self.options.batch_size.max(1);
        let workers = self.options.workers.max(1);
        let interval = self.options.progress_interval.max(1);
        let total_batches = pending.len().div_ceil(batch_size);
        info!(
            "Processing {} companies in {} batch(es) of up to {} with {} worker(s)",
            pending.len(),
            total_batches,
            batch_size,
            workers
        );

        self.reporter.set_length(pending.len() as u64);
        let mut eta = EtaEstimator::new();

        for (batch_index, batch) in pending.chunks(batch_size).enumerate() {
            if self.cancel.is_cancelled() {
                for company in batch {
                    let outcome = ProcessingOutcome::abandoned(company.id.clone());
                    summary.record(&outcome);
                    outcomes.push(outcome);
                }
                continue;
            }

            let batch_started = Instant::now();
            summary.batches += 1;
            self.reporter
                .set_message(format!("batch {}/{}", batch_index + 1, total_batches));

            let mut results = stream::iter(batch)
                .map(|company| async move {
                    if self.cancel.is_cancelled() {
                        ProcessingOutcome::abandoned(company.id.clone())
                    } else {
                        self.processor.process(company).await
                    }
                })
                .buffer_unordered(workers);

            let mut tally = BatchTally::default();
            while let Some(outcome) = results.next().await {
                summary.record(&outcome);
                tally.record(&outcome);
                outcomes.push(outcome);
                self.reporter.advance(1);
                if tally.completed > 0 && tally.completed % interval == 0 && tally.completed < batch.len() {
                    self.reporter.println(format!(
                        "    {} Progress: {}/{} ({:.1}% success, {:.1}% from services)",
                        progress_band(tally.success_rate()),
                        tally.completed,
                        batch.len(),
                        tally.success_rate(),
                        tally.external_rate()
                    ));
                }
            }

            let batch_elapsed = batch_started.elapsed();
            eta.record(batch_elapsed);

            let remaining = total_batches - (batch_index + 1);
            let estimate = if remaining > 0 && !self.cancel.is_cancelled() {
                eta.estimate(remaining)
            } else {
                None
            };
            summary.eta_remaining_secs = estimate.map(|e| e.as_secs_f64());

            let eta_message = estimate
                .map(|e| format!(" | ETA for {} remaining batch(es): {}", remaining, format_duration(e)))
                .unwrap_or_default();
            self.reporter.println(format!(
                "  {} Batch {}/{} completed in {}: {}/{} logos ({:.1}% success, {:.1}% from services, {} failed){}",
                progress_band(tally.success_rate()),
                batch_index + 1,
                total_batches,
                format_duration(batch_elapsed),
                tally.saved,
                batch.len(),
                tally.success_rate(),
                tally.external_rate(),
                tally.completed - tally.saved,
                eta_message
            ));
        }

        let failed_lookups = self.processor.failed_lookups();
        if failed_lookups > 0 {
            debug!("{} source/domain pair(s) were skipped after a permanent failure", failed_lookups);
        }

        summary.interrupted = self.cancel.is_cancelled();
        summary.finalize(started.elapsed(), &eta);
        self.reporter.finish(if summary.interrupted { "interrupted" } else { "done" });

        Ok(BatchRun { outcomes, summary })
    }
}
