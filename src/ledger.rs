// ledger.rs - Outcome ledger for reporting
//
// Records the latest outcome per company across runs. The ledger is written
// for people and downstream tooling; resume decisions never read it (the
// artifact files in the output directory are the only evidence of completion).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::company::ProcessingOutcome;

/// Ledger file name - hidden file to keep it apart from the logos
pub const LEDGER_FILENAME: &str = ".logo-scraper-ledger.json";

/// Current ledger format version - bump when making breaking changes
pub const LEDGER_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeLedger {
    /// Format version for compatibility checking
    pub version: u32,

    /// UTC timestamp of the last save
    pub updated_at: DateTime<Utc>,

    /// Latest outcome per company identifier
    pub outcomes: BTreeMap<String, ProcessingOutcome>,
}

impl Default for OutcomeLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl OutcomeLedger {
    pub fn new() -> Self {
        Self {
            version: LEDGER_VERSION,
            updated_at: Utc::now(),
            outcomes: BTreeMap::new(),
        }
    }

    pub fn path(output_dir: &Path) -> PathBuf {
        output_dir.join(LEDGER_FILENAME)
    }

    pub fn exists(output_dir: &Path) -> bool {
        Self::path(output_dir).exists()
    }

    /// Load the ledger from `output_dir`. Fails on an incompatible version.
    pub fn load(output_dir: &Path) -> Result<Self> {
        let path = Self::path(output_dir);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read ledger: {}", path.display()))?;
        let ledger: OutcomeLedger = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse ledger: {}", path.display()))?;
        if ledger.version != LEDGER_VERSION {
            anyhow::bail!(
                "Incompatible ledger version: file has version {} but current version is {}. \
                 Delete the ledger file to start a new one.",
                ledger.version,
                LEDGER_VERSION
            );
        }
        Ok(ledger)
    }

    /// Load the existing ledger, or start a new one if it is missing or unreadable
    pub fn load_or_new(output_dir: &Path) -> Self {
        if !Self::exists(output_dir) {
            return Self::new();
        }
        match Self::load(output_dir) {
            Ok(ledger) => ledger,
            Err(e) => {
                tracing::warn!("Starting a new outcome ledger: {:#}", e);
                Self::new()
            }
        }
    }

    /// Merge this run's outcomes. Abandoned companies keep their earlier entry.
    pub fn record_all<'a>(&mut self, outcomes: impl IntoIterator<Item = &'a ProcessingOutcome>) {
        for outcome in outcomes {
            let keep_previous = matches!(outcome.status, crate::company::OutcomeStatus::Abandoned)
                && self.outcomes.contains_key(&outcome.id);
            if !keep_previous {
                self.outcomes.insert(outcome.id.clone(), outcome.clone());
            }
        }
    }

    /// Save to `output_dir` atomically (temp file, fsync, rename)
    pub fn save(&mut self, output_dir: &Path) -> Result<()> {
        self.updated_at = Utc::now();
        let path = Self::path(output_dir);
        let temp_path = output_dir.join(".logo-scraper-ledger.tmp");
        let content = serde_json::to_string_pretty(self).context("Failed to serialize ledger")?;

        {
            let mut file = std::fs::File::create(&temp_path)
                .with_context(|| format!("Failed to create {}", temp_path.display()))?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }

        std::fs::rename(&temp_path, &path)
            .with_context(|| format!("Failed to write ledger: {}", path.display()))?;
        Ok(())
    }
}
