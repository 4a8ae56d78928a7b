//! Company records and per-company processing results

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain_utils::Domain;
use crate::sources::SourceKind;

/// One row of input. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompanyRecord {
    /// Opaque stable key; also names the output file
    pub id: String,
    pub name: String,
    /// Raw website field as found in the input
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl CompanyRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            website: None,
            country: None,
        }
    }

    pub fn with_website(mut self, website: impl Into<String>) -> Self {
        self.website = Some(website.into());
        self
    }
}

/// Where a logo artifact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Primary,
    Favicon,
    Default,
}

impl SourceTag {
    /// Whether the image came from an external service rather than being synthesized
    pub fn is_external(self) -> bool {
        !matches!(self, SourceTag::Default)
    }
}

impl From<SourceKind> for SourceTag {
    fn from(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Primary => SourceTag::Primary,
            SourceKind::Favicon => SourceTag::Favicon,
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            SourceTag::Primary => "primary",
            SourceTag::Favicon => "favicon",
            SourceTag::Default => "default",
        };
        f.write_str(tag)
    }
}

/// The final image for one company, ready to persist
#[derive(Debug, Clone)]
pub struct LogoArtifact {
    pub png: Vec<u8>,
    pub size: u32,
    pub source: SourceTag,
    /// Service that produced the image (`default` for synthesized logos)
    pub service: String,
}

/// Final state of one company in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "status", content = "source")]
pub enum OutcomeStatus {
    /// An artifact was written this run
    Saved(SourceTag),
    /// An artifact from an earlier run was found; nothing was fetched
    Existing,
    /// Never started because the run was interrupted
    Abandoned,
    /// The artifact could not be written
    Failed,
}

impl OutcomeStatus {
    pub fn label(&self) -> &'static str {
        match self {
            OutcomeStatus::Saved(SourceTag::Primary) => "primary",
            OutcomeStatus::Saved(SourceTag::Favicon) => "favicon",
            OutcomeStatus::Saved(SourceTag::Default) => "default",
            OutcomeStatus::Existing => "existing",
            OutcomeStatus::Abandoned => "abandoned",
            OutcomeStatus::Failed => "failed",
        }
    }

    pub fn has_logo(&self) -> bool {
        matches!(self, OutcomeStatus::Saved(_) | OutcomeStatus::Existing)
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-company result, produced exactly once per identifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingOutcome {
    pub id: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
    pub domain: Option<Domain>,
    /// Name of the service that produced the image
    pub service: Option<String>,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

impl ProcessingOutcome {
    pub fn existing(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: OutcomeStatus::Existing,
            domain: None,
            service: None,
            elapsed_ms: 0,
            error: None,
        }
    }

    pub fn abandoned(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: OutcomeStatus::Abandoned,
            domain: None,
            service: None,
            elapsed_ms: 0,
            error: Some("interrupted before processing started".to_string()),
        }
    }

    pub fn source(&self) -> Option<SourceTag> {
        match self.status {
            OutcomeStatus::Saved(tag) => Some(tag),
            _ => None,
        }
    }
}
