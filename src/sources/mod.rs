//! Logo sources
//!
//! A source turns a domain into raw image bytes. Sources are tried in a fixed
//! order (the primary lookup service, then favicon services) and every attempt
//! resolves to a [`FetchOutcome`]; nothing is thrown across this boundary.

pub mod http;

pub use http::HttpLogoSource;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::config::AppConfig;
use crate::domain_utils::Domain;
use crate::rate_limit::{RateLimitContext, Retryable};

/// Role of a source within the fallback chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Primary,
    Favicon,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Primary => write!(f, "primary"),
            SourceKind::Favicon => write!(f, "favicon"),
        }
    }
}

/// Whether a failed fetch is worth repeating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Timeouts, connection resets, 5xx, 408, 429
    Transient,
    /// Other 4xx, unusable responses, bad request URLs
    Permanent,
}

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("HTTP {status}: {snippet}")]
    Status { status: u16, snippet: String },

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("response body is empty")]
    EmptyBody,

    #[error("response is not an image (content-type '{0}')")]
    NotAnImage(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Timeout | FetchError::Connection(_) | FetchError::Body(_) => {
                FetchErrorKind::Transient
            }
            FetchError::Status { status, .. } => classify_status(*status),
            FetchError::EmptyBody | FetchError::NotAnImage(_) | FetchError::InvalidRequest(_) => {
                FetchErrorKind::Permanent
            }
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_builder() || err.is_redirect() {
            FetchError::InvalidRequest(err.to_string())
        } else if err.is_body() || err.is_decode() {
            FetchError::Body(err.to_string())
        } else {
            FetchError::Connection(err.to_string())
        }
    }
}

impl Retryable for FetchError {
    fn is_transient(&self) -> bool {
        self.kind() == FetchErrorKind::Transient
    }
}

/// Map a non-success HTTP status to a failure kind
pub fn classify_status(status: u16) -> FetchErrorKind {
    match status {
        408 | 429 => FetchErrorKind::Transient,
        500..=599 => FetchErrorKind::Transient,
        _ => FetchErrorKind::Permanent,
    }
}

/// Image bytes as delivered by a source, not yet decoded
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    /// Width and height read from the image header, when the format is recognized
    pub reported_size: Option<(u32, u32)>,
}

pub type FetchOutcome = Result<FetchedImage, FetchError>;

/// The single capability every source provides
#[async_trait]
pub trait LogoSource: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind;

    /// Fetch a logo for `domain`, retrying transient failures internally
    async fn fetch(&self, domain: &Domain) -> FetchOutcome;
}

/// Ordered fallback chain shared by all workers in a run
pub type SourceChain = Vec<Arc<dyn LogoSource>>;

/// Build the configured sources in priority order: the primary first, then
/// the favicon sources in the order they appear in the configuration.
pub fn build_source_chain(
    config: &AppConfig,
    rate_limits: &RateLimitContext,
) -> Result<SourceChain, reqwest::Error> {
    let mut ordered: Vec<_> = config.sources.iter().collect();
    ordered.sort_by_key(|s| match s.kind {
        SourceKind::Primary => 0,
        SourceKind::Favicon => 1,
    });

    ordered
        .into_iter()
        .map(|source| {
            HttpLogoSource::new(source, &config.http, config.processing.output_size, rate_limits)
                .map(|s| Arc::new(s) as Arc<dyn LogoSource>)
        })
        .collect()
}
