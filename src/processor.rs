//! Per-company fallback pipeline.
//!
//! `NORMALIZE -> TRY_SOURCE(0..n) -> GENERATE_DEFAULT -> STANDARDIZE -> PERSIST -> DONE`
//!
//! An invalid domain goes straight to the default generator. A source that
//! fails (after its own retries) or returns an unusable image hands over to the
//! next one; the default generator cannot fail, so every company reaches
//! `DONE` with an artifact unless the final write itself fails.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

use crate::company::{CompanyRecord, LogoArtifact, OutcomeStatus, ProcessingOutcome, SourceTag};
use crate::config::AppConfig;
use crate::default_logo::{DefaultLogoGenerator, FontResolver};
use crate::domain_utils::{normalize_domain, Domain};
use crate::failed_cache::FailedDomainCache;
use crate::progress_store::ProgressStore;
use crate::rate_limit::RateLimitContext;
use crate::sources::{build_source_chain, FetchedImage, SourceChain};
use crate::standardize::{encode_png, ImageStandardizer, StandardizeError};

/// Failures that stop a run before any company is processed
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("output directory {} is not usable: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// State shared by every worker for the length of one run
#[derive(Debug)]
pub struct RunContext {
    pub failed_cache: FailedDomainCache,
    pub rate_limits: RateLimitContext,
}

impl RunContext {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            failed_cache: FailedDomainCache::new(),
            rate_limits: RateLimitContext::from_config(&config.sources, &config.retry),
        }
    }
}

enum Step {
    Normalize,
    TrySource { index: usize, domain: Domain },
    Standardize { index: usize, domain: Domain, image: FetchedImage },
    GenerateDefault,
    Persist(LogoArtifact),
    Done(ProcessingOutcome),
}

#[derive(Clone)]
pub struct CompanyProcessor {
    sources: SourceChain,
    standardizer: ImageStandardizer,
    generator: DefaultLogoGenerator,
    store: ProgressStore,
    context: Arc<RunContext>,
}

impl CompanyProcessor {
    pub fn new(
        sources: SourceChain,
        standardizer: ImageStandardizer,
        generator: DefaultLogoGenerator,
        store: ProgressStore,
        context: Arc<RunContext>,
    ) -> Self {
        Self {
            sources,
            standardizer,
            generator,
            store,
            context,
        }
    }

    /// Build the source chain, standardizer, and generator described by `config`
    pub fn from_config(
        config: &AppConfig,
        store: ProgressStore,
        context: Arc<RunContext>,
    ) -> Result<Self, SetupError> {
        let sources = build_source_chain(config, &context.rate_limits)?;
        let processing = &config.processing;
        let standardizer = ImageStandardizer::new(
            processing.output_size,
            processing.min_source_size,
            processing.min_size_policy,
        );
        let fonts = Arc::new(FontResolver::new(&config.default_logo));
        let generator = DefaultLogoGenerator::new(processing.output_size, fonts);
        Ok(Self::new(sources, standardizer, generator, store, context))
    }

    /// Source/domain pairs known to fail permanently during this run
    pub fn failed_lookups(&self) -> usize {
        self.context.failed_cache.len()
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    /// Run one company through the fallback chain and persist its logo
    pub async fn process(&self, company: &CompanyRecord) -> ProcessingOutcome {
        let started = Instant::now();
        let mut normalized: Option<Domain> = None;
        let mut step = Step::Normalize;

        loop {
            step = match step {
                Step::Normalize => {
                    let raw = company.website.as_deref().unwrap_or_default();
                    match normalize_domain(raw) {
                        Ok(domain) => {
                            normalized = Some(domain.clone());
                            Step::TrySource { index: 0, domain }
                        }
                        Err(reason) => {
                            debug!("{}: no usable domain in {:?} ({})", company.id, raw, reason);
                            Step::GenerateDefault
                        }
                    }
                }

                Step::TrySource { index, domain } => self.try_source(company, index, domain).await,

                Step::Standardize { index, domain, image } => {
                    self.standardize(company, index, domain, image).await
                }

                Step::GenerateDefault => self.generate_default(company).await,

                Step::Persist(artifact) => {
                    let outcome = self.persist(company, artifact, normalized.take(), started).await;
                    Step::Done(outcome)
                }

                Step::Done(outcome) => return outcome,
            };
        }
    }

    async fn try_source(&self, company: &CompanyRecord, index: usize, domain: Domain) -> Step {
        let Some(source) = self.sources.get(index) else {
            return Step::GenerateDefault;
        };
        let next = Step::TrySource {
            index: index + 1,
            domain: domain.clone(),
        };

        if self.context.failed_cache.contains(source.name(), &domain) {
            debug!("{}: skipping {} for {} (failed earlier this run)", company.id, source.name(), domain);
            return next;
        }

        match source.fetch(&domain).await {
            Ok(image) => Step::Standardize { index, domain, image },
            Err(e) => {
                debug!("{}: {} has no logo for {}: {}", company.id, source.name(), domain, e);
                self.context.failed_cache.record(source.name(), &domain);
                next
            }
        }
    }

    async fn standardize(
        &self,
        company: &CompanyRecord,
        index: usize,
        domain: Domain,
        image: FetchedImage,
    ) -> Step {
        let source = &self.sources[index];
        let standardizer = self.standardizer;
        let bytes = image.bytes;

        let result = tokio::task::spawn_blocking(move || standardizer.standardize(&bytes))
            .await
            .unwrap_or_else(|e| Err(StandardizeError::Decode(format!("standardization task failed: {}", e))));

        match result {
            Ok(standardized) => Step::Persist(LogoArtifact {
                png: standardized.png,
                size: standardized.size,
                source: SourceTag::from(source.kind()),
                service: source.name().to_string(),
            }),
            Err(e) => {
                debug!("{}: rejected image from {} for {}: {}", company.id, source.name(), domain, e);
                self.context.failed_cache.record(source.name(), &domain);
                Step::TrySource { index: index + 1, domain }
            }
        }
    }

    async fn generate_default(&self, company: &CompanyRecord) -> Step {
        let generator = self.generator.clone();
        let id = company.id.clone();
        let name = company.name.clone();
        let size = generator.size();

        let rendered = tokio::task::spawn_blocking(move || {
            let logo = generator.generate(&id, &name);
            encode_png(logo.image)
        })
        .await;

        match rendered {
            Ok(Ok(png)) => Step::Persist(LogoArtifact {
                png,
                size,
                source: SourceTag::Default,
                service: SourceTag::Default.to_string(),
            }),
            Ok(Err(e)) => Step::Done(self.failed(company, format!("default logo encoding failed: {}", e))),
            Err(e) => Step::Done(self.failed(company, format!("default logo task failed: {}", e))),
        }
    }

    async fn persist(
        &self,
        company: &CompanyRecord,
        artifact: LogoArtifact,
        domain: Option<Domain>,
        started: Instant,
    ) -> ProcessingOutcome {
        let store = self.store.clone();
        let id = company.id.clone();
        let png = artifact.png;

        let written = tokio::task::spawn_blocking(move || store.write_atomic(&id, &png))
            .await
            .unwrap_or_else(|e| Err(io::Error::other(e.to_string())));

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match written {
            Ok(path) => {
                debug!("{}: saved {} logo from {} to {}", company.id, artifact.source, artifact.service, path.display());
                ProcessingOutcome {
                    id: company.id.clone(),
                    status: OutcomeStatus::Saved(artifact.source),
                    domain,
                    service: Some(artifact.service),
                    elapsed_ms,
                    error: None,
                }
            }
            Err(e) => {
                warn!("{}: failed to write logo: {}", company.id, e);
                ProcessingOutcome {
                    id: company.id.clone(),
                    status: OutcomeStatus::Failed,
                    domain,
                    service: Some(artifact.service),
                    elapsed_ms,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    fn failed(&self, company: &CompanyRecord, error: String) -> ProcessingOutcome {
        warn!("{}: {}", company.id, error);
        ProcessingOutcome {
            id: company.id.clone(),
            status: OutcomeStatus::Failed,
            domain: None,
            service: None,
            elapsed_ms: 0,
            error: Some(error),
        }
    }
}
