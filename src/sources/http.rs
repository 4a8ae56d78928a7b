use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::io::Cursor;
use tracing::{debug, info, warn};

use super::{FetchError, FetchErrorKind, FetchOutcome, FetchedImage, LogoSource, SourceKind};
use crate::config::{HttpConfig, SourceConfig};
use crate::domain_utils::Domain;
use crate::rate_limit::{RateLimitContext, RetryHelper, SharedRateLimiter};

/// Body prefix kept in error messages
const SNIPPET_CHARS: usize = 120;

/// A logo service reached by substituting the domain into a URL template.
///
/// The `reqwest::Client` is built once and reused for every request so the
/// connection pool persists across companies and workers.
pub struct HttpLogoSource {
    name: String,
    kind: SourceKind,
    url_template: String,
    size: u32,
    client: reqwest::Client,
    limiter: SharedRateLimiter,
    retry: RetryHelper,
}

impl HttpLogoSource {
    pub fn new(
        source: &SourceConfig,
        http: &HttpConfig,
        size: u32,
        rate_limits: &RateLimitContext,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(http.request_timeout())
            .user_agent(&http.user_agent)
            .build()?;

        Ok(Self {
            name: source.name.clone(),
            kind: source.kind,
            url_template: source.url_template.clone(),
            size,
            client,
            limiter: rate_limits.limiter_for(&source.name),
            retry: rate_limits.retry_helper(),
        })
    }

    pub fn request_url(&self, domain: &Domain) -> String {
        self.url_template
            .replace("{domain}", domain.as_str())
            .replace("{size}", &self.size.to_string())
    }

    async fn fetch_once(&self, url: &str) -> FetchOutcome {
        self.limiter.acquire().await;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                snippet: body.chars().take(SNIPPET_CHARS).collect(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        if let Some(ct) = &content_type {
            if !is_image_content_type(ct) {
                return Err(FetchError::NotAnImage(ct.clone()));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))?;

        if bytes.is_empty() {
            return Err(FetchError::EmptyBody);
        }

        let bytes = bytes.to_vec();
        let reported_size = read_dimensions(&bytes);

        Ok(FetchedImage {
            bytes,
            content_type,
            reported_size,
        })
    }
}

#[async_trait]
impl LogoSource for HttpLogoSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(&self, domain: &Domain) -> FetchOutcome {
        let url = self.request_url(domain);
        let result = self
            .retry
            .with_retry(|| async {
                let attempt = self.fetch_once(&url).await;
                if let Err(e) = &attempt {
                    debug!("{} fetch for {} failed: {} ({:?})", self.name, domain, e, e.kind());
                }
                attempt
            })
            .await;

        match &result {
            Ok(image) => debug!(
                "{} returned {} bytes for {} (reported size {:?})",
                self.name,
                image.bytes.len(),
                domain,
                image.reported_size
            ),
            Err(e) => match e.kind() {
                FetchErrorKind::Transient => warn!("{} gave up on {} after retries: {}", self.name, domain, e),
                FetchErrorKind::Permanent => info!("{} has no logo for {}: {}", self.name, domain, e),
            },
        }
        result
    }
}

/// Services often send favicons as octet-stream; only clearly non-image
/// types are refused.
fn is_image_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime.starts_with("image/") || mime == "application/octet-stream" || mime.is_empty()
}

/// Read width and height from the image header without decoding pixels
fn read_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HttpConfig, RetryConfig};
    use crate::domain_utils::normalize_domain;
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Log sink shared with a test subscriber
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    /// Fetch from a server answering every request with `status`, capturing INFO+ logs
    async fn fetch_with_status(status: u16) -> (FetchOutcome, String) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;

        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let config = SourceConfig {
            name: "clearbit".to_string(),
            kind: SourceKind::Primary,
            url_template: format!("{}/{{domain}}", server.uri()),
            requests_per_second: 0,
        };
        let http = HttpConfig {
            user_agent: "logo-scraper-test/1.0".to_string(),
            request_timeout_secs: 5,
        };
        let retry = RetryConfig {
            max_retries: 1,
            base_delay_ms: 1,
            max_delay_ms: 2,
            jitter_ratio: 0.0,
            ..RetryConfig::default()
        };
        let rate_limits = RateLimitContext::from_config(&[config.clone()], &retry);
        let source = HttpLogoSource::new(&config, &http, 128, &rate_limits).unwrap();

        let outcome = source.fetch(&normalize_domain("acme.com").unwrap()).await;
        (outcome, logs.text())
    }

    fn test_source(template: &str) -> HttpLogoSource {
        let config = SourceConfig {
            name: "test".to_string(),
            kind: SourceKind::Primary,
            url_template: template.to_string(),
            requests_per_second: 0,
        };
        let http = HttpConfig {
            user_agent: "logo-scraper-test/1.0".to_string(),
            request_timeout_secs: 5,
        };
        let rate_limits = RateLimitContext::from_config(&[config.clone()], &RetryConfig::default());
        HttpLogoSource::new(&config, &http, 256, &rate_limits).unwrap()
    }

    #[test]
    fn test_request_url_substitution() {
        let domain = normalize_domain("acme.com").unwrap();
        let primary = test_source("https://logo.example.com/{domain}?size={size}");
        assert_eq!(primary.request_url(&domain), "https://logo.example.com/acme.com?size=256");

        let favicon = test_source("https://icons.example.com/ip3/{domain}.ico");
        assert_eq!(favicon.request_url(&domain), "https://icons.example.com/ip3/acme.com.ico");
    }

    #[test]
    fn test_image_content_types() {
        assert!(is_image_content_type("image/png"));
        assert!(is_image_content_type("image/x-icon"));
        assert!(is_image_content_type("IMAGE/JPEG; charset=binary"));
        assert!(is_image_content_type("application/octet-stream"));
        assert!(!is_image_content_type("text/html; charset=utf-8"));
        assert!(!is_image_content_type("application/json"));
    }

    #[tokio::test]
    async fn test_permanent_failure_logged_at_info() {
        let (outcome, logs) = fetch_with_status(404).await;

        assert!(matches!(outcome, Err(FetchError::Status { status: 404, .. })));
        assert!(logs.contains("INFO"), "logs: {}", logs);
        assert!(logs.contains("clearbit has no logo for acme.com"), "logs: {}", logs);
        // Per-attempt detail stays at debug
        assert!(!logs.contains("fetch for acme.com failed"), "logs: {}", logs);
    }

    #[tokio::test]
    async fn test_exhausted_retries_logged_at_warn() {
        let (outcome, logs) = fetch_with_status(503).await;

        assert!(matches!(outcome, Err(FetchError::Status { status: 503, .. })));
        assert!(logs.contains("WARN"), "logs: {}", logs);
        assert!(logs.contains("clearbit gave up on acme.com after retries"), "logs: {}", logs);
    }

    #[test]
    fn test_read_dimensions() {
        let img = image::RgbaImage::new(30, 40);
        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        assert_eq!(read_dimensions(&png), Some((30, 40)));
        assert_eq!(read_dimensions(b"<html>not an image</html>"), None);
    }
}
