// src/services/fetch.rs
//! Acquisition of rendered markup. The rendering itself happens elsewhere; sources here
//! only hand back saved or served section HTML.

use async_trait::async_trait;
use log::{error, info, warn};
use reqwest::{Client, StatusCode};
use std::future::Future;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::FetchError;
use crate::models::{Granularity, MarkupBundle, Metric, ProviderRecords};

const PROVIDERS_FILE: &str = "providers.json";

/// File stem / path segment for one section, e.g. `eps_quarterly`.
pub fn section_name(metric: Metric, granularity: Granularity) -> String {
    let metric = match metric {
        Metric::Eps => "eps",
        Metric::Revenue => "revenue",
    };
    format!("{}_{}", metric, granularity)
}

pub const SECTIONS: [(Metric, Granularity); 4] = [
    (Metric::Eps, Granularity::Quarterly),
    (Metric::Eps, Granularity::Annual),
    (Metric::Revenue, Granularity::Quarterly),
    (Metric::Revenue, Granularity::Annual),
];

#[async_trait]
pub trait MarkupSource: Send + Sync {
    /// Rendered HTML of one section. `FetchError::NotFound` means the page has no such section.
    async fn fetch_section(
        &self,
        ticker: &str,
        metric: Metric,
        granularity: Granularity,
    ) -> Result<String, FetchError>;

    /// Estimate records the source keeps alongside the markup, in precedence order.
    async fn fetch_providers(&self, _ticker: &str) -> Result<Vec<ProviderRecords>, FetchError> {
        Ok(Vec::new())
    }
}

/// Serves sections from a snapshot service at `{base}/{TICKER}/{section}`.
pub struct HttpMarkupSource {
    client: Client,
    base_url: String,
}

impl HttpMarkupSource {
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()?;
        Ok(HttpMarkupSource {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        info!("Fetching {}", url);
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url.to_string()));
        }
        Ok(response.error_for_status()?.text().await?)
    }
}

#[async_trait]
impl MarkupSource for HttpMarkupSource {
    async fn fetch_section(
        &self,
        ticker: &str,
        metric: Metric,
        granularity: Granularity,
    ) -> Result<String, FetchError> {
        let url = format!(
            "{}/{}/{}",
            self.base_url,
            ticker.to_uppercase(),
            section_name(metric, granularity)
        );
        self.get_text(&url).await
    }

    async fn fetch_providers(&self, ticker: &str) -> Result<Vec<ProviderRecords>, FetchError> {
        let url = format!("{}/{}/providers", self.base_url, ticker.to_uppercase());
        match self.get_text(&url).await {
            Ok(body) => Ok(serde_json::from_str(&body)?),
            Err(FetchError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

/// Reads saved sections from `{dir}/{TICKER}/{section}.html`.
pub struct FileMarkupSource {
    dir: PathBuf,
}

impl FileMarkupSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileMarkupSource { dir: dir.into() }
    }

    async fn read(&self, path: PathBuf) -> Result<String, FetchError> {
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(FetchError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(FetchError::Io(e)),
        }
    }
}

#[async_trait]
impl MarkupSource for FileMarkupSource {
    async fn fetch_section(
        &self,
        ticker: &str,
        metric: Metric,
        granularity: Granularity,
    ) -> Result<String, FetchError> {
        let path = self
            .dir
            .join(ticker.to_uppercase())
            .join(format!("{}.html", section_name(metric, granularity)));
        self.read(path).await
    }

    async fn fetch_providers(&self, ticker: &str) -> Result<Vec<ProviderRecords>, FetchError> {
        let path = self.dir.join(ticker.to_uppercase()).join(PROVIDERS_FILE);
        match self.read(path).await {
            Ok(body) => Ok(serde_json::from_str(&body)?),
            Err(FetchError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

/// Fixed-interval bounded retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// Missing, malformed or unconfigured data will not change on a second try.
fn is_retryable(err: &FetchError) -> bool {
    !matches!(
        err,
        FetchError::NotFound(_) | FetchError::Parse(_) | FetchError::Unconfigured
    )
}

/// Runs `op` up to `policy.attempts` times, sleeping `policy.delay` between failures.
/// The last failure is returned once attempts are exhausted.
pub async fn fetch_with_retry<T, F, Fut>(
    what: &str,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !is_retryable(&e) => return Err(e),
            Err(e) if attempt >= attempts => {
                error!("{}: giving up after {} attempt(s): {}", what, attempt, e);
                return Err(e);
            }
            Err(e) => {
                warn!("{}: attempt {}/{} failed: {}", what, attempt, attempts, e);
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}

/// Per-section acquisition failure. Missing sections are not failures.
#[derive(Debug)]
pub struct SectionFailure {
    pub metric: Metric,
    pub granularity: Granularity,
    pub error: FetchError,
}

/// Fetches all four sections of a ticker. Absent sections stay `None`.
pub async fn fetch_bundle(
    source: &dyn MarkupSource,
    ticker: &str,
    policy: &RetryPolicy,
) -> (MarkupBundle, Vec<SectionFailure>) {
    let mut bundle = MarkupBundle::default();
    let mut failures = Vec::new();
    for (metric, granularity) in SECTIONS {
        let what = format!("[{}] {} {}", ticker, metric, granularity);
        let result = fetch_with_retry(&what, policy, || {
            source.fetch_section(ticker, metric, granularity)
        })
        .await;
        match result {
            Ok(markup) => bundle.set_section(metric, granularity, markup),
            Err(FetchError::NotFound(_)) => info!("{}: section not available", what),
            Err(error) => failures.push(SectionFailure { metric, granularity, error }),
        }
    }
    (bundle, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant() -> RetryPolicy {
        RetryPolicy { attempts: 3, delay: Duration::from_millis(0) }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = fetch_with_retry("flaky", &instant(), move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(FetchError::Io(std::io::Error::new(ErrorKind::Other, "boom")))
            } else {
                Ok("markup")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "markup");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn propagates_last_failure_after_exhausting_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), FetchError> = fetch_with_retry("down", &instant(), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Io(std::io::Error::new(ErrorKind::Other, "down")))
        })
        .await;
        assert!(matches!(result, Err(FetchError::Io(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn missing_sections_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), FetchError> = fetch_with_retry("absent", &instant(), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::NotFound("x".to_string()))
        })
        .await;
        assert!(matches!(result, Err(FetchError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn file_source_reads_saved_sections_and_providers() {
        let dir = tempfile::tempdir().unwrap();
        let ticker_dir = dir.path().join("ACME");
        fs::create_dir_all(&ticker_dir).unwrap();
        fs::write(ticker_dir.join("eps_quarterly.html"), "<div>eps</div>").unwrap();
        fs::write(
            ticker_dir.join(PROVIDERS_FILE),
            r#"[{"provider":"scanner","records":[{"epsEstimate":1.2}]}]"#,
        )
        .unwrap();

        let source = FileMarkupSource::new(dir.path());
        let (bundle, failures) = fetch_bundle(&source, "acme", &instant()).await;
        assert!(failures.is_empty());
        assert_eq!(bundle.eps_quarterly.as_deref(), Some("<div>eps</div>"));
        assert!(bundle.revenue_annual.is_none());

        let providers = source.fetch_providers("ACME").await.unwrap();
        assert_eq!(providers[0].records[0].eps_estimate, Some(1.2));
        assert!(source.fetch_providers("OTHER").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_provider_records_are_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let ticker_dir = dir.path().join("ACME");
        fs::create_dir_all(&ticker_dir).unwrap();
        fs::write(ticker_dir.join(PROVIDERS_FILE), "{not json").unwrap();
        let source = FileMarkupSource::new(dir.path());

        let calls = AtomicU32::new(0);
        let counter = &calls;
        let source_ref = &source;
        let result = fetch_with_retry("providers", &instant(), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            source_ref.fetch_providers("ACME").await
        })
        .await;
        assert!(matches!(result, Err(FetchError::Parse(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn names_sections() {
        assert_eq!(section_name(Metric::Revenue, Granularity::Annual), "revenue_annual");
    }
}
