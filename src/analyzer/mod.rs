// src/analyzer/mod.rs
// =============================================================================
// Page analysis: fetch one page, describe it, and check its links.
//
// Submodules:
// - html: DOCTYPE, title, headings and hrefs out of the document
// - login: login form heuristic
// - cache: TTL cache for finished results
// - breaker: circuit breaker around page fetches
// - metrics: request counters
//
// Flow for one request:
//   raw URL -> normalize -> cache? -> breaker -> GET -> extract
//   -> links::Scheduler -> AnalysisResult
//
// analyze() never fails. Anything that goes wrong at page level is put
// into AnalysisResult::error, so the CLI and the HTTP API can both report
// it alongside whatever was learned before the failure.
// =============================================================================

mod breaker;
mod cache;
mod html;
mod login;
mod metrics;

pub use breaker::{BreakerState, CircuitBreaker};
pub use cache::TtlCache;
pub use html::{detect_html_version, extract_page, PageFacts};
pub use login::{has_login_form, is_login_form};
pub use metrics::{Metrics, MetricsSnapshot};

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::AnalyzerConfig;
use crate::error::AnalysisError;
use crate::links::{AnalysisBatch, BatchReport, ClientPool, Prober, Scheduler};

/// What the analyzer reports for one page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    pub url: String,
    pub html_version: String,
    pub page_title: String,
    pub heading_counts: BTreeMap<String, usize>,
    pub internal_links: usize,
    pub external_links: usize,
    pub inaccessible_links: usize,
    pub has_login_form: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AnalysisError>,
    /// Status of the page fetch, when one got that far
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl AnalysisResult {
    fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    fn failed(mut self, error: AnalysisError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    fn apply_facts(&mut self, facts: PageFacts) {
        self.html_version = facts.html_version;
        self.page_title = facts.title;
        self.heading_counts = facts.heading_counts;
        self.has_login_form = facts.has_login_form;
    }

    fn apply_links(&mut self, report: &BatchReport) {
        self.internal_links = report.counts.internal_links;
        self.external_links = report.counts.external_links;
        self.inaccessible_links = report.counts.inaccessible_links;
    }
}

// Turns user input into an absolute http(s) URL.
// "example.com/docs" becomes "https://example.com/docs".
pub fn normalize_url(raw: &str) -> Result<Url, AnalysisError> {
    let trimmed = raw.trim();
    let invalid = |reason: String| AnalysisError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };

    if trimmed.is_empty() {
        return Err(invalid("URL is empty".to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let url = Url::parse(&candidate).map_err(|e| invalid(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("URL has no host".to_string()));
    }

    Ok(url)
}

pub struct Analyzer {
    config: AnalyzerConfig,
    pool: ClientPool,
    scheduler: Scheduler,
    cache: TtlCache<AnalysisResult>,
    breaker: CircuitBreaker,
    metrics: Metrics,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        let pool = ClientPool::new(config.pool.clone());
        let scheduler = Scheduler::new(Prober::new(pool.clone()));
        let cache = TtlCache::new(config.cache_ttl, config.cache_capacity);
        let breaker = CircuitBreaker::new(
            config.breaker_failure_threshold,
            config.breaker_open_timeout,
            config.breaker_success_threshold,
        );

        Self {
            config,
            pool,
            scheduler,
            cache,
            breaker,
            metrics: Metrics::new(),
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn cache(&self) -> &TtlCache<AnalysisResult> {
        &self.cache
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub async fn analyze(&self, raw_url: &str) -> AnalysisResult {
        self.analyze_with_cancel(raw_url, &CancellationToken::new()).await
    }

    // Same as analyze(), but stops early when `cancel` fires (for example
    // when the HTTP client that asked has gone away).
    pub async fn analyze_with_cancel(&self, raw_url: &str, cancel: &CancellationToken) -> AnalysisResult {
        let _active = self.metrics.start_request();
        let started = Instant::now();

        let result = self.run(raw_url, cancel).await;

        self.metrics.record_duration(started.elapsed());
        match &result.error {
            None => info!(
                url = %result.url,
                total_ms = started.elapsed().as_millis() as u64,
                internal = result.internal_links,
                external = result.external_links,
                inaccessible = result.inaccessible_links,
                headings = result.heading_counts.values().sum::<usize>(),
                login_form = result.has_login_form,
                html_version = %result.html_version,
                "analysis done"
            ),
            Some(error) => warn!(url = %result.url, code = error.code(), %error, "analysis failed"),
        }
        result
    }

    async fn run(&self, raw_url: &str, cancel: &CancellationToken) -> AnalysisResult {
        info!(url = raw_url, "analysis started");

        let url = match normalize_url(raw_url) {
            Ok(url) => url,
            Err(error) => return AnalysisResult::new(raw_url.trim()).failed(error),
        };

        if let Some(cached) = self.cache.get(url.as_str()) {
            self.metrics.record_cache_hit();
            debug!(url = %url, "analysis served from cache");
            return cached;
        }
        self.metrics.record_cache_miss();

        let mut result = AnalysisResult::new(url.as_str());

        if !self.breaker.try_acquire() {
            return result.failed(AnalysisError::CircuitOpen { url: url.to_string() });
        }

        match self.fetch_and_analyze(&url, &mut result, cancel).await {
            Ok(()) => {
                self.breaker.record_success();
                self.cache.insert(url.as_str(), result.clone());
                result
            }
            // The caller gave up; that says nothing about the upstream
            Err(error) if cancel.is_cancelled() => result.failed(error),
            Err(error) => {
                self.breaker.record_failure();
                result.failed(error)
            }
        }
    }

    async fn fetch_and_analyze(
        &self,
        url: &Url,
        result: &mut AnalysisResult,
        cancel: &CancellationToken,
    ) -> Result<(), AnalysisError> {
        let (status, body) = tokio::select! {
            fetched = self.fetch(url) => fetched?,
            _ = cancel.cancelled() => return Err(cancelled()),
        };

        result.status_code = Some(status);
        if status >= 400 {
            return Err(AnalysisError::Http {
                url: url.to_string(),
                status,
            });
        }

        // The parsed document can't be held across an await, so it is
        // reduced to plain facts right here
        let facts = extract_page(&body)?;
        debug!(url = %url, links = facts.links.len(), html_version = %facts.html_version, "page parsed");

        let links = facts.links.clone();
        result.apply_facts(facts);

        let report = self
            .scheduler
            .run_with_cancel(AnalysisBatch::new(links, url.clone()), cancel)
            .await;
        result.apply_links(&report);

        // Partial counts must not be cached or passed off as a full analysis
        if report.cancelled {
            return Err(cancelled());
        }

        Ok(())
    }

    // GETs the page and reads the body. Error statuses still return the
    // body, the caller decides what a status means.
    async fn fetch(&self, url: &Url) -> Result<(u16, String), AnalysisError> {
        let timeout = self.config.fetch_timeout;
        let client = self.pool.acquire().map_err(|e| AnalysisError::Internal(e.to_string()))?;

        let response = client
            .get(url.as_str())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| AnalysisError::from_fetch(url.as_str(), timeout, e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            if e.is_decode() {
                AnalysisError::Parse {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            } else {
                AnalysisError::from_fetch(url.as_str(), timeout, e)
            }
        })?;

        Ok((status, body))
    }
}

fn cancelled() -> AnalysisError {
    AnalysisError::Internal("analysis cancelled".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn analyzer() -> Analyzer {
        Analyzer::new(AnalyzerConfig::default())
    }

    // Links on the page: two internal, one external (same mock server under
    // a different host name), one skipped
    fn page(server: &MockServer) -> String {
        let port = server.address().port();
        format!(
            r##"<!DOCTYPE html>
<html>
<head><title>Mock Page</title></head>
<body>
    <h1>Welcome</h1>
    <h2>Section</h2>
    <a href="/about">About</a>
    <a href="contact">Contact</a>
    <a href="http://localhost:{port}/elsewhere">Elsewhere</a>
    <a href="#top">Top</a>
    <form action="/login">
        <input type="email" name="email">
        <input type="password" name="password">
    </form>
</body>
</html>"##
        )
    }

    async fn mount_page(server: &MockServer, expected_gets: u64) {
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page(server)))
            .expect(expected_gets)
            .mount(server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/elsewhere"))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("example.com").unwrap().as_str(), "https://example.com/");
        assert_eq!(
            normalize_url("  http://example.com/a?b=1 ").unwrap().as_str(),
            "http://example.com/a?b=1"
        );

        for bad in ["", "   ", "ftp://example.com", "https://", "http://exa mple.com"] {
            let err = normalize_url(bad).unwrap_err();
            assert_eq!(err.code(), "INVALID_URL", "{bad:?}");
        }
    }

    #[tokio::test]
    async fn test_analyze_page() {
        let server = MockServer::start().await;
        mount_page(&server, 1).await;

        let result = analyzer().analyze(&server.uri()).await;

        assert!(result.is_ok(), "{:?}", result.error);
        assert_eq!(result.status_code, Some(200));
        assert_eq!(result.html_version, "HTML5");
        assert_eq!(result.page_title, "Mock Page");
        assert_eq!(result.heading_counts.get("h1"), Some(&1));
        assert_eq!(result.heading_counts.get("h2"), Some(&1));
        assert_eq!(result.internal_links, 2);
        assert_eq!(result.external_links, 1);
        assert_eq!(result.inaccessible_links, 0);
        assert!(result.has_login_form);
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let server = MockServer::start().await;
        // The page must be fetched exactly once
        mount_page(&server, 1).await;
        let analyzer = analyzer();

        let first = analyzer.analyze(&server.uri()).await;
        let second = analyzer.analyze(&server.uri()).await;

        assert_eq!(first, second);
        let metrics = analyzer.metrics();
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.cache_misses, 1);
        assert_eq!(metrics.total_requests, 2);
        assert_eq!(metrics.active_requests, 0);
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let result = analyzer().analyze("ftp://example.com").await;
        let error = result.error.expect("should fail");
        assert_eq!(error.code(), "INVALID_URL");
        assert_eq!(result.status_code, None);
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("<h1>Not Found</h1>"))
            .mount(&server)
            .await;
        let analyzer = analyzer();

        let result = analyzer.analyze(&format!("{}/missing", server.uri())).await;

        assert_eq!(result.status_code, Some(404));
        assert_eq!(
            result.error,
            Some(AnalysisError::Http {
                url: format!("{}/missing", server.uri()),
                status: 404,
            })
        );
        // Failures are not cached
        assert!(analyzer.cache().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;
        let mut config = AnalyzerConfig::default();
        config.fetch_timeout = Duration::from_millis(200);

        let result = Analyzer::new(config).analyze(&server.uri()).await;

        assert_eq!(result.error.map(|e| e.code()), Some("TIMEOUT_ERROR"));
    }

    #[tokio::test]
    async fn test_network_error() {
        let result = analyzer().analyze("http://127.0.0.1:1/").await;
        assert_eq!(result.error.map(|e| e.code()), Some("NETWORK_ERROR"));
    }

    #[tokio::test]
    async fn test_breaker_opens_after_repeated_failures() {
        let mut config = AnalyzerConfig::default();
        config.breaker_failure_threshold = 2;
        let analyzer = Analyzer::new(config);

        for _ in 0..2 {
            let result = analyzer.analyze("http://127.0.0.1:1/").await;
            assert_eq!(result.error.map(|e| e.code()), Some("NETWORK_ERROR"));
        }

        let result = analyzer.analyze("http://127.0.0.1:1/").await;
        assert_eq!(result.error.map(|e| e.code()), Some("CIRCUIT_OPEN"));
        assert_eq!(analyzer.breaker().state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn test_cancelled_analysis() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let started = Instant::now();
        let result = analyzer().analyze_with_cancel(&server.uri(), &cancel).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(result.error.map(|e| e.code()), Some("INTERNAL_ERROR"));
    }

    #[tokio::test]
    async fn test_cancelled_during_link_checks_is_not_cached() {
        let server = MockServer::start().await;
        let port = server.address().port();
        let body = format!(
            r#"<!DOCTYPE html><title>Slow links</title>
            <a href="/here">Here</a>
            <a href="http://localhost:{port}/slow">Slow</a>"#
        );
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let analyzer = analyzer();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            // The page fetch is instant; the external HEAD is still pending
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = analyzer.analyze_with_cancel(&server.uri(), &cancel).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(result.status_code, Some(200));
        assert_eq!(result.error.map(|e| e.code()), Some("INTERNAL_ERROR"));

        let key = normalize_url(&server.uri()).unwrap();
        assert_eq!(analyzer.cache().get(key.as_str()), None);
        // Giving up is not an upstream failure
        assert_eq!(analyzer.breaker().state(), BreakerState::Closed);
    }

    #[test]
    fn test_result_json_shape() {
        let mut result = AnalysisResult::new("https://example.com/");
        result.heading_counts.insert("h1".to_string(), 2);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["url"], "https://example.com/");
        assert_eq!(json["heading_counts"]["h1"], 2);
        assert!(json.get("error").is_none());
        assert!(json.get("status_code").is_none());

        let json = serde_json::to_value(result.failed(AnalysisError::CircuitOpen {
            url: "https://example.com/".to_string(),
        }))
        .unwrap();
        assert_eq!(json["error"]["code"], "CIRCUIT_OPEN");
    }
}
