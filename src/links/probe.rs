// src/links/probe.rs
// =============================================================================
// Checks whether an external link is reachable.
//
// Key functionality:
// - One HEAD request per link (headers only, no body download)
// - Short per-request timeout so one slow host can't eat the batch budget
// - Browser-like headers, set on every pooled client
// - Fail-closed: any error at all means "inaccessible"
// - No retries: a timeout is the answer for this analysis pass
//
// Only external links come through here. Internal links are assumed to be
// reachable, which keeps us from hammering the very site we are analyzing.
// =============================================================================

use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::pool::ClientPool;
use super::LinkError;

/// Issues accessibility probes using clients from a shared pool
#[derive(Clone)]
pub struct Prober {
    pool: ClientPool,
}

impl Prober {
    pub fn new(pool: ClientPool) -> Self {
        Self { pool }
    }

    // Probes a URL and folds every failure mode into `false`.
    pub async fn probe(&self, url: &str) -> bool {
        let never_cancelled = CancellationToken::new();
        self.try_probe(url, &never_cancelled).await.unwrap_or(false)
    }

    // Like probe(), but reports the one failure that is not about the target
    // at all: not being able to get an HTTP client. Network errors, timeouts
    // and bad statuses are still Ok(false).
    //
    // If `cancel` fires while the request is in flight the request future is
    // dropped, which closes the connection, and the link counts as
    // inaccessible.
    pub async fn try_probe(&self, url: &str, cancel: &CancellationToken) -> Result<bool, LinkError> {
        // The guard goes back to the pool when this function returns,
        // whichever branch we leave through
        let client = self.pool.acquire()?;

        let request = client.head(url).send();

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(url, "probe cancelled");
                return Ok(false);
            }
            result = request => result,
        };

        let accessible = match result {
            Ok(response) => {
                let status = response.status();
                if !is_accessible_status(status) {
                    debug!(url, status = status.as_u16(), "link inaccessible");
                }
                is_accessible_status(status)
            }
            Err(error) => {
                debug!(url, reason = failure_reason(&error), %error, "probe failed");
                false
            }
        };

        Ok(accessible)
    }
}

// 2xx and 3xx count as reachable; 4xx and 5xx don't
pub fn is_accessible_status(status: StatusCode) -> bool {
    (200..400).contains(&status.as_u16())
}

// Short label for the log line. Same categories a human would use when
// looking at a broken link: did it time out, did DNS fail, was it TLS...
fn failure_reason(error: &reqwest::Error) -> &'static str {
    let message = error.to_string().to_lowercase();

    if error.is_timeout() {
        "timeout"
    } else if error.is_redirect() {
        "too_many_redirects"
    } else if error.is_connect() {
        if message.contains("dns") {
            "dns"
        } else {
            "connect"
        }
    } else if message.contains("certificate") || message.contains("tls") || message.contains("ssl") {
        "tls"
    } else if error.is_builder() {
        "invalid_url"
    } else {
        "other"
    }
}

// -----------------------------------------------------------------------------
// NOTES:
//
// 1. Why HEAD and not GET?
//    - We only need the status code
//    - HEAD asks the server for headers only, so nothing large is downloaded
//    - A few servers answer HEAD with 405; those links show up as
//      inaccessible, same as any other 4xx
//
// 2. Why does tokio::select! cancel the request?
//    - select! drops the branch that did not finish
//    - Dropping a reqwest future aborts the request and its connection
//    - So a cancelled probe stops using the network right away instead of
//      waiting for its own timeout
// -----------------------------------------------------------------------------
