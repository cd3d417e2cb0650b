// src/links/pool.rs
// =============================================================================
// A small pool of pre-configured reqwest clients for link probes.
//
// Building a reqwest::Client sets up a TLS config, a DNS resolver and a
// connection pool, so we keep finished clients around and hand them out
// again instead of rebuilding one per probe.
//
// Semantics:
// - acquire() never waits: if no idle client is available a fresh one is
//   built on the spot (get-or-create)
// - the returned PooledClient is a guard; dropping it puts the client back
// - at most `max_idle` clients are kept, extras are simply dropped
//
// The pool is an ordinary value owned by whoever builds it (the analyzer),
// not a process-wide global.
// =============================================================================

use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

// Many sites answer bot-looking requests with 403, which would make
// perfectly healthy links look broken
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const BROWSER_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.5";

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Transport settings shared by every client the pool builds
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Whole-request timeout (connect + headers + body)
    pub request_timeout: Duration,
    /// TCP connect + TLS handshake budget
    pub connect_timeout: Duration,
    /// How long an idle keep-alive connection is kept
    pub idle_timeout: Duration,
    /// Idle connections kept per host
    pub max_idle_per_host: usize,
    /// Released clients kept for reuse
    pub max_idle: usize,
    pub max_redirects: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(2),
            idle_timeout: Duration::from_secs(30),
            max_idle_per_host: 10,
            max_idle: 100,
            max_redirects: 10,
        }
    }
}

struct Inner {
    config: PoolConfig,
    idle: Mutex<Vec<Client>>,
}

/// Cheap to clone; clones share the same set of idle clients
#[derive(Clone)]
pub struct ClientPool {
    inner: Arc<Inner>,
}

impl ClientPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                idle: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    // Takes an idle client or builds a new one.
    // Only fails if reqwest cannot build a client at all (broken TLS
    // backend, for example).
    pub fn acquire(&self) -> Result<PooledClient, PoolError> {
        let reused = self.lock_idle().pop();

        let client = match reused {
            Some(client) => client,
            None => {
                debug!("client pool empty, building a new client");
                build_client(&self.inner.config)?
            }
        };

        Ok(PooledClient {
            client,
            pool: Arc::clone(&self.inner),
        })
    }

    /// Number of clients currently waiting for reuse
    pub fn idle_count(&self) -> usize {
        self.lock_idle().len()
    }

    fn lock_idle(&self) -> std::sync::MutexGuard<'_, Vec<Client>> {
        lock(&self.inner.idle)
    }
}

// A poisoned lock only means another thread panicked while pushing or
// popping a Vec entry; the Vec itself is still fine
fn lock(idle: &Mutex<Vec<Client>>) -> std::sync::MutexGuard<'_, Vec<Client>> {
    idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn build_client(config: &PoolConfig) -> Result<Client, PoolError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(BROWSER_ACCEPT_LANGUAGE));

    let client = Client::builder()
        .default_headers(headers)
        .timeout(config.request_timeout)
        .connect_timeout(config.connect_timeout)
        .pool_idle_timeout(config.idle_timeout)
        .pool_max_idle_per_host(config.max_idle_per_host)
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        .build()?;

    Ok(client)
}

/// A client on loan from the pool. Returned automatically on drop.
pub struct PooledClient {
    client: Client,
    pool: Arc<Inner>,
}

impl std::ops::Deref for PooledClient {
    type Target = Client;

    fn deref(&self) -> &Client {
        &self.client
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        // reqwest::Client is a handle around an Arc, so handing a clone back
        // shares the same connection pool as the one we are dropping
        let mut idle = lock(&self.pool.idle);
        if idle.len() < self.pool.config.max_idle {
            idle.push(self.client.clone());
        } else {
            debug!(max_idle = self.pool.config.max_idle, "client pool full, dropping client");
        }
    }
}
