// src/config.rs
// =============================================================================
// Tunables for the analyzer.
//
// The defaults are the values the service has always run with. The CLI
// overrides the handful that operators actually touch (see cli.rs).
// =============================================================================

use std::time::Duration;

use crate::links::PoolConfig;

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Budget for fetching the analyzed page itself
    pub fetch_timeout: Duration,
    /// How long a finished analysis is served from the cache
    pub cache_ttl: Duration,
    /// Most results the cache holds at once
    pub cache_capacity: u64,
    /// Consecutive failures before the breaker opens
    pub breaker_failure_threshold: u32,
    /// Successes in half-open state before the breaker closes again
    pub breaker_success_threshold: u32,
    /// How long an open breaker rejects calls before trying again
    pub breaker_open_timeout: Duration,
    /// Transport settings for link probes (probe timeout lives here)
    pub pool: PoolConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(30),
            cache_ttl: Duration::from_secs(5 * 60),
            cache_capacity: 1000,
            breaker_failure_threshold: 5,
            breaker_success_threshold: 2,
            breaker_open_timeout: Duration::from_secs(30),
            pool: PoolConfig::default(),
        }
    }
}

impl AnalyzerConfig {
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.pool.request_timeout = timeout;
        self
    }
}
