// src/links/mod.rs
// =============================================================================
// The concurrent link-analysis engine.
//
// Submodules:
// - classify: resolves a raw href against the page URL, internal vs external
// - pool: reusable pool of pre-configured HTTP clients
// - probe: HEAD request that decides whether an external link is reachable
// - scheduler: fans links out over workers under a batch deadline
// - aggregate: folds per-link outcomes into the final counts
//
// Flow for one page:
//   AnalysisBatch -> Scheduler -> workers (classify, probe) -> LinkOutcome
//   -> Aggregator -> AggregateCounts
// =============================================================================

mod aggregate;
mod classify;
mod pool;
mod probe;
mod scheduler;

pub use aggregate::{AggregateCounts, LinkOutcome, Verdict};
pub use classify::{classify, Classification};
pub use pool::{ClientPool, PoolConfig, PoolError, PooledClient};
pub use probe::Prober;
pub use scheduler::{deadline_for, workers_for, AnalysisBatch, BatchReport, Scheduler};

use thiserror::Error;

// Everything that can go wrong for a single link.
//
// None of these ever abort a batch: the worker wraps them in a
// LinkOutcome and moves on to its next job.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("cannot resolve href {href:?}: {source}")]
    Resolve {
        href: String,
        #[source]
        source: url::ParseError,
    },

    #[error("no HTTP client available for probe: {0}")]
    Pool(#[from] PoolError),
}
