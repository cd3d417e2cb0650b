// src/lib.rs
// =============================================================================
// page-analyzer: fetches a web page and reports its HTML version, title,
// heading counts, link health and whether it carries a login form.
//
// Modules:
// - links: the concurrent link-analysis engine
// - analyzer: page fetch, extraction, cache, circuit breaker, metrics
// - server: axum HTTP API
// - cli: command-line definitions (used by src/main.rs)
// =============================================================================

pub mod analyzer;
pub mod cli;
pub mod config;
pub mod error;
pub mod links;
pub mod server;

pub use analyzer::{AnalysisResult, Analyzer};
pub use config::AnalyzerConfig;
pub use error::AnalysisError;
