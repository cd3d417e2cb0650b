// src/cli.rs
// =============================================================================
// Command-line interface, built with clap's derive API.
//
//   page-analyzer analyze <URL> [--json]
//   page-analyzer serve [--port N]
//
// The tuning flags are global, so they can go before or after the
// subcommand. Their defaults are the analyzer defaults in config.rs.
// =============================================================================

use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::config::AnalyzerConfig;

#[derive(Parser, Debug)]
#[command(
    name = "page-analyzer",
    version,
    about = "Analyzes a web page: HTML version, title, headings, links and login forms",
    long_about = "page-analyzer fetches a web page, describes its structure and checks every link on it. \
                  Run a single analysis from the terminal, or serve the analyzer over HTTP."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub tuning: Tuning,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze one page and print the result
    ///
    /// Example: page-analyzer analyze https://example.com
    Analyze {
        /// Page to analyze; "https://" is assumed when no scheme is given
        url: String,

        /// Output the result as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Serve the analyzer over HTTP
    ///
    /// Example: page-analyzer serve --port 3000
    Serve {
        /// Port to listen on
        #[arg(long, env = "PORT", default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Args, Debug)]
pub struct Tuning {
    /// Timeout for each link probe (HEAD request), in seconds
    #[arg(long, global = true, default_value_t = 3)]
    pub probe_timeout_secs: u64,

    /// Timeout for fetching the analyzed page, in seconds
    #[arg(long, global = true, default_value_t = 30)]
    pub fetch_timeout_secs: u64,

    /// How long a successful analysis is served from cache, in seconds
    #[arg(long, global = true, default_value_t = 300)]
    pub cache_ttl_secs: u64,
}

impl Tuning {
    pub fn analyzer_config(&self) -> AnalyzerConfig {
        let mut config =
            AnalyzerConfig::default().with_probe_timeout(Duration::from_secs(self.probe_timeout_secs));
        config.fetch_timeout = Duration::from_secs(self.fetch_timeout_secs);
        config.cache_ttl = Duration::from_secs(self.cache_ttl_secs);
        config
    }
}
