// src/main.rs
// =============================================================================
// Entry point of the page-analyzer binary.
//
// What happens here:
// 1. Set up logging (tracing, to stderr so stdout stays clean for output)
// 2. Parse command-line arguments using clap
// 3. Dispatch to the subcommand handler
// 4. Exit with proper code (0 = success, 1 = analysis reported an error,
//    2 = unexpected failure)
// =============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use page_analyzer::cli::{Cli, Commands};
use page_analyzer::{server, AnalysisResult, Analyzer, AnalyzerConfig};

#[tokio::main]
async fn main() {
    init_tracing();

    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            2
        }
    };

    std::process::exit(exit_code);
}

// RUST_LOG overrides the default level
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = cli.tuning.analyzer_config();

    match cli.command {
        Commands::Analyze { url, json } => handle_analyze(&url, json, config).await,
        Commands::Serve { port } => {
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            server::serve(addr, Arc::new(Analyzer::new(config))).await?;
            Ok(0)
        }
    }
}

async fn handle_analyze(url: &str, json: bool, config: AnalyzerConfig) -> Result<i32> {
    let analyzer = Analyzer::new(config);
    let result = analyzer.analyze(url).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_table(&result);
    }

    Ok(if result.is_ok() { 0 } else { 1 })
}

fn print_table(result: &AnalysisResult) {
    println!("{:<22} {}", "URL", result.url);

    if let Some(error) = &result.error {
        if let Some(status) = result.status_code {
            println!("{:<22} {}", "Status", status);
        }
        println!("{:<22} {} ({})", "Error", error, error.code());
        return;
    }

    println!("{:<22} {}", "HTML version", result.html_version);
    println!("{:<22} {}", "Title", result.page_title);

    let headings = if result.heading_counts.is_empty() {
        "none".to_string()
    } else {
        result
            .heading_counts
            .iter()
            .map(|(level, count)| format!("{level}: {count}"))
            .collect::<Vec<_>>()
            .join(", ")
    };
    println!("{:<22} {}", "Headings", headings);

    println!("{:<22} {}", "Internal links", result.internal_links);
    println!("{:<22} {}", "External links", result.external_links);
    println!("{:<22} {}", "Inaccessible links", result.inaccessible_links);
    println!(
        "{:<22} {}",
        "Login form",
        if result.has_login_form { "yes" } else { "no" }
    );
}
