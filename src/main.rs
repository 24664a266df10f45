// Copyright 2026 Sitescan Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;

use sitescan::analytics::AnalyticsSink;
use sitescan::config::{self, ScanConfig};
use sitescan::progress::ProgressEvent;
use sitescan::prompts::cache::PromptCache;
use sitescan::scan::{ScanRegistry, ScanStatus};
use sitescan::{browser, rest};

#[derive(Parser)]
#[command(
    name = "sitescan",
    about = "Automated QA scans for public websites",
    version,
    after_help = "Run 'sitescan <command> --help' for details on each command."
)]
struct Cli {
    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API (scans, progress events, reports)
    Serve {
        /// Port to listen on (loopback only)
        #[arg(long, default_value = "7810")]
        port: u16,
    },
    /// Scan one site from the terminal and print the result
    Scan {
        /// Seed URL, e.g. "https://example.com"
        url: String,
        /// Maximum number of pages to discover
        #[arg(long, default_value = "20")]
        max_pages: usize,
        /// Concurrent page loads during discovery
        #[arg(long, default_value = "3")]
        concurrency: usize,
        /// Print the full report as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Check environment and diagnose issues
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Serve { port } => {
            let registry = build_registry(ScanConfig::default());
            rest::serve(port, registry).await
        }
        Commands::Scan {
            url,
            max_pages,
            concurrency,
            json,
        } => {
            let registry = build_registry(ScanConfig {
                max_pages,
                max_concurrency: concurrency,
            });
            run_cli_scan(&registry, &url, json).await
        }
        Commands::Doctor => {
            doctor();
            Ok(())
        }
    }
}

fn build_registry(scan_config: ScanConfig) -> Arc<ScanRegistry> {
    let prompt_cache = Arc::new(PromptCache::open(PromptCache::default_path()));
    let analytics = Arc::new(AnalyticsSink::open(AnalyticsSink::default_path()));
    Arc::new(ScanRegistry::new(prompt_cache, analytics, scan_config))
}

async fn run_cli_scan(registry: &Arc<ScanRegistry>, url: &str, json: bool) -> Result<()> {
    let id = registry.start_scan(url)?;

    let guard = registry.subscribe_progress(&id, move |event: &ProgressEvent| {
        eprintln!("[{:>3}%] {} {}", event.progress, event.phase, event.message);
    });

    // The scan runs in the background; poll the registry for terminal state.
    let snapshot = loop {
        tokio::time::sleep(Duration::from_millis(200)).await;
        match registry.get_report(&id) {
            Some(snapshot) if snapshot.status != ScanStatus::Running => break snapshot,
            Some(_) => continue,
            None => anyhow::bail!("scan {id} disappeared from the registry"),
        }
    };
    if let Some(guard) = guard {
        guard.detach();
    }

    match snapshot.status {
        ScanStatus::Complete => {
            let report = snapshot
                .report
                .ok_or_else(|| anyhow::anyhow!("complete scan carries no report"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "{}: {} page(s), {} defect(s) ({} critical, {} warning, {} info)",
                    report.url,
                    report.pages_found,
                    report.summary.total_defects,
                    report.summary.critical,
                    report.summary.warning,
                    report.summary.info
                );
                for warning in &report.warnings {
                    println!("note: {warning}");
                }
            }
            Ok(())
        }
        ScanStatus::Error => {
            anyhow::bail!(
                "scan failed: {}",
                snapshot.error.unwrap_or_else(|| "unknown error".to_string())
            )
        }
        ScanStatus::Running => unreachable!("loop exits only on terminal status"),
    }
}

fn doctor() {
    match browser::find_chromium() {
        Some(path) => println!("chromium: {}", path.display()),
        None => println!(
            "chromium: NOT FOUND (install Chrome or set {})",
            config::CHROMIUM_PATH_ENV
        ),
    }
    let has_key = std::env::var(config::LLM_API_KEY_ENV)
        .map(|k| !k.trim().is_empty())
        .unwrap_or(false);
    println!(
        "llm: {}",
        if has_key {
            "API key configured"
        } else {
            "no API key (template prompts only)"
        }
    );
    let data_dir = config::data_dir();
    let writable = std::fs::create_dir_all(&data_dir).is_ok();
    println!(
        "data dir: {} ({})",
        data_dir.display(),
        if writable { "writable" } else { "NOT WRITABLE" }
    );
}
