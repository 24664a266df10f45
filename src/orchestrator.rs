//! End-to-end scan pipeline.
//!
//! Crawl, then drive every tester over every discovered page, then fill
//! remediation hints, then build the report; progress events are published
//! at each stage with monotonically non-decreasing percentages. The whole
//! scan runs under a 5 minute deadline; that deadline is the only failure
//! that loses partial results.

use crate::config::{self, ScanConfig};
use crate::defects::Defect;
use crate::driver;
use crate::progress::{Phase, ProgressBus, ScanProgress};
use crate::prompts::{self, cache::PromptCache, llm::LlmClient};
use crate::report::{self, Report};
use crate::{browser, crawler};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// What a finished pipeline hands back to the scan registry.
pub struct ScanOutcome {
    pub report: Report,
    /// True when any remediation hint came from templates; analytics wants it.
    pub used_templates: bool,
}

/// Run a full scan of `seed`. Fails on browser launch failure or the
/// whole-scan deadline; everything below that degrades per stage.
pub async fn run_scan(
    seed: &str,
    scan_config: ScanConfig,
    bus: Arc<ProgressBus>,
    prompt_cache: Arc<PromptCache>,
    client: Option<LlmClient>,
) -> Result<ScanOutcome> {
    match tokio::time::timeout(
        config::SCAN_TIMEOUT,
        pipeline(seed, scan_config, bus, prompt_cache, client),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => anyhow::bail!(
            "scan timed out after {} seconds",
            config::SCAN_TIMEOUT.as_secs()
        ),
    }
}

async fn pipeline(
    seed: &str,
    scan_config: ScanConfig,
    bus: Arc<ProgressBus>,
    prompt_cache: Arc<PromptCache>,
    client: Option<LlmClient>,
) -> Result<ScanOutcome> {
    let progress = ScanProgress::new(bus);

    progress.emit(Phase::Crawling, "Starting page discovery...", 0);
    let mut pages = crawler::crawl(seed, &scan_config, |pct, message| {
        // Inner 0..=100 maps onto the outer 0..=30 crawl window.
        progress.emit(Phase::Crawling, message, (u32::from(pct) * 30 / 100) as u8);
    })
    .await?;
    progress.emit(Phase::Crawling, format!("Found {} page(s)", pages.len()), 30);
    info!("crawl of {seed} found {} page(s)", pages.len());

    let test_browser = browser::launch()
        .await
        .context("failed to launch browser for the test phase")?;
    let http = driver::link_check_client();
    let total = pages.len();
    for (i, page) in pages.iter_mut().enumerate() {
        let label = if page.title.trim().is_empty() {
            page.url.clone()
        } else {
            page.title.clone()
        };
        progress.emit(
            Phase::Testing,
            format!("Testing page {}/{}: {label}", i + 1, total),
            30 + (((i + 1) * 50) / total) as u8,
        );
        driver::run_page(&test_browser, &http, page).await;
    }
    browser::shutdown(test_browser).await;

    progress.emit(Phase::Prompts, "Generating fix prompts...", 85);
    let per_page_counts: Vec<usize> = pages.iter().map(|p| p.defects.len()).collect();
    let mut all_defects: Vec<Defect> = pages.iter_mut().flat_map(|p| p.defects.drain(..)).collect();
    let stats = prompts::generate(&mut all_defects, &prompt_cache, client.as_ref()).await;
    if stats.used_fallback {
        if let Some(reason) = &stats.fallback_reason {
            progress.emit(Phase::Prompts, reason.clone(), 90);
        }
    }

    // The generator returns the sequence it was given; hand defects back to
    // their pages in the original order.
    let mut remaining = all_defects.into_iter();
    for (page, count) in pages.iter_mut().zip(per_page_counts) {
        page.defects = remaining.by_ref().take(count).collect();
    }

    progress.emit(Phase::Report, "Building report...", 95);
    let warnings = if stats.used_fallback {
        stats.fallback_reason.clone().into_iter().collect()
    } else {
        Vec::new()
    };
    let final_report = report::build_report(seed, pages, warnings);

    progress.emit(Phase::Complete, "Scan complete!", 100);
    Ok(ScanOutcome {
        report: final_report,
        used_templates: stats.used_fallback,
    })
}
