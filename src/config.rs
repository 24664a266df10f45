//! Limits, timeout budgets, and environment variable names.

use std::path::PathBuf;
use std::time::Duration;

/// External LLM credential. Absence disables the external prompt tier.
pub const LLM_API_KEY_ENV: &str = "SITESCAN_LLM_API_KEY";
/// Optional override for the OpenAI-compatible endpoint base URL.
pub const LLM_BASE_URL_ENV: &str = "SITESCAN_LLM_BASE_URL";
/// Optional override for the LLM model name.
pub const LLM_MODEL_ENV: &str = "SITESCAN_LLM_MODEL";
/// Admin key; read only by the HTTP surface, never by the scan engine.
pub const ADMIN_KEY_ENV: &str = "SITESCAN_ADMIN_KEY";
/// Chromium binary override.
pub const CHROMIUM_PATH_ENV: &str = "SITESCAN_CHROMIUM_PATH";
/// Base directory for the prompt cache and analytics files.
pub const DATA_DIR_ENV: &str = "SITESCAN_DATA_DIR";

pub const DEFAULT_MAX_PAGES: usize = 20;
pub const DEFAULT_CRAWL_CONCURRENCY: usize = 3;

/// Navigation budget for a single page load.
pub const NAV_TIMEOUT: Duration = Duration::from_secs(15);
/// Total budget for one crawl handler (navigation + title + link harvest).
pub const CRAWL_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);
/// Budget for one tester run against one page.
pub const TESTER_TIMEOUT: Duration = Duration::from_secs(30);
/// Budget for each HEAD and each GET of a link check.
pub const LINK_REQUEST_TIMEOUT: Duration = Duration::from_secs(8);
/// Whole-scan deadline; the only timeout that fails a scan.
pub const SCAN_TIMEOUT: Duration = Duration::from_secs(300);

/// Post-navigation settle before inspecting the DOM (a11y, responsive).
pub const SETTLE_SHORT: Duration = Duration::from_millis(300);
/// Post-navigation settle for async errors and in-flight requests.
pub const SETTLE_LONG: Duration = Duration::from_millis(500);

/// Per-scan crawl bounds.
#[derive(Debug, Clone, Copy)]
pub struct ScanConfig {
    pub max_pages: usize,
    pub max_concurrency: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            max_concurrency: DEFAULT_CRAWL_CONCURRENCY,
        }
    }
}

/// Data directory: `$SITESCAN_DATA_DIR`, else `~/.sitescan`, else `/tmp/.sitescan`.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".sitescan")
}
