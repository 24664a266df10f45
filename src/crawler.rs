//! Same-origin page discovery.
//!
//! Breadth-first crawl from a seed URL with bounded concurrency. Every
//! candidate link runs through the follow predicate; pages are keyed by
//! their normalized final URL so redirects cannot produce duplicates. A
//! failed load never aborts the crawl: the URL stays marked visited and the
//! frontier moves on.

use crate::browser;
use crate::config::{self, ScanConfig};
use crate::defects::PageRecord;
use anyhow::{bail, Result};
use chromiumoxide::Browser;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashSet, VecDeque};
use std::time::Instant;
use tracing::{debug, warn};
use url::Url;

/// Download and media extensions that are never followed.
const EXCLUDED_EXTENSIONS: &[&str] = &[
    "pdf", "zip", "tar", "gz", "rar", "7z", "png", "jpg", "jpeg", "gif", "svg", "webp", "ico",
    "mp3", "mp4", "wav", "avi", "mov", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "exe", "dmg",
    "apk",
];

/// Schemes that are never followed.
const SKIPPED_SCHEMES: &[&str] = &["mailto", "tel", "javascript", "data", "blob", "file"];

const COLLECT_HREFS_JS: &str = r#"
[...document.querySelectorAll('a[href]')]
    .map(a => a.getAttribute('href'))
    .filter(h => h && h.trim().length)
"#;

/// Normalize a URL for visited-set and page identity.
///
/// Drops the fragment and at most one trailing slash; the query string is
/// preserved. The root URL normalizes to the bare origin (`http://h/` to
/// `http://h`). Idempotent: re-parsing the output and stripping again yields
/// the same string.
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw).ok()?;
    url.set_fragment(None);
    let mut s = url.to_string();
    if s.ends_with('/') {
        s.pop();
    }
    Some(s)
}

/// Decide whether a candidate link is crawled, and under which key.
///
/// Returns the normalized URL iff the candidate resolves against `base`, is
/// http(s) on exactly the seed host, is not a download/media target, and has
/// not been visited yet.
pub fn should_follow(
    candidate: &str,
    base: &Url,
    seed_host: &str,
    visited: &HashSet<String>,
) -> Option<String> {
    let resolved = base.join(candidate.trim()).ok()?;
    let scheme = resolved.scheme();
    if SKIPPED_SCHEMES.contains(&scheme) {
        return None;
    }
    if scheme != "http" && scheme != "https" {
        return None;
    }
    let host = resolved.host_str()?;
    if !host.eq_ignore_ascii_case(seed_host) {
        return None;
    }
    if let Some(ext) = path_extension(resolved.path()) {
        if EXCLUDED_EXTENSIONS.contains(&ext.as_str()) {
            return None;
        }
    }
    let normalized = normalize_url(resolved.as_str())?;
    if visited.contains(&normalized) {
        return None;
    }
    Some(normalized)
}

fn path_extension(path: &str) -> Option<String> {
    let segment = path.rsplit('/').next()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

struct LoadedPage {
    final_url: String,
    title: String,
    load_time_ms: u64,
    links: Vec<String>,
}

/// Crawl every same-origin page reachable from `seed`, bounded by the config.
///
/// Launches its own browser instance for the discovery phase. Individual
/// load failures (the seed included) are swallowed and logged; the caller
/// observes them only as a smaller, possibly empty, page set. Progress is
/// reported through `on_progress` as (percent 0..=100, message).
pub async fn crawl(
    seed: &str,
    scan_config: &ScanConfig,
    mut on_progress: impl FnMut(u8, String),
) -> Result<Vec<PageRecord>> {
    let seed_url = match Url::parse(seed) {
        Ok(u) => u,
        Err(e) => bail!("seed URL does not parse: {e}"),
    };
    let seed_host = match seed_url.host_str() {
        Some(h) => h.to_ascii_lowercase(),
        None => bail!("seed URL has no host"),
    };
    let seed_normalized = match normalize_url(seed) {
        Some(n) => n,
        None => bail!("seed URL does not normalize"),
    };

    let browser = browser::launch().await?;
    let pages = discover(&browser, &seed_normalized, &seed_host, scan_config, &mut on_progress).await;
    browser::shutdown(browser).await;

    on_progress(100, format!("Discovered {} page(s)", pages.len()));
    Ok(pages)
}

async fn discover(
    browser: &Browser,
    seed_normalized: &str,
    seed_host: &str,
    scan_config: &ScanConfig,
    on_progress: &mut impl FnMut(u8, String),
) -> Vec<PageRecord> {
    let max_pages = scan_config.max_pages.max(1);
    let concurrency = scan_config.max_concurrency.max(1);

    let mut visited: HashSet<String> = HashSet::new();
    let mut frontier: VecDeque<String> = VecDeque::new();
    visited.insert(seed_normalized.to_string());
    frontier.push_back(seed_normalized.to_string());

    let mut pages: Vec<PageRecord> = Vec::new();
    let mut page_keys: HashSet<String> = HashSet::new();
    let mut in_flight = FuturesUnordered::new();

    loop {
        while in_flight.len() < concurrency && pages.len() + in_flight.len() < max_pages {
            let Some(next) = frontier.pop_front() else {
                break;
            };
            in_flight.push(load_page(browser, next));
        }

        let Some((requested, outcome)) = in_flight.next().await else {
            break;
        };

        let loaded = match outcome {
            Ok(loaded) => loaded,
            Err(e) => {
                // Visited-but-dropped: the URL stays in the visited set.
                warn!("crawl load failed for {requested}: {e:#}");
                continue;
            }
        };

        let key = normalize_url(&loaded.final_url).unwrap_or(requested);
        visited.insert(key.clone());
        if page_keys.insert(key.clone()) && pages.len() < max_pages {
            debug!("discovered {key} ({} ms)", loaded.load_time_ms);
            pages.push(PageRecord::new(&key, &loaded.title, loaded.load_time_ms));
            let pct = ((90 * pages.len()) / max_pages).min(90) as u8;
            on_progress(pct, format!("Found {}: {}", pages.len(), key));
        }

        let base = match Url::parse(&loaded.final_url) {
            Ok(u) => u,
            Err(_) => continue,
        };
        for link in &loaded.links {
            if let Some(normalized) = should_follow(link, &base, seed_host, &visited) {
                visited.insert(normalized.clone());
                frontier.push_back(normalized);
            }
        }
    }

    pages
}

/// Load one page within the crawl handler budget; returns the requested URL
/// alongside the outcome so failures can be attributed.
async fn load_page(browser: &Browser, url: String) -> (String, Result<LoadedPage>) {
    let outcome = tokio::time::timeout(config::CRAWL_HANDLER_TIMEOUT, load_page_inner(browser, &url)).await;
    match outcome {
        Ok(result) => (url, result),
        Err(_) => (
            url,
            Err(anyhow::anyhow!(
                "crawl handler exceeded {}s budget",
                config::CRAWL_HANDLER_TIMEOUT.as_secs()
            )),
        ),
    }
}

async fn load_page_inner(browser: &Browser, url: &str) -> Result<LoadedPage> {
    let page = browser.new_page("about:blank").await?;
    let start = Instant::now();

    let nav = tokio::time::timeout(config::NAV_TIMEOUT, page.goto(url)).await;
    match nav {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            let _ = page.close().await;
            bail!("navigation failed: {e}");
        }
        Err(_) => {
            let _ = page.close().await;
            bail!("navigation timed out after {}s", config::NAV_TIMEOUT.as_secs());
        }
    }
    let _ = page.wait_for_navigation().await;
    let load_time_ms = start.elapsed().as_millis() as u64;

    let final_url = page
        .url()
        .await
        .unwrap_or_default()
        .map(|u| u.to_string())
        .unwrap_or_else(|| url.to_string());

    let title: String = match page.evaluate("document.title").await {
        Ok(result) => result.into_value().unwrap_or_default(),
        Err(_) => String::new(),
    };

    let links: Vec<String> = match page.evaluate(COLLECT_HREFS_JS).await {
        Ok(result) => result.into_value().unwrap_or_default(),
        Err(_) => Vec::new(),
    };

    let _ = page.close().await;

    Ok(LoadedPage {
        final_url,
        title,
        load_time_ms,
        links,
    })
}
