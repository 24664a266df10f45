//! Defect detectors.
//!
//! Six testers share the shape (page, url) -> defects. Each gets a fresh
//! browser page from the page driver; the listener-based testers (console,
//! network) attach their CDP handlers before navigating. A tester returns
//! defects with an empty `id` and `page` set to the input URL; it never
//! fails the page it runs on: errors propagate to the driver, which logs
//! and moves on.

pub mod a11y;
pub mod console;
pub mod images;
pub mod links;
pub mod network;
pub mod responsive;

use crate::config;
use crate::defects::Defect;
use anyhow::{bail, Result};
use chromiumoxide::Page;
use url::Url;

/// The closed set of testers, enumerated explicitly by the page driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tester {
    ConsoleErrors,
    NetworkErrors,
    BrokenImages,
    BrokenLinks,
    Accessibility,
    Responsive,
}

impl Tester {
    /// Run order within a page.
    pub const ALL: [Tester; 6] = [
        Tester::ConsoleErrors,
        Tester::NetworkErrors,
        Tester::BrokenImages,
        Tester::BrokenLinks,
        Tester::Accessibility,
        Tester::Responsive,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Tester::ConsoleErrors => "console errors",
            Tester::NetworkErrors => "network errors",
            Tester::BrokenImages => "broken images",
            Tester::BrokenLinks => "broken links",
            Tester::Accessibility => "accessibility",
            Tester::Responsive => "responsive layout",
        }
    }

    pub async fn run(self, page: &Page, http: &reqwest::Client, url: &str) -> Result<Vec<Defect>> {
        match self {
            Tester::ConsoleErrors => console::run(page, url).await,
            Tester::NetworkErrors => network::run(page, url).await,
            Tester::BrokenImages => images::run(page, url).await,
            Tester::BrokenLinks => links::run(page, http, url).await,
            Tester::Accessibility => a11y::run(page, url).await,
            Tester::Responsive => responsive::run(page, url).await,
        }
    }
}

/// Console-message noise: third-party infrastructure a site owner cannot fix.
pub(crate) fn is_console_noise(message: &str) -> bool {
    let m = message.to_ascii_lowercase();
    const PATTERNS: &[&str] = &[
        "favicon",
        "/cdn-cgi/",
        "googletagmanager",
        "gtag/js",
        "google-analytics.com",
        "doubleclick",
        "clarity.ms",
        "failed to load resource",
    ];
    PATTERNS.iter().any(|p| m.contains(p))
}

/// Sub-resource URL noise: analytics, ads, and edge infrastructure.
pub(crate) fn is_request_noise(url: &str) -> bool {
    let u = url.to_ascii_lowercase();
    const PATTERNS: &[&str] = &[
        "favicon",
        "google-analytics.com",
        "googletagmanager",
        "gtag/js",
        "hotjar.com",
        "sentry.io",
        "/cdn-cgi/",
        "cloudflareinsights.com",
        "clarity.ms",
        "doubleclick",
        "googlesyndication.com",
        "adsbygoogle",
    ];
    PATTERNS.iter().any(|p| u.contains(p))
}

/// Path component of a URL, for titles; falls back to the raw string.
pub(crate) fn url_path(url: &str) -> String {
    match Url::parse(url) {
        Ok(u) => u.path().to_string(),
        Err(_) => url.to_string(),
    }
}

/// Truncate on a char boundary, without an ellipsis.
pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars).collect()
}

/// Navigate within the navigation budget, then wait for the load to settle.
pub(crate) async fn navigate(page: &Page, url: &str) -> Result<()> {
    let nav = tokio::time::timeout(config::NAV_TIMEOUT, page.goto(url)).await;
    match nav {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => bail!("navigation failed: {e}"),
        Err(_) => bail!("navigation timed out after {}s", config::NAV_TIMEOUT.as_secs()),
    }
    let _ = page.wait_for_navigation().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_noise() {
        assert!(is_console_noise("GET http://x/favicon.ico 404"));
        assert!(is_console_noise("https://www.googletagmanager.com/gtag/js failed"));
        assert!(is_console_noise("Failed to load resource: net::ERR_FAILED"));
        assert!(!is_console_noise("Uncaught TypeError: null.x is not a function"));
        assert!(!is_console_noise("boom"));
    }

    #[test]
    fn test_request_noise() {
        assert!(is_request_noise("https://static.hotjar.com/c.js"));
        assert!(is_request_noise("https://o0.ingest.sentry.io/api/1/envelope/"));
        assert!(is_request_noise("https://site/cdn-cgi/challenge-platform/x"));
        assert!(is_request_noise("https://pagead2.googlesyndication.com/x.js"));
        assert!(!is_request_noise("https://site/assets/app.js"));
    }

    #[test]
    fn test_truncate_char_boundary() {
        assert_eq!(truncate("héllo wörld", 5), "héllo");
        assert_eq!(truncate("short", 100), "short");
    }

    #[test]
    fn test_url_path() {
        assert_eq!(url_path("https://site.example/a/b?q=1"), "/a/b");
        assert_eq!(url_path("not a url"), "not a url");
    }
}
