//! Headless Chromium discovery and launch.
//!
//! Discovery order: the explicit env override (authoritative when set),
//! whatever the system PATH offers, a managed install under the data dir,
//! and finally the platform's default install locations.

use crate::config;
use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Binary names probed on the system PATH, most specific first.
const PATH_NAMES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome-stable",
    "google-chrome",
];

/// Flags for scan runs: headless, quiet, and safe inside containers.
const LAUNCH_ARGS: &[&str] = &[
    "--headless=new",
    "--hide-scrollbars",
    "--mute-audio",
    "--no-first-run",
    "--disable-background-networking",
    "--disable-dev-shm-usage",
    "--no-sandbox",
];

/// Locate a Chromium binary, or `None` if the host has none.
pub fn find_chromium() -> Option<PathBuf> {
    // An explicit override is authoritative: a dangling path is reported,
    // not silently papered over by the fallback tiers.
    if let Ok(explicit) = std::env::var(config::CHROMIUM_PATH_ENV) {
        let path = PathBuf::from(explicit.trim());
        if path.exists() {
            return Some(path);
        }
        warn!(
            "{} points at {}, which does not exist",
            config::CHROMIUM_PATH_ENV,
            path.display()
        );
        return None;
    }

    if let Some(found) = PATH_NAMES.iter().find_map(|name| which::which(name).ok()) {
        return Some(found);
    }

    managed_install()
        .into_iter()
        .chain(platform_defaults())
        .find(|candidate| candidate.exists())
}

/// Candidates inside `<data dir>/chromium/`, where `sitescan` keeps a
/// downloaded Chrome for Testing build.
fn managed_install() -> Vec<PathBuf> {
    let root = config::data_dir().join("chromium");
    let subpaths: &[&str] = if cfg!(target_os = "macos") {
        &[
            "chrome",
            "Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
        ]
    } else {
        &["chrome", "chrome-linux64/chrome"]
    };
    subpaths.iter().map(|sub| root.join(sub)).collect()
}

fn platform_defaults() -> Vec<PathBuf> {
    let paths: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        ]
    } else {
        &["/usr/bin/chromium", "/usr/bin/google-chrome"]
    };
    paths.iter().map(PathBuf::from).collect()
}

fn launch_config(binary: PathBuf) -> Result<BrowserConfig> {
    let mut builder = BrowserConfig::builder()
        .chrome_executable(binary)
        .window_size(1280, 800);
    for arg in LAUNCH_ARGS {
        builder = builder.arg(*arg);
    }
    builder
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))
}

/// Launch a headless Chromium instance for one scan phase.
///
/// The CDP event loop runs in a background task for the lifetime of the
/// instance and winds down when the browser is dropped.
pub async fn launch() -> Result<Browser> {
    let binary = find_chromium().context(
        "Chromium not found. Install Chrome or set SITESCAN_CHROMIUM_PATH.",
    )?;
    debug!("launching {}", binary.display());

    let (browser, mut handler) = Browser::launch(launch_config(binary)?)
        .await
        .context("failed to launch Chromium")?;

    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                debug!("cdp handler: {e}");
            }
        }
    });

    Ok(browser)
}

/// Best-effort shutdown: ask the browser to close, then reap the process.
pub async fn shutdown(mut browser: Browser) {
    let _ = browser.close().await;
    let _ = browser.wait().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_managed_install_lives_under_data_dir() {
        let root = config::data_dir().join("chromium");
        for candidate in managed_install() {
            assert!(candidate.starts_with(&root));
        }
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_launch_navigate_close() {
        let browser = launch().await.expect("failed to launch browser");
        let page = browser
            .new_page("data:text/html,<title>t</title><h1>Hello</h1>")
            .await
            .expect("failed to open page");
        let heading: String = page
            .evaluate("document.querySelector('h1').textContent")
            .await
            .expect("evaluate failed")
            .into_value()
            .expect("conversion failed");
        assert_eq!(heading, "Hello");
        let _ = page.close().await;
        shutdown(browser).await;
    }
}
