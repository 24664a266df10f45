//! Page driver: runs every tester against one page with isolation.
//!
//! Testers run sequentially. Each gets a fresh browser page and a 30 s
//! budget; a timeout or error drops that tester's defects and logs a
//! warning, never the page or the scan. The page is closed on every exit
//! path, timeout included.

use crate::config;
use crate::defects::PageRecord;
use crate::testers::Tester;
use chromiumoxide::Browser;
use std::collections::HashSet;
use tracing::warn;

pub async fn run_page(browser: &Browser, http: &reqwest::Client, record: &mut PageRecord) {
    for tester in Tester::ALL {
        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                warn!("could not open page for {} tester on {}: {e}", tester.name(), record.url);
                continue;
            }
        };

        let outcome =
            tokio::time::timeout(config::TESTER_TIMEOUT, tester.run(&page, http, &record.url)).await;
        match outcome {
            Ok(Ok(defects)) => record.defects.extend(defects),
            Ok(Err(e)) => {
                warn!("{} tester failed on {}: {e:#}", tester.name(), record.url);
            }
            Err(_) => {
                warn!(
                    "{} tester timed out after {}s on {}",
                    tester.name(),
                    config::TESTER_TIMEOUT.as_secs(),
                    record.url
                );
            }
        }

        let _ = page.close().await;
    }

    // Within-page dedup, keeping the first occurrence in discovery order.
    let mut seen = HashSet::new();
    record.defects.retain(|defect| seen.insert(defect.fingerprint()));
}

/// Shared client for link checks, with a standard Chrome user-agent.
pub fn link_check_client() -> reqwest::Client {
    let ua = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
              AppleWebKit/537.36 (KHTML, like Gecko) \
              Chrome/131.0.0.0 Safari/537.36";
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(5))
        .user_agent(ua)
        .build()
        .unwrap_or_default()
}
