//! Broken-link tester.
//!
//! Collects every anchor target on the page and probes each unique one
//! with a HEAD request, falling back to GET when HEAD is inconclusive.
//! Only definite failures (404/410, dead host) become defects; anything
//! ambiguous is dropped rather than risk a false positive. Hosts known to
//! block automated checks are skipped outright.

use super::navigate;
use crate::config;
use crate::defects::{Defect, DefectType, Severity};
use anyhow::Result;
use chromiumoxide::Page;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::debug;
use url::Url;

/// Most links checked per page.
const MAX_LINKS_PER_PAGE: usize = 50;

/// Hosts that reject automated HEAD/GET; checking them yields false positives.
const BOT_BLOCKED_HOSTS: &[&str] = &[
    "linkedin.com",
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "tiktok.com",
    "pinterest.com",
    "reddit.com",
    "threads.net",
];

/// Anchor schemes that are not fetchable targets.
const SKIPPED_SCHEMES: &[&str] = &["mailto", "tel", "javascript", "data", "blob"];

const COLLECT_ANCHORS_JS: &str = r#"
[...document.querySelectorAll('a[href]')]
    .map(a => ({ raw: a.getAttribute('href') || '', href: a.href || '' }))
"#;

/// Best-effort cookie-consent dismissal: click the first visible element
/// matching the usual consent buttons, then give the overlay time to close.
const DISMISS_CONSENT_JS: &str = r#"
(() => {
    const visible = el => {
        const rect = el.getBoundingClientRect();
        const style = getComputedStyle(el);
        return rect.width > 0 && rect.height > 0
            && style.visibility !== 'hidden' && style.display !== 'none';
    };
    const labels = [
        'accept all', 'accept', 'ok', 'agree', 'allow all',
        'alle akzeptieren', 'akzeptieren', 'tout accepter', 'accepter',
        'aceptar todo', 'aceptar', 'accetta tutti', 'accetta',
        'alles accepteren', 'akkoord'
    ];
    const candidates = [...document.querySelectorAll(
        'button, [role="button"], input[type="button"], input[type="submit"], a'
    )];
    for (const el of candidates) {
        const text = (el.innerText || el.value || '').trim().toLowerCase();
        if (text && labels.some(l => text === l || text.startsWith(l + ' '))) {
            if (visible(el)) { el.click(); return { clicked: true }; }
        }
    }
    const byAttr = document.querySelector(
        '[id*="accept-all" i], [class*="accept-all" i], [aria-label*="Accept" i][role="button"]'
    );
    if (byAttr && visible(byAttr)) { byAttr.click(); return { clicked: true }; }
    return { clicked: false };
})()
"#;

#[derive(Debug, Deserialize)]
struct CollectedAnchor {
    raw: String,
    href: String,
}

#[derive(Debug, PartialEq)]
enum LinkVerdict {
    Reachable,
    Broken(String),
    Uncertain(String),
}

pub async fn run(page: &Page, http: &reqwest::Client, url: &str) -> Result<Vec<Defect>> {
    navigate(page, url).await?;
    dismiss_consent(page).await;

    let anchors: Vec<CollectedAnchor> = page
        .evaluate(COLLECT_ANCHORS_JS)
        .await?
        .into_value()
        .unwrap_or_default();

    let targets = collect_targets(&anchors);

    let mut defects = Vec::new();
    for target in &targets {
        match check_link(http, target).await {
            LinkVerdict::Reachable => {}
            LinkVerdict::Broken(detail) => {
                defects.push(Defect::new(
                    DefectType::BrokenLink,
                    Severity::Warning,
                    format!("Broken link: {target}"),
                    detail,
                    url,
                ));
            }
            // Anti-false-positive rule: ambiguous outcomes are dropped.
            LinkVerdict::Uncertain(detail) => {
                debug!("uncertain link {target}: {detail}");
            }
        }
    }
    Ok(defects)
}

async fn dismiss_consent(page: &Page) {
    let clicked = match page.evaluate(DISMISS_CONSENT_JS).await {
        Ok(result) => result
            .into_value::<serde_json::Value>()
            .ok()
            .and_then(|v| v.get("clicked").and_then(|c| c.as_bool()))
            .unwrap_or(false),
        Err(_) => false,
    };
    if clicked {
        tokio::time::sleep(config::SETTLE_SHORT).await;
    }
}

/// Unique, fragment-stripped check targets, capped at [`MAX_LINKS_PER_PAGE`].
fn collect_targets(anchors: &[CollectedAnchor]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut targets = Vec::new();
    for anchor in anchors {
        if targets.len() >= MAX_LINKS_PER_PAGE {
            break;
        }
        let raw = anchor.raw.trim();
        if raw.is_empty() || raw.starts_with('#') || anchor.href.is_empty() {
            continue;
        }
        let Ok(mut resolved) = Url::parse(&anchor.href) else {
            continue;
        };
        if SKIPPED_SCHEMES.contains(&resolved.scheme()) {
            continue;
        }
        if let Some(host) = resolved.host_str() {
            if is_bot_blocked(host) {
                continue;
            }
        }
        resolved.set_fragment(None);
        let target = resolved.to_string();
        if seen.insert(target.clone()) {
            targets.push(target);
        }
    }
    targets
}

fn is_bot_blocked(host: &str) -> bool {
    let h = host.to_ascii_lowercase();
    BOT_BLOCKED_HOSTS
        .iter()
        .any(|blocked| h == *blocked || h.ends_with(&format!(".{blocked}")))
}

/// HEAD first; GET when HEAD is inconclusive. Only 404/410 and dead hosts
/// are definite breakage; everything else in the 4xx/5xx range may be
/// bot-blocking or transient, so it stays uncertain.
async fn check_link(http: &reqwest::Client, target: &str) -> LinkVerdict {
    if let Ok(response) = http
        .head(target)
        .timeout(config::LINK_REQUEST_TIMEOUT)
        .send()
        .await
    {
        let status = response.status().as_u16();
        if status < 400 {
            return LinkVerdict::Reachable;
        }
        if status == 404 || status == 410 {
            return LinkVerdict::Broken(format!("Returned {status}"));
        }
    }

    match http
        .get(target)
        .timeout(config::LINK_REQUEST_TIMEOUT)
        .send()
        .await
    {
        Ok(response) => {
            let status = response.status().as_u16();
            if status < 400 {
                LinkVerdict::Reachable
            } else if status == 404 || status == 410 {
                LinkVerdict::Broken(format!("Returned {status}"))
            } else {
                LinkVerdict::Uncertain(format!(
                    "Returned {status} - may be access-restricted or temporarily unavailable"
                ))
            }
        }
        Err(e) => {
            if is_dead_host_error(&e) {
                LinkVerdict::Broken("Domain not found or connection refused".to_string())
            } else {
                LinkVerdict::Uncertain(format!("request error: {e}"))
            }
        }
    }
}

/// A name-resolution or connection-refused failure means the link target is
/// dead, not merely unfriendly. reqwest spells these differently from the
/// browser's net::ERR_* codes; match both.
fn is_dead_host_error(e: &reqwest::Error) -> bool {
    let text = format!("{e:?}").to_ascii_lowercase();
    ["dns error", "name or service not known", "failed to lookup", "connection refused", "err_name_not_resolved", "err_connection_refused"]
        .iter()
        .any(|needle| text.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor(raw: &str, href: &str) -> CollectedAnchor {
        CollectedAnchor {
            raw: raw.to_string(),
            href: href.to_string(),
        }
    }

    #[test]
    fn test_bot_blocked_exact_and_subdomain() {
        assert!(is_bot_blocked("linkedin.com"));
        assert!(is_bot_blocked("www.LinkedIn.com"));
        assert!(is_bot_blocked("x.com"));
        assert!(!is_bot_blocked("notlinkedin.com"));
        assert!(!is_bot_blocked("x.company.example"));
    }

    #[test]
    fn test_collect_targets_filters_and_dedupes() {
        let anchors = vec![
            anchor("/about", "http://site.example/about"),
            anchor("/about#team", "http://site.example/about#team"),
            anchor("#top", "http://site.example/page#top"),
            anchor("mailto:hi@site.example", "mailto:hi@site.example"),
            anchor("javascript:void(0)", "javascript:void(0)"),
            anchor("https://linkedin.com/in/someone", "https://linkedin.com/in/someone"),
            anchor("https://external.example/x", "https://external.example/x"),
        ];
        let targets = collect_targets(&anchors);
        assert_eq!(
            targets,
            vec![
                "http://site.example/about".to_string(),
                "https://external.example/x".to_string(),
            ]
        );
    }

    #[test]
    fn test_collect_targets_caps_at_fifty() {
        let anchors: Vec<CollectedAnchor> = (0..80)
            .map(|i| anchor("/p", &format!("http://site.example/p{i}")))
            .collect();
        assert_eq!(collect_targets(&anchors).len(), MAX_LINKS_PER_PAGE);
    }
}
