//! Broken-image tester.
//!
//! An image is broken when it finished loading with a natural width of
//! zero. Data URIs and empty `src` attributes are skipped.

use super::navigate;
use crate::config;
use crate::defects::{Defect, DefectType, Severity};
use anyhow::Result;
use chromiumoxide::Page;
use serde::Deserialize;

const BROKEN_IMAGES_JS: &str = r#"
[...document.querySelectorAll('img[src]')]
    .filter(img => {
        const src = (img.getAttribute('src') || '').trim();
        return src.length && !src.startsWith('data:');
    })
    .filter(img => img.complete && img.naturalWidth === 0)
    .map(img => ({ src: img.currentSrc || img.src, alt: (img.getAttribute('alt') || '').trim() }))
"#;

#[derive(Debug, Deserialize)]
struct BrokenImage {
    src: String,
    alt: String,
}

pub async fn run(page: &Page, url: &str) -> Result<Vec<Defect>> {
    navigate(page, url).await?;
    tokio::time::sleep(config::SETTLE_LONG).await;

    let broken: Vec<BrokenImage> = page
        .evaluate(BROKEN_IMAGES_JS)
        .await?
        .into_value()
        .unwrap_or_default();

    Ok(broken
        .into_iter()
        .map(|img| {
            let label = if img.alt.is_empty() { &img.src } else { &img.alt };
            Defect::new(
                DefectType::BrokenImage,
                Severity::Warning,
                format!("Broken image: {label}"),
                format!("Image failed to load: {}", img.src),
                url,
            )
        })
        .collect())
}
