//! End-to-end properties of the report and prompt stages, driven with
//! hand-built defects so no browser is needed.

use std::collections::HashSet;
use std::sync::Arc;

use sitescan::defects::{Defect, DefectType, PageRecord, Severity};
use sitescan::prompts::{self, cache::PromptCache};
use sitescan::report::build_report;

fn page(url: &str, title: &str, defects: Vec<Defect>) -> PageRecord {
    let mut record = PageRecord::new(url, title, 120);
    record.defects = defects;
    record
}

fn console_error(message: &str, page_url: &str) -> Defect {
    Defect::new(
        DefectType::ConsoleError,
        Severity::Warning,
        format!("Console error: {message}"),
        message,
        page_url,
    )
}

/// A clean two-page site produces an all-zero summary with a complete
/// type map.
#[test]
fn clean_site_report() {
    let pages = vec![
        page("http://site.example", "Home", Vec::new()),
        page("http://site.example/about", "About", Vec::new()),
    ];
    let report = build_report("http://site.example", pages, Vec::new());

    assert_eq!(report.pages_found, 2);
    assert_eq!(report.pages[0].url, "http://site.example");
    assert_eq!(report.pages[1].url, "http://site.example/about");
    assert_eq!(report.summary.total_defects, 0);
    assert_eq!(report.summary.critical + report.summary.warning + report.summary.info, 0);
    assert_eq!(report.summary.by_type.len(), 6);
    assert!(report.summary.by_type.values().all(|&count| count == 0));
}

/// The same console error on two pages is reported once, on the earlier
/// page, with the expected fingerprint.
#[test]
fn dedup_across_pages() {
    let pages = vec![
        page("http://site.example", "Home", vec![console_error("boom", "http://site.example")]),
        page(
            "http://site.example/about",
            "About",
            vec![console_error("boom", "http://site.example/about")],
        ),
    ];
    let report = build_report("http://site.example", pages, Vec::new());

    assert_eq!(report.summary.total_defects, 1);
    assert_eq!(report.pages[0].defects.len(), 1);
    assert!(report.pages[1].defects.is_empty());
    assert_eq!(
        report.pages[0].defects[0].fingerprint(),
        "console-error::Console error: boom::boom"
    );
}

/// Every report invariant from one pass over a mixed defect set: counts
/// reconcile, fingerprints are unique, ids are assigned, pages keep order,
/// and each page is severity-sorted.
#[tokio::test]
async fn full_pipeline_invariants() {
    let dir = tempfile::tempdir().unwrap();
    let prompt_cache = Arc::new(PromptCache::open(dir.path().join("cache.json")));

    let pages = vec![
        page(
            "http://site.example",
            "Home",
            vec![
                Defect::new(
                    DefectType::Responsive,
                    Severity::Info,
                    "Horizontal overflow at Desktop",
                    "Page has horizontal overflow at 1440px width. Content width: 1600px, viewport: 1440px.",
                    "http://site.example",
                ),
                Defect::new(
                    DefectType::ConsoleError,
                    Severity::Critical,
                    "Uncaught exception: TypeError",
                    "TypeError: null.x is not a function",
                    "http://site.example",
                ),
                Defect::new(
                    DefectType::BrokenImage,
                    Severity::Warning,
                    "Broken image: hero",
                    "Image failed to load: http://site.example/hero.png",
                    "http://site.example",
                ),
            ],
        ),
        page(
            "http://site.example/pricing",
            "Pricing",
            vec![Defect::new(
                DefectType::BrokenLink,
                Severity::Warning,
                "Broken link: http://site.example/old",
                "Returned 404",
                "http://site.example/pricing",
            )],
        ),
    ];

    // Prompt stage over the flattened defect list, template tier only.
    let mut all: Vec<Defect> = pages.iter().flat_map(|p| p.defects.clone()).collect();
    let stats = prompts::generate(&mut all, &prompt_cache, None).await;
    assert!(stats.used_fallback);

    // Hand back per page, as the orchestrator does.
    let mut rebuilt = pages.clone();
    let mut remaining = all.into_iter();
    for p in &mut rebuilt {
        let count = p.defects.len();
        p.defects = remaining.by_ref().take(count).collect();
    }

    let warnings = stats.fallback_reason.clone().into_iter().collect();
    let report = build_report("http://site.example", rebuilt, warnings);

    // Count reconciliation.
    let per_page: usize = report.pages.iter().map(|p| p.defects.len()).sum();
    assert_eq!(report.summary.total_defects, per_page);
    assert_eq!(
        report.summary.critical + report.summary.warning + report.summary.info,
        report.summary.total_defects
    );
    assert_eq!(
        report.summary.by_type.values().sum::<usize>(),
        report.summary.total_defects
    );

    // Fingerprint uniqueness, ids, hints.
    let all_kept: Vec<&Defect> = report.pages.iter().flat_map(|p| p.defects.iter()).collect();
    let fingerprints: HashSet<String> = all_kept.iter().map(|d| d.fingerprint()).collect();
    assert_eq!(fingerprints.len(), all_kept.len());
    assert!(all_kept.iter().all(|d| !d.id.is_empty()));
    assert!(all_kept.iter().all(|d| !d.fix_prompt.is_empty()));

    // Page order preserved; per-page severity order.
    assert_eq!(report.pages[0].url, "http://site.example");
    assert_eq!(report.pages[1].url, "http://site.example/pricing");
    for p in &report.pages {
        let severities: Vec<Severity> = p.defects.iter().map(|d| d.severity).collect();
        assert!(severities.windows(2).all(|w| w[0] <= w[1]));
    }
    assert_eq!(report.pages[0].defects[0].severity, Severity::Critical);

    // Fallback surfaced as a single report warning.
    assert_eq!(report.warnings.len(), 1);
}

/// Scan B sees scan A's hint verbatim from the cache, with no fallback and
/// no misses, even without an LLM credential.
#[tokio::test]
async fn prompt_cache_hit_across_scans() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("cache.json");

    // Scan A generates and persists a hint.
    let hint = {
        let prompt_cache = Arc::new(PromptCache::open(&cache_path));
        let mut defects = vec![console_error("boom", "http://site-a.example")];
        let stats = prompts::generate(&mut defects, &prompt_cache, None).await;
        assert_eq!(stats.cache_misses, 1);
        assert!(stats.used_fallback);
        defects[0].fix_prompt.clone()
    };
    assert!(!hint.is_empty());

    // Scan B, fresh cache handle over the same file: pure hit.
    let prompt_cache = Arc::new(PromptCache::open(&cache_path));
    let mut defects = vec![console_error("boom", "http://site-b.example")];
    let stats = prompts::generate(&mut defects, &prompt_cache, None).await;

    assert_eq!(defects[0].fix_prompt, hint);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.cache_misses, 0);
    assert!(!stats.used_fallback);
}
