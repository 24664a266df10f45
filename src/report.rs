//! Report assembly: deduplication, identifiers, ordering, summary counts.

use crate::defects::{Defect, DefectType, PageRecord, Severity};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// Aggregate counters over every kept defect in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_defects: usize,
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
    /// Complete: every defect type is present, zero or not.
    pub by_type: BTreeMap<DefectType, usize>,
}

/// The consolidated scan result, immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub url: String,
    /// ISO-8601 wall-clock timestamp of report construction.
    pub generated_at: String,
    /// Page count at crawl time.
    pub pages_found: usize,
    pub pages: Vec<PageRecord>,
    pub summary: Summary,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Build the final report from crawled pages with hint-filled defects.
///
/// Pages keep their crawl discovery order. Duplicate defects (by
/// fingerprint) are dropped in favor of the first occurrence on the
/// earliest page; kept defects get fresh identifiers and each page's list
/// is stably sorted critical first.
pub fn build_report(seed: &str, mut pages: Vec<PageRecord>, warnings: Vec<String>) -> Report {
    let pages_found = pages.len();

    let mut seen: HashSet<String> = HashSet::new();
    for page in &mut pages {
        page.defects.retain(|defect| seen.insert(defect.fingerprint()));
        for defect in &mut page.defects {
            defect.id = Uuid::new_v4().to_string();
        }
        page.defects.sort_by_key(|defect| defect.severity);
    }

    let mut by_type: BTreeMap<DefectType, usize> = DefectType::ALL.iter().map(|t| (*t, 0)).collect();
    let (mut critical, mut warning, mut info) = (0usize, 0usize, 0usize);
    for defect in pages.iter().flat_map(|p| p.defects.iter()) {
        *by_type.entry(defect.defect_type).or_insert(0) += 1;
        match defect.severity {
            Severity::Critical => critical += 1,
            Severity::Warning => warning += 1,
            Severity::Info => info += 1,
        }
    }
    let total_defects = critical + warning + info;

    Report {
        url: seed.to_string(),
        generated_at: Utc::now().to_rfc3339(),
        pages_found,
        pages,
        summary: Summary {
            total_defects,
            critical,
            warning,
            info,
            by_type,
        },
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defect(
        defect_type: DefectType,
        severity: Severity,
        title: &str,
        details: &str,
        page: &str,
    ) -> Defect {
        Defect::new(defect_type, severity, title, details, page)
    }

    fn page(url: &str, defects: Vec<Defect>) -> PageRecord {
        let mut record = PageRecord::new(url, "Title", 100);
        record.defects = defects;
        record
    }

    #[test]
    fn test_empty_report() {
        let report = build_report("http://site.example", Vec::new(), Vec::new());
        assert_eq!(report.pages_found, 0);
        assert_eq!(report.summary.total_defects, 0);
        assert_eq!(report.summary.by_type.len(), 6);
        assert!(report.summary.by_type.values().all(|&n| n == 0));
        assert!(!report.generated_at.is_empty());
    }

    #[test]
    fn test_counts_and_complete_type_map() {
        let pages = vec![page(
            "http://s/a",
            vec![
                defect(DefectType::ConsoleError, Severity::Critical, "a", "1", "http://s/a"),
                defect(DefectType::BrokenImage, Severity::Warning, "b", "2", "http://s/a"),
                defect(DefectType::Responsive, Severity::Info, "c", "3", "http://s/a"),
            ],
        )];
        let report = build_report("http://s", pages, Vec::new());
        let summary = &report.summary;
        assert_eq!(summary.total_defects, 3);
        assert_eq!((summary.critical, summary.warning, summary.info), (1, 1, 1));
        assert_eq!(summary.by_type.len(), 6);
        assert_eq!(summary.by_type[&DefectType::ConsoleError], 1);
        assert_eq!(summary.by_type[&DefectType::NetworkError], 0);
        assert_eq!(summary.by_type.values().sum::<usize>(), summary.total_defects);
        let per_page: usize = report.pages.iter().map(|p| p.defects.len()).sum();
        assert_eq!(per_page, summary.total_defects);
    }

    #[test]
    fn test_dedup_across_pages_keeps_earliest_page() {
        let duplicated = |url: &str| {
            defect(DefectType::ConsoleError, Severity::Warning, "Console error: boom", "boom", url)
        };
        let pages = vec![
            page("http://s", vec![duplicated("http://s")]),
            page("http://s/about", vec![duplicated("http://s/about")]),
        ];
        let report = build_report("http://s", pages, Vec::new());
        assert_eq!(report.summary.total_defects, 1);
        assert_eq!(report.pages[0].defects.len(), 1);
        assert!(report.pages[1].defects.is_empty());
        assert_eq!(
            report.pages[0].defects[0].fingerprint(),
            "console-error::Console error: boom::boom"
        );
        // pagesFound counts crawled pages, not pages with defects.
        assert_eq!(report.pages_found, 2);
    }

    #[test]
    fn test_fingerprints_unique_and_ids_assigned() {
        let pages = vec![page(
            "http://s",
            vec![
                defect(DefectType::ConsoleError, Severity::Warning, "t", "d", "http://s"),
                defect(DefectType::ConsoleError, Severity::Warning, "t", "d", "http://s"),
                defect(DefectType::NetworkError, Severity::Warning, "t", "d", "http://s"),
            ],
        )];
        let report = build_report("http://s", pages, Vec::new());
        let all: Vec<&Defect> = report.pages.iter().flat_map(|p| p.defects.iter()).collect();
        assert_eq!(all.len(), 2);
        let fingerprints: HashSet<String> = all.iter().map(|d| d.fingerprint()).collect();
        assert_eq!(fingerprints.len(), all.len());
        let ids: HashSet<&String> = all.iter().map(|d| &d.id).collect();
        assert_eq!(ids.len(), all.len());
        assert!(all.iter().all(|d| !d.id.is_empty()));
    }

    #[test]
    fn test_severity_sort_is_stable() {
        let pages = vec![page(
            "http://s",
            vec![
                defect(DefectType::Responsive, Severity::Info, "i1", "1", "http://s"),
                defect(DefectType::BrokenImage, Severity::Warning, "w1", "2", "http://s"),
                defect(DefectType::ConsoleError, Severity::Critical, "c1", "3", "http://s"),
                defect(DefectType::BrokenLink, Severity::Warning, "w2", "4", "http://s"),
            ],
        )];
        let report = build_report("http://s", pages, Vec::new());
        let titles: Vec<&str> = report.pages[0].defects.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["c1", "w1", "w2", "i1"]);
        let severities: Vec<Severity> =
            report.pages[0].defects.iter().map(|d| d.severity).collect();
        assert!(severities.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_warnings_carried_and_wire_shape() {
        let report = build_report(
            "http://s",
            Vec::new(),
            vec!["LLM prompt generation failed".to_string()],
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["summary"]["totalDefects"], 0);
        assert_eq!(json["pagesFound"], 0);
        assert_eq!(json["warnings"][0], "LLM prompt generation failed");
        assert!(json["summary"]["byType"]["console-error"].is_number());
    }
}
