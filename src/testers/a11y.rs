//! Accessibility tester.
//!
//! Runs the embedded in-page audit (`a11y.js`) after a short settle and maps
//! each violation to a defect. At most 10 violations are reported per page.

use super::navigate;
use crate::config;
use crate::defects::{Defect, DefectType, Severity};
use anyhow::Result;
use chromiumoxide::Page;
use serde::Deserialize;

const AUDIT_JS: &str = include_str!("a11y.js");

/// Most violations reported per page.
const MAX_VIOLATIONS: usize = 10;

#[derive(Debug, Deserialize)]
struct Violation {
    id: String,
    impact: Option<String>,
    help: String,
    description: String,
    #[serde(default)]
    nodes: Vec<String>,
}

pub async fn run(page: &Page, url: &str) -> Result<Vec<Defect>> {
    navigate(page, url).await?;
    tokio::time::sleep(config::SETTLE_SHORT).await;

    let violations: Vec<Violation> = page
        .evaluate(AUDIT_JS)
        .await?
        .into_value()
        .unwrap_or_default();

    Ok(violations
        .into_iter()
        .take(MAX_VIOLATIONS)
        .map(|v| {
            let severity = impact_severity(v.impact.as_deref());
            let affected = v
                .nodes
                .iter()
                .take(3)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            Defect::new(
                DefectType::Accessibility,
                severity,
                format!("{}: {}", v.id, v.help),
                format!("{}. Affected elements: {affected}", v.description),
                url,
            )
        })
        .collect())
}

fn impact_severity(impact: Option<&str>) -> Severity {
    match impact {
        Some("critical") => Severity::Critical,
        Some("serious") => Severity::Warning,
        // moderate, minor, or unreported
        _ => Severity::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impact_mapping() {
        assert_eq!(impact_severity(Some("critical")), Severity::Critical);
        assert_eq!(impact_severity(Some("serious")), Severity::Warning);
        assert_eq!(impact_severity(Some("moderate")), Severity::Info);
        assert_eq!(impact_severity(Some("minor")), Severity::Info);
        assert_eq!(impact_severity(None), Severity::Info);
    }

    #[test]
    fn test_audit_script_is_embedded() {
        assert!(AUDIT_JS.contains("image-alt"));
        assert!(AUDIT_JS.contains("heading-order"));
    }
}
