//! Defect model shared by every pipeline stage.
//!
//! Testers create [`Defect`]s with an empty `id` and `fix_prompt`; the prompt
//! stage fills `fix_prompt` exactly once and the report builder assigns `id`s
//! to the defects it keeps. Everything serializes camelCase for the HTTP
//! collaborator.

use serde::{Deserialize, Serialize};

/// The closed set of defect categories a scan can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DefectType {
    #[serde(rename = "console-error")]
    ConsoleError,
    #[serde(rename = "network-error")]
    NetworkError,
    #[serde(rename = "broken-link")]
    BrokenLink,
    #[serde(rename = "broken-image")]
    BrokenImage,
    #[serde(rename = "accessibility")]
    Accessibility,
    #[serde(rename = "responsive")]
    Responsive,
}

impl DefectType {
    /// Every defect type, in reporting order.
    pub const ALL: [DefectType; 6] = [
        DefectType::ConsoleError,
        DefectType::NetworkError,
        DefectType::BrokenLink,
        DefectType::BrokenImage,
        DefectType::Accessibility,
        DefectType::Responsive,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DefectType::ConsoleError => "console-error",
            DefectType::NetworkError => "network-error",
            DefectType::BrokenLink => "broken-link",
            DefectType::BrokenImage => "broken-image",
            DefectType::Accessibility => "accessibility",
            DefectType::Responsive => "responsive",
        }
    }
}

impl std::fmt::Display for DefectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Defect severity. The variant order is the report order: critical sorts
/// before warning, warning before info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single observed defect on one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Defect {
    /// Unique within a report; assigned by the report builder, empty before.
    pub id: String,
    #[serde(rename = "type")]
    pub defect_type: DefectType,
    pub severity: Severity,
    pub title: String,
    pub details: String,
    /// Absolute URL of the page the defect was found on.
    pub page: String,
    /// Remediation hint; empty until the prompt stage runs.
    pub fix_prompt: String,
}

impl Defect {
    /// A freshly detected defect: no id, no remediation hint yet.
    pub fn new(
        defect_type: DefectType,
        severity: Severity,
        title: impl Into<String>,
        details: impl Into<String>,
        page: &str,
    ) -> Self {
        Self {
            id: String::new(),
            defect_type,
            severity,
            title: title.into(),
            details: details.into(),
            page: page.to_string(),
            fix_prompt: String::new(),
        }
    }

    /// Cross-page deduplication fingerprint: `<type>::<title>::<details>`.
    pub fn fingerprint(&self) -> String {
        format!("{}::{}::{}", self.defect_type, self.title, self.details)
    }
}

/// One crawled page and the defects found on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    /// Normalized absolute URL, same-origin with the seed.
    pub url: String,
    pub title: String,
    pub load_time_ms: u64,
    pub defects: Vec<Defect>,
}

impl PageRecord {
    pub fn new(url: impl Into<String>, title: impl Into<String>, load_time_ms: u64) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            load_time_ms,
            defects: Vec::new(),
        }
    }
}
