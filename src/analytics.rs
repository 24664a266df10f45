//! Analytics sink: one JSONL record per completed scan.
//!
//! Write-only from the scan engine's perspective; the HTTP surface reads
//! the file back for the admin view. Failures are logged, never propagated.

use crate::defects::DefectType;
use crate::report::Report;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeverityBreakdown {
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
}

/// The single record emitted per completed scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanCompleteRecord {
    pub event: String,
    pub domain: String,
    pub pages_scanned: usize,
    pub total_bugs: usize,
    pub bugs_by_type: BTreeMap<DefectType, usize>,
    pub bugs_by_severity: SeverityBreakdown,
    pub used_templates: bool,
    pub ts: String,
}

impl ScanCompleteRecord {
    pub fn from_report(report: &Report, used_templates: bool) -> Self {
        let domain = Url::parse(&report.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| report.url.clone());
        Self {
            event: "scan_complete".to_string(),
            domain,
            pages_scanned: report.pages_found,
            total_bugs: report.summary.total_defects,
            bugs_by_type: report.summary.by_type.clone(),
            bugs_by_severity: SeverityBreakdown {
                critical: report.summary.critical,
                warning: report.summary.warning,
                info: report.summary.info,
            },
            used_templates,
            ts: Utc::now().to_rfc3339(),
        }
    }
}

/// Append-only JSONL sink.
pub struct AnalyticsSink {
    path: PathBuf,
}

impl AnalyticsSink {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location: `<data dir>/analytics.jsonl`.
    pub fn default_path() -> PathBuf {
        crate::config::data_dir().join("analytics.jsonl")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. Best-effort: I/O problems are logged and dropped.
    pub fn record(&self, record: &ScanCompleteRecord) {
        if let Err(e) = self.try_record(record) {
            warn!("could not write analytics record to {}: {e}", self.path.display());
        }
    }

    fn try_record(&self, record: &ScanCompleteRecord) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let json = serde_json::to_string(record)?;
        writeln!(file, "{json}")
    }

    /// All records currently on disk; unparseable lines are skipped.
    /// Used by the HTTP surface's admin view, not by the scan engine.
    pub fn read_all(&self) -> Vec<serde_json::Value> {
        let Ok(text) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}
