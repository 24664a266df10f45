//! Scan registry: the invocation surface the HTTP collaborator talks to.
//!
//! One scan at a time process-wide. A scan is created in `running` state,
//! spawned as a background task, and transitions exactly once to `complete`
//! or `error`. Scans are never removed; the registry is the process-lifetime
//! record of everything scanned.

use crate::analytics::{AnalyticsSink, ScanCompleteRecord};
use crate::config::ScanConfig;
use crate::orchestrator;
use crate::progress::{ProgressBus, ProgressEvent};
use crate::prompts::{cache::PromptCache, llm::LlmClient};
use crate::report::Report;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tracing::{error, info};
use url::Url;
use uuid::Uuid;

/// Synchronous rejection codes for `start_scan`.
#[derive(Debug, Error)]
pub enum StartScanError {
    #[error("invalid seed URL: {0}")]
    InvalidUrl(String),
    #[error("a scan is already running")]
    ScanInProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Running,
    Complete,
    Error,
}

/// Point-in-time view of one scan, shaped for the report endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSnapshot {
    pub status: ScanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<Report>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct ScanResult {
    status: ScanStatus,
    report: Option<Report>,
    error: Option<String>,
}

struct ScanState {
    seed: String,
    bus: Arc<ProgressBus>,
    result: Mutex<ScanResult>,
}

impl ScanState {
    fn new(seed: &str) -> Self {
        Self {
            seed: seed.to_string(),
            bus: Arc::new(ProgressBus::new()),
            result: Mutex::new(ScanResult {
                status: ScanStatus::Running,
                report: None,
                error: None,
            }),
        }
    }

    fn status(&self) -> ScanStatus {
        self.lock().status
    }

    fn complete(&self, report: Report) {
        let mut result = self.lock();
        if result.status == ScanStatus::Running {
            result.status = ScanStatus::Complete;
            result.report = Some(report);
        }
    }

    fn fail(&self, message: String) {
        let mut result = self.lock();
        if result.status == ScanStatus::Running {
            result.status = ScanStatus::Error;
            result.error = Some(message);
        }
    }

    fn snapshot(&self) -> ScanSnapshot {
        let result = self.lock();
        ScanSnapshot {
            status: result.status,
            report: result.report.clone(),
            error: result.error.clone(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScanResult> {
        self.result.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Idempotent detach handle returned by `subscribe_progress`.
pub struct Unsubscriber {
    bus: Arc<ProgressBus>,
    token: u64,
    detached: AtomicBool,
}

impl Unsubscriber {
    pub fn detach(&self) {
        if !self.detached.swap(true, Ordering::SeqCst) {
            self.bus.unsubscribe(self.token);
        }
    }
}

impl Drop for Unsubscriber {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Process-wide registry of scans. Not a global: constructed once in `main`
/// (or per test) and shared by reference.
pub struct ScanRegistry {
    scans: RwLock<HashMap<String, Arc<ScanState>>>,
    prompt_cache: Arc<PromptCache>,
    analytics: Arc<AnalyticsSink>,
    scan_config: ScanConfig,
}

impl ScanRegistry {
    pub fn new(
        prompt_cache: Arc<PromptCache>,
        analytics: Arc<AnalyticsSink>,
        scan_config: ScanConfig,
    ) -> Self {
        Self {
            scans: RwLock::new(HashMap::new()),
            prompt_cache,
            analytics,
            scan_config,
        }
    }

    /// Validate the seed, reject if a scan is running, then spawn the
    /// pipeline as a background task and return the new scan id.
    pub fn start_scan(self: &Arc<Self>, seed: &str) -> Result<String, StartScanError> {
        validate_seed(seed)?;

        let (id, state) = {
            let mut scans = self.write();
            if scans.values().any(|s| s.status() == ScanStatus::Running) {
                return Err(StartScanError::ScanInProgress);
            }
            let id = Uuid::new_v4().to_string();
            let state = Arc::new(ScanState::new(seed));
            scans.insert(id.clone(), Arc::clone(&state));
            (id, state)
        };

        info!("scan {id} started for {seed}");
        let registry = Arc::clone(self);
        let scan_id = id.clone();
        tokio::spawn(async move {
            let client = LlmClient::from_env();
            let outcome = orchestrator::run_scan(
                &state.seed,
                registry.scan_config,
                Arc::clone(&state.bus),
                Arc::clone(&registry.prompt_cache),
                client,
            )
            .await;
            match outcome {
                Ok(outcome) => {
                    let record =
                        ScanCompleteRecord::from_report(&outcome.report, outcome.used_templates);
                    registry.analytics.record(&record);
                    info!(
                        "scan {scan_id} complete: {} page(s), {} defect(s)",
                        outcome.report.pages_found, outcome.report.summary.total_defects
                    );
                    state.complete(outcome.report);
                }
                Err(e) => {
                    error!("scan {scan_id} failed: {e:#}");
                    state.fail(format!("{e:#}"));
                }
            }
        });

        Ok(id)
    }

    /// Attach a progress callback to a scan. Returns `None` for unknown ids.
    /// Late subscribers receive nothing; query `get_report` for terminal
    /// state instead.
    pub fn subscribe_progress(
        &self,
        id: &str,
        on_event: impl Fn(&ProgressEvent) + Send + Sync + 'static,
    ) -> Option<Unsubscriber> {
        let state = self.read().get(id).cloned()?;
        let token = state.bus.subscribe(on_event);
        Some(Unsubscriber {
            bus: Arc::clone(&state.bus),
            token,
            detached: AtomicBool::new(false),
        })
    }

    /// Status plus report or error, shaped for the HTTP surface.
    pub fn get_report(&self, id: &str) -> Option<ScanSnapshot> {
        self.read().get(id).map(|state| state.snapshot())
    }

    pub fn analytics(&self) -> &AnalyticsSink {
        &self.analytics
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<ScanState>>> {
        self.scans.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<ScanState>>> {
        self.scans.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A scannable seed: absolute http(s) URL whose hostname has at least two
/// dot-separated parts and a TLD of two or more characters.
pub fn validate_seed(seed: &str) -> Result<Url, StartScanError> {
    let url = Url::parse(seed).map_err(|e| StartScanError::InvalidUrl(e.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(StartScanError::InvalidUrl(format!(
            "scheme must be http or https, got {}",
            url.scheme()
        )));
    }
    let Some(host) = url.host_str() else {
        return Err(StartScanError::InvalidUrl("URL has no hostname".to_string()));
    };
    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() < 2 || parts.iter().any(|p| p.is_empty()) {
        return Err(StartScanError::InvalidUrl(format!(
            "hostname {host} must contain a dot-separated domain"
        )));
    }
    if parts.last().map(|tld| tld.len()).unwrap_or(0) < 2 {
        return Err(StartScanError::InvalidUrl(format!(
            "hostname {host} has no valid top-level domain"
        )));
    }
    Ok(url)
}
