// Copyright 2026 Sitescan Contributors
// SPDX-License-Identifier: Apache-2.0

//! Progress events and the per-scan subscriber fan-out.
//!
//! Each scan owns a [`ProgressBus`]: a set of subscriber callbacks invoked
//! synchronously, in subscription order, on every published event. There is
//! no buffering; a subscriber that attaches after the final event receives
//! nothing, so terminal state is queried through the scan registry instead.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

/// Pipeline phase a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Crawling,
    Testing,
    Prompts,
    Report,
    Complete,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Crawling => "crawling",
            Phase::Testing => "testing",
            Phase::Prompts => "prompts",
            Phase::Report => "report",
            Phase::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// A progress event, forwarded verbatim over SSE by the HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub message: String,
    /// 0..=100, non-decreasing within a scan.
    pub progress: u8,
}

impl ProgressEvent {
    pub fn new(phase: Phase, message: impl Into<String>, progress: u8) -> Self {
        Self {
            phase,
            message: message.into(),
            progress,
        }
    }
}

type Callback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    entries: Vec<(u64, Callback)>,
}

/// Multi-subscriber fan-out for one scan.
///
/// Subscribers may be added and removed concurrently with publishes. A
/// removal takes effect before the next publish: the subscriber list is
/// snapshotted under the lock, then callbacks run outside it, so a callback
/// may itself subscribe or unsubscribe without deadlocking.
#[derive(Default)]
pub struct ProgressBus {
    subscribers: Mutex<Subscribers>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a callback; returns a token for [`ProgressBus::unsubscribe`].
    pub fn subscribe(&self, callback: impl Fn(&ProgressEvent) + Send + Sync + 'static) -> u64 {
        let mut subs = self.lock();
        subs.next_id += 1;
        let id = subs.next_id;
        subs.entries.push((id, Arc::new(callback)));
        id
    }

    /// Detach a subscriber. Idempotent; unknown tokens are ignored.
    pub fn unsubscribe(&self, id: u64) {
        self.lock().entries.retain(|(sid, _)| *sid != id);
    }

    /// Invoke every subscriber with the event, in subscription order.
    pub fn publish(&self, event: &ProgressEvent) {
        let snapshot: Vec<Callback> = self.lock().entries.iter().map(|(_, cb)| Arc::clone(cb)).collect();
        for callback in snapshot {
            callback(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().entries.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Subscribers> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Publication helper that enforces the monotonic-progress contract.
///
/// The orchestrator publishes through this; a percentage lower than one
/// already published is raised to the previous high-water mark.
pub struct ScanProgress {
    bus: Arc<ProgressBus>,
    last: AtomicU8,
}

impl ScanProgress {
    pub fn new(bus: Arc<ProgressBus>) -> Self {
        Self {
            bus,
            last: AtomicU8::new(0),
        }
    }

    pub fn emit(&self, phase: Phase, message: impl Into<String>, progress: u8) {
        let clamped = progress.min(100).max(self.last.load(Ordering::Relaxed));
        self.last.store(clamped, Ordering::Relaxed);
        self.bus.publish(&ProgressEvent::new(phase, message, clamped));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_event_wire_shape() {
        let event = ProgressEvent::new(Phase::Crawling, "Starting page discovery...", 0);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["phase"], "crawling");
        assert_eq!(json["message"], "Starting page discovery...");
        assert_eq!(json["progress"], 0);
    }

    #[test]
    fn test_publish_reaches_subscribers_in_order() {
        let bus = ProgressBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let order = Arc::clone(&order);
            bus.subscribe(move |_| order.lock().unwrap().push(tag));
        }
        bus.publish(&ProgressEvent::new(Phase::Testing, "x", 50));
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = ProgressBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let id = bus.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(&ProgressEvent::new(Phase::Testing, "x", 10));
        bus.unsubscribe(id);
        bus.unsubscribe(id);
        bus.publish(&ProgressEvent::new(Phase::Testing, "y", 20));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_late_subscriber_receives_nothing() {
        let bus = ProgressBus::new();
        bus.publish(&ProgressEvent::new(Phase::Complete, "Scan complete!", 100));
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        bus.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_scan_progress_is_monotonic() {
        let bus = Arc::new(ProgressBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        bus.subscribe(move |ev| s.lock().unwrap().push(ev.progress));
        let progress = ScanProgress::new(Arc::clone(&bus));
        progress.emit(Phase::Crawling, "a", 10);
        progress.emit(Phase::Crawling, "b", 5);
        progress.emit(Phase::Testing, "c", 60);
        progress.emit(Phase::Complete, "d", 100);
        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![10, 10, 60, 100]);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }
}
