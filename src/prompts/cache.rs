//! Persistent prompt cache.
//!
//! Process-wide key-value store over remediation hints, backed by one
//! pretty-printed JSON file. Writes are last-writer-wins under a mutex; the
//! whole file is rewritten on every mutation. A missing file is an empty
//! cache; a corrupt file is logged and replaced on the next write.

use crate::config;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub prompt: String,
    pub created_at: String,
}

pub struct PromptCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl PromptCache {
    /// Open the cache at `path`, loading whatever is already there.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(map) => map,
                Err(e) => {
                    warn!("prompt cache at {} is corrupt, starting empty: {e}", path.display());
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!("could not read prompt cache at {}: {e}", path.display());
                HashMap::new()
            }
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Default location: `<data dir>/prompt-cache.json`.
    pub fn default_path() -> PathBuf {
        config::data_dir().join("prompt-cache.json")
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).map(|entry| entry.prompt.clone())
    }

    /// Insert or overwrite, then persist. Cache I/O failures are logged and
    /// never propagated; the in-memory state stays authoritative.
    pub fn insert(&self, key: &str, prompt: &str) {
        let mut entries = self.lock();
        entries.insert(
            key.to_string(),
            CacheEntry {
                prompt: prompt.to_string(),
                created_at: Utc::now().to_rfc3339(),
            },
        );
        persist(&self.path, &entries);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn persist(path: &Path, entries: &HashMap<String, CacheEntry>) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!("could not create cache dir {}: {e}", parent.display());
            return;
        }
    }
    let json = match serde_json::to_string_pretty(entries) {
        Ok(json) => json,
        Err(e) => {
            warn!("could not serialize prompt cache: {e}");
            return;
        }
    };
    if let Err(e) = std::fs::write(path, json) {
        warn!("could not write prompt cache to {}: {e}", path.display());
    }
}
