//! Tiered remediation-hint generation.
//!
//! For each defect, in order: prompt cache, external LLM, deterministic
//! template. Hints from either generator are written through to the cache.
//! External calls go out in per-page batches; a batch whose response cannot
//! be used falls back to templates on its own, and the global fallback flag
//! is raised only when no batch succeeds (or no credential is configured).

pub mod cache;
pub mod llm;
pub mod templates;

use crate::defects::Defect;
use self::cache::PromptCache;
use self::llm::LlmClient;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You are helping a website owner fix quality issues found by an \
automated scan. For each issue in the user message, write a plain-language remediation hint of \
2-4 sentences that works regardless of the site's technology stack. Respond with a JSON array of \
strings, one per issue, in the same order, and nothing else.";

/// Cache key: `<type>::<title>::<first 12 hex chars of SHA-256(details)>`.
///
/// Coarser than the report fingerprint: whitespace-level differences in
/// details hash apart rarely enough that near-duplicates share a hint.
pub fn cache_key(defect: &Defect) -> String {
    let digest = Sha256::digest(defect.details.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("{}::{}::{}", defect.defect_type, defect.title, &hex[..12])
}

/// Counters reported alongside the filled-in defects.
#[derive(Debug, Default, Clone)]
pub struct PromptStats {
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub used_fallback: bool,
    pub fallback_reason: Option<String>,
}

/// Fill `fix_prompt` on every defect, in place, preserving order.
pub async fn generate(
    defects: &mut [Defect],
    prompt_cache: &PromptCache,
    client: Option<&LlmClient>,
) -> PromptStats {
    let mut stats = PromptStats::default();
    let mut batches_attempted = 0usize;
    let mut batches_succeeded = 0usize;
    let mut last_error: Option<String> = None;

    for batch in page_batches(defects) {
        let mut uncached: Vec<usize> = Vec::new();
        for &i in &batch {
            let key = cache_key(&defects[i]);
            match prompt_cache.get(&key) {
                Some(hint) => {
                    defects[i].fix_prompt = hint;
                    stats.cache_hits += 1;
                }
                None => {
                    stats.cache_misses += 1;
                    uncached.push(i);
                }
            }
        }
        if uncached.is_empty() {
            continue;
        }

        let mut external: Option<Vec<String>> = None;
        if let Some(client) = client {
            batches_attempted += 1;
            let payload = batch_payload(defects, &uncached);
            match client.generate_batch(SYSTEM_PROMPT, &payload, uncached.len()).await {
                Ok(hints) => {
                    batches_succeeded += 1;
                    external = Some(hints);
                }
                Err(e) => {
                    warn!("LLM batch failed, using templates: {e:#}");
                    last_error = Some(format!("{e:#}"));
                }
            }
        }

        match external {
            Some(hints) => {
                for (&i, hint) in uncached.iter().zip(hints) {
                    prompt_cache.insert(&cache_key(&defects[i]), &hint);
                    defects[i].fix_prompt = hint;
                }
            }
            None => {
                for &i in &uncached {
                    let hint = templates::template_prompt(&defects[i]);
                    prompt_cache.insert(&cache_key(&defects[i]), &hint);
                    defects[i].fix_prompt = hint;
                }
            }
        }
    }

    if client.is_none() && stats.cache_misses > 0 {
        stats.used_fallback = true;
        stats.fallback_reason = Some(format!(
            "No LLM API key configured ({}); fix prompts were generated from templates",
            crate::config::LLM_API_KEY_ENV
        ));
    } else if batches_attempted > 0 && batches_succeeded == 0 {
        // A single successful batch purges the flag.
        stats.used_fallback = true;
        stats.fallback_reason = Some(format!(
            "LLM prompt generation failed; fix prompts were generated from templates ({})",
            last_error.unwrap_or_else(|| "unknown error".to_string())
        ));
    }

    debug!(
        "prompts: {} cached, {} generated, fallback={}",
        stats.cache_hits, stats.cache_misses, stats.used_fallback
    );
    stats
}

/// Indices grouped into per-page batches, preserving input order.
fn page_batches(defects: &[Defect]) -> Vec<Vec<usize>> {
    let mut batches: Vec<(String, Vec<usize>)> = Vec::new();
    for (i, defect) in defects.iter().enumerate() {
        match batches.last_mut() {
            Some((page, indices)) if *page == defect.page => indices.push(i),
            _ => batches.push((defect.page.clone(), vec![i])),
        }
    }
    batches.into_iter().map(|(_, indices)| indices).collect()
}

fn batch_payload(defects: &[Defect], indices: &[usize]) -> String {
    let issues: Vec<serde_json::Value> = indices
        .iter()
        .map(|&i| {
            let d = &defects[i];
            serde_json::json!({
                "type": d.defect_type,
                "severity": d.severity,
                "title": d.title,
                "details": d.details,
            })
        })
        .collect();
    serde_json::json!({
        "page": defects[indices[0]].page,
        "issues": issues,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defects::{DefectType, Severity};

    fn defect(title: &str, details: &str, page: &str) -> Defect {
        Defect::new(DefectType::ConsoleError, Severity::Warning, title, details, page)
    }

    fn temp_cache() -> (tempfile::TempDir, PromptCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = PromptCache::open(dir.path().join("cache.json"));
        (dir, cache)
    }

    #[test]
    fn test_cache_key_shape() {
        let d = defect("Console error: boom", "boom", "http://site.example");
        let key = cache_key(&d);
        let parts: Vec<&str> = key.split("::").collect();
        assert_eq!(parts[0], "console-error");
        assert_eq!(parts[1], "Console error: boom");
        assert_eq!(parts[2].len(), 12);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_cache_key_ignores_page() {
        let a = defect("t", "d", "http://site.example/a");
        let b = defect("t", "d", "http://site.example/b");
        assert_eq!(cache_key(&a), cache_key(&b));
    }

    #[test]
    fn test_page_batches_group_consecutive_pages() {
        let defects = vec![
            defect("a", "1", "http://s/one"),
            defect("b", "2", "http://s/one"),
            defect("c", "3", "http://s/two"),
        ];
        let batches = page_batches(&defects);
        assert_eq!(batches, vec![vec![0, 1], vec![2]]);
    }

    #[tokio::test]
    async fn test_template_tier_fills_everything_and_flags_fallback() {
        let (_dir, prompt_cache) = temp_cache();
        let mut defects = vec![
            defect("Console error: boom", "boom", "http://s/one"),
            defect("Console error: crash", "crash", "http://s/two"),
        ];
        let stats = generate(&mut defects, &prompt_cache, None).await;
        assert!(defects.iter().all(|d| !d.fix_prompt.is_empty()));
        assert_eq!(stats.cache_hits, 0);
        assert_eq!(stats.cache_misses, 2);
        assert!(stats.used_fallback);
        assert!(stats.fallback_reason.is_some());
        assert_eq!(prompt_cache.len(), 2);
    }

    #[tokio::test]
    async fn test_second_run_hits_cache_and_clears_flag() {
        let (_dir, prompt_cache) = temp_cache();
        let mut first = vec![defect("Console error: boom", "boom", "http://s/one")];
        generate(&mut first, &prompt_cache, None).await;
        let hint = first[0].fix_prompt.clone();

        // Same (type, title, details) on a different page: cache hit, no fallback.
        let mut second = vec![defect("Console error: boom", "boom", "http://s/elsewhere")];
        let stats = generate(&mut second, &prompt_cache, None).await;
        assert_eq!(second[0].fix_prompt, hint);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 0);
        assert!(!stats.used_fallback);
    }

    #[tokio::test]
    async fn test_all_cached_means_no_fallback_without_client() {
        let (_dir, prompt_cache) = temp_cache();
        let d = defect("t", "d", "http://s/p");
        prompt_cache.insert(&cache_key(&d), "cached hint");
        let mut defects = vec![d];
        let stats = generate(&mut defects, &prompt_cache, None).await;
        assert_eq!(defects[0].fix_prompt, "cached hint");
        assert!(!stats.used_fallback);
    }
}
