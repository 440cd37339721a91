use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

use super::collaborators::{CollaboratorError, LiteratureCollaborator};

/// TTL cache in front of a literature collaborator. Lookups are keyed by the normalized,
/// order-independent set of search terms; a fresh hit never reaches the wrapped service.
pub struct CachedLiterature<L> {
    inner: L,
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedScore>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
struct CachedScore {
    score: f64,
    stored_at: DateTime<Utc>,
}

/// Counters describing cache effectiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl<L: LiteratureCollaborator> CachedLiterature<L> {
    pub fn new(inner: L, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn with_ttl_hours(inner: L, hours: u32) -> Self {
        Self::new(inner, Duration::hours(i64::from(hours)))
    }

    /// Cache lookup evaluated at an explicit instant.
    pub fn evidence_at(
        &self,
        terms: &[String],
        now: DateTime<Utc>,
    ) -> Result<f64, CollaboratorError> {
        let key = cache_key(terms);

        {
            let entries = self.entries.lock().expect("literature cache mutex poisoned");
            if let Some(entry) = entries.get(&key) {
                if now.signed_duration_since(entry.stored_at) < self.ttl {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(entry.score);
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let raw = self.inner.evidence_for(terms)?;
        if !raw.is_finite() {
            return Err(CollaboratorError::Unavailable(format!(
                "literature score for '{key}' is not a number"
            )));
        }
        let score = raw.clamp(0.0, 1.0);
        debug!(terms = %key, score, "literature evidence cached");

        let mut entries = self.entries.lock().expect("literature cache mutex poisoned");
        entries.retain(|_, entry| now.signed_duration_since(entry.stored_at) < self.ttl);
        entries.insert(
            key,
            CachedScore {
                score,
                stored_at: now,
            },
        );

        Ok(score)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self
                .entries
                .lock()
                .expect("literature cache mutex poisoned")
                .len(),
        }
    }
}

impl<L: LiteratureCollaborator> LiteratureCollaborator for CachedLiterature<L> {
    fn evidence_for(&self, terms: &[String]) -> Result<f64, CollaboratorError> {
        self.evidence_at(terms, Utc::now())
    }
}

fn cache_key(terms: &[String]) -> String {
    let mut normalized: Vec<String> = terms
        .iter()
        .map(|term| term.trim().to_lowercase())
        .filter(|term| !term.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized.join(" ")
}
