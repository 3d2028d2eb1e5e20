//! Bounded, time-expiring answer cache keyed by request fingerprint.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use groundqa_core::config::CacheSettings;

use crate::pipeline::Answer;

/// Hex blake3 digest over the whitespace-normalized, lowercased question, the
/// category filter and `top_k`.
pub fn fingerprint(question: &str, category_filter: Option<&str>, top_k: usize) -> String {
    let normalized = question.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let mut hasher = blake3::Hasher::new();
    hasher.update(normalized.as_bytes());
    hasher.update(&[0x1f]);
    hasher.update(category_filter.unwrap_or("").as_bytes());
    hasher.update(&[0x1f]);
    hasher.update(&(top_k as u64).to_le_bytes());
    hasher.finalize().to_hex().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub size: usize,
    pub max_size: usize,
    pub ttl_secs: u64,
}

struct Entry {
    created_at: Instant,
    payload: Answer,
}

pub struct ResultCache {
    enabled: bool,
    ttl: Duration,
    max_size: usize,
    entries: Mutex<HashMap<String, Entry>>,
}

impl ResultCache {
    pub fn new(enabled: bool, ttl: Duration, max_size: usize) -> Self {
        Self { enabled, ttl, max_size, entries: Mutex::new(HashMap::new()) }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(settings.enabled, Duration::from_secs(settings.ttl_secs), settings.max_size)
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<Answer> { self.get_at(key, Instant::now()) }

    /// Expired entries are removed here and reported as a miss.
    pub fn get_at(&self, key: &str, now: Instant) -> Option<Answer> {
        if !self.enabled {
            return None;
        }
        let mut entries = self.entries();
        let entry = entries.get(key)?;
        if now.saturating_duration_since(entry.created_at) > self.ttl {
            entries.remove(key);
            debug!(key, "cache entry expired");
            return None;
        }
        debug!(key, "cache hit");
        Some(entry.payload.clone())
    }

    pub fn set(&self, key: &str, payload: Answer) { self.set_at(key, payload, Instant::now()) }

    /// Inserting a new key at capacity first evicts the entry with the oldest
    /// insertion time. Overwriting an existing key evicts nothing.
    pub fn set_at(&self, key: &str, payload: Answer, now: Instant) {
        if !self.enabled || self.max_size == 0 {
            return;
        }
        let mut entries = self.entries();
        if !entries.contains_key(key) && entries.len() >= self.max_size {
            let oldest = entries.iter().min_by_key(|(_, e)| e.created_at).map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
                debug!(evicted = %oldest, "evicted oldest cache entry");
            }
        }
        entries.insert(key.to_string(), Entry { created_at: now, payload });
    }

    pub fn clear(&self) {
        self.entries().clear();
        info!("cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            enabled: self.enabled,
            size: self.entries().len(),
            max_size: self.max_size,
            ttl_secs: self.ttl.as_secs(),
        }
    }
}
