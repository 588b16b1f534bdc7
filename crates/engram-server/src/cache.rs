// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Short-TTL cache for search results.
//!
//! Keyed by the full request shape so two requests differing only in
//! limit or kind filter never share an entry. Invalidation is coarse:
//! any observation write clears the whole cache, which is cheap at the
//! TTLs involved and can never serve a stale hit after a write.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use engram_core::{ObservationKind, ScoredObservation};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    query: String,
    kinds: Vec<String>,
    limit: usize,
    project: Option<String>,
}

struct CacheEntry {
    inserted: Instant,
    results: Vec<ScoredObservation>,
}

pub struct SearchCache {
    entries: DashMap<CacheKey, CacheEntry>,
    ttl: Duration,
}

impl SearchCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    fn key(
        query: &str,
        kinds: &[ObservationKind],
        limit: usize,
        project: Option<&str>,
    ) -> CacheKey {
        let mut kinds: Vec<String> = kinds.iter().map(|k| k.as_str().to_string()).collect();
        kinds.sort();
        CacheKey {
            query: query.to_string(),
            kinds,
            limit,
            project: project.map(str::to_string),
        }
    }

    pub fn get(
        &self,
        query: &str,
        kinds: &[ObservationKind],
        limit: usize,
        project: Option<&str>,
    ) -> Option<Vec<ScoredObservation>> {
        let key = Self::key(query, kinds, limit, project);
        let entry = self.entries.get(&key)?;
        if entry.inserted.elapsed() > self.ttl {
            drop(entry);
            self.entries.remove(&key);
            return None;
        }
        Some(entry.results.clone())
    }

    pub fn put(
        &self,
        query: &str,
        kinds: &[ObservationKind],
        limit: usize,
        project: Option<&str>,
        results: Vec<ScoredObservation>,
    ) {
        self.entries.insert(
            Self::key(query, kinds, limit, project),
            CacheEntry {
                inserted: Instant::now(),
                results,
            },
        );
    }

    /// Drop every entry. Called after any observation write.
    pub fn invalidate(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results() -> Vec<ScoredObservation> {
        vec![]
    }

    #[test]
    fn hit_within_ttl() {
        let cache = SearchCache::new(Duration::from_secs(30));
        cache.put("q", &[], 10, None, results());
        assert!(cache.get("q", &[], 10, None).is_some());
    }

    #[test]
    fn expired_entry_misses_and_is_evicted() {
        let cache = SearchCache::new(Duration::ZERO);
        cache.put("q", &[], 10, None, results());
        assert!(cache.get("q", &[], 10, None).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn key_includes_limit_and_kinds() {
        let cache = SearchCache::new(Duration::from_secs(30));
        cache.put("q", &[], 10, None, results());
        assert!(cache.get("q", &[], 20, None).is_none());
        assert!(cache.get("q", &[ObservationKind::Decision], 10, None).is_none());
    }

    #[test]
    fn kind_order_does_not_change_the_key() {
        let cache = SearchCache::new(Duration::from_secs(30));
        let ab = [ObservationKind::Decision, ObservationKind::Learning];
        let ba = [ObservationKind::Learning, ObservationKind::Decision];
        cache.put("q", &ab, 10, None, results());
        assert!(cache.get("q", &ba, 10, None).is_some());
    }

    #[test]
    fn invalidate_clears_everything() {
        let cache = SearchCache::new(Duration::from_secs(30));
        cache.put("a", &[], 10, None, results());
        cache.put("b", &[], 10, None, results());
        cache.invalidate();
        assert!(cache.is_empty());
    }
}
