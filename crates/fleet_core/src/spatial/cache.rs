//! Shortest-path memo shared by every routing call of a run.
//!
//! Two tiers: an immutable precomputed table (optionally loaded from a
//! bincode file) and an LRU of paths computed on demand. Paths are
//! deterministic for a fixed map, so an evicted entry recomputes to the same
//! value. The LRU lock is held while a miss is computed, which serialises
//! concurrent first requests for the same pair.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use h3o::CellIndex;
use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::error::SimResult;

pub const DEFAULT_PATH_CACHE_CAPACITY: usize = 200_000;

/// Distance and cell sequence of a shortest path, endpoints included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPath {
    pub distance_m: f64,
    #[serde(with = "cell_vec_serde")]
    pub cells: Vec<CellIndex>,
}

impl CachedPath {
    fn reversed(&self) -> Self {
        let mut cells = self.cells.clone();
        cells.reverse();
        Self {
            distance_m: self.distance_m,
            cells,
        }
    }
}

/// One row of a serialised precomputed table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecomputedPath {
    pub from: u64,
    pub to: u64,
    pub path: CachedPath,
}

type PairKey = (CellIndex, CellIndex);

pub struct RoutePathCache {
    precomputed: HashMap<PairKey, Arc<CachedPath>>,
    computed: Mutex<LruCache<PairKey, Arc<CachedPath>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl fmt::Debug for RoutePathCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutePathCache")
            .field("precomputed", &self.precomputed.len())
            .field("computed", &self.computed_len())
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for RoutePathCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_PATH_CACHE_CAPACITY)
    }
}

impl RoutePathCache {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            precomputed: HashMap::new(),
            computed: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Seeds the read-only tier. Later entries for the same pair win.
    pub fn with_precomputed<I>(mut self, entries: I) -> SimResult<Self>
    where
        I: IntoIterator<Item = PrecomputedPath>,
    {
        for entry in entries {
            let from = cell_from_raw(entry.from)?;
            let to = cell_from_raw(entry.to)?;
            self.precomputed.insert((from, to), Arc::new(entry.path));
        }
        Ok(self)
    }

    /// Loads a bincode-encoded `Vec<PrecomputedPath>` into the read-only tier.
    #[cfg(feature = "precomputed")]
    pub fn load_bincode<P: AsRef<std::path::Path>>(self, path: P) -> SimResult<Self> {
        let bytes = std::fs::read(path)?;
        let entries: Vec<PrecomputedPath> = bincode::deserialize(&bytes)?;
        log::info!("loaded {} precomputed paths", entries.len());
        self.with_precomputed(entries)
    }

    #[cfg(feature = "precomputed")]
    pub fn write_bincode<P: AsRef<std::path::Path>>(
        entries: &[PrecomputedPath],
        path: P,
    ) -> SimResult<()> {
        let bytes = bincode::serialize(entries)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Returns the path for `(from, to)`, computing and memoising it on a miss.
    /// A cached `(to, from)` path is reused reversed.
    pub fn get_or_compute<F>(
        &self,
        from: CellIndex,
        to: CellIndex,
        compute: F,
    ) -> SimResult<Arc<CachedPath>>
    where
        F: FnOnce() -> SimResult<CachedPath>,
    {
        if let Some(path) = self.precomputed.get(&(from, to)) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(path));
        }
        if let Some(path) = self.precomputed.get(&(to, from)) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::new(path.reversed()));
        }

        let mut computed = self.computed.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(path) = computed.get(&(from, to)) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(path));
        }
        if let Some(reverse) = computed.get(&(to, from)) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            let path = Arc::new(reverse.reversed());
            computed.put((from, to), Arc::clone(&path));
            return Ok(path);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let path = Arc::new(compute()?);
        computed.put((from, to), Arc::clone(&path));
        Ok(path)
    }

    pub fn precomputed_len(&self) -> usize {
        self.precomputed.len()
    }

    pub fn computed_len(&self) -> usize {
        self.computed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// `(hits, misses)` since construction.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

fn cell_from_raw(raw: u64) -> SimResult<CellIndex> {
    CellIndex::try_from(raw).map_err(|_| crate::error::SimError::InvalidCell(format!("{raw:x}")))
}

/// Stores cell sequences as raw `u64` ids.
mod cell_vec_serde {
    use h3o::CellIndex;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(cells: &[CellIndex], serializer: S) -> Result<S::Ok, S::Error> {
        let raw: Vec<u64> = cells.iter().map(|cell| u64::from(*cell)).collect();
        raw.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<CellIndex>, D::Error> {
        let raw = Vec::<u64>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|value| {
                CellIndex::try_from(value)
                    .map_err(|_| serde::de::Error::custom(format!("invalid cell id {value:x}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{test_cell, test_neighbor_cell};

    fn two_cell_path() -> CachedPath {
        CachedPath {
            distance_m: 120.0,
            cells: vec![test_cell(), test_neighbor_cell()],
        }
    }

    #[test]
    fn computes_once_and_reuses_reverse() {
        let cache = RoutePathCache::with_capacity(16);
        let (a, b) = (test_cell(), test_neighbor_cell());

        let first = cache.get_or_compute(a, b, || Ok(two_cell_path())).expect("path");
        let again = cache
            .get_or_compute(a, b, || panic!("must be cached"))
            .expect("path");
        assert_eq!(first, again);

        let reverse = cache
            .get_or_compute(b, a, || panic!("reverse must be reused"))
            .expect("path");
        assert_eq!(reverse.cells, vec![b, a]);
        assert_eq!(reverse.distance_m, first.distance_m);
        assert_eq!(cache.stats(), (2, 1));
    }

    #[test]
    fn precomputed_tier_wins_over_compute() {
        let (a, b) = (test_cell(), test_neighbor_cell());
        let cache = RoutePathCache::with_capacity(4)
            .with_precomputed(vec![PrecomputedPath {
                from: a.into(),
                to: b.into(),
                path: two_cell_path(),
            }])
            .expect("valid table");
        let path = cache
            .get_or_compute(a, b, || panic!("precomputed"))
            .expect("path");
        assert_eq!(path.distance_m, 120.0);
        assert_eq!(cache.computed_len(), 0);
    }

    #[test]
    fn failed_computation_is_not_cached() {
        let cache = RoutePathCache::with_capacity(4);
        let (a, b) = (test_cell(), test_neighbor_cell());
        let err = cache.get_or_compute(a, b, || {
            Err(crate::error::SimError::NoPath { from: a, to: b })
        });
        assert!(err.is_err());
        assert_eq!(cache.computed_len(), 0);
    }
}
