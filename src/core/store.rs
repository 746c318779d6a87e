//! Byte-budgeted, time-ordered cache of pre-built comment rasters
//!
//! **Why**: The worker admits entries in display-time order, so the front of
//! the deque is always the earliest (and first to expire) entry. Admission
//! may only make room by evicting entries the playhead has already passed;
//! a still-live entry is never sacrificed for a newer one.
//!
//! **Used by**: CacheScheduler (build pass, staleness eviction), render gate
//!
//! The store does no locking of its own: every call happens under the render
//! gate, which is the one exclusion domain shared with the draw path.

use std::collections::VecDeque;
use std::sync::Arc;

use log::debug;

use crate::core::pool::RasterPool;
use crate::core::stats::CacheStats;
use crate::entities::comment::CommentRef;

#[derive(Debug)]
struct Entry {
    comment: CommentRef,
    /// Raster size recorded at admission; the running total reconciles
    /// against this, never against a re-read of mutable comment state
    bytes: usize,
}

/// Time-ordered cache entries under a byte budget
#[derive(Debug)]
pub struct CacheStore {
    entries: VecDeque<Entry>,
    bytes: usize,
    budget: usize,
    stats: Arc<CacheStats>,
}

impl CacheStore {
    pub fn new(budget: usize, stats: Arc<CacheStats>) -> Self {
        Self {
            entries: VecDeque::new(),
            bytes: 0,
            budget,
            stats,
        }
    }

    /// Admit a comment whose raster is already attached.
    ///
    /// Evicts expired entries from the front until the raster fits. Returns
    /// false without changing the store when the earliest entry is still
    /// live, or when the store is empty and the raster alone exceeds the
    /// budget; the caller abandons the build and retries on a later pass.
    pub fn admit(&mut self, comment: CommentRef, now_ms: i64, pool: &mut RasterPool) -> bool {
        let size = comment.raster_bytes();
        while self.bytes + size > self.budget {
            let Some(front) = self.entries.front() else {
                return false;
            };
            if !front.comment.is_expired(now_ms) {
                return false;
            }
            self.evict_front(pool);
        }
        self.bytes += size;
        self.entries.push_back(Entry { comment, bytes: size });
        true
    }

    fn evict_front(&mut self, pool: &mut RasterPool) {
        if let Some(e) = self.entries.pop_front() {
            self.bytes -= e.bytes;
            Self::recycle(&e, pool);
            self.stats.record_evicted();
        }
    }

    /// Detach the entry's raster and hand it back to the pool
    fn recycle(e: &Entry, pool: &mut RasterPool) {
        if let Some(raster) = e.comment.detach_raster() {
            pool.release(raster);
        }
    }

    /// Remove every entry expired at `now_ms`, wherever it sits.
    ///
    /// Full scan; surviving entries keep their relative order. Used on
    /// window-boundary events. Returns the number of entries removed.
    pub fn evict_expired(&mut self, now_ms: i64, pool: &mut RasterPool) -> usize {
        let before = self.entries.len();
        let mut freed = 0usize;
        let entries = std::mem::take(&mut self.entries);
        for e in entries {
            if e.comment.is_expired(now_ms) {
                self.bytes -= e.bytes;
                freed += e.bytes;
                Self::recycle(&e, pool);
                self.stats.record_evicted();
            } else {
                self.entries.push_back(e);
            }
        }
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!("evicted {} expired entries, freed {} KiB", removed, freed / 1024);
        }
        removed
    }

    /// Cheap steady-state variant: pop expired entries from the front only,
    /// stopping at the first live one
    pub fn evict_expired_prefix(&mut self, now_ms: i64, pool: &mut RasterPool) -> usize {
        let mut removed = 0;
        while let Some(front) = self.entries.front() {
            if !front.comment.is_expired(now_ms) {
                break;
            }
            self.evict_front(pool);
            removed += 1;
        }
        removed
    }

    /// Remove every entry whose comment is outside the render viewport,
    /// regardless of expiry
    pub fn evict_out_of_window(&mut self, pool: &mut RasterPool) -> usize {
        let before = self.entries.len();
        let entries = std::mem::take(&mut self.entries);
        for e in entries {
            if e.comment.visible() {
                self.entries.push_back(e);
            } else {
                self.bytes -= e.bytes;
                Self::recycle(&e, pool);
                self.stats.record_evicted();
            }
        }
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!("evicted {} off-screen entries, {} KiB cached", removed, self.bytes / 1024);
        }
        removed
    }

    /// Remove everything
    pub fn evict_all(&mut self, pool: &mut RasterPool) -> usize {
        let removed = self.entries.len();
        while !self.entries.is_empty() {
            self.evict_front(pool);
        }
        if removed > 0 {
            debug!("evicted all {} entries", removed);
        }
        removed
    }

    /// Display time of the earliest cached entry, 0 when empty
    pub fn first_entry_time(&self) -> i64 {
        self.entries.front().map(|e| e.comment.time_ms()).unwrap_or(0)
    }

    /// Clear the in-window flag on every cached comment (seek/reset path)
    pub fn mark_all_outside(&self) {
        for e in &self.entries {
            e.comment.set_visible(false);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current total raster bytes
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// (usage, budget) in bytes
    pub fn mem(&self) -> (usize, usize) {
        (self.bytes, self.budget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::comment::{Comment, CommentKind};
    use crate::entities::raster::Raster;

    /// Comment at `t` lasting 1000ms with an attached raster of exactly `bytes`
    fn cached(t: i64, bytes: usize) -> CommentRef {
        assert_eq!(bytes % 4, 0);
        let c = Comment::new(format!("c{}", t), CommentKind::Rolling, t, 1000);
        c.attach_raster(Raster::with_size((bytes / 4) as u32, 1));
        assert_eq!(c.raster_bytes(), bytes);
        c
    }

    fn store(budget: usize) -> (CacheStore, RasterPool) {
        (
            CacheStore::new(budget, Arc::new(CacheStats::new())),
            RasterPool::new(16),
        )
    }

    /// Test: byte accounting stays exact across admissions and evictions
    /// Validates: current size always equals the sum of cached raster sizes
    #[test]
    fn test_exact_accounting() {
        let (mut s, mut pool) = store(10_000);
        for t in 0..5 {
            assert!(s.admit(cached(t * 100, 400), 0, &mut pool));
        }
        assert_eq!(s.bytes(), 2000);
        assert_eq!(s.len(), 5);

        // expiries run 1000..=1400; at 1399 only the newest entry survives
        s.evict_expired(1399, &mut pool);
        assert_eq!(s.len(), 1);
        assert_eq!(s.bytes(), 400);

        // the boundary is inclusive: expiry == now evicts
        s.evict_expired(1400, &mut pool);
        assert_eq!(s.bytes(), 0);
        assert!(s.is_empty());
    }

    /// Test: admission never sacrifices a live entry
    /// Validates: A(t=0,600), B(t=1,600) under budget 1000: B fails while A
    /// lives, succeeds once A expired (A evicted first)
    #[test]
    fn test_admission_respects_live_entries() {
        let (mut s, mut pool) = store(1000);
        let a = cached(0, 600);
        let b = cached(1, 600);

        assert!(s.admit(a.clone(), 0, &mut pool));
        assert_eq!(s.bytes(), 600);

        // A is still live at now=500: admission must fail, store unchanged
        assert!(!s.admit(b.clone(), 500, &mut pool));
        assert_eq!(s.len(), 1);
        assert_eq!(s.bytes(), 600);
        assert!(a.has_raster());

        // A expires at 1000; retry succeeds by evicting it
        assert!(s.admit(b.clone(), 1000, &mut pool));
        assert_eq!(s.len(), 1);
        assert_eq!(s.bytes(), 600);
        assert!(!a.has_raster());
        assert!(b.has_raster());
        assert_eq!(s.first_entry_time(), 1);
    }

    /// Test: empty store, oversized raster
    /// Validates: admission fails cleanly instead of exceeding the budget
    #[test]
    fn test_admit_over_budget_when_empty() {
        let (mut s, mut pool) = store(100);
        let big = cached(0, 400);
        assert!(!s.admit(big.clone(), 0, &mut pool));
        assert!(s.is_empty());
        assert_eq!(s.bytes(), 0);
        // the raster stays with the caller, not the pool
        assert!(big.has_raster());
        assert_eq!(pool.len(), 0);
    }

    /// Test: full-scan expired eviction
    /// Validates: exactly the expired entries go, survivors keep their order
    #[test]
    fn test_evict_expired_exact() {
        let (mut s, mut pool) = store(10_000);
        // expiries: 1000, 1500, 2000, 2500
        for t in [0, 500, 1000, 1500] {
            assert!(s.admit(cached(t, 400), 0, &mut pool));
        }

        let removed = s.evict_expired(1500, &mut pool);
        assert_eq!(removed, 2);
        assert_eq!(s.len(), 2);
        assert_eq!(s.first_entry_time(), 1000);
        assert_eq!(s.bytes(), 800);
        // both rasters went back to the pool
        assert_eq!(pool.len(), 2);
    }

    /// Test: prefix sweep stops at the first live entry
    /// Validates: an unexpired head shields expired entries behind it
    #[test]
    fn test_prefix_sweep_stops_at_live_head() {
        let (mut s, mut pool) = store(10_000);
        let head = Comment::new("head", CommentKind::Rolling, 0, 60_000); // lives long
        head.attach_raster(Raster::with_size(100, 1));
        assert!(s.admit(head, 0, &mut pool));
        assert!(s.admit(cached(100, 400), 0, &mut pool)); // expires at 1100

        assert_eq!(s.evict_expired_prefix(5000, &mut pool), 0);
        assert_eq!(s.len(), 2);

        // the full scan reaches it
        assert_eq!(s.evict_expired(5000, &mut pool), 1);
        assert_eq!(s.len(), 1);
    }

    /// Test: out-of-window eviction recycles buffers
    /// Validates: only off-screen entries go, their buffers return to the pool
    #[test]
    fn test_evict_out_of_window_returns_buffer() {
        let (mut s, mut pool) = store(10_000);
        let on = cached(0, 400);
        let off = cached(500, 400);
        on.set_visible(true);
        assert!(s.admit(on.clone(), 0, &mut pool));
        assert!(s.admit(off.clone(), 0, &mut pool));
        let pooled_before = pool.len();

        assert_eq!(s.evict_out_of_window(&mut pool), 1);
        assert_eq!(s.len(), 1);
        assert!(on.has_raster());
        assert!(!off.has_raster());
        assert_eq!(pool.len(), pooled_before + 1);
        assert_eq!(s.bytes(), 400);
    }

    #[test]
    fn test_first_entry_time_sentinel() {
        let (mut s, mut pool) = store(1000);
        assert_eq!(s.first_entry_time(), 0);
        assert!(s.admit(cached(777, 400), 0, &mut pool));
        assert_eq!(s.first_entry_time(), 777);
        s.evict_all(&mut pool);
        assert_eq!(s.first_entry_time(), 0);
    }

    #[test]
    fn test_eviction_stats() {
        let stats = Arc::new(CacheStats::new());
        let mut s = CacheStore::new(10_000, Arc::clone(&stats));
        let mut pool = RasterPool::new(16);
        for t in [0, 100, 200] {
            assert!(s.admit(cached(t, 400), 0, &mut pool));
        }
        s.evict_all(&mut pool);
        assert_eq!(stats.evicted(), 3);
    }
}
