//! Engine tunables with system-memory-derived budget sizing

use log::info;
use sysinfo::System;

/// Cache engine configuration
///
/// Defaults follow the tuning of the reference overlay player: a pool of a
/// few hundred recyclable buffers, a look-ahead of three screenfuls, and
/// sub-second pacing margins.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    // Memory
    pub budget_bytes: usize, // Max total raster bytes held by the store (default 64 MiB)
    pub pool_capacity: usize, // Max pooled raster buffers (default 500)
    pub pool_prime: usize,   // Buffers pre-allocated on begin() (default 200)

    // Timeline geometry
    pub max_duration_ms: i64,   // Longest a comment stays on screen (default 4000)
    pub lookahead_screens: i64, // Build horizon in screenfuls of max_duration (default 3)

    // Worker pacing
    pub rest_margin_ms: i64,   // Keep-ahead slack before the worker rests (default 1000)
    pub resync_offset_ms: i64, // Forward offset when re-syncing the ahead clock (default 100)
    pub pass_quota_ms: u64,    // Wall-clock cap for one build pass (default 3800)
    pub frame_wait_ms: u64,    // Bounded wait on the frame signal between builds (default 100)
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            budget_bytes: 64 * 1024 * 1024,
            pool_capacity: 500,
            pool_prime: 200,
            max_duration_ms: 4000,
            lookahead_screens: 3,
            rest_margin_ms: 1000,
            resync_offset_ms: 100,
            pass_quota_ms: 3800,
            frame_wait_ms: 100,
        }
    }
}

impl CacheConfig {
    /// Build horizon in milliseconds
    pub fn horizon_ms(&self) -> i64 {
        self.lookahead_screens * self.max_duration_ms
    }

    /// Size the byte budget from available system memory.
    ///
    /// # Arguments
    ///
    /// * `mem_fraction` - Fraction of available memory (0.0-1.0, e.g. 0.25 = 25%)
    /// * `reserve_gb` - Reserve memory for the rest of the system (GB)
    pub fn from_system(mem_fraction: f64, reserve_gb: f64) -> Self {
        let mut sys = System::new_all();
        sys.refresh_memory();

        let available = sys.available_memory() as usize;
        let reserve = (reserve_gb * 1024.0 * 1024.0 * 1024.0) as usize;
        let usable = available.saturating_sub(reserve);
        let budget_bytes = ((usable as f64 * mem_fraction) as usize).max(8 * 1024 * 1024); // min 8 MiB

        info!(
            "CacheConfig from system: available={} MB, reserve={} MB, budget={} MB ({}%)",
            available / 1024 / 1024,
            reserve / 1024 / 1024,
            budget_bytes / 1024 / 1024,
            (mem_fraction * 100.0) as u32
        );

        Self {
            budget_bytes,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_horizon() {
        let cfg = CacheConfig::default();
        assert_eq!(cfg.horizon_ms(), 12_000);
        assert!(cfg.pool_prime <= cfg.pool_capacity);
    }

    #[test]
    fn test_from_system_has_floor() {
        // absurd reserve leaves nothing usable, budget still has a floor
        let cfg = CacheConfig::from_system(0.5, 1024.0 * 1024.0);
        assert!(cfg.budget_bytes >= 8 * 1024 * 1024);
    }
}
