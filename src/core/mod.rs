//! Core engine modules - clocks, store, pool, gate, scheduler
//!
//! These modules form the cache engine, independent of any renderer.

pub mod clock;
pub mod gate;
pub mod pool;
pub mod scheduler;
pub mod stats;
pub mod store;

// Re-exports for convenience
pub use clock::TimelineClock;
pub use gate::{GateState, RenderGate};
pub use pool::RasterPool;
pub use scheduler::{CacheScheduler, Command, ReadyFn};
pub use stats::CacheStats;
pub use store::CacheStore;
