//! BARRAGE - Timed comment render-cache library
//!
//! Pre-builds rasters for time-stamped overlay comments just ahead of a
//! moving playback clock, so the render path blits instead of rasterizing.
//! Re-exports all modules for use by binary targets.

// Cache engine (clocks, store, pool, gate, scheduler)
pub mod core;

// Domain modules
pub mod config;
pub mod entities;

// Re-export commonly used types from core
pub use crate::core::clock::TimelineClock;
pub use crate::core::gate::{GateState, RenderGate};
pub use crate::core::pool::RasterPool;
pub use crate::core::scheduler::{CacheScheduler, Command};
pub use crate::core::stats::CacheStats;
pub use crate::core::store::CacheStore;

// Re-export entities
pub use config::CacheConfig;
pub use entities::{
    BuildError, Comment, CommentKind, CommentRef, CommentSource, Displayer, MonoDisplayer, Raster,
    SortedComments, Surface,
};
