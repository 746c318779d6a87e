//! Render gate: the one exclusion domain shared by the draw path and the
//! cache worker, plus the bounded draw-notify used for build pacing
//!
//! **Why**: Store mutation, source queries and pool hand-offs must never
//! interleave with a render-path read of the same entries. Wrapping all
//! three in a single mutex makes the invariant structural instead of
//! conventional. The frame signal lives on its own mutex so the worker can
//! wait for a frame without stalling the draw path.
//!
//! **Used by**: CacheScheduler (per-candidate build lock, frame pacing),
//! draw path (whole-frame lock, frame signal)

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::core::pool::RasterPool;
use crate::core::store::CacheStore;
use crate::entities::source::CommentSource;

/// Everything the worker and the draw path contend over
pub struct GateState {
    pub source: Box<dyn CommentSource>,
    pub store: CacheStore,
    pub pool: RasterPool,
}

/// Mutex over the shared cache state + bounded frame-completion signal
pub struct RenderGate {
    state: Mutex<GateState>,
    frames: Mutex<u64>,
    frame_signal: Condvar,
}

impl RenderGate {
    pub fn new(source: Box<dyn CommentSource>, store: CacheStore, pool: RasterPool) -> Self {
        Self {
            state: Mutex::new(GateState { source, store, pool }),
            frames: Mutex::new(0),
            frame_signal: Condvar::new(),
        }
    }

    /// Lock the shared state. Recovers from poisoning: a panicking render
    /// frame must not wedge the worker.
    pub fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Announce one completed render frame, waking a pacing worker
    pub fn signal_frame(&self) {
        {
            let mut frames = self.frames.lock().unwrap_or_else(|e| e.into_inner());
            *frames += 1;
        }
        self.frame_signal.notify_all();
    }

    /// Wait up to `timeout` for the next completed frame.
    ///
    /// Returns true if a frame was signaled, false on timeout. Call without
    /// holding `lock()`, otherwise the draw path cannot produce the frame
    /// this wait is for.
    pub fn wait_frame(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut frames = self.frames.lock().unwrap_or_else(|e| e.into_inner());
        let seen = *frames;
        while *frames == seen {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .frame_signal
                .wait_timeout(frames, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            frames = guard;
        }
        true
    }

    /// Frames signaled since creation
    pub fn frame_count(&self) -> u64 {
        *self.frames.lock().unwrap_or_else(|e| e.into_inner())
    }
}
