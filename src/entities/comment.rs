//! Timed overlay comment with interior-mutable display state
//!
//! **Why**: A comment is shared between the render path (draws it, flags it
//! visible) and the cache worker (measures it, attaches a pre-built raster).
//! Scheduling fields are immutable after creation; everything two threads
//! touch lives behind one mutex.
//!
//! **Used by**: CacheStore (entries), CacheScheduler (build pass), draw path

use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::raster::Raster;

/// Placement class of a comment on the display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum CommentKind {
    /// Scrolls right-to-left across the screen
    #[default]
    Rolling,
    /// Pinned to the top, centered
    Top,
    /// Pinned to the bottom, centered
    Bottom,
}

/// Mutable display state protected by mutex
#[derive(Debug, Default)]
struct CommentState {
    width: f32,
    height: f32,
    measured: bool,
    /// Currently inside the render viewport (set by the draw path)
    visible: bool,
    /// Pre-built artifact, present while this comment sits in the cache
    raster: Option<Raster>,
}

/// A single timed comment
///
/// Shared as `CommentRef`; cloning the ref never copies text or pixels.
#[derive(Debug)]
pub struct Comment {
    id: Uuid,
    text: String,
    kind: CommentKind,
    time_ms: i64,
    duration_ms: i64,
    state: Mutex<CommentState>,
}

/// Shared handle to a comment
pub type CommentRef = Arc<Comment>;

impl Comment {
    /// Create a new comment scheduled at `time_ms` for `duration_ms`
    pub fn new(text: impl Into<String>, kind: CommentKind, time_ms: i64, duration_ms: i64) -> CommentRef {
        Arc::new(Self {
            id: Uuid::new_v4(),
            text: text.into(),
            kind,
            time_ms,
            duration_ms,
            state: Mutex::new(CommentState::default()),
        })
    }

    fn state(&self) -> MutexGuard<'_, CommentState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> CommentKind {
        self.kind
    }

    /// Scheduled display time (ms on the presentation timeline)
    pub fn time_ms(&self) -> i64 {
        self.time_ms
    }

    pub fn duration_ms(&self) -> i64 {
        self.duration_ms
    }

    /// Time at which this comment leaves the screen
    pub fn expiry_ms(&self) -> i64 {
        self.time_ms + self.duration_ms
    }

    /// True once the playhead has passed the expiry time
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expiry_ms() <= now_ms
    }

    /// True while the comment's display window covers `now_ms`
    pub fn is_active(&self, now_ms: i64) -> bool {
        now_ms >= self.time_ms && !self.is_expired(now_ms)
    }

    pub fn measured(&self) -> bool {
        self.state().measured
    }

    /// Layout size from the last measure, (0, 0) if unmeasured
    pub fn size(&self) -> (f32, f32) {
        let s = self.state();
        (s.width, s.height)
    }

    pub fn set_measured(&self, width: f32, height: f32) {
        let mut s = self.state();
        s.width = width;
        s.height = height;
        s.measured = true;
    }

    /// Inside the render viewport right now?
    pub fn visible(&self) -> bool {
        self.state().visible
    }

    pub fn set_visible(&self, visible: bool) {
        self.state().visible = visible;
    }

    pub fn has_raster(&self) -> bool {
        self.state().raster.is_some()
    }

    /// Byte size of the attached raster, 0 if none
    pub fn raster_bytes(&self) -> usize {
        self.state().raster.as_ref().map(|r| r.size()).unwrap_or(0)
    }

    /// Attach a pre-built raster, returning the previous one if any.
    ///
    /// A raster is owned by at most one comment; the store detaches it on
    /// eviction and hands it back to the pool.
    pub fn attach_raster(&self, raster: Raster) -> Option<Raster> {
        self.state().raster.replace(raster)
    }

    /// Take the raster out, leaving the comment uncached
    pub fn detach_raster(&self) -> Option<Raster> {
        self.state().raster.take()
    }

    /// Run `f` against the attached raster without detaching it.
    ///
    /// Returns None when no raster is attached (cache miss).
    pub fn with_raster<R>(&self, f: impl FnOnce(&Raster) -> R) -> Option<R> {
        self.state().raster.as_ref().map(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: expiry arithmetic
    /// Validates: a comment expires exactly at time + duration
    #[test]
    fn test_expiry() {
        let c = Comment::new("hello", CommentKind::Rolling, 1000, 4000);
        assert_eq!(c.expiry_ms(), 5000);
        assert!(!c.is_expired(4999));
        assert!(c.is_expired(5000));
        assert!(c.is_expired(5001));

        assert!(!c.is_active(999));
        assert!(c.is_active(1000));
        assert!(c.is_active(4999));
        assert!(!c.is_active(5000));
    }

    /// Test: raster attach/detach ownership
    /// Validates: at most one raster per comment, detach empties the slot
    #[test]
    fn test_raster_ownership() {
        let c = Comment::new("x", CommentKind::Top, 0, 1000);
        assert!(!c.has_raster());
        assert_eq!(c.raster_bytes(), 0);

        assert!(c.attach_raster(Raster::with_size(10, 10)).is_none());
        assert!(c.has_raster());
        assert_eq!(c.raster_bytes(), 400);

        // replacing returns the old buffer
        let old = c.attach_raster(Raster::with_size(5, 5));
        assert_eq!(old.map(|r| r.size()), Some(400));
        assert_eq!(c.raster_bytes(), 100);

        let taken = c.detach_raster();
        assert_eq!(taken.map(|r| r.size()), Some(100));
        assert!(!c.has_raster());
        assert!(c.detach_raster().is_none());
    }

    /// Test: measure state
    /// Validates: size is (0,0) until measured, then reports the layout
    #[test]
    fn test_measure_state() {
        let c = Comment::new("abc", CommentKind::Bottom, 0, 1000);
        assert!(!c.measured());
        assert_eq!(c.size(), (0.0, 0.0));

        c.set_measured(120.0, 24.0);
        assert!(c.measured());
        assert_eq!(c.size(), (120.0, 24.0));
    }
}
