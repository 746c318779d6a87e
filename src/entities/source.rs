//! Time-indexed comment collection
//!
//! The scheduler and the draw path both query comments by display-time range;
//! the trait keeps the backing collection external (a streaming client or a
//! parsed file can provide its own), `SortedComments` is the bundled
//! implementation.

use super::comment::CommentRef;

/// Source of comments, ordered by display time.
///
/// Implementations must be cheap to call while the render gate is held: both
/// the build pass and the draw path query under the lock.
pub trait CommentSource: Send {
    /// Comments with display time in `[start_ms, end_ms]`, ascending
    fn range(&self, start_ms: i64, end_ms: i64) -> Vec<CommentRef>;

    /// Insert a comment, keeping time order
    fn insert(&mut self, comment: CommentRef);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Vec-backed comment collection kept sorted by (time, id)
#[derive(Debug, Default)]
pub struct SortedComments {
    items: Vec<CommentRef>,
}

impl SortedComments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an unordered batch (e.g. a parsed file)
    pub fn from_vec(mut items: Vec<CommentRef>) -> Self {
        items.sort_by_key(|c| (c.time_ms(), c.id()));
        Self { items }
    }

    /// First index with time >= `t`
    fn lower_bound(&self, t: i64) -> usize {
        self.items.partition_point(|c| c.time_ms() < t)
    }

    /// First index with time > `t`
    fn upper_bound(&self, t: i64) -> usize {
        self.items.partition_point(|c| c.time_ms() <= t)
    }
}

impl CommentSource for SortedComments {
    fn range(&self, start_ms: i64, end_ms: i64) -> Vec<CommentRef> {
        if end_ms < start_ms {
            return Vec::new();
        }
        let lo = self.lower_bound(start_ms);
        let hi = self.upper_bound(end_ms);
        self.items[lo..hi].to_vec()
    }

    fn insert(&mut self, comment: CommentRef) {
        let key = (comment.time_ms(), comment.id());
        let idx = self.items.partition_point(|c| (c.time_ms(), c.id()) < key);
        self.items.insert(idx, comment);
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::comment::{Comment, CommentKind};

    fn at(t: i64) -> CommentRef {
        Comment::new(format!("c{}", t), CommentKind::Rolling, t, 4000)
    }

    #[test]
    fn test_insert_keeps_order() {
        let mut src = SortedComments::new();
        for t in [500, 100, 300, 100, 200] {
            src.insert(at(t));
        }
        let all = src.range(i64::MIN, i64::MAX);
        let times: Vec<i64> = all.iter().map(|c| c.time_ms()).collect();
        assert_eq!(times, vec![100, 100, 200, 300, 500]);
        assert_eq!(src.len(), 5);
    }

    #[test]
    fn test_range_bounds_inclusive() {
        let src = SortedComments::from_vec(vec![at(100), at(200), at(300)]);

        let mid = src.range(100, 200);
        assert_eq!(mid.len(), 2);
        assert_eq!(mid[0].time_ms(), 100);
        assert_eq!(mid[1].time_ms(), 200);

        assert!(src.range(301, 400).is_empty());
        assert!(src.range(200, 100).is_empty());
        assert_eq!(src.range(150, 150).len(), 0);
        assert_eq!(src.range(300, 300).len(), 1);
    }

    #[test]
    fn test_same_time_comments_all_returned() {
        let mut src = SortedComments::new();
        for _ in 0..3 {
            src.insert(at(1000));
        }
        assert_eq!(src.range(1000, 1000).len(), 3);
    }
}
