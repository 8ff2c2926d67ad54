//! # Run Queue
//!
//! A run queue combines the bitmap-indexed [`PriorityIndex`] for timeshare
//! and kernel priorities with the sorted [`FixedLane`] for kernel-thread and
//! real-time priorities. One instance is global, one is owned by each CPU.
//!
//! The queue stores thread IDs keyed by the priority they were enqueued at.
//! Callers must dequeue and re-enqueue a thread to change its key.

pub mod fixed;
pub mod index;

pub use fixed::FixedLane;
pub use index::PriorityIndex;

use crate::param::{is_fixed_lane, Pri};
use crate::thread::ThreadId;

/// Bitmap lanes + fixed-priority lane + membership count
#[derive(Debug, Default)]
pub struct RunQueue {
    index: PriorityIndex,
    fixed: FixedLane,
    count: usize,
}

impl RunQueue {
    /// Create empty run queue
    pub fn new() -> Self {
        Self {
            index: PriorityIndex::new(),
            fixed: FixedLane::new(),
            count: 0,
        }
    }

    /// Add thread at priority `pri`
    pub fn enqueue(&mut self, id: ThreadId, pri: Pri) {
        let inserted = if is_fixed_lane(pri) {
            self.fixed.insert(id, pri);
            true
        } else {
            self.index.insert(id, pri)
        };
        if inserted {
            self.count += 1;
        }
    }

    /// Remove thread that was enqueued at priority `pri`
    pub fn dequeue(&mut self, id: ThreadId, pri: Pri) {
        let removed = if is_fixed_lane(pri) {
            self.fixed.remove(id)
        } else {
            self.index.remove(id, pri)
        };
        debug_assert!(removed, "thread {} not on run queue at priority {}", id, pri);
        if removed {
            self.count -= 1;
        }
    }

    /// Pre-size for thread slots below `slots` so enqueue does not allocate
    /// in the bitmap half
    pub fn reserve(&mut self, slots: usize) {
        self.index.reserve(slots);
    }

    /// Best candidate: fixed lane head first, else the highest bitmap lane head
    pub fn next(&self) -> Option<(ThreadId, Pri)> {
        if self.count == 0 {
            return None;
        }
        self.fixed.peek_highest().or_else(|| self.index.peek_highest())
    }

    /// Number of queued threads
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Is thread queued here with this key?
    pub fn contains(&self, id: ThreadId, pri: Pri) -> bool {
        if is_fixed_lane(pri) {
            self.fixed.contains(id, pri)
        } else {
            self.index.contains(id, pri)
        }
    }

    /// Bitmap half (read-only)
    pub fn index(&self) -> &PriorityIndex {
        &self.index
    }

    /// Fixed-priority half (read-only)
    pub fn fixed(&self) -> &FixedLane {
        &self.fixed
    }

    /// Iterate in dispatch order
    pub fn iter(&self) -> impl Iterator<Item = (ThreadId, Pri)> + '_ {
        self.fixed.iter().chain(self.index.iter())
    }

    /// Verify bitmap occupancy, fixed-lane order and count
    pub fn check(&self) -> Result<(), &'static str> {
        self.index.check()?;
        self.fixed.check()?;
        if self.count != self.index.len() + self.fixed.len() {
            return Err("run-queue count disagrees with lane lengths");
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
