//! # Fixed-Priority Lane
//!
//! Kernel-thread and real-time threads. They are few, so a sorted list with
//! linear insertion is enough, and unlike the bitmap lanes the order is by
//! exact priority.

use alloc::collections::VecDeque;

use crate::param::Pri;
use crate::thread::ThreadId;

/// Priority-ordered list, highest first, FIFO among equals
#[derive(Debug, Default)]
pub struct FixedLane {
    entries: VecDeque<(ThreadId, Pri)>,
}

impl FixedLane {
    /// Create empty lane
    pub const fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Insert before the first entry of strictly lower priority
    pub fn insert(&mut self, id: ThreadId, pri: Pri) {
        match self.entries.iter().position(|&(_, p)| p < pri) {
            Some(pos) => self.entries.insert(pos, (id, pri)),
            None => self.entries.push_back((id, pri)),
        }
    }

    /// Unlink by identity
    pub fn remove(&mut self, id: ThreadId) -> bool {
        match self.entries.iter().position(|&(t, _)| t == id) {
            Some(pos) => self.entries.remove(pos).is_some(),
            None => false,
        }
    }

    /// Highest-priority entry
    pub fn peek_highest(&self) -> Option<(ThreadId, Pri)> {
        self.entries.front().copied()
    }

    /// Is thread queued here with this priority?
    pub fn contains(&self, id: ThreadId, pri: Pri) -> bool {
        self.entries.contains(&(id, pri))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in dispatch order
    pub fn iter(&self) -> impl Iterator<Item = (ThreadId, Pri)> + '_ {
        self.entries.iter().copied()
    }

    /// Verify the list is sorted by non-increasing priority
    pub fn check(&self) -> Result<(), &'static str> {
        let sorted = self
            .entries
            .iter()
            .zip(self.entries.iter().skip(1))
            .all(|(a, b)| a.1 >= b.1);
        if sorted {
            Ok(())
        } else {
            Err("fixed-priority lane out of order")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn test_priority_order() {
        let mut lane = FixedLane::new();
        lane.insert(ThreadId(1), 100);
        lane.insert(ThreadId(2), 200);
        lane.insert(ThreadId(3), 150);

        let order: Vec<_> = lane.iter().map(|(id, _)| id.0).collect();
        assert_eq!(order, [2, 3, 1]);
        assert_eq!(lane.peek_highest(), Some((ThreadId(2), 200)));
        assert!(lane.check().is_ok());
    }

    #[test]
    fn test_equal_priority_is_fifo() {
        let mut lane = FixedLane::new();
        lane.insert(ThreadId(1), 120);
        lane.insert(ThreadId(2), 120);
        lane.insert(ThreadId(3), 130);
        lane.insert(ThreadId(4), 120);

        let order: Vec<_> = lane.iter().map(|(id, _)| id.0).collect();
        assert_eq!(order, [3, 1, 2, 4]);
    }

    #[test]
    fn test_remove_by_identity() {
        let mut lane = FixedLane::new();
        lane.insert(ThreadId(1), 100);
        lane.insert(ThreadId(2), 100);

        assert!(lane.remove(ThreadId(1)));
        assert!(!lane.remove(ThreadId(1)));
        assert_eq!(lane.peek_highest(), Some((ThreadId(2), 100)));
        assert!(lane.remove(ThreadId(2)));
        assert!(lane.is_empty());
    }
}
