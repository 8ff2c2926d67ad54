//! # Priority Index
//!
//! One FIFO lane per timeshare/kernel priority level plus an occupancy
//! bitmap. Bit `p` is set iff lane `p` is non-empty, so the highest occupied
//! lane is found with one `leading_zeros` per 32-level band.
//!
//! Lanes are intrusive lists threaded through a link table indexed by
//! thread slot. Insert and remove touch only the neighbours of the thread,
//! and neither allocates once the table covers the slot
//! (see [`PriorityIndex::reserve`]).
//!
//! ```text
//!   bitmap[2]          bitmap[1]          bitmap[0]
//!  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!  │ 95 ...... 64 │   │ 63 ...... 32 │   │ 31 ....... 0 │
//!  └──────┬───────┘   └──────────────┘   └───────┬──────┘
//!         ▼                                      ▼
//!   lanes[70]: T4 ⇄ T9                     lanes[3]: T2
//! ```

use alloc::vec::Vec;

use crate::param::{Pri, BITMAP_BITS, BITMAP_WORDS, RUNQUE_NQS};
use crate::thread::ThreadId;

/// Position of one queued thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Link {
    pri: Pri,
    prev: Option<ThreadId>,
    next: Option<ThreadId>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Lane {
    head: Option<ThreadId>,
    tail: Option<ThreadId>,
    len: usize,
}

impl Lane {
    const EMPTY: Self = Self {
        head: None,
        tail: None,
        len: 0,
    };
}

/// Bitmap-indexed FIFO lanes
#[derive(Debug)]
pub struct PriorityIndex {
    bitmap: [u32; BITMAP_WORDS],
    lanes: [Lane; RUNQUE_NQS],
    links: Vec<Option<Link>>,
    len: usize,
}

impl PriorityIndex {
    /// Create empty index
    pub fn new() -> Self {
        Self {
            bitmap: [0; BITMAP_WORDS],
            lanes: [Lane::EMPTY; RUNQUE_NQS],
            links: Vec::new(),
            len: 0,
        }
    }

    #[inline]
    const fn word_bit(pri: Pri) -> (usize, u32) {
        let idx = pri as usize;
        (idx / BITMAP_BITS, 1 << (idx % BITMAP_BITS))
    }

    #[inline]
    const fn slot(id: ThreadId) -> usize {
        id.0 as usize
    }

    fn link(&self, id: ThreadId) -> Option<Link> {
        self.links.get(Self::slot(id)).copied().flatten()
    }

    /// Grow the link table to cover `slots` thread slots
    pub fn reserve(&mut self, slots: usize) {
        if slots > self.links.len() {
            self.links.resize(slots, None);
        }
    }

    /// Append thread to the tail of lane `pri`; returns false if it is
    /// already indexed
    pub fn insert(&mut self, id: ThreadId, pri: Pri) -> bool {
        debug_assert!((pri as usize) < RUNQUE_NQS, "priority {} not bitmap-indexed", pri);
        let slot = Self::slot(id);
        self.reserve(slot + 1);
        debug_assert!(self.links[slot].is_none(), "thread {} indexed twice", id);
        if self.links[slot].is_some() {
            return false;
        }

        let lane = &mut self.lanes[pri as usize];
        let prev = lane.tail;
        self.links[slot] = Some(Link {
            pri,
            prev,
            next: None,
        });
        match prev {
            Some(tail) => {
                if let Some(link) = self.links[Self::slot(tail)].as_mut() {
                    link.next = Some(id);
                }
            },
            None => {
                lane.head = Some(id);
                let (word, bit) = Self::word_bit(pri);
                self.bitmap[word] |= bit;
            },
        }
        lane.tail = Some(id);
        lane.len += 1;
        self.len += 1;
        true
    }

    /// Detach thread from lane `pri`; returns false if it was not there
    pub fn remove(&mut self, id: ThreadId, pri: Pri) -> bool {
        let Some(link) = self.link(id) else {
            return false;
        };
        if link.pri != pri {
            return false;
        }
        self.links[Self::slot(id)] = None;

        let lane = &mut self.lanes[pri as usize];
        match link.prev {
            Some(prev) => {
                if let Some(l) = self.links[Self::slot(prev)].as_mut() {
                    l.next = link.next;
                }
            },
            None => lane.head = link.next,
        }
        match link.next {
            Some(next) => {
                if let Some(l) = self.links[Self::slot(next)].as_mut() {
                    l.prev = link.prev;
                }
            },
            None => lane.tail = link.prev,
        }
        lane.len -= 1;
        if lane.len == 0 {
            let (word, bit) = Self::word_bit(pri);
            self.bitmap[word] &= !bit;
        }
        self.len -= 1;
        true
    }

    /// Highest occupied priority level
    pub fn highest_priority(&self) -> Option<Pri> {
        self.bitmap
            .iter()
            .enumerate()
            .rev()
            .find(|(_, &word)| word != 0)
            .map(|(i, &word)| {
                let bit = BITMAP_BITS - 1 - word.leading_zeros() as usize;
                (i * BITMAP_BITS + bit) as Pri
            })
    }

    /// Head of the highest occupied lane
    pub fn peek_highest(&self) -> Option<(ThreadId, Pri)> {
        let pri = self.highest_priority()?;
        self.lanes[pri as usize].head.map(|id| (id, pri))
    }

    /// Is lane `pri` marked occupied in the bitmap?
    pub fn is_occupied(&self, pri: Pri) -> bool {
        let (word, bit) = Self::word_bit(pri);
        self.bitmap[word] & bit != 0
    }

    /// Number of threads in lane `pri`
    pub fn lane_len(&self, pri: Pri) -> usize {
        self.lanes[pri as usize].len
    }

    /// Is thread in lane `pri`?
    pub fn contains(&self, id: ThreadId, pri: Pri) -> bool {
        self.link(id).is_some_and(|link| link.pri == pri)
    }

    /// Total threads over all lanes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Are all lanes empty?
    pub fn is_empty(&self) -> bool {
        self.bitmap.iter().all(|&w| w == 0)
    }

    /// Iterate `(thread, priority)` from the highest lane down, FIFO within a lane
    pub fn iter(&self) -> impl Iterator<Item = (ThreadId, Pri)> + '_ {
        self.lanes.iter().enumerate().rev().flat_map(move |(pri, lane)| {
            core::iter::successors(lane.head, move |&id| self.link(id).and_then(|l| l.next))
                .map(move |id| (id, pri as Pri))
        })
    }

    /// Verify bitmap occupancy and that every lane's links, count and tail
    /// agree with the link table
    pub fn check(&self) -> Result<(), &'static str> {
        let mut total = 0;
        for (pri, lane) in self.lanes.iter().enumerate() {
            if self.is_occupied(pri as Pri) == (lane.len == 0) {
                return Err("bitmap bit disagrees with lane occupancy");
            }
            let mut prev = None;
            let mut cursor = lane.head;
            let mut n = 0;
            while let Some(id) = cursor {
                let Some(link) = self.link(id) else {
                    return Err("lane links a thread that is not indexed");
                };
                if link.pri as usize != pri || link.prev != prev {
                    return Err("lane links are inconsistent");
                }
                n += 1;
                if n > lane.len {
                    return Err("lane is longer than its count");
                }
                prev = cursor;
                cursor = link.next;
            }
            if n != lane.len || lane.tail != prev {
                return Err("lane count or tail disagrees with links");
            }
            total += n;
        }
        if total != self.len || self.links.iter().flatten().count() != total {
            return Err("index length disagrees with lanes");
        }
        Ok(())
    }
}

impl Default for PriorityIndex {
    fn default() -> Self {
        Self::new()
    }
}
