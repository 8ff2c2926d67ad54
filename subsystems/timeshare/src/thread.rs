//! # Thread Records
//!
//! Schedulable entities live in a slot arena indexed by [`ThreadId`]. Run
//! queues hold IDs only; the record remembers which queue it sits on and
//! under which key.

use alloc::vec::Vec;
use core::fmt;

use crate::param::{CpuId, Fixpt, Pri};
use crate::process::Pid;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Stable thread identifier (arena slot)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u32);

impl ThreadId {
    #[inline]
    const fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

// =============================================================================
// CLASS AND STATE
// =============================================================================

/// Scheduling class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedClass {
    /// Priority derived from CPU usage and nice
    Timeshare {
        /// Decaying CPU-usage estimate
        estcpu: Fixpt,
        /// Nice value, stored offset by `NZERO`
        nice: u8,
    },
    /// Caller-assigned priority
    Fixed {
        level: Pri,
    },
}

impl SchedClass {
    /// Is this the timeshare class?
    pub const fn is_timeshare(&self) -> bool {
        matches!(self, Self::Timeshare { .. })
    }
}

/// Thread run state
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Created, not yet runnable
    Idle     = 0,
    /// On a run queue
    Runnable = 1,
    /// Running on a CPU
    OnProc   = 2,
    /// Blocked
    Sleeping = 3,
    /// Exited, waiting to be collected
    Zombie   = 4,
}

/// Which run queue a thread is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueId {
    Global,
    Cpu(CpuId),
}

/// Run-queue membership record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Membership {
    pub queue: QueueId,
    /// Priority the thread was enqueued at
    pub pri: Pri,
}

// =============================================================================
// THREAD
// =============================================================================

/// Schedulable entity
#[derive(Debug, Clone)]
pub struct Thread {
    pub id: ThreadId,
    /// Owning process
    pub pid: Pid,
    pub class: SchedClass,
    /// Base priority (derived for timeshare, assigned for fixed)
    pub priority: Pri,
    /// Priority lent by a waiter, if any
    pub inherited: Option<Pri>,
    pub state: ThreadState,
    /// Statistics intervals spent asleep
    pub slptime: u32,
    /// Decaying %CPU in fixed point
    pub pctcpu: Fixpt,
    /// Clock ticks run during the current statistics interval
    pub cpticks: u32,
    /// Last or assigned CPU
    pub cpu: CpuId,
    /// Pinned to `cpu`'s own run queue
    pub bound: bool,
    /// Pending migration, applied at the next enqueue
    pub target_cpu: Option<CpuId>,
    pub membership: Option<Membership>,
}

impl Thread {
    /// New thread in the `Idle` state on CPU 0
    pub fn new(id: ThreadId, pid: Pid, class: SchedClass, priority: Pri) -> Self {
        Self {
            id,
            pid,
            class,
            priority,
            inherited: None,
            state: ThreadState::Idle,
            slptime: 0,
            pctcpu: 0,
            cpticks: 0,
            cpu: 0,
            bound: false,
            target_cpu: None,
            membership: None,
        }
    }

    /// Effective priority: base or lent, whichever is higher
    #[inline]
    pub fn eprio(&self) -> Pri {
        match self.inherited {
            Some(lent) => self.priority.max(lent),
            None => self.priority,
        }
    }

    /// CPU-usage estimate (timeshare only)
    pub fn estcpu(&self) -> Option<Fixpt> {
        match self.class {
            SchedClass::Timeshare { estcpu, .. } => Some(estcpu),
            SchedClass::Fixed { .. } => None,
        }
    }

    /// Replace the estimate; no-op for fixed-priority threads
    pub fn set_estcpu(&mut self, value: Fixpt) {
        if let SchedClass::Timeshare { estcpu, .. } = &mut self.class {
            *estcpu = value;
        }
    }

    pub fn is_queued(&self) -> bool {
        self.membership.is_some()
    }
}

// =============================================================================
// THREAD TABLE
// =============================================================================

/// Slot arena of thread records
#[derive(Debug, Default)]
pub struct ThreadTable {
    slots: Vec<Option<Thread>>,
    free: Vec<u32>,
    live: usize,
}

impl ThreadTable {
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Allocate a slot and build the record with its ID
    pub fn insert_with(&mut self, build: impl FnOnce(ThreadId) -> Thread) -> ThreadId {
        let id = match self.free.pop() {
            Some(slot) => ThreadId(slot),
            None => {
                self.slots.push(None);
                ThreadId((self.slots.len() - 1) as u32)
            },
        };
        self.slots[id.slot()] = Some(build(id));
        self.live += 1;
        id
    }

    pub fn get(&self, id: ThreadId) -> Option<&Thread> {
        self.slots.get(id.slot()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: ThreadId) -> Option<&mut Thread> {
        self.slots.get_mut(id.slot()).and_then(Option::as_mut)
    }

    /// Free the slot; the ID may be reused
    pub fn remove(&mut self, id: ThreadId) -> Option<Thread> {
        let thread = self.slots.get_mut(id.slot())?.take()?;
        self.free.push(id.0);
        self.live -= 1;
        Some(thread)
    }

    pub fn contains(&self, id: ThreadId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Thread> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Thread> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    /// Number of live threads
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}
