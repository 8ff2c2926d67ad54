//! # Per-CPU Scheduler State
//!
//! Each CPU owns a run queue for threads bound to it, a cache of the
//! running thread's priority, and the round-robin flags that track how long
//! the current thread has held the CPU.
//!
//! ## Round-Robin
//!
//! ```text
//!   tick         tick                tick
//! Idle ──▶ SeenOneQuantum ──▶ ShouldYield ──▶ ShouldYield + kernel preemption
//!   ▲                                               │
//!   └───────────────── context switch ──────────────┘
//! ```

use bitflags::bitflags;

use crate::param::{CpuId, Pri};
use crate::runq::RunQueue;
use crate::thread::ThreadId;

bitflags! {
    /// Per-CPU scheduler flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SpcFlags: u32 {
        /// Current thread has run for one round-robin interval
        const SEEN_RR = 1 << 0;
        /// Current thread has run a full quantum and should yield
        const SHOULD_YIELD = 1 << 1;
        /// CPU takes no work from the global run queue
        const OFFLINE = 1 << 2;
    }
}

bitflags! {
    /// Reschedule requests posted to a CPU
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Resched: u32 {
        /// Switch at the next opportunity
        const PENDING = 1 << 0;
        /// Preempt even in kernel mode
        const KPREEMPT = 1 << 1;
    }
}

/// Round-robin state of a CPU, derived from its flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RrState {
    Idle,
    SeenOneQuantum,
    ShouldYield,
}

/// Scheduler state owned by one CPU
#[derive(Debug)]
pub struct SchedCpu {
    pub id: CpuId,
    /// Bound threads
    pub runq: RunQueue,
    /// Effective priority of the running thread (0 when idle)
    pub curpri: Pri,
    pub flags: SpcFlags,
    pub resched: Resched,
    /// Running thread; `None` means the idle thread
    pub curlwp: Option<ThreadId>,
    /// Clock ticks until the next round-robin tick
    pub rr_countdown: u32,
    rr_ticks: u32,
    /// Soft interrupt waiting to run
    pub softint_pending: bool,
    /// Context switches performed
    pub nswitch: u64,
}

impl SchedCpu {
    pub fn new(id: CpuId, rr_ticks: u32) -> Self {
        Self {
            id,
            runq: RunQueue::new(),
            curpri: 0,
            flags: SpcFlags::empty(),
            resched: Resched::empty(),
            curlwp: None,
            rr_countdown: rr_ticks,
            rr_ticks,
            softint_pending: false,
            nswitch: 0,
        }
    }

    #[inline]
    pub fn is_offline(&self) -> bool {
        self.flags.contains(SpcFlags::OFFLINE)
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.curlwp.is_none()
    }

    /// Round-robin tick.
    ///
    /// The first tick of a quantum only marks it seen. The second asks the
    /// running thread to yield; if it is still running at the third, the
    /// request escalates to kernel preemption.
    pub fn roundrobin(&mut self) {
        if self.is_idle() {
            return;
        }
        if !self.flags.contains(SpcFlags::SEEN_RR) {
            self.flags.insert(SpcFlags::SEEN_RR);
            return;
        }
        if self.flags.contains(SpcFlags::SHOULD_YIELD) {
            self.resched.insert(Resched::PENDING | Resched::KPREEMPT);
        } else {
            self.flags.insert(SpcFlags::SHOULD_YIELD);
            self.resched.insert(Resched::PENDING);
        }
    }

    /// Count down one clock tick; true when a round-robin tick is due
    pub fn hardclock_tick(&mut self) -> bool {
        self.rr_countdown = self.rr_countdown.saturating_sub(1);
        if self.rr_countdown == 0 {
            self.rr_countdown = self.rr_ticks;
            true
        } else {
            false
        }
    }

    /// Reset the quantum when a new thread starts running
    pub fn clear_on_switch(&mut self) {
        self.flags.remove(SpcFlags::SEEN_RR | SpcFlags::SHOULD_YIELD);
        self.resched = Resched::empty();
        self.rr_countdown = self.rr_ticks;
    }

    pub fn rr_state(&self) -> RrState {
        if self.flags.contains(SpcFlags::SHOULD_YIELD) {
            RrState::ShouldYield
        } else if self.flags.contains(SpcFlags::SEEN_RR) {
            RrState::SeenOneQuantum
        } else {
            RrState::Idle
        }
    }
}
