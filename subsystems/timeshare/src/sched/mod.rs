//! # Timeshare Scheduler
//!
//! The dispatcher proper. One [`spin::Mutex`] protects every run queue and
//! every thread and process record, so any operation on any CPU serializes
//! against all others. Operations take `&self`, lock once and never block.
//!
//! ## Operation Groups
//!
//! | Group | Module |
//! |-------|--------|
//! | enqueue, dequeue, next_to_run, switch_to_next | `dispatch` |
//! | schedclock, tick, hardclock, pstats, load average | `clock` |
//! | create, wakeup, sleep, exit, fork, collect, nice | `lifecycle` |
//! | lent priority, binding, migration, offline, softints | `control` |
//! | thread_info, snapshot, dump, check_invariants | `introspect` |

use alloc::vec::Vec;

use spin::Mutex;

use crate::config::SchedConfig;
use crate::cpu::{Resched, SchedCpu};
use crate::error::{ErrorKind, SchedError, SchedResult};
use crate::estcpu::timeshare_priority;
use crate::loadavg::LoadAverage;
use crate::param::{CpuId, Fixpt, Pri, PRI_KPREEMPT};
use crate::process::{Pid, Process, ProcessTable};
use crate::runq::RunQueue;
use crate::thread::{Membership, QueueId, SchedClass, Thread, ThreadId, ThreadState, ThreadTable};

mod clock;
mod control;
mod dispatch;
mod introspect;
mod lifecycle;

pub use introspect::{CpuSnapshot, SchedSnapshot, ThreadInfo};
pub use lifecycle::{ClassParam, ThreadParams};

// =============================================================================
// SCHEDULER
// =============================================================================

/// 4BSD timeshare scheduler
#[derive(Debug)]
pub struct Scheduler {
    config: SchedConfig,
    inner: Mutex<SchedState>,
}

impl Scheduler {
    /// Create a scheduler with one run queue per configured CPU
    pub fn new(config: SchedConfig) -> SchedResult<Self> {
        config.validate()?;
        log::info!(
            "timeshare: {} cpu(s), hz {}, round-robin every {} ticks",
            config.ncpu,
            config.hz,
            config.rr_ticks
        );
        Ok(Self {
            config,
            inner: Mutex::new(SchedState::new(&config)),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &SchedConfig {
        &self.config
    }

    /// Number of CPUs
    pub fn ncpu(&self) -> usize {
        self.config.ncpu
    }
}

// =============================================================================
// LOCKED STATE
// =============================================================================

/// Everything behind the scheduler lock
#[derive(Debug)]
pub(crate) struct SchedState {
    hz: u32,
    global: RunQueue,
    cpus: Vec<SchedCpu>,
    threads: ThreadTable,
    procs: ProcessTable,
    loadavg: LoadAverage,
    /// Statistics intervals elapsed
    pstats_ticks: u64,
}

impl SchedState {
    fn new(config: &SchedConfig) -> Self {
        Self {
            hz: config.hz,
            global: RunQueue::new(),
            cpus: (0..config.ncpu)
                .map(|id| SchedCpu::new(id, config.rr_ticks))
                .collect(),
            threads: ThreadTable::new(),
            procs: ProcessTable::new(),
            loadavg: LoadAverage::new(),
            pstats_ticks: 0,
        }
    }

    // -------------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------------

    fn thread(&self, id: ThreadId) -> SchedResult<&Thread> {
        self.threads
            .get(id)
            .ok_or(SchedError::from_kind(ErrorKind::NoSuchThread))
    }

    fn thread_mut(&mut self, id: ThreadId) -> SchedResult<&mut Thread> {
        self.threads
            .get_mut(id)
            .ok_or(SchedError::from_kind(ErrorKind::NoSuchThread))
    }

    fn process(&self, pid: Pid) -> SchedResult<&Process> {
        self.procs
            .get(pid)
            .ok_or(SchedError::from_kind(ErrorKind::NoSuchProcess))
    }

    fn check_cpu(&self, cpu: CpuId) -> SchedResult<()> {
        if cpu < self.cpus.len() {
            Ok(())
        } else {
            Err(SchedError::from_kind(ErrorKind::NoSuchCpu))
        }
    }

    fn runq(&self, queue: QueueId) -> &RunQueue {
        match queue {
            QueueId::Global => &self.global,
            QueueId::Cpu(cpu) => &self.cpus[cpu].runq,
        }
    }

    /// Is the thread the running thread of its CPU?
    fn is_on_cpu(&self, id: ThreadId) -> bool {
        self.cpus.iter().any(|cpu| cpu.curlwp == Some(id))
    }

    fn loadfac(&self) -> Fixpt {
        crate::estcpu::loadfactor(self.loadavg.one())
    }

    /// Size every run queue for a newly allocated thread slot
    fn reserve_slot(&mut self, id: ThreadId) {
        let slots = id.0 as usize + 1;
        self.global.reserve(slots);
        for spc in &mut self.cpus {
            spc.runq.reserve(slots);
        }
    }

    // -------------------------------------------------------------------------
    // Run-queue membership
    // -------------------------------------------------------------------------

    /// Put a thread on the run queue it belongs to.
    ///
    /// A pending migration is applied first. Bound threads go to their CPU's
    /// queue, the rest to the global queue, keyed by effective priority.
    fn enqueue(&mut self, id: ThreadId) {
        debug_assert!(self.threads.contains(id), "enqueue of unknown thread {}", id);
        let Some(t) = self.threads.get_mut(id) else {
            return;
        };
        debug_assert!(t.membership.is_none(), "thread {} enqueued twice", id);
        if t.membership.is_some() {
            return;
        }
        if let Some(target) = t.target_cpu.take() {
            log::debug!("timeshare: {} migrates cpu{} -> cpu{}", id, t.cpu, target);
            t.cpu = target;
        }
        let queue = if t.bound {
            QueueId::Cpu(t.cpu)
        } else {
            QueueId::Global
        };
        let pri = t.eprio();
        t.membership = Some(Membership { queue, pri });
        t.state = ThreadState::Runnable;

        match queue {
            QueueId::Global => self.global.enqueue(id, pri),
            QueueId::Cpu(cpu) => self.cpus[cpu].runq.enqueue(id, pri),
        }
    }

    /// Take a thread off the run queue recorded in its membership
    fn dequeue(&mut self, id: ThreadId) {
        let Some(t) = self.threads.get_mut(id) else {
            return;
        };
        debug_assert!(t.membership.is_some(), "thread {} not on a run queue", id);
        let Some(Membership { queue, pri }) = t.membership.take() else {
            return;
        };
        match queue {
            QueueId::Global => self.global.dequeue(id, pri),
            QueueId::Cpu(cpu) => self.cpus[cpu].runq.dequeue(id, pri),
        }
    }

    /// Re-key a thread whose effective priority may have changed.
    ///
    /// Queued threads move to the tail of their new lane. A running thread
    /// refreshes its CPU's priority cache.
    fn priority_changed(&mut self, id: ThreadId) {
        let Some(t) = self.threads.get(id) else {
            return;
        };
        let (eprio, membership, state, cpu) = (t.eprio(), t.membership, t.state, t.cpu);
        match membership {
            Some(m) if m.pri != eprio => {
                self.dequeue(id);
                self.enqueue(id);
            },
            Some(_) => {},
            None => {
                if state == ThreadState::OnProc && self.cpus[cpu].curlwp == Some(id) {
                    self.cpus[cpu].curpri = eprio;
                }
            },
        }
    }

    /// Recompute a timeshare thread's priority from its estimate and nice
    fn resetpriority(&mut self, id: ThreadId) {
        let Some(t) = self.threads.get_mut(id) else {
            return;
        };
        let SchedClass::Timeshare { estcpu, nice } = t.class else {
            return;
        };
        let pri = timeshare_priority(estcpu, nice);
        if pri != t.priority {
            t.priority = pri;
            self.priority_changed(id);
        }
    }

    /// Ask a CPU to reschedule if a newly runnable thread outranks its
    /// current one. Returns whether a request was posted.
    fn resched_for(&mut self, id: ThreadId) -> bool {
        let Some(t) = self.threads.get(id) else {
            return false;
        };
        let (eprio, bound) = (t.eprio(), t.bound);
        let mut target = t.cpu;
        if !bound && self.cpus[target].is_offline() {
            target = self
                .cpus
                .iter()
                .filter(|cpu| !cpu.is_offline())
                .min_by_key(|cpu| (!cpu.is_idle(), cpu.curpri))
                .map_or(target, |cpu| cpu.id);
        }

        let cpu = &mut self.cpus[target];
        if cpu.is_idle() {
            cpu.resched.insert(Resched::PENDING);
            return true;
        }
        if eprio <= cpu.curpri {
            return false;
        }
        let mut req = Resched::PENDING;
        if eprio >= PRI_KPREEMPT {
            req |= Resched::KPREEMPT;
        }
        cpu.resched.insert(req);
        log::trace!("timeshare: {} (pri {}) preempts cpu{}", id, eprio, target);
        true
    }

    /// Best candidate for `cpu`: local against global, local wins ties
    fn next_to_run(&self, cpu: CpuId) -> Option<(ThreadId, Pri)> {
        let spc = &self.cpus[cpu];
        let local = spc.runq.next();
        let global = if spc.is_offline() {
            None
        } else {
            self.global.next()
        };
        match (local, global) {
            (Some(l), Some(g)) => Some(if g.1 > l.1 { g } else { l }),
            (l, g) => l.or(g),
        }
    }
}

/// Starting priority for a class
fn initial_priority(class: &SchedClass) -> Pri {
    match *class {
        SchedClass::Timeshare { estcpu, nice } => timeshare_priority(estcpu, nice),
        SchedClass::Fixed { level } => level,
    }
}

// =============================================================================
// TESTS
// =============================================================================
