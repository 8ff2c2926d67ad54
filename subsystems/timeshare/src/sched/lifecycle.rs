//! # Thread and Process Lifecycle
//!
//! Creation, sleep and wakeup, exit, and the accounting that carries CPU
//! usage across fork, exit and reap.
//!
//! ## Fork/Exit Chargeback
//!
//! At fork the child process records the parent lead thread's estimate and
//! the statistics tick. At exit that snapshot is decayed over the elapsed
//! intervals. If the child's final estimate is higher, the parent pays the
//! difference:
//!
//! ```text
//!     projected = decay^(now - forktime)(inherited)
//!     parent   += max(0, child - projected)
//! ```

use super::{initial_priority, SchedState, Scheduler};
use crate::error::{ErrorKind, SchedError, SchedResult};
use crate::estcpu::{charge, decay_on_wake, projected_decay};
use crate::param::{
    nice_to_offset, offset_to_nice, CpuId, Fixpt, Pri, ESTCPU_MAX, MAXPRI, PRIO_MAX, PRIO_MIN,
    PRI_KTHREAD,
};
use crate::process::Pid;
use crate::thread::{SchedClass, Thread, ThreadId, ThreadState};

// =============================================================================
// THREAD PARAMETERS
// =============================================================================

/// Scheduling class requested at thread creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassParam {
    /// Timeshare with a starting estimate
    Timeshare { estcpu: Fixpt },
    /// Fixed priority in `[PRI_KTHREAD, MAXPRI]`
    Fixed { level: Pri },
}

/// Thread creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadParams {
    pub class: ClassParam,
    /// Bind to this CPU
    pub bound: Option<CpuId>,
}

impl ThreadParams {
    /// Timeshare thread with no CPU history
    pub const fn timeshare() -> Self {
        Self {
            class: ClassParam::Timeshare { estcpu: 0 },
            bound: None,
        }
    }

    /// Fixed-priority thread
    pub const fn fixed(level: Pri) -> Self {
        Self {
            class: ClassParam::Fixed { level },
            bound: None,
        }
    }

    /// Starting estimate (timeshare only)
    pub fn with_estcpu(mut self, estcpu: Fixpt) -> Self {
        if let ClassParam::Timeshare { estcpu: e } = &mut self.class {
            *e = estcpu;
        }
        self
    }

    /// Bind to `cpu`
    pub const fn bound_to(mut self, cpu: CpuId) -> Self {
        self.bound = Some(cpu);
        self
    }
}

fn check_nice(nice: i32) -> SchedResult<u8> {
    if (PRIO_MIN..=PRIO_MAX).contains(&nice) {
        Ok(nice_to_offset(nice))
    } else {
        log::warn!("timeshare: rejected nice {}", nice);
        Err(SchedError::from_kind(ErrorKind::InvalidNice))
    }
}

pub(super) fn check_fixed_level(level: Pri) -> SchedResult<()> {
    if (PRI_KTHREAD..=MAXPRI).contains(&level) {
        Ok(())
    } else {
        Err(SchedError::new(
            ErrorKind::InvalidPriority,
            "fixed priority outside the fixed-priority range",
        ))
    }
}

// =============================================================================
// LOCKED HELPERS
// =============================================================================

impl SchedState {
    /// Settle deferred decay and put the thread on a run queue.
    ///
    /// A thread that went to sleep but is still current on its CPU has not
    /// been switched out yet. It goes back to `OnProc` and is not queued.
    fn make_runnable(&mut self, id: ThreadId) -> SchedResult<bool> {
        let loadfac = self.loadfac();
        let on_cpu = self.is_on_cpu(id);
        let t = self.thread_mut(id)?;
        if t.slptime > 1 {
            if let Some(estcpu) = t.estcpu() {
                t.set_estcpu(decay_on_wake(loadfac, estcpu, t.slptime));
            }
        }
        t.slptime = 0;
        if on_cpu {
            t.state = ThreadState::OnProc;
            let cpu = t.cpu;
            self.resetpriority(id);
            let eprio = self.thread(id)?.eprio();
            self.cpus[cpu].curpri = eprio;
            return Ok(false);
        }
        self.resetpriority(id);
        self.enqueue(id);
        Ok(self.resched_for(id))
    }

    /// Unlink a thread from every structure that refers to it
    fn free_thread(&mut self, id: ThreadId) -> Option<Thread> {
        if self.threads.get(id).is_some_and(Thread::is_queued) {
            self.dequeue(id);
        }
        let t = self.threads.remove(id)?;
        if let Some(p) = self.procs.get_mut(t.pid) {
            p.lwps.retain(|&lwp| lwp != id);
        }
        Some(t)
    }
}

// =============================================================================
// CREATION
// =============================================================================

impl Scheduler {
    /// Create a process with no threads
    pub fn create_process(&self, nice: i32) -> SchedResult<Pid> {
        let nice = check_nice(nice)?;
        Ok(self.inner.lock().procs.create(None, nice))
    }

    /// Create a thread in `pid`. It starts `Idle`; make it runnable with
    /// [`setrunnable`](Self::setrunnable).
    pub fn create_thread(&self, pid: Pid, params: ThreadParams) -> SchedResult<ThreadId> {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        let nice = state.process(pid)?.nice;
        if let Some(cpu) = params.bound {
            state.check_cpu(cpu)?;
        }
        let class = match params.class {
            ClassParam::Timeshare { estcpu } => SchedClass::Timeshare {
                estcpu: estcpu.min(ESTCPU_MAX),
                nice,
            },
            ClassParam::Fixed { level } => {
                check_fixed_level(level)?;
                SchedClass::Fixed { level }
            },
        };

        let id = state.threads.insert_with(|id| {
            let mut t = Thread::new(id, pid, class, initial_priority(&class));
            if let Some(cpu) = params.bound {
                t.cpu = cpu;
                t.bound = true;
            }
            t
        });
        state.reserve_slot(id);
        if let Some(p) = state.procs.get_mut(pid) {
            p.lwps.push(id);
        }
        Ok(id)
    }

    // =========================================================================
    // SLEEP AND WAKEUP
    // =========================================================================

    /// Make a new or sleeping thread runnable
    pub fn setrunnable(&self, id: ThreadId) -> SchedResult<()> {
        let mut state = self.inner.lock();
        let current = state.thread(id)?.state;
        match current {
            ThreadState::Idle | ThreadState::Sleeping => state.make_runnable(id).map(|_| ()),
            _ => Err(SchedError::new(
                ErrorKind::InvalidState,
                "thread is not idle or sleeping",
            )),
        }
    }

    /// Wake a sleeping thread.
    ///
    /// Decay skipped while asleep is applied before the thread is queued.
    /// Returns true if a CPU was asked to reschedule for it.
    pub fn wakeup(&self, id: ThreadId) -> SchedResult<bool> {
        let mut state = self.inner.lock();
        if state.thread(id)?.state != ThreadState::Sleeping {
            return Err(SchedError::new(ErrorKind::InvalidState, "thread is not sleeping"));
        }
        state.make_runnable(id)
    }

    /// Block a runnable or running thread. A running thread keeps its CPU
    /// until the next [`switch_to_next`](Self::switch_to_next).
    pub fn sleep(&self, id: ThreadId) -> SchedResult<()> {
        let mut state = self.inner.lock();
        let t = state.thread(id)?;
        if !matches!(t.state, ThreadState::Runnable | ThreadState::OnProc) {
            return Err(SchedError::new(ErrorKind::InvalidState, "thread is not runnable"));
        }
        if t.is_queued() {
            state.dequeue(id);
        }
        let t = state.thread_mut(id)?;
        t.state = ThreadState::Sleeping;
        t.slptime = 0;
        Ok(())
    }

    /// Mark a thread exited. Its estimate stays until it is collected.
    pub fn exit_thread(&self, id: ThreadId) -> SchedResult<()> {
        let mut state = self.inner.lock();
        let t = state.thread(id)?;
        if t.state == ThreadState::Zombie {
            return Err(SchedError::new(ErrorKind::InvalidState, "thread already exited"));
        }
        if t.is_queued() {
            state.dequeue(id);
        }
        state.thread_mut(id)?.state = ThreadState::Zombie;
        Ok(())
    }

    // =========================================================================
    // ACCOUNTING
    // =========================================================================

    /// Fork `parent`.
    ///
    /// The child process records the parent lead thread's estimate and the
    /// current statistics tick. Its lead thread starts with the same estimate
    /// and class, unbound, on the parent's CPU.
    pub fn fork(&self, parent: Pid) -> SchedResult<(Pid, ThreadId)> {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        let proc = state.process(parent)?;
        let nice = proc.nice;
        let lead = proc
            .lead()
            .ok_or(SchedError::new(ErrorKind::NoSuchThread, "parent has no threads"))?;
        let (class, cpu) = {
            let t = state.thread(lead)?;
            (t.class, t.cpu)
        };
        let inherited = match class {
            SchedClass::Timeshare { estcpu, .. } => estcpu,
            SchedClass::Fixed { .. } => 0,
        };

        let pid = state.procs.create(Some(parent), nice);
        let forktime = state.pstats_ticks;
        let id = state.threads.insert_with(|id| {
            let mut t = Thread::new(id, pid, class, initial_priority(&class));
            t.cpu = cpu;
            t
        });
        state.reserve_slot(id);
        if let Some(child) = state.procs.get_mut(pid) {
            child.estcpu_inherited = inherited;
            child.forktime = forktime;
            child.lwps.push(id);
        }
        log::debug!("timeshare: fork {} -> {}, inherited estcpu {}", parent, pid, inherited);
        Ok((pid, id))
    }

    /// Tear down an exited process and charge its parent for excess CPU use.
    ///
    /// None of the process's threads may still be running on a CPU.
    /// Remaining threads are freed and children are orphaned.
    pub fn exit_process(&self, pid: Pid) -> SchedResult<()> {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        let proc = state.process(pid)?;
        if proc.lwps.iter().any(|&id| state.is_on_cpu(id)) {
            return Err(SchedError::new(ErrorKind::InvalidState, "thread still on a cpu"));
        }
        let (parent, inherited, forktime) = (proc.parent, proc.estcpu_inherited, proc.forktime);
        let child_est = proc
            .lead()
            .and_then(|id| state.threads.get(id))
            .and_then(Thread::estcpu);
        let parent_lead = parent
            .and_then(|ppid| state.procs.get(ppid))
            .and_then(|p| p.lead());

        if let (Some(child_est), Some(parent_lead)) = (child_est, parent_lead) {
            let elapsed = state.pstats_ticks.saturating_sub(forktime);
            let projected = projected_decay(state.loadfac(), inherited, elapsed);
            if child_est > projected {
                let excess = child_est - projected;
                if let Some(t) = state.threads.get_mut(parent_lead) {
                    if let Some(estcpu) = t.estcpu() {
                        t.set_estcpu(charge(estcpu, excess));
                        log::debug!(
                            "timeshare: exit {} charges {} estcpu {} (projected {})",
                            pid,
                            parent_lead,
                            excess,
                            projected
                        );
                    }
                }
                state.resetpriority(parent_lead);
            }
        }

        let Some(proc) = state.procs.remove(pid) else {
            return Err(SchedError::from_kind(ErrorKind::NoSuchProcess));
        };
        for id in proc.lwps {
            state.free_thread(id);
        }
        for orphan in state.procs.iter_mut().filter(|p| p.parent == Some(pid)) {
            orphan.parent = None;
        }
        Ok(())
    }

    /// Reap an exited thread, folding its estimate into `collector`'s
    pub fn collect(&self, collector: ThreadId, reaped: ThreadId) -> SchedResult<()> {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        if collector == reaped {
            return Err(SchedError::new(ErrorKind::InvalidState, "thread cannot collect itself"));
        }
        state.thread(collector)?;
        let reaped_est = {
            let t = state.thread(reaped)?;
            if t.state != ThreadState::Zombie {
                return Err(SchedError::new(ErrorKind::InvalidState, "thread has not exited"));
            }
            t.estcpu()
        };
        if state.is_on_cpu(reaped) {
            return Err(SchedError::new(ErrorKind::InvalidState, "thread still on a cpu"));
        }

        if let Some(amount) = reaped_est {
            let t = state.thread_mut(collector)?;
            if let Some(estcpu) = t.estcpu() {
                t.set_estcpu(charge(estcpu, amount));
            }
            state.resetpriority(collector);
        }
        state.free_thread(reaped);
        Ok(())
    }

    // =========================================================================
    // NICE
    // =========================================================================

    /// Set a process's nice value and reprioritize its threads
    pub fn set_nice(&self, pid: Pid, nice: i32) -> SchedResult<()> {
        let offset = check_nice(nice)?;
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        let proc = state
            .procs
            .get_mut(pid)
            .ok_or(SchedError::from_kind(ErrorKind::NoSuchProcess))?;
        let old = offset_to_nice(proc.nice);
        proc.nice = offset;
        let lwps = proc.lwps.clone();

        for id in lwps {
            if let Some(t) = state.threads.get_mut(id) {
                if let SchedClass::Timeshare { nice, .. } = &mut t.class {
                    *nice = offset;
                }
            }
            state.resetpriority(id);
        }
        log::debug!("timeshare: pid {} nice {} -> {}", pid, old, nice);
        Ok(())
    }

    /// Nice value of a process
    pub fn nice(&self, pid: Pid) -> SchedResult<i32> {
        let state = self.inner.lock();
        Ok(offset_to_nice(state.process(pid)?.nice))
    }
}

// =============================================================================
// TESTS
// =============================================================================
