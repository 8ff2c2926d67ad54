//! # Introspection
//!
//! Read-only views of scheduler state for diagnostics, and a full
//! consistency check of run queues against thread records.

use alloc::vec::Vec;

use super::{SchedState, Scheduler};
use crate::cpu::{Resched, SpcFlags};
use crate::error::{ErrorKind, SchedError, SchedResult};
use crate::loadavg::LoadAverage;
use crate::param::{offset_to_nice, CpuId, Fixpt, Pri, ESTCPU_MAX};
use crate::process::Pid;
use crate::thread::{QueueId, SchedClass, Thread, ThreadId, ThreadState};

// =============================================================================
// VIEWS
// =============================================================================

/// Copy of one thread's scheduling state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub pid: Pid,
    pub state: ThreadState,
    pub class: SchedClass,
    /// Base priority
    pub priority: Pri,
    /// Effective priority
    pub eprio: Pri,
    pub estcpu: Option<Fixpt>,
    pub nice: Option<i32>,
    pub pctcpu: Fixpt,
    pub slptime: u32,
    pub cpu: CpuId,
    pub bound: bool,
    pub queue: Option<QueueId>,
}

impl From<&Thread> for ThreadInfo {
    fn from(t: &Thread) -> Self {
        let nice = match t.class {
            SchedClass::Timeshare { nice, .. } => Some(offset_to_nice(nice)),
            SchedClass::Fixed { .. } => None,
        };
        Self {
            id: t.id,
            pid: t.pid,
            state: t.state,
            class: t.class,
            priority: t.priority,
            eprio: t.eprio(),
            estcpu: t.estcpu(),
            nice,
            pctcpu: t.pctcpu,
            slptime: t.slptime,
            cpu: t.cpu,
            bound: t.bound,
            queue: t.membership.map(|m| m.queue),
        }
    }
}

/// One CPU's dispatcher state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuSnapshot {
    pub id: CpuId,
    pub curlwp: Option<ThreadId>,
    pub curpri: Pri,
    pub flags: SpcFlags,
    pub resched: Resched,
    pub softint_pending: bool,
    pub nswitch: u64,
    /// Bound threads in dispatch order
    pub queue: Vec<(ThreadId, Pri)>,
}

/// Whole-scheduler view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedSnapshot {
    /// Global run queue in dispatch order
    pub global: Vec<(ThreadId, Pri)>,
    pub cpus: Vec<CpuSnapshot>,
    pub loadavg: LoadAverage,
    pub pstats_ticks: u64,
    pub nthreads: usize,
}

fn violation(message: &'static str) -> SchedError {
    SchedError::new(ErrorKind::InvariantViolation, message)
}

// =============================================================================
// QUERIES
// =============================================================================

impl Scheduler {
    /// Scheduling state of one thread
    pub fn thread_info(&self, id: ThreadId) -> SchedResult<ThreadInfo> {
        let state = self.inner.lock();
        state.thread(id).map(ThreadInfo::from)
    }

    /// Threads of a process, lead first
    pub fn threads_of(&self, pid: Pid) -> SchedResult<Vec<ThreadId>> {
        let state = self.inner.lock();
        Ok(state.process(pid)?.lwps.clone())
    }

    /// Parent of a process; `None` once orphaned
    pub fn parent(&self, pid: Pid) -> SchedResult<Option<Pid>> {
        let state = self.inner.lock();
        Ok(state.process(pid)?.parent)
    }

    /// Copy out every run queue and per-CPU state
    pub fn snapshot(&self) -> SchedSnapshot {
        let state = self.inner.lock();
        SchedSnapshot {
            global: state.global.iter().collect(),
            cpus: state
                .cpus
                .iter()
                .map(|spc| CpuSnapshot {
                    id: spc.id,
                    curlwp: spc.curlwp,
                    curpri: spc.curpri,
                    flags: spc.flags,
                    resched: spc.resched,
                    softint_pending: spc.softint_pending,
                    nswitch: spc.nswitch,
                    queue: spc.runq.iter().collect(),
                })
                .collect(),
            loadavg: state.loadavg,
            pstats_ticks: state.pstats_ticks,
            nthreads: state.threads.len(),
        }
    }

    /// Log the run queues at debug level
    pub fn dump(&self) {
        let state = self.inner.lock();
        log::debug!(
            "timeshare: {} threads, global queue {} entries, load {}/{}/{}",
            state.threads.len(),
            state.global.count(),
            state.loadavg.one(),
            state.loadavg.five(),
            state.loadavg.fifteen()
        );
        for (id, pri) in state.global.iter() {
            log::debug!("  global  {} pri {}", id, pri);
        }
        for spc in &state.cpus {
            log::debug!(
                "  cpu{}: cur {:?} curpri {} flags {:?} resched {:?} switches {}",
                spc.id,
                spc.curlwp,
                spc.curpri,
                spc.flags,
                spc.resched,
                spc.nswitch
            );
            for (id, pri) in spc.runq.iter() {
                log::debug!("  cpu{}    {} pri {}", spc.id, id, pri);
            }
        }
    }

    /// Verify run queues against thread records
    pub fn check_invariants(&self) -> SchedResult<()> {
        self.inner.lock().check_invariants()
    }
}

impl SchedState {
    fn check_invariants(&self) -> SchedResult<()> {
        self.global.check().map_err(violation)?;
        for spc in &self.cpus {
            spc.runq.check().map_err(violation)?;
        }

        let mut queued = 0;
        for t in self.threads.iter() {
            if t.estcpu().is_some_and(|est| est > ESTCPU_MAX) {
                return Err(violation("estcpu above ESTCPU_MAX"));
            }
            if t.state == ThreadState::OnProc && self.cpus[t.cpu].curlwp != Some(t.id) {
                return Err(violation("running thread is not current on its cpu"));
            }
            let Some(m) = t.membership else {
                continue;
            };
            queued += 1;
            if !self.runq(m.queue).contains(t.id, m.pri) {
                return Err(violation("membership record disagrees with run queue"));
            }
            if m.pri != t.eprio() {
                return Err(violation("thread queued under stale priority"));
            }
            if t.state != ThreadState::Runnable {
                return Err(violation("queued thread is not runnable"));
            }
            let placed = match m.queue {
                QueueId::Global => !t.bound,
                QueueId::Cpu(cpu) => t.bound && t.cpu == cpu,
            };
            if !placed {
                return Err(violation("thread on the wrong run queue"));
            }
        }

        let total = self.global.count() + self.cpus.iter().map(|spc| spc.runq.count()).sum::<usize>();
        if total != queued {
            return Err(violation("run-queue counts disagree with thread records"));
        }

        let mut current: Vec<ThreadId> = Vec::with_capacity(self.cpus.len());
        for spc in &self.cpus {
            let Some(id) = spc.curlwp else {
                continue;
            };
            if current.contains(&id) {
                return Err(violation("thread is current on more than one cpu"));
            }
            current.push(id);
            let t = self
                .threads
                .get(id)
                .ok_or(violation("current thread does not exist"))?;
            if t.is_queued() {
                return Err(violation("current thread is also queued"));
            }
            if t.cpu != spc.id {
                return Err(violation("current thread records another cpu"));
            }
            if !matches!(
                t.state,
                ThreadState::OnProc | ThreadState::Sleeping | ThreadState::Zombie
            ) {
                return Err(violation("current thread is neither running nor blocked"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::SchedConfig;
    use crate::error::ErrorKind;
    use crate::sched::{Scheduler, ThreadParams};
    use crate::thread::{QueueId, ThreadState};

    #[test]
    fn test_snapshot_reflects_queues() {
        let sched = Scheduler::new(SchedConfig::new().with_ncpu(2)).unwrap();
        let pid = sched.create_process(0).unwrap();
        let a = sched.create_thread(pid, ThreadParams::timeshare()).unwrap();
        let b = sched
            .create_thread(pid, ThreadParams::timeshare().bound_to(1))
            .unwrap();
        sched.enqueue(a);
        sched.enqueue(b);

        let snap = sched.snapshot();
        assert_eq!(snap.global, [(a, 43)]);
        assert!(snap.cpus[0].queue.is_empty());
        assert_eq!(snap.cpus[1].queue, [(b, 43)]);
        assert_eq!(snap.nthreads, 2);
        sched.dump();

        let info = sched.thread_info(b).unwrap();
        assert_eq!(info.queue, Some(QueueId::Cpu(1)));
        assert_eq!(info.nice, Some(0));
        assert!(info.bound);
    }

    #[test]
    fn test_check_rejects_bad_current_thread() {
        let sched = Scheduler::new(SchedConfig::new().with_ncpu(2)).unwrap();
        let pid = sched.create_process(0).unwrap();
        let t = sched.create_thread(pid, ThreadParams::timeshare()).unwrap();
        sched.setrunnable(t).unwrap();
        assert_eq!(sched.switch_to_next(0), Some(t));
        sched.check_invariants().unwrap();

        sched.inner.lock().cpus[1].curlwp = Some(t);
        let err = sched.check_invariants().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        assert_eq!(err.message(), "thread is current on more than one cpu");

        sched.inner.lock().cpus[1].curlwp = None;
        sched.inner.lock().threads.get_mut(t).unwrap().state = ThreadState::Runnable;
        let err = sched.check_invariants().unwrap_err();
        assert_eq!(err.message(), "current thread is neither running nor blocked");

        {
            let mut state = sched.inner.lock();
            state.threads.get_mut(t).unwrap().state = ThreadState::Sleeping;
            state.threads.get_mut(t).unwrap().cpu = 1;
        }
        let err = sched.check_invariants().unwrap_err();
        assert_eq!(err.message(), "current thread records another cpu");
    }

    #[test]
    fn test_thread_info_unknown() {
        let sched = Scheduler::new(SchedConfig::new()).unwrap();
        assert!(sched.thread_info(crate::thread::ThreadId(3)).is_err());
    }
}
