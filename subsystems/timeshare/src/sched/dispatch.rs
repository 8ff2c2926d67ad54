//! # Dispatch
//!
//! Run-queue routing and the per-CPU "what runs next" decision. These are
//! hot-path operations: they never fail, and misuse (double enqueue,
//! dequeue of a thread that is not queued) trips a debug assertion.

use super::Scheduler;
use crate::param::CpuId;
use crate::thread::{ThreadId, ThreadState};

impl Scheduler {
    /// Put a thread on its run queue
    pub fn enqueue(&self, id: ThreadId) {
        self.inner.lock().enqueue(id);
    }

    /// Take a thread off its run queue
    pub fn dequeue(&self, id: ThreadId) {
        self.inner.lock().dequeue(id);
    }

    /// Thread `cpu` should run next, without removing it
    pub fn next_to_run(&self, cpu: CpuId) -> Option<ThreadId> {
        let state = self.inner.lock();
        debug_assert!(cpu < state.cpus.len(), "no cpu{}", cpu);
        if cpu >= state.cpus.len() {
            return None;
        }
        state.next_to_run(cpu).map(|(id, _)| id)
    }

    /// Does `cpu` have anything to do besides idling?
    pub fn has_runnable_work(&self, cpu: CpuId) -> bool {
        let state = self.inner.lock();
        let Some(spc) = state.cpus.get(cpu) else {
            return false;
        };
        !spc.runq.is_empty()
            || (!spc.is_offline() && !state.global.is_empty())
            || spc.softint_pending
    }

    /// Context switch on `cpu`.
    ///
    /// A thread still running goes back on its run queue, then the best
    /// candidate is taken off and made current. Round-robin flags and
    /// reschedule requests are cleared. Returns the new current thread, or
    /// `None` if the CPU goes idle.
    pub fn switch_to_next(&self, cpu: CpuId) -> Option<ThreadId> {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        debug_assert!(cpu < state.cpus.len(), "no cpu{}", cpu);
        if cpu >= state.cpus.len() {
            return None;
        }

        let prev = state.cpus[cpu].curlwp;
        if let Some(prev) = prev {
            let preempted = state
                .threads
                .get(prev)
                .is_some_and(|t| t.state == ThreadState::OnProc);
            if preempted {
                state.enqueue(prev);
            }
        }

        let next = state.next_to_run(cpu);
        if let Some((id, _)) = next {
            state.dequeue(id);
            if let Some(t) = state.threads.get_mut(id) {
                t.state = ThreadState::OnProc;
                t.cpu = cpu;
            }
        }

        let spc = &mut state.cpus[cpu];
        spc.curlwp = next.map(|(id, _)| id);
        spc.curpri = next.map_or(0, |(_, pri)| pri);
        spc.clear_on_switch();
        if spc.curlwp != prev {
            spc.nswitch += 1;
            log::trace!("timeshare: cpu{} switch {:?} -> {:?}", cpu, prev, spc.curlwp);
        }
        spc.curlwp
    }
}
