//! # Priority and CPU Control
//!
//! Administrative knobs: lent priority, fixed-class priority, CPU binding
//! and migration, CPU offline state and soft interrupts.

use super::lifecycle::check_fixed_level;
use super::Scheduler;
use crate::cpu::SpcFlags;
use crate::error::{ErrorKind, SchedError, SchedResult};
use crate::param::{CpuId, Pri, MAXPRI};
use crate::thread::{SchedClass, ThreadId};

impl Scheduler {
    // =========================================================================
    // PRIORITY
    // =========================================================================

    /// Lend a priority to a thread, or withdraw it with `None`.
    ///
    /// The effective priority becomes the higher of the base and the lent
    /// value. A queued thread moves to the matching lane.
    pub fn lend_priority(&self, id: ThreadId, lent: Option<Pri>) -> SchedResult<()> {
        if lent.is_some_and(|pri| pri > MAXPRI) {
            return Err(SchedError::from_kind(ErrorKind::InvalidPriority));
        }
        let mut state = self.inner.lock();
        state.thread_mut(id)?.inherited = lent;
        state.priority_changed(id);
        Ok(())
    }

    /// Change the level of a fixed-priority thread
    pub fn set_fixed_priority(&self, id: ThreadId, level: Pri) -> SchedResult<()> {
        check_fixed_level(level)?;
        let mut state = self.inner.lock();
        let t = state.thread_mut(id)?;
        let SchedClass::Fixed { level: current } = &mut t.class else {
            return Err(SchedError::new(
                ErrorKind::InvalidPriority,
                "not a fixed-priority thread",
            ));
        };
        *current = level;
        t.priority = level;
        state.priority_changed(id);
        Ok(())
    }

    // =========================================================================
    // AFFINITY
    // =========================================================================

    /// Bind a thread to `cpu`, or let it float with `None`.
    ///
    /// A queued thread moves at once. Otherwise the binding takes effect at
    /// the next enqueue.
    pub fn bind(&self, id: ThreadId, cpu: Option<CpuId>) -> SchedResult<()> {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        if let Some(cpu) = cpu {
            state.check_cpu(cpu)?;
        }
        let t = state.thread_mut(id)?;
        t.bound = cpu.is_some();
        if cpu.is_some() {
            t.target_cpu = cpu;
        }
        if t.is_queued() {
            state.dequeue(id);
            state.enqueue(id);
        }
        Ok(())
    }

    /// Request that a thread move to `cpu`. Applied at its next enqueue; a
    /// thread already queued stays where it is until then.
    pub fn migrate(&self, id: ThreadId, cpu: CpuId) -> SchedResult<()> {
        let mut state = self.inner.lock();
        state.check_cpu(cpu)?;
        state.thread_mut(id)?.target_cpu = Some(cpu);
        log::debug!("timeshare: {} will migrate to cpu{}", id, cpu);
        Ok(())
    }

    // =========================================================================
    // CPU STATE
    // =========================================================================

    /// Take `cpu` off or back on the global run queue.
    ///
    /// The last online CPU cannot go offline.
    pub fn set_cpu_offline(&self, cpu: CpuId, offline: bool) -> SchedResult<()> {
        let mut state = self.inner.lock();
        state.check_cpu(cpu)?;
        if offline {
            let others_online = state
                .cpus
                .iter()
                .any(|spc| spc.id != cpu && !spc.is_offline());
            if !others_online {
                log::warn!("timeshare: refusing to offline last cpu{}", cpu);
                return Err(SchedError::new(ErrorKind::InvalidState, "last online cpu"));
            }
        }
        state.cpus[cpu].flags.set(SpcFlags::OFFLINE, offline);
        log::info!("timeshare: cpu{} {}", cpu, if offline { "offline" } else { "online" });
        Ok(())
    }

    /// Flag a pending soft interrupt on `cpu`
    pub fn raise_softint(&self, cpu: CpuId) -> SchedResult<()> {
        let mut state = self.inner.lock();
        state.check_cpu(cpu)?;
        state.cpus[cpu].softint_pending = true;
        Ok(())
    }

    /// Clear the pending soft interrupt on `cpu`
    pub fn clear_softint(&self, cpu: CpuId) -> SchedResult<()> {
        let mut state = self.inner.lock();
        state.check_cpu(cpu)?;
        state.cpus[cpu].softint_pending = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::SchedConfig;
    use crate::error::ErrorKind;
    use crate::param::{PRI_KTHREAD, PRI_USER_RT};
    use crate::sched::{Scheduler, ThreadParams};
    use crate::thread::ThreadId;

    fn scheduler(ncpu: usize) -> Scheduler {
        Scheduler::new(SchedConfig::new().with_ncpu(ncpu)).unwrap()
    }

    fn spawn(sched: &Scheduler, params: ThreadParams) -> ThreadId {
        let pid = sched.create_process(0).unwrap();
        sched.create_thread(pid, params).unwrap()
    }

    #[test]
    fn test_migration_is_lazy() {
        let sched = scheduler(2);
        let t = spawn(&sched, ThreadParams::timeshare().bound_to(0));
        sched.enqueue(t);
        sched.migrate(t, 1).unwrap();

        assert_eq!(sched.next_to_run(0), Some(t));
        assert_eq!(sched.next_to_run(1), None);

        sched.dequeue(t);
        sched.enqueue(t);
        assert_eq!(sched.next_to_run(0), None);
        assert_eq!(sched.next_to_run(1), Some(t));
        assert_eq!(sched.thread_info(t).unwrap().cpu, 1);
        assert!(sched.check_invariants().is_ok());
    }

    #[test]
    fn test_bind_moves_queued_thread() {
        let sched = scheduler(2);
        let t = spawn(&sched, ThreadParams::timeshare());
        sched.enqueue(t);
        assert_eq!(sched.next_to_run(0), Some(t));

        sched.bind(t, Some(1)).unwrap();
        assert_eq!(sched.next_to_run(0), None);
        assert_eq!(sched.next_to_run(1), Some(t));

        sched.bind(t, None).unwrap();
        assert_eq!(sched.next_to_run(0), Some(t));
        assert_eq!(sched.next_to_run(1), Some(t));
        assert_eq!(sched.bind(t, Some(2)).unwrap_err().kind(), ErrorKind::NoSuchCpu);
        assert!(sched.check_invariants().is_ok());
    }

    #[test]
    fn test_lent_priority_moves_to_fixed_lane() {
        let sched = scheduler(1);
        let t = spawn(&sched, ThreadParams::timeshare());
        let kt = spawn(&sched, ThreadParams::fixed(PRI_KTHREAD + 4));
        sched.enqueue(t);
        sched.enqueue(kt);
        assert_eq!(sched.next_to_run(0), Some(kt));

        sched.lend_priority(t, Some(PRI_USER_RT)).unwrap();
        assert_eq!(sched.next_to_run(0), Some(t));
        assert_eq!(sched.thread_info(t).unwrap().eprio, PRI_USER_RT);
        assert!(sched.check_invariants().is_ok());

        sched.lend_priority(t, None).unwrap();
        assert_eq!(sched.next_to_run(0), Some(kt));
        assert!(sched.check_invariants().is_ok());

        assert_eq!(
            sched.lend_priority(t, Some(250)).unwrap_err().kind(),
            ErrorKind::InvalidPriority
        );
    }

    #[test]
    fn test_lent_priority_updates_running_cpu() {
        let sched = scheduler(1);
        let t = spawn(&sched, ThreadParams::timeshare());
        sched.setrunnable(t).unwrap();
        sched.switch_to_next(0);

        sched.lend_priority(t, Some(PRI_USER_RT)).unwrap();
        assert_eq!(sched.snapshot().cpus[0].curpri, PRI_USER_RT);
    }

    #[test]
    fn test_set_fixed_priority() {
        let sched = scheduler(1);
        let a = spawn(&sched, ThreadParams::fixed(PRI_KTHREAD + 10));
        let b = spawn(&sched, ThreadParams::fixed(PRI_KTHREAD));
        let ts = spawn(&sched, ThreadParams::timeshare());
        sched.enqueue(a);
        sched.enqueue(b);
        assert_eq!(sched.next_to_run(0), Some(a));

        sched.set_fixed_priority(b, PRI_KTHREAD + 20).unwrap();
        assert_eq!(sched.next_to_run(0), Some(b));
        assert!(sched.check_invariants().is_ok());

        assert_eq!(
            sched.set_fixed_priority(ts, PRI_KTHREAD).unwrap_err().kind(),
            ErrorKind::InvalidPriority
        );
        assert_eq!(
            sched.set_fixed_priority(a, 50).unwrap_err().kind(),
            ErrorKind::InvalidPriority
        );
    }

    #[test]
    fn test_last_cpu_stays_online() {
        let sched = scheduler(2);
        sched.set_cpu_offline(0, true).unwrap();
        assert_eq!(
            sched.set_cpu_offline(1, true).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
        sched.set_cpu_offline(0, false).unwrap();
        sched.set_cpu_offline(1, true).unwrap();
        assert_eq!(sched.set_cpu_offline(7, true).unwrap_err().kind(), ErrorKind::NoSuchCpu);
    }
}
