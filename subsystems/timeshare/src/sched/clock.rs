//! # Clock Hooks
//!
//! Entry points driven by the clock subsystem:
//!
//! | Hook | Cadence | Effect |
//! |------|---------|--------|
//! | [`hardclock`](Scheduler::hardclock) | every clock tick, per CPU | cpticks, round-robin countdown |
//! | [`tick`](Scheduler::tick) | every round-robin interval, per CPU | quantum bookkeeping |
//! | [`schedclock`](Scheduler::schedclock) | scheduler clock, per CPU | estcpu accumulation |
//! | [`pstats`](Scheduler::pstats) | once per second | estcpu and %CPU decay |
//! | [`update_loadavg`](Scheduler::update_loadavg) | every 5 seconds | load average |

use alloc::vec::Vec;

use super::Scheduler;
use crate::cpu::{Resched, RrState};
use crate::estcpu::{accumulate, decay_cpu, decay_pctcpu};
use crate::loadavg::LoadAverage;
use crate::param::{CpuId, Fixpt};
use crate::thread::{ThreadId, ThreadState};

impl Scheduler {
    // =========================================================================
    // PER-CPU HOOKS
    // =========================================================================

    /// Charge one scheduler clock tick to the thread running on `cpu`
    pub fn schedclock(&self, cpu: CpuId) {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        let Some(id) = state.cpus.get(cpu).and_then(|spc| spc.curlwp) else {
            return;
        };
        if let Some(t) = state.threads.get_mut(id) {
            if let Some(estcpu) = t.estcpu() {
                t.set_estcpu(accumulate(estcpu));
            }
        }
        state.resetpriority(id);
    }

    /// Round-robin tick for `cpu`
    pub fn tick(&self, cpu: CpuId) {
        let mut state = self.inner.lock();
        if let Some(spc) = state.cpus.get_mut(cpu) {
            spc.roundrobin();
        }
    }

    /// Clock interrupt on `cpu`: counts the running thread's cpticks and
    /// runs [`tick`](Self::tick) every `rr_ticks` interrupts.
    pub fn hardclock(&self, cpu: CpuId) {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        let Some(spc) = state.cpus.get_mut(cpu) else {
            return;
        };
        if let Some(t) = spc.curlwp.and_then(|id| state.threads.get_mut(id)) {
            t.cpticks = t.cpticks.saturating_add(1);
        }
        if spc.hardclock_tick() {
            spc.roundrobin();
        }
    }

    // =========================================================================
    // STATISTICS INTERVAL
    // =========================================================================

    /// Once-per-second pass over every thread.
    ///
    /// Sleeping threads age by one interval. %CPU decays for every live
    /// thread. Estimates decay unless the thread has slept for more than one
    /// interval; that decay is settled when it wakes. Zombies are left alone
    /// until collected.
    pub fn pstats(&self) {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        let loadfac = state.loadfac();
        let hz = state.hz;

        let ids: Vec<ThreadId> = state.threads.iter().map(|t| t.id).collect();
        for id in ids {
            let Some(t) = state.threads.get_mut(id) else {
                continue;
            };
            if t.state == ThreadState::Zombie {
                continue;
            }
            if t.state == ThreadState::Sleeping {
                t.slptime = t.slptime.saturating_add(1);
            }
            let cpticks = if t.slptime == 0 { t.cpticks } else { 0 };
            t.pctcpu = decay_pctcpu(t.pctcpu, cpticks, hz);
            t.cpticks = 0;

            if t.slptime > 1 {
                continue;
            }
            if let Some(estcpu) = t.estcpu() {
                t.set_estcpu(decay_cpu(loadfac, estcpu));
                state.resetpriority(id);
            }
        }
        state.pstats_ticks += 1;
    }

    /// Statistics intervals elapsed
    pub fn pstats_ticks(&self) -> u64 {
        self.inner.lock().pstats_ticks
    }

    // =========================================================================
    // LOAD AVERAGE
    // =========================================================================

    /// Sample the number of runnable and running threads into the load
    /// average
    pub fn update_loadavg(&self) {
        let mut state = self.inner.lock();
        let nrun = state
            .threads
            .iter()
            .filter(|t| matches!(t.state, ThreadState::Runnable | ThreadState::OnProc))
            .count();
        state.loadavg.sample(nrun as u32);
    }

    /// Force all load averages to `ldavg` (fixed point)
    pub fn set_load_average(&self, ldavg: Fixpt) {
        self.inner.lock().loadavg = LoadAverage::constant(ldavg);
    }

    pub fn load_average(&self) -> LoadAverage {
        self.inner.lock().loadavg
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Pending reschedule requests for `cpu`
    pub fn need_resched(&self, cpu: CpuId) -> Resched {
        self.inner
            .lock()
            .cpus
            .get(cpu)
            .map_or(Resched::empty(), |spc| spc.resched)
    }

    /// Round-robin state of `cpu`
    pub fn rr_state(&self, cpu: CpuId) -> Option<RrState> {
        self.inner.lock().cpus.get(cpu).map(|spc| spc.rr_state())
    }

    /// Thread running on `cpu`
    pub fn current(&self, cpu: CpuId) -> Option<ThreadId> {
        self.inner.lock().cpus.get(cpu).and_then(|spc| spc.curlwp)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::SchedConfig;
    use crate::cpu::{Resched, RrState};
    use crate::param::{ESTCPU_ACCUM, ESTCPU_MAX, FSCALE};
    use crate::sched::{Scheduler, ThreadParams};
    use crate::thread::ThreadId;

    fn running(sched: &Scheduler) -> ThreadId {
        let pid = sched.create_process(0).unwrap();
        let t = sched.create_thread(pid, ThreadParams::timeshare()).unwrap();
        sched.setrunnable(t).unwrap();
        assert_eq!(sched.switch_to_next(0), Some(t));
        t
    }

    fn estcpu(sched: &Scheduler, t: ThreadId) -> u32 {
        sched.thread_info(t).unwrap().estcpu.unwrap()
    }

    #[test]
    fn test_schedclock_accumulates_and_lowers_priority() {
        let sched = Scheduler::new(SchedConfig::new()).unwrap();
        let t = running(&sched);
        let before = sched.thread_info(t).unwrap().priority;

        for _ in 0..4 {
            sched.schedclock(0);
        }
        assert_eq!(estcpu(&sched, t), 4 * ESTCPU_ACCUM);
        assert_eq!(sched.thread_info(t).unwrap().priority, before - 2);

        for _ in 0..100 {
            sched.schedclock(0);
        }
        assert_eq!(estcpu(&sched, t), ESTCPU_MAX);
        assert!(sched.check_invariants().is_ok());
    }

    #[test]
    fn test_tick_requests_yield_on_second_tick() {
        let sched = Scheduler::new(SchedConfig::new()).unwrap();
        running(&sched);

        sched.tick(0);
        assert_eq!(sched.rr_state(0), Some(RrState::SeenOneQuantum));
        assert!(sched.need_resched(0).is_empty());

        sched.tick(0);
        assert_eq!(sched.rr_state(0), Some(RrState::ShouldYield));
        assert!(sched.need_resched(0).contains(Resched::PENDING));

        sched.switch_to_next(0);
        assert_eq!(sched.rr_state(0), Some(RrState::Idle));
    }

    #[test]
    fn test_idle_cpu_tick_is_noop() {
        let sched = Scheduler::new(SchedConfig::new()).unwrap();
        sched.tick(0);
        sched.tick(0);
        assert_eq!(sched.rr_state(0), Some(RrState::Idle));
    }

    #[test]
    fn test_hardclock_drives_round_robin() {
        let sched = Scheduler::new(SchedConfig::new().with_rr_ticks(3)).unwrap();
        let t = running(&sched);
        for _ in 0..3 {
            sched.hardclock(0);
        }
        assert_eq!(sched.rr_state(0), Some(RrState::SeenOneQuantum));
        for _ in 0..3 {
            sched.hardclock(0);
        }
        assert_eq!(sched.rr_state(0), Some(RrState::ShouldYield));

        sched.pstats();
        assert!(sched.thread_info(t).unwrap().pctcpu > 0);
    }

    #[test]
    fn test_pstats_decays_with_load() {
        let sched = Scheduler::new(SchedConfig::new()).unwrap();
        sched.set_load_average(FSCALE);
        let t = running(&sched);
        for _ in 0..3 {
            sched.schedclock(0);
        }
        assert_eq!(estcpu(&sched, t), 3072);

        sched.pstats();
        assert_eq!(estcpu(&sched, t), 2048);
        assert_eq!(sched.pstats_ticks(), 1);
    }

    #[test]
    fn test_long_sleeper_decay_deferred_to_wake() {
        let sched = Scheduler::new(SchedConfig::new()).unwrap();
        sched.set_load_average(FSCALE);
        let t = running(&sched);
        for _ in 0..8 {
            sched.schedclock(0);
        }
        sched.sleep(t).unwrap();
        sched.switch_to_next(0);

        // First interval decays, later ones are skipped.
        sched.pstats();
        assert_eq!(estcpu(&sched, t), 5461);
        sched.pstats();
        sched.pstats();
        assert_eq!(estcpu(&sched, t), 5461);
        assert_eq!(sched.thread_info(t).unwrap().slptime, 3);

        // Wake settles the two skipped intervals.
        sched.wakeup(t).unwrap();
        assert_eq!(estcpu(&sched, t), 2426);
        assert_eq!(sched.thread_info(t).unwrap().slptime, 0);
    }

    #[test]
    fn test_update_loadavg_counts_runnable() {
        let sched = Scheduler::new(SchedConfig::new()).unwrap();
        sched.update_loadavg();
        assert_eq!(sched.load_average().one(), 0);

        running(&sched);
        sched.update_loadavg();
        assert!(sched.load_average().one() > 0);
    }
}
