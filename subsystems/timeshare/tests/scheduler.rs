//! End-to-end dispatcher scenarios: chargeback, round-robin, sleep decay,
//! configuration and concurrent use from several OS threads.

use std::sync::Arc;
use std::thread;

use helix_timeshare::estcpu::{loadfactor, projected_decay};
use helix_timeshare::param::{ESTCPU_ACCUM, ESTCPU_MAX, FSCALE};
use helix_timeshare::{
    MemoryConfig, Resched, RrState, SchedConfig, Scheduler, ThreadId, ThreadParams,
};

fn estcpu(sched: &Scheduler, t: ThreadId) -> u32 {
    sched.thread_info(t).unwrap().estcpu.unwrap()
}

#[test]
fn fork_exit_chargeback() {
    let sched = Scheduler::new(SchedConfig::new().with_ncpu(2)).unwrap();
    sched.set_load_average(FSCALE);

    let parent = sched.create_process(0).unwrap();
    let pt = sched.create_thread(parent, ThreadParams::timeshare()).unwrap();
    sched.setrunnable(pt).unwrap();
    assert_eq!(sched.switch_to_next(0), Some(pt));
    for _ in 0..4 {
        sched.schedclock(0);
    }
    assert_eq!(estcpu(&sched, pt), 4096);

    let (child, ct) = sched.fork(parent).unwrap();
    sched.setrunnable(ct).unwrap();
    sched.pstats();
    assert_eq!(estcpu(&sched, pt), 2730);
    assert_eq!(estcpu(&sched, ct), 2730);

    // Child runs on the second CPU.
    assert_eq!(sched.switch_to_next(1), Some(ct));
    for _ in 0..10 {
        sched.schedclock(1);
    }
    let child_final = estcpu(&sched, ct);
    assert_eq!(child_final, 12970);

    sched.exit_thread(ct).unwrap();
    assert_eq!(sched.switch_to_next(1), None);

    let before = estcpu(&sched, pt);
    let projected = projected_decay(loadfactor(FSCALE), 4096, 1);
    assert_eq!(projected, 2730);
    sched.exit_process(child).unwrap();
    assert_eq!(estcpu(&sched, pt) - before, child_final - projected);
    assert_eq!(estcpu(&sched, pt) - before, 10 * ESTCPU_ACCUM);
    assert!(sched.check_invariants().is_ok());
}

#[test]
fn chargeback_is_clamped() {
    let sched = Scheduler::new(SchedConfig::new().with_ncpu(2)).unwrap();
    let parent = sched.create_process(0).unwrap();
    let pt = sched
        .create_thread(parent, ThreadParams::timeshare().with_estcpu(ESTCPU_MAX - 1000))
        .unwrap();
    sched.setrunnable(pt).unwrap();
    sched.switch_to_next(0);

    let (child, ct) = sched.fork(parent).unwrap();
    sched.setrunnable(ct).unwrap();
    assert_eq!(sched.switch_to_next(1), Some(ct));
    for _ in 0..40 {
        sched.schedclock(1);
    }
    sched.schedclock(0);
    sched.exit_thread(ct).unwrap();
    sched.switch_to_next(1);
    sched.exit_process(child).unwrap();

    assert_eq!(estcpu(&sched, pt), ESTCPU_MAX);
}

#[test]
fn round_robin_after_full_quantum() {
    let sched = Scheduler::new(SchedConfig::new()).unwrap();
    let rr_ticks = sched.config().rr_ticks;
    let pid = sched.create_process(0).unwrap();
    let a = sched.create_thread(pid, ThreadParams::timeshare()).unwrap();
    let b = sched.create_thread(pid, ThreadParams::timeshare()).unwrap();
    sched.setrunnable(a).unwrap();
    sched.setrunnable(b).unwrap();
    assert_eq!(sched.switch_to_next(0), Some(a));

    for _ in 0..rr_ticks {
        sched.hardclock(0);
    }
    assert_eq!(sched.rr_state(0), Some(RrState::SeenOneQuantum));
    assert!(sched.need_resched(0).is_empty());

    for _ in 0..rr_ticks {
        sched.hardclock(0);
    }
    assert_eq!(sched.rr_state(0), Some(RrState::ShouldYield));
    assert!(sched.need_resched(0).contains(Resched::PENDING));

    assert_eq!(sched.switch_to_next(0), Some(b));
    assert_eq!(sched.rr_state(0), Some(RrState::Idle));
}

#[test]
fn long_sleep_forgets_usage() {
    let sched = Scheduler::new(SchedConfig::new()).unwrap();
    sched.set_load_average(FSCALE);
    let pid = sched.create_process(0).unwrap();
    let t = sched.create_thread(pid, ThreadParams::timeshare()).unwrap();
    sched.setrunnable(t).unwrap();
    sched.switch_to_next(0);
    for _ in 0..100 {
        sched.schedclock(0);
    }
    assert_eq!(estcpu(&sched, t), ESTCPU_MAX);

    sched.sleep(t).unwrap();
    sched.switch_to_next(0);
    for _ in 0..20 {
        sched.pstats();
    }
    sched.wakeup(t).unwrap();
    assert_eq!(estcpu(&sched, t), 0);
    assert_eq!(sched.thread_info(t).unwrap().priority, 43);
}

#[test]
fn config_from_provider() {
    let mut config = MemoryConfig::new();
    config.set_uint("sched.ncpu", 4);
    config.set_uint("sched.hz", 1000);

    let sched = Scheduler::new(SchedConfig::from_provider(&config).unwrap()).unwrap();
    assert_eq!(sched.ncpu(), 4);
    assert_eq!(sched.config().rr_ticks, 100);
    assert_eq!(sched.snapshot().cpus.len(), 4);
}

#[test]
fn concurrent_cpus_keep_invariants() {
    const NCPU: usize = 4;
    let sched = Arc::new(Scheduler::new(SchedConfig::new().with_ncpu(NCPU)).unwrap());
    sched.set_load_average(FSCALE);

    let pid = sched.create_process(0).unwrap();
    for i in 0..16 {
        let params = if i % 2 == 0 {
            ThreadParams::timeshare().bound_to(i % NCPU)
        } else {
            ThreadParams::timeshare()
        };
        let t = sched.create_thread(pid, params).unwrap();
        sched.setrunnable(t).unwrap();
    }

    let mut workers = Vec::new();
    for cpu in 0..NCPU {
        let sched = Arc::clone(&sched);
        workers.push(thread::spawn(move || {
            for round in 0..200 {
                sched.switch_to_next(cpu);
                sched.hardclock(cpu);
                sched.schedclock(cpu);
                if round % 7 == 0 {
                    sched.tick(cpu);
                }
                // Eight floating threads and four CPUs: global work remains.
                assert!(sched.has_runnable_work(cpu));
            }
        }));
    }
    let clock = {
        let sched = Arc::clone(&sched);
        thread::spawn(move || {
            for _ in 0..50 {
                sched.pstats();
                sched.update_loadavg();
            }
        })
    };

    for worker in workers {
        worker.join().unwrap();
    }
    clock.join().unwrap();

    sched.check_invariants().unwrap();
    let snap = sched.snapshot();
    let queued = snap.global.len() + snap.cpus.iter().map(|c| c.queue.len()).sum::<usize>();
    let running = snap.cpus.iter().filter(|c| c.curlwp.is_some()).count();
    assert_eq!(queued + running, 16);
    assert_eq!(snap.pstats_ticks, 50);
}
