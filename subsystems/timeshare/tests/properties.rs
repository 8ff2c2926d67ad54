//! Property-based tests for run-queue invariants and the estimator
//! arithmetic.

use helix_timeshare::estcpu::{
    decay_cpu, decay_cpu_batch, decay_on_wake, loadfactor, timeshare_priority,
};
use helix_timeshare::param::{
    nice_to_offset, Pri, ESTCPU_MAX, ESTCPU_SHIFT, FSCALE, PRIO_MAX, PRIO_MIN, PRI_COUNT,
    PRI_KERNEL,
};
use helix_timeshare::{RunQueue, ThreadId};
use proptest::prelude::*;

// ============================================================================
// Arbitrary generators
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Enqueue(Pri),
    Dequeue(usize),
    Pop,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..PRI_COUNT as Pri).prop_map(Op::Enqueue),
        1 => any::<usize>().prop_map(Op::Dequeue),
        1 => Just(Op::Pop),
    ]
}

/// Load average of at least 1.0
fn arb_ldavg() -> impl Strategy<Value = u32> {
    FSCALE..=64 * FSCALE
}

/// Queued entry in the reference model: thread, key, enqueue sequence
type Entry = (ThreadId, Pri, u64);

/// Highest key wins, earliest enqueue among equals
fn model_next(model: &[Entry]) -> Option<(ThreadId, Pri)> {
    model
        .iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.2.cmp(&a.2)))
        .map(|&(id, pri, _)| (id, pri))
}

// ============================================================================
// Run queue
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn runq_matches_model(ops in proptest::collection::vec(arb_op(), 1..200)) {
        let mut rq = RunQueue::new();
        let mut model: Vec<Entry> = Vec::new();
        let mut next_id = 0u32;
        let mut seq = 0u64;

        for op in ops {
            match op {
                Op::Enqueue(pri) => {
                    let id = ThreadId(next_id);
                    next_id += 1;
                    seq += 1;
                    rq.enqueue(id, pri);
                    model.push((id, pri, seq));
                }
                Op::Dequeue(k) => {
                    if !model.is_empty() {
                        let (id, pri, _) = model.remove(k % model.len());
                        rq.dequeue(id, pri);
                    }
                }
                Op::Pop => {
                    if let Some((id, pri)) = rq.next() {
                        rq.dequeue(id, pri);
                        model.retain(|e| e.0 != id);
                    }
                }
            }

            prop_assert!(rq.check().is_ok(), "{:?}", rq.check());
            prop_assert_eq!(rq.count(), model.len());
            prop_assert_eq!(rq.next(), model_next(&model));
        }
    }

    #[test]
    fn equal_priority_is_fifo(pri in 0..PRI_COUNT as Pri, n in 1usize..40) {
        let mut rq = RunQueue::new();
        for i in 0..n {
            rq.enqueue(ThreadId(i as u32), pri);
        }
        let mut order = Vec::new();
        while let Some((id, p)) = rq.next() {
            prop_assert_eq!(p, pri);
            rq.dequeue(id, p);
            order.push(id.0);
        }
        prop_assert_eq!(order, (0..n as u32).collect::<Vec<_>>());
    }

    #[test]
    fn next_is_never_below_another_queued(pris in proptest::collection::vec(0..PRI_COUNT as Pri, 1..64)) {
        let mut rq = RunQueue::new();
        for (i, &pri) in pris.iter().enumerate() {
            rq.enqueue(ThreadId(i as u32), pri);
        }
        let mut last = Pri::MAX;
        while let Some((id, pri)) = rq.next() {
            prop_assert!(rq.iter().all(|(_, other)| other <= pri));
            prop_assert!(pri <= last);
            last = pri;
            rq.dequeue(id, pri);
        }
        prop_assert!(rq.is_empty());
    }
}

// ============================================================================
// Estimator
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn decay_is_monotone(ldavg in 0..=64 * FSCALE, est in 0..=ESTCPU_MAX) {
        let loadfac = loadfactor(ldavg);
        prop_assert!(decay_cpu(loadfac, est) <= est);
        prop_assert_eq!(decay_cpu(loadfac, 0), 0);
    }

    #[test]
    fn decay_converges_below_one_level(ldavg in arb_ldavg(), est in 0..=ESTCPU_MAX) {
        let loadfac = loadfactor(ldavg);
        let steps = (7 * u64::from(loadfac)).div_ceil(u64::from(FSCALE)) as u32;

        let mut iterated = est;
        for _ in 0..steps {
            iterated = decay_cpu(loadfac, iterated);
        }
        prop_assert_eq!(iterated >> ESTCPU_SHIFT, 0);
        prop_assert_eq!(decay_cpu_batch(loadfac, est, steps), 0);
    }

    #[test]
    fn batch_below_bound_matches_iteration(ldavg in arb_ldavg(), est in 0..=ESTCPU_MAX, n in 0u32..14) {
        let loadfac = loadfactor(ldavg);
        let mut iterated = est;
        for _ in 0..n {
            iterated = decay_cpu(loadfac, iterated);
        }
        prop_assert_eq!(decay_cpu_batch(loadfac, est, n), iterated);
    }

    #[test]
    fn wake_decay_never_increases(ldavg in arb_ldavg(), est in 0..=ESTCPU_MAX, slept in 0u32..1000) {
        let loadfac = loadfactor(ldavg);
        prop_assert!(decay_on_wake(loadfac, est, slept) <= est);
    }

    #[test]
    fn lower_nice_never_worse(est in 0..=ESTCPU_MAX, a in PRIO_MIN..=PRIO_MAX, b in PRIO_MIN..=PRIO_MAX) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let better = timeshare_priority(est, nice_to_offset(lo));
        let worse = timeshare_priority(est, nice_to_offset(hi));
        prop_assert!(better >= worse);
        prop_assert!(better < PRI_KERNEL);
    }
}
