//! # CPU Usage Estimator
//!
//! Pure fixed-point functions behind the timeshare priority. The load
//! average and elapsed tick counts are passed in; nothing here reads global
//! state.
//!
//! ## Decay
//!
//! Once per statistics interval every estimate is multiplied by
//!
//! ```text
//!     decay = loadfac / (loadfac + 1),   loadfac = 2 * loadavg
//! ```
//!
//! so that `decay ^ (5 * loadavg) ≈ 0.1` for any load: 90% of the history is
//! forgotten in `5 * loadavg` intervals. A busy system forgets slowly, an idle
//! one almost immediately.
//!
//! ## Priority
//!
//! ```text
//!     pri = max(0, (PRI_KERNEL - 1) - (estcpu >> ESTCPU_SHIFT) - nice)
//! ```

use crate::param::{
    Fixpt, Pri, CCPU, DECAY_STEPS_PER_LOADFAC, ESTCPU_ACCUM, ESTCPU_MAX, ESTCPU_SHIFT, FSCALE,
    FSHIFT, PRI_KERNEL,
};

/// Decay rate input derived from the 1-minute load average
#[inline]
pub const fn loadfactor(ldavg: Fixpt) -> Fixpt {
    ldavg.saturating_mul(2)
}

/// One decay step: `estcpu * loadfac / (loadfac + FSCALE)`
#[inline]
pub fn decay_cpu(loadfac: Fixpt, estcpu: Fixpt) -> Fixpt {
    if estcpu == 0 {
        return 0;
    }
    let loadfac = u64::from(loadfac);
    (u64::from(estcpu) * loadfac / (loadfac + u64::from(FSCALE))) as Fixpt
}

/// `n` decay steps.
///
/// Past `7 * loadfac` steps the estimate is below one priority level for any
/// starting value up to [`ESTCPU_MAX`] and load of at least one, so the result
/// is zero without iterating.
pub fn decay_cpu_batch(loadfac: Fixpt, estcpu: Fixpt, n: u32) -> Fixpt {
    if n == 0 {
        return estcpu;
    }
    if u64::from(n) << FSHIFT >= DECAY_STEPS_PER_LOADFAC * u64::from(loadfac) {
        return 0;
    }
    let mut estcpu = estcpu;
    for _ in 0..n {
        if estcpu == 0 {
            break;
        }
        estcpu = decay_cpu(loadfac, estcpu);
    }
    estcpu
}

/// Decay owed on wakeup after sleeping `slptime` statistics intervals.
///
/// The periodic pass already decayed the first interval; the rest were
/// skipped while the thread slept.
pub fn decay_on_wake(loadfac: Fixpt, estcpu: Fixpt, slptime: u32) -> Fixpt {
    if slptime <= 1 {
        return estcpu;
    }
    decay_cpu_batch(loadfac, estcpu, slptime - 1)
}

/// Charge one scheduler clock tick
#[inline]
pub fn accumulate(estcpu: Fixpt) -> Fixpt {
    estcpu.saturating_add(ESTCPU_ACCUM).min(ESTCPU_MAX)
}

/// Add `amount` to an estimate, clamped to [`ESTCPU_MAX`]
#[inline]
pub fn charge(estcpu: Fixpt, amount: Fixpt) -> Fixpt {
    estcpu.saturating_add(amount).min(ESTCPU_MAX)
}

/// Timeshare priority for an estimate and a stored (offset) nice value
#[inline]
pub fn timeshare_priority(estcpu: Fixpt, nice: u8) -> Pri {
    let pri = i32::from(PRI_KERNEL) - 1 - (estcpu >> ESTCPU_SHIFT) as i32 - i32::from(nice);
    pri.max(0) as Pri
}

/// What an estimate inherited at fork is expected to have decayed to
#[inline]
pub fn projected_decay(loadfac: Fixpt, inherited: Fixpt, elapsed: u64) -> Fixpt {
    decay_cpu_batch(loadfac, inherited, u32::try_from(elapsed).unwrap_or(u32::MAX))
}

/// Fold one statistics interval into %CPU.
///
/// `pctcpu` decays by [`CCPU`]; `cpticks` clock ticks out of `hz` are added
/// with weight `1 - CCPU`.
pub fn decay_pctcpu(pctcpu: Fixpt, cpticks: u32, hz: u32) -> Fixpt {
    let mut pct = (u64::from(pctcpu) * u64::from(CCPU)) >> FSHIFT;
    if cpticks != 0 && hz != 0 {
        let usage = u64::from(cpticks) * u64::from(FSCALE) / u64::from(hz);
        pct += (u64::from(FSCALE - CCPU) * usage) >> FSHIFT;
    }
    pct.min(u64::from(FSCALE)) as Fixpt
}

// =============================================================================
// TESTS
// =============================================================================
