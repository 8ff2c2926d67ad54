//! # Load Average
//!
//! Exponentially-damped run-queue length over 1, 5 and 15 minutes,
//! sampled every [`LOADAV_INTERVAL`] seconds. The 1-minute value drives the
//! estcpu decay rate.

use crate::param::{Fixpt, FSCALE, FSHIFT};

/// Seconds between samples
pub const LOADAV_INTERVAL: u32 = 5;

/// exp(-1/12), exp(-1/60), exp(-1/180) in fixed point
pub const CEXP: [Fixpt; 3] = [
    (0.920_044_414_629_323_2 * FSCALE as f64) as Fixpt,
    (0.983_471_453_821_617_4 * FSCALE as f64) as Fixpt,
    (0.994_459_848_004_896_7 * FSCALE as f64) as Fixpt,
];

/// 1, 5 and 15 minute load averages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadAverage {
    ldavg: [Fixpt; 3],
}

impl LoadAverage {
    /// All averages zero
    pub const fn new() -> Self {
        Self { ldavg: [0; 3] }
    }

    /// All averages set to `ldavg`
    pub const fn constant(ldavg: Fixpt) -> Self {
        Self {
            ldavg: [ldavg; 3],
        }
    }

    /// Fold in one sample of `nrun` runnable threads
    pub fn sample(&mut self, nrun: u32) {
        for (avg, &cexp) in self.ldavg.iter_mut().zip(CEXP.iter()) {
            let kept = u64::from(cexp) * u64::from(*avg);
            let added = u64::from(nrun) * u64::from(FSCALE) * u64::from(FSCALE - cexp);
            *avg = ((kept + added) >> FSHIFT) as Fixpt;
        }
    }

    /// 1-minute average
    pub const fn one(&self) -> Fixpt {
        self.ldavg[0]
    }

    /// 5-minute average
    pub const fn five(&self) -> Fixpt {
        self.ldavg[1]
    }

    /// 15-minute average
    pub const fn fifteen(&self) -> Fixpt {
        self.ldavg[2]
    }
}
