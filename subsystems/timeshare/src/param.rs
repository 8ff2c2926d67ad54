//! # Scheduler Parameters
//!
//! Priority layout and fixed-point tuning constants.
//!
//! ## Priority Layout
//!
//! Higher numeric value means more important.
//!
//! ```text
//! 223 ┌──────────────────┐
//!     │  Kernel RT       │  192..=223 ─┐
//! 191 ├──────────────────┤             │
//!     │  User RT         │  128..=191  ├── fixed-priority lane
//! 127 ├──────────────────┤             │
//!     │  Kernel threads  │   96..=127 ─┘
//!  95 ├──────────────────┤
//!     │  Kernel          │   64..=95  ─┐
//!  63 ├──────────────────┤             ├── bitmap lanes (RUNQUE_NQS)
//!     │  User timeshare  │    0..=63  ─┘
//!   0 └──────────────────┘
//! ```
//!
//! The estcpu/nice split and the level counts are historical tuning values.
//! They are kept as named constants so that they can be adjusted in one place.

use static_assertions::const_assert;

// =============================================================================
// TYPES
// =============================================================================

/// Scheduling priority (0 = least important)
pub type Pri = u8;

/// Fixed-point number scaled by [`FSCALE`]
pub type Fixpt = u32;

/// CPU index
pub type CpuId = usize;

// =============================================================================
// PRIORITY LEVELS
// =============================================================================

/// First user timeshare priority
pub const PRI_USER: Pri = 0;

/// First kernel priority; user timeshare priorities are below it
pub const PRI_KERNEL: Pri = 64;

/// First kernel-thread priority; everything at or above is fixed priority
pub const PRI_KTHREAD: Pri = 96;

/// First user real-time priority
pub const PRI_USER_RT: Pri = 128;

/// First kernel real-time priority
pub const PRI_KERNEL_RT: Pri = 192;

/// Wakeups at or above this priority also request kernel preemption
pub const PRI_KPREEMPT: Pri = PRI_USER_RT;

/// Total number of priority levels
pub const PRI_COUNT: usize = 224;

/// Highest priority
pub const MAXPRI: Pri = (PRI_COUNT - 1) as Pri;

/// Number of bitmap-indexed lanes (user + kernel levels)
pub const RUNQUE_NQS: usize = PRI_KTHREAD as usize;

/// Lanes covered by one bitmap word
pub const BITMAP_BITS: usize = 32;

/// Bitmap words per run queue
pub const BITMAP_WORDS: usize = RUNQUE_NQS / BITMAP_BITS;

// =============================================================================
// FIXED POINT
// =============================================================================

/// Bits of fraction in [`Fixpt`]
pub const FSHIFT: u32 = 11;

/// 1.0 in [`Fixpt`]
pub const FSCALE: Fixpt = 1 << FSHIFT;

// =============================================================================
// NICE
// =============================================================================

/// Offset applied to nice values before storing them
pub const NZERO: i32 = 20;

/// Lowest (most favourable) nice value
pub const PRIO_MIN: i32 = -20;

/// Highest nice value
pub const PRIO_MAX: i32 = 20;

// =============================================================================
// ESTCPU
// =============================================================================

/// Bits of fraction in an estcpu value.
///
/// `estcpu >> ESTCPU_SHIFT` is the number of priority levels a thread has
/// lost to measured CPU use.
pub const ESTCPU_SHIFT: u32 = 11;

/// Upper bound of estcpu: [`PRIO_MAX`] priority levels.
///
/// Nice spans `2 * NZERO` levels, so nice has twice the range of the
/// automatic estimator.
pub const ESTCPU_MAX: Fixpt = (PRIO_MAX as Fixpt) << ESTCPU_SHIFT;

/// Estcpu added per scheduler clock tick while running
pub const ESTCPU_ACCUM: Fixpt = 1 << (ESTCPU_SHIFT - 1);

/// Seven decay steps per unit of load factor reduce any estcpu below one
/// priority level.
pub const DECAY_STEPS_PER_LOADFAC: u64 = 7;

/// exp(-1/20) in [`Fixpt`]: %CPU decays by 95% over 60 statistics intervals
pub const CCPU: Fixpt = 1948;

// =============================================================================
// CLOCK
// =============================================================================

/// Default clock interrupt frequency
pub const HZ: u32 = 100;

/// Maximum number of CPUs
pub const MAX_CPUS: usize = 256;

const_assert!(RUNQUE_NQS % BITMAP_BITS == 0);
const_assert!(PRI_KERNEL < PRI_KTHREAD);
const_assert!(ESTCPU_ACCUM < ESTCPU_MAX);
const_assert!(CCPU < FSCALE);
// Worst case timeshare priority never goes below PRI_USER.
const_assert!(
    (PRI_KERNEL as i32 - 1) - (ESTCPU_MAX >> ESTCPU_SHIFT) as i32 - (PRIO_MAX + NZERO) >= 0
);

/// Convert a nice value to its stored form (`nice + NZERO`)
#[inline]
pub const fn nice_to_offset(nice: i32) -> u8 {
    (nice + NZERO) as u8
}

/// Convert a stored nice value back to `[PRIO_MIN, PRIO_MAX]`
#[inline]
pub const fn offset_to_nice(offset: u8) -> i32 {
    offset as i32 - NZERO
}

/// Does this priority go to the fixed-priority lane?
#[inline]
pub const fn is_fixed_lane(pri: Pri) -> bool {
    pri >= PRI_KTHREAD
}
