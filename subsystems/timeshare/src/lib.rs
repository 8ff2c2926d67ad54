//! # Helix Timeshare Scheduler
//!
//! A 4BSD-style timeshare dispatcher: bitmap-indexed run queues, a decaying
//! CPU-usage estimator that derives priority from measured usage and nice,
//! and the per-CPU protocol that picks the next thread to run.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          Scheduler (spin::Mutex)                    │
//! │                                                                     │
//! │   ┌───────────────┐   ┌───────────────┐        ┌───────────────┐    │
//! │   │ Global RunQ   │   │ cpu0 RunQ     │  ...   │ cpuN RunQ     │    │
//! │   │ (floating)    │   │ (bound)       │        │ (bound)       │    │
//! │   └───────┬───────┘   └───────┬───────┘        └───────┬───────┘    │
//! │           └──────────┬────────┴─────────────────────────┘           │
//! │                      ▼                                              │
//! │               next_to_run(cpu): higher priority wins, local on tie  │
//! │                                                                     │
//! │   ┌───────────────┐   ┌───────────────┐   ┌───────────────────┐     │
//! │   │ ThreadTable   │   │ ProcessTable  │   │ LoadAverage       │     │
//! │   │ (arena)       │   │ (nice, fork)  │   │ (decay rate)      │     │
//! │   └───────────────┘   └───────────────┘   └───────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each run queue has two halves:
//!
//! - [`runq::PriorityIndex`]: one FIFO lane per timeshare and kernel level,
//!   with an occupancy bitmap for O(1) highest-lane lookup
//! - [`runq::FixedLane`]: a sorted list for kernel-thread and real-time
//!   priorities
//!
//! ## Priority
//!
//! Timeshare priority falls as the estimate grows:
//!
//! ```text
//!     pri = max(0, 63 - (estcpu >> 11) - (nice + 20))
//! ```
//!
//! The estimate grows while the thread runs ([`Scheduler::schedclock`]) and
//! decays once per second at a rate set by the load average
//! ([`Scheduler::pstats`]). See [`estcpu`] for the arithmetic.
//!
//! ## Example
//!
//! ```rust
//! use helix_timeshare::{SchedConfig, Scheduler, ThreadParams};
//!
//! let sched = Scheduler::new(SchedConfig::new().with_ncpu(2))?;
//! let pid = sched.create_process(0)?;
//! let tid = sched.create_thread(pid, ThreadParams::timeshare())?;
//! sched.setrunnable(tid)?;
//!
//! assert!(sched.has_runnable_work(0));
//! assert_eq!(sched.switch_to_next(0), Some(tid));
//! # Ok::<(), helix_timeshare::SchedError>(())
//! ```
//!
//! ## Invariants
//!
//! 1. A thread is on at most one run queue, keyed by its effective priority.
//! 2. Bitmap bit `p` is set iff lane `p` is non-empty; a queue's count equals
//!    the sum of its lane lengths.
//! 3. Estimates stay within `[0, ESTCPU_MAX]`.
//!
//! [`Scheduler::check_invariants`] verifies all of them.

#![no_std]

// =============================================================================
// EXTERNAL DEPENDENCIES
// =============================================================================

extern crate alloc;

// =============================================================================
// MODULE DECLARATIONS
// =============================================================================

/// Priority layout and tuning constants
pub mod param;

/// Error types
pub mod error;

/// Runtime configuration
pub mod config;

/// Run queues
pub mod runq;

/// CPU-usage estimator
pub mod estcpu;

/// Load average
pub mod loadavg;

/// Thread records
pub mod thread;

/// Process records
pub mod process;

/// Per-CPU state
pub mod cpu;

/// The dispatcher
pub mod sched;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use config::{ConfigProvider, ConfigValue, MemoryConfig, SchedConfig};
pub use cpu::{Resched, RrState, SpcFlags};
pub use error::{ErrorKind, SchedError, SchedResult};
pub use loadavg::LoadAverage;
pub use param::{CpuId, Fixpt, Pri};
pub use process::Pid;
pub use runq::RunQueue;
pub use sched::{ClassParam, CpuSnapshot, SchedSnapshot, Scheduler, ThreadInfo, ThreadParams};
pub use thread::{QueueId, SchedClass, ThreadId, ThreadState};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
