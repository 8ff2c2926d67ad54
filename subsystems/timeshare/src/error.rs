//! # Scheduler Errors
//!
//! Only administrative operations fail. Enqueue, dequeue and dispatch are
//! total over well-formed state; misuse there is caught by debug assertions.
//!
//! | Category | Codes | Example |
//! |----------|-------|---------|
//! | Lookup | 0-99 | Unknown thread, process or CPU |
//! | Argument | 100-199 | Nice out of range |
//! | State | 200-299 | Collecting a thread that has not exited |
//! | Configuration | 300-399 | Zero CPUs |
//! | Internal | 800-899 | Run-queue invariant broken |

use core::fmt;

// =============================================================================
// ERROR KIND
// =============================================================================

/// Classification of scheduler errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorKind {
    // -------------------------------------------------------------------------
    // Lookup Errors (0-99)
    // -------------------------------------------------------------------------
    /// Thread ID does not name a live thread
    NoSuchThread        = 1,

    /// Process ID does not name a live process
    NoSuchProcess       = 2,

    /// CPU index out of range
    NoSuchCpu           = 3,

    // -------------------------------------------------------------------------
    // Argument Errors (100-199)
    // -------------------------------------------------------------------------
    /// Nice value outside `[PRIO_MIN, PRIO_MAX]`
    InvalidNice         = 100,

    /// Priority outside `[0, MAXPRI]` or wrong class
    InvalidPriority     = 101,

    // -------------------------------------------------------------------------
    // State Errors (200-299)
    // -------------------------------------------------------------------------
    /// Thread is in the wrong state for the operation
    InvalidState        = 200,

    // -------------------------------------------------------------------------
    // Configuration Errors (300-399)
    // -------------------------------------------------------------------------
    /// Invalid configuration
    InvalidConfig       = 300,

    // -------------------------------------------------------------------------
    // Internal Errors (800-899)
    // -------------------------------------------------------------------------
    /// Run-queue bookkeeping disagrees with itself
    InvariantViolation  = 800,
}

impl ErrorKind {
    /// Get the error category name
    pub const fn category(&self) -> &'static str {
        match *self as u32 {
            0..=99 => "Lookup",
            100..=199 => "Argument",
            200..=299 => "State",
            300..=399 => "Configuration",
            800..=899 => "Internal",
            _ => "Unknown",
        }
    }

    /// Numeric error code
    pub const fn code(&self) -> u32 {
        *self as u32
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// =============================================================================
// SCHED ERROR
// =============================================================================

/// Scheduler error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedError {
    kind: ErrorKind,
    message: &'static str,
}

impl SchedError {
    /// Create new error with kind and message
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self { kind, message }
    }

    /// Create error from kind with default message
    pub const fn from_kind(kind: ErrorKind) -> Self {
        Self::new(kind, kind_to_message(kind))
    }

    /// Error classification
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human-readable message
    pub const fn message(&self) -> &'static str {
        self.message
    }
}

impl From<ErrorKind> for SchedError {
    fn from(kind: ErrorKind) -> Self {
        Self::from_kind(kind)
    }
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.category(), self.message)
    }
}

const fn kind_to_message(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::NoSuchThread => "no such thread",
        ErrorKind::NoSuchProcess => "no such process",
        ErrorKind::NoSuchCpu => "no such CPU",
        ErrorKind::InvalidNice => "nice value out of range",
        ErrorKind::InvalidPriority => "invalid priority",
        ErrorKind::InvalidState => "thread in wrong state",
        ErrorKind::InvalidConfig => "invalid configuration",
        ErrorKind::InvariantViolation => "run-queue invariant violated",
    }
}

/// Result type for scheduler operations
pub type SchedResult<T> = Result<T, SchedError>;

// =============================================================================
// TESTS
// =============================================================================
