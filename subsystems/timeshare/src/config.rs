//! # Scheduler Configuration
//!
//! Runtime knobs for the dispatcher. Compile-time tuning constants live in
//! [`crate::param`].
//!
//! Configuration can be built directly or read from any [`ConfigProvider`]:
//!
//! | Key | Type | Default |
//! |-----|------|---------|
//! | `sched.ncpu` | uint | 1 |
//! | `sched.hz` | uint | [`HZ`] |
//! | `sched.rr_ticks` | uint | `hz / 10` |

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};

use crate::error::{ErrorKind, SchedError, SchedResult};
use crate::param::{HZ, MAX_CPUS};

// =============================================================================
// CONFIG VALUES
// =============================================================================

/// A configuration value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    Int(i64),
    Uint(u64),
    String(String),
}

impl ConfigValue {
    /// Get as uint (non-negative ints convert)
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            ConfigValue::Uint(u) => Some(*u),
            ConfigValue::Int(i) if *i >= 0 => Some(*i as u64),
            _ => None,
        }
    }
}

/// Configuration provider trait
pub trait ConfigProvider: Send + Sync {
    /// Get a configuration value
    fn get(&self, key: &str) -> Option<ConfigValue>;

    /// Get uint with default
    fn get_uint(&self, key: &str, default: u64) -> u64 {
        self.get(key).and_then(|v| v.as_uint()).unwrap_or(default)
    }
}

/// Simple in-memory config provider
#[derive(Debug, Default)]
pub struct MemoryConfig {
    values: BTreeMap<String, ConfigValue>,
}

impl MemoryConfig {
    /// Create empty config
    pub fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Set a value
    pub fn set(&mut self, key: impl Into<String>, value: ConfigValue) {
        self.values.insert(key.into(), value);
    }

    /// Set uint
    pub fn set_uint(&mut self, key: impl Into<String>, value: u64) {
        self.set(key, ConfigValue::Uint(value));
    }

    /// Set string
    pub fn set_string(&mut self, key: &str, value: &str) {
        self.set(key.to_string(), ConfigValue::String(value.to_string()));
    }
}

impl ConfigProvider for MemoryConfig {
    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.values.get(key).cloned()
    }
}

// =============================================================================
// SCHED CONFIG
// =============================================================================

/// Dispatcher configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedConfig {
    /// Number of CPUs (one per-CPU run queue each)
    pub ncpu: usize,
    /// Clock interrupts per second
    pub hz: u32,
    /// Clock ticks per round-robin interval
    pub rr_ticks: u32,
}

impl SchedConfig {
    /// Single CPU, default clock
    pub const fn new() -> Self {
        Self {
            ncpu: 1,
            hz: HZ,
            rr_ticks: HZ / 10,
        }
    }

    /// Set CPU count
    pub const fn with_ncpu(mut self, ncpu: usize) -> Self {
        self.ncpu = ncpu;
        self
    }

    /// Set clock frequency; round-robin interval follows at `hz / 10`
    pub const fn with_hz(mut self, hz: u32) -> Self {
        self.hz = hz;
        self.rr_ticks = hz / 10;
        self
    }

    /// Set round-robin interval in clock ticks
    pub const fn with_rr_ticks(mut self, rr_ticks: u32) -> Self {
        self.rr_ticks = rr_ticks;
        self
    }

    /// Read configuration from a provider
    pub fn from_provider(provider: &dyn ConfigProvider) -> SchedResult<Self> {
        let hz = provider.get_uint("sched.hz", u64::from(HZ));
        let hz = u32::try_from(hz)
            .map_err(|_| SchedError::new(ErrorKind::InvalidConfig, "sched.hz out of range"))?;
        let rr_ticks = provider.get_uint("sched.rr_ticks", u64::from(hz / 10));
        let rr_ticks = u32::try_from(rr_ticks).map_err(|_| {
            SchedError::new(ErrorKind::InvalidConfig, "sched.rr_ticks out of range")
        })?;
        let ncpu = provider.get_uint("sched.ncpu", 1) as usize;

        let config = Self { ncpu, hz, rr_ticks };
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for consistency
    pub fn validate(&self) -> SchedResult<()> {
        if self.ncpu == 0 {
            return Err(SchedError::new(ErrorKind::InvalidConfig, "ncpu must be non-zero"));
        }
        if self.ncpu > MAX_CPUS {
            return Err(SchedError::new(ErrorKind::InvalidConfig, "ncpu exceeds MAX_CPUS"));
        }
        if self.hz == 0 {
            return Err(SchedError::new(ErrorKind::InvalidConfig, "hz must be non-zero"));
        }
        if self.rr_ticks == 0 {
            return Err(SchedError::new(ErrorKind::InvalidConfig, "rr_ticks must be non-zero"));
        }
        Ok(())
    }
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================
