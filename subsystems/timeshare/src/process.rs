//! # Process Records
//!
//! A process groups threads that share a nice value. It also keeps the
//! estimate snapshot taken at fork, read once when the process exits.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::fmt;

use crate::param::Fixpt;
use crate::thread::ThreadId;

/// Process identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process scheduling record
#[derive(Debug, Clone)]
pub struct Process {
    pub pid: Pid,
    pub parent: Option<Pid>,
    /// Nice value, stored offset by `NZERO`
    pub nice: u8,
    /// Member threads; the first is the lead thread
    pub lwps: Vec<ThreadId>,
    /// Parent lead-thread estimate at fork time
    pub estcpu_inherited: Fixpt,
    /// Statistics tick counter at fork time
    pub forktime: u64,
}

impl Process {
    pub fn new(pid: Pid, parent: Option<Pid>, nice: u8) -> Self {
        Self {
            pid,
            parent,
            nice,
            lwps: Vec::new(),
            estcpu_inherited: 0,
            forktime: 0,
        }
    }

    /// Lead thread
    #[inline]
    pub fn lead(&self) -> Option<ThreadId> {
        self.lwps.first().copied()
    }
}

/// Live processes by PID
#[derive(Debug)]
pub struct ProcessTable {
    procs: BTreeMap<Pid, Process>,
    next_pid: u32,
}

impl ProcessTable {
    pub const fn new() -> Self {
        Self {
            procs: BTreeMap::new(),
            next_pid: 1,
        }
    }

    /// Allocate a PID and register a new process
    pub fn create(&mut self, parent: Option<Pid>, nice: u8) -> Pid {
        let pid = Pid(self.next_pid);
        self.next_pid += 1;
        self.procs.insert(pid, Process::new(pid, parent, nice));
        pid
    }

    pub fn get(&self, pid: Pid) -> Option<&Process> {
        self.procs.get(&pid)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Process> {
        self.procs.get_mut(&pid)
    }

    pub fn remove(&mut self, pid: Pid) -> Option<Process> {
        self.procs.remove(&pid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Process> {
        self.procs.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Process> {
        self.procs.values_mut()
    }

    pub fn len(&self) -> usize {
        self.procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}
