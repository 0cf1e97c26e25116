//! Memory Budget Monitor
//!
//! Reads the scanning process's own resident memory and compares it
//! against the configured budget. Above the pressure threshold the
//! orchestrator asks the cache for an emergency eviction - best-effort
//! and bounded, never blocking a scan.

use parking_lot::Mutex;
use sysinfo::{Pid, System};

use crate::constants::MEMORY_PRESSURE_FRACTION;

// ============================================================================
// MONITOR
// ============================================================================

pub struct MemoryMonitor {
    system: Mutex<System>,
    pid: Option<Pid>,
    budget_bytes: u64,
    pressure_fraction: f64,
}

impl MemoryMonitor {
    pub fn new(budget_bytes: u64) -> Self {
        let pid = sysinfo::get_current_pid().ok();
        if pid.is_none() {
            log::warn!("Cannot resolve own pid - memory pressure checks disabled");
        }
        Self {
            system: Mutex::new(System::new()),
            pid,
            budget_bytes,
            pressure_fraction: MEMORY_PRESSURE_FRACTION,
        }
    }

    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    /// Current resident memory of this process, 0 when unreadable
    pub fn usage_bytes(&self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };
        let mut system = self.system.lock();
        if !system.refresh_process(pid) {
            return 0;
        }
        system.process(pid).map(|p| p.memory()).unwrap_or(0)
    }

    /// True when usage crossed the pressure threshold of the budget
    pub fn over_pressure(&self) -> bool {
        let usage = self.usage_bytes();
        usage as f64 >= self.budget_bytes as f64 * self.pressure_fraction
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_readable() {
        let monitor = MemoryMonitor::new(512 * 1024 * 1024);
        // A running test process always has resident memory
        assert!(monitor.usage_bytes() > 0);
    }

    #[test]
    fn test_generous_budget_not_under_pressure() {
        let monitor = MemoryMonitor::new(u64::MAX);
        assert!(!monitor.over_pressure());
    }

    #[test]
    fn test_tiny_budget_is_under_pressure() {
        let monitor = MemoryMonitor::new(1);
        assert!(monitor.over_pressure());
    }
}
