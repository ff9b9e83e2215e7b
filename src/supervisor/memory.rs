use crate::process_tree::get_process_tree_memory;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

/// Environment variable overriding the memory size, in MiB.
pub const MEMORY_LIMIT_ENV: &str = "MEMORY_LIMIT";

/// Samples the memory of solver process trees against a per-solver limit
/// expressed as a percentage of the available memory.
pub struct MemoryMonitor {
    system: System,
    total_memory: u64,
    limit_percent: f64,
}

impl MemoryMonitor {
    pub fn new(limit_percent: f64) -> Self {
        let mut system = System::new();
        system.refresh_memory();

        let total_memory = std::env::var(MEMORY_LIMIT_ENV)
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .map(|mib| mib * 1024 * 1024)
            .unwrap_or_else(|| system.total_memory());

        Self {
            system,
            total_memory,
            limit_percent,
        }
    }

    pub fn refresh(&mut self) {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
    }

    pub fn limit_bytes(&self) -> u64 {
        limit_from_percent(self.total_memory, self.limit_percent)
    }

    /// Resident memory of `pid` and its descendants, in bytes.
    pub fn usage(&self, pid: u32) -> u64 {
        get_process_tree_memory(&self.system, pid)
    }

    pub fn is_over_limit(&self, pid: u32) -> bool {
        self.usage(pid) > self.limit_bytes()
    }
}

fn limit_from_percent(total: u64, percent: f64) -> u64 {
    (total as f64 * percent.clamp(0.0, 100.0) / 100.0) as u64
}
