use crate::args::Args;
use crate::supervisor::SupervisorConfig;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub timeout: f64,
    pub kb_timeout: Option<f64>,
    pub check_kb: bool,
    pub neighbors: Option<usize>,
    pub cores: usize,
    pub min_size: usize,
    pub wait_time: f64,
    pub restart_time: f64,
    pub max_restarts: u32,
    pub mem_limit: f64,
    pub monitor_interval: u64,
    pub all_solutions: bool,
    pub free_search: bool,
    pub switch_search: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: 1800.0,
            kb_timeout: None,
            check_kb: true,
            neighbors: None,
            cores: available_cores(),
            min_size: 1,
            wait_time: 2.0,
            restart_time: 5.0,
            max_restarts: 10,
            mem_limit: 80.0,
            monitor_interval: 1,
            all_solutions: false,
            free_search: false,
            switch_search: false,
        }
    }
}

impl Config {
    pub fn new(args: &Args) -> Self {
        let defaults = Self::default();
        Self {
            timeout: args.timeout.unwrap_or(defaults.timeout),
            kb_timeout: args.kb_timeout,
            check_kb: !args.no_kb_check,
            neighbors: args.neighbors,
            cores: args.cores.unwrap_or(defaults.cores).max(1),
            min_size: args.min_size.unwrap_or(defaults.min_size),
            wait_time: args.wait_time.unwrap_or(defaults.wait_time),
            restart_time: args.restart_time.unwrap_or(defaults.restart_time),
            max_restarts: args.max_restarts.unwrap_or(defaults.max_restarts),
            mem_limit: args.mem_limit.unwrap_or(defaults.mem_limit),
            monitor_interval: defaults.monitor_interval,
            all_solutions: args.all_solutions,
            free_search: args.free_search,
            switch_search: args.switch_search,
        }
    }

    /// Timeout the knowledge base rows are checked against.
    pub fn kb_timeout(&self) -> f64 {
        self.kb_timeout.unwrap_or(self.timeout)
    }

    pub fn supervisor(&self) -> SupervisorConfig {
        SupervisorConfig {
            timeout: Duration::from_secs_f64(self.timeout.max(0.0)),
            wait_time: Duration::from_secs_f64(self.wait_time.max(0.0)),
            restart_time: Duration::from_secs_f64(self.restart_time.max(0.0)),
            max_restarts: self.max_restarts,
            mem_limit: self.mem_limit,
            monitor_interval: Duration::from_secs(self.monitor_interval.max(1)),
            all_solutions: self.all_solutions,
            free_search: self.free_search,
            switch_search: self.switch_search,
        }
    }
}

fn available_cores() -> usize {
    core_affinity::get_core_ids()
        .map(|ids| ids.len())
        .filter(|n| *n > 0)
        .unwrap_or(1)
}
