use super::launch::SolverProcess;
use crate::problem::{ObjectiveType, ObjectiveValue};
use crate::solver_output::Status;
use std::time::Duration;
use tokio::time::Instant;

pub type SolverId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Ready,
    Converting,
    Solving,
    Suspended,
    Restarting,
    Terminated,
}

/// Whether the solver owns a core or takes turns on the shared one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Dedicated,
    Queued,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationCause {
    Completed(Status),
    /// Exited without reporting a completion status.
    Finished,
    ConversionFailure,
    Crashed(Option<i32>),
    MemoryLimitExceeded,
    RestartsExhausted,
    SlotExpired,
    Cancelled,
}

impl TerminationCause {
    /// Whether a later queue slot of the same solver starts it again.
    pub fn allows_relaunch(&self) -> bool {
        !matches!(
            self,
            Self::MemoryLimitExceeded | Self::ConversionFailure | Self::RestartsExhausted
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotExpiry {
    Suspend,
    Terminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stagnation {
    Healthy,
    Restart,
    Exhausted,
}

#[derive(Debug)]
pub struct RunningSolver {
    pub id: SolverId,
    pub name: String,
    pub placement: Placement,
    pub phase: Phase,
    /// Incremented on every relaunch; messages of older processes are stale.
    pub generation: u64,
    pub restarts_used: u32,
    pub suspensions: u32,
    pub free_search: bool,
    pub start_time: Option<Instant>,
    pub last_solution_time: Option<Instant>,
    pub best_value: Option<ObjectiveValue>,
    /// Bound the current process was launched with.
    pub injected_bound: Option<ObjectiveValue>,
    pub termination: Option<TerminationCause>,
    pub process: Option<SolverProcess>,
}

impl RunningSolver {
    pub fn new(id: SolverId, name: String, placement: Placement, free_search: bool) -> Self {
        Self {
            id,
            name,
            placement,
            phase: Phase::Ready,
            generation: 0,
            restarts_used: 0,
            suspensions: 0,
            free_search,
            start_time: None,
            last_solution_time: None,
            best_value: None,
            injected_bound: None,
            termination: None,
            process: None,
        }
    }

    pub fn is_live(&self) -> bool {
        !matches!(self.phase, Phase::Terminated)
    }

    pub fn start_converting(&mut self) {
        self.phase = Phase::Converting;
    }

    pub fn on_launched(
        &mut self,
        now: Instant,
        process: SolverProcess,
        injected_bound: Option<ObjectiveValue>,
    ) {
        self.phase = Phase::Solving;
        self.start_time = Some(now);
        self.last_solution_time = None;
        if injected_bound.is_some() {
            self.injected_bound = injected_bound;
        }
        self.process = Some(process);
    }

    /// Records a solution. Returns whether it improves the solver's own best.
    pub fn record_solution(
        &mut self,
        now: Instant,
        goal: ObjectiveType,
        objective: Option<ObjectiveValue>,
    ) -> bool {
        self.last_solution_time = Some(now);
        match objective {
            Some(value) if goal.is_better(self.best_value, value) => {
                self.best_value = Some(value);
                true
            }
            Some(_) => false,
            None => true,
        }
    }

    /// Best value the current process is known to improve on.
    fn effective_best(&self, goal: ObjectiveType) -> Option<ObjectiveValue> {
        match (self.best_value, self.injected_bound) {
            (Some(best), Some(injected)) if goal.is_better(Some(best), injected) => Some(injected),
            (Some(best), _) => Some(best),
            (None, injected) => injected,
        }
    }

    /// A solver whose allotted slot runs out keeps its progress if it found a
    /// solution within the last `wait_time`.
    pub fn on_slot_expired(&self, now: Instant, wait_time: Duration) -> SlotExpiry {
        match self.last_solution_time {
            Some(at) if now.saturating_duration_since(at) <= wait_time => SlotExpiry::Suspend,
            _ => SlotExpiry::Terminate,
        }
    }

    pub fn suspend(&mut self) {
        self.phase = Phase::Suspended;
        self.suspensions += 1;
    }

    pub fn resume(&mut self) {
        self.phase = Phase::Solving;
    }

    /// A solving optimization process stagnates when the run's best bound is
    /// strictly better than anything it knows about and it has been quiet
    /// for `restart_time`.
    pub fn check_stagnation(
        &self,
        now: Instant,
        goal: ObjectiveType,
        global_best: Option<ObjectiveValue>,
        restart_time: Duration,
        max_restarts: u32,
    ) -> Stagnation {
        if self.phase != Phase::Solving || !goal.is_optimization() {
            return Stagnation::Healthy;
        }
        let Some(global) = global_best else {
            return Stagnation::Healthy;
        };
        let obsolete = match self.effective_best(goal) {
            Some(own) => goal.is_better(Some(own), global),
            None => true,
        };
        let Some(since) = self.last_solution_time.or(self.start_time) else {
            return Stagnation::Healthy;
        };
        let quiet = now.saturating_duration_since(since) >= restart_time;

        if !(obsolete && quiet) {
            Stagnation::Healthy
        } else if self.restarts_used < max_restarts {
            Stagnation::Restart
        } else {
            Stagnation::Exhausted
        }
    }

    /// Drops the current process and prepares a relaunch.
    pub fn begin_restart(&mut self, switch_search: bool) {
        self.process = None;
        self.phase = Phase::Restarting;
        self.restarts_used += 1;
        self.generation += 1;
        if switch_search {
            self.free_search = !self.free_search;
        }
    }

    /// Moves to `Terminated`, killing the process. The first cause is kept.
    pub fn terminate(&mut self, cause: TerminationCause) {
        self.process = None;
        self.phase = Phase::Terminated;
        if self.termination.is_none() {
            self.termination = Some(cause);
        }
    }
}
