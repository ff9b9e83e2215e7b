//! Runs a parallel schedule to completion.
//!
//! One event loop owns every [`RunningSolver`]. Launch tasks stream process
//! events back over a channel, so a slow solver never blocks the others, and
//! all state changes happen in one place.

pub mod launch;
pub mod memory;
pub mod running_solver;

use crate::logging;
use crate::mzn_to_fzn::cached_compiler::CachedCompiler;
use crate::problem::{ObjectiveType, ObjectiveValue, Problem};
use crate::process_tree::{KILL_GRACE_PERIOD, force_kill};
use crate::run_context::{Proof, RunContext, Winner};
use crate::schedule::{ParallelSchedule, Slot};
use crate::signal_handler::SignalEvent;
use crate::solver_config::Solvers;
use crate::solver_output::dzn::{
    DONE_TERMINATOR, SOLUTION_TERMINATOR, UNBOUNDED_TERMINATOR, UNKNOWN_TERMINATOR,
    UNSATISFIABLE_TERMINATOR,
};
use crate::solver_output::{Event, Solution, Status};
use launch::{LaunchRequest, SolverProcess, spawn_solver};
use memory::MemoryMonitor;
use running_solver::{
    Phase, Placement, RunningSolver, SlotExpiry, SolverId, Stagnation, TerminationCause,
};
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, sleep, sleep_until};

/// Shortest slot worth starting a solver for.
const MIN_SLOT: Duration = Duration::from_millis(10);

/// How long killed process groups get to be reaped before the run returns.
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub timeout: Duration,
    pub wait_time: Duration,
    pub restart_time: Duration,
    pub max_restarts: u32,
    /// Per-solver memory limit, in percent of the available memory.
    pub mem_limit: f64,
    pub monitor_interval: Duration,
    pub all_solutions: bool,
    pub free_search: bool,
    pub switch_search: bool,
}

/// Failures scoped to a single solver. They are logged and never end the run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to convert the model for solver '{0}': {1}")]
    ConversionFailure(String, String),
    #[error("solver '{0}' crashed with exit code {1:?}")]
    SolverCrash(String, Option<i32>),
    #[error("solver '{name}' uses {usage} bytes of memory, above the limit of {limit} bytes")]
    MemoryLimitExceeded { name: String, usage: u64, limit: u64 },
    #[error("solver '{0}' stagnated after {1} restarts")]
    StagnationRestartExhausted(String, u32),
    #[error("failed to launch solver '{0}': {1}")]
    Launch(String, String),
    #[error("piping failed for process: {0}")]
    Pipe(String),
    #[error("failed to signal solver '{0}'")]
    Signal(String, #[source] nix::Error),
    #[error("IO error")]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
pub enum Msg {
    Launched {
        id: SolverId,
        generation: u64,
        process: SolverProcess,
        injected: Option<ObjectiveValue>,
    },
    LaunchFailed {
        id: SolverId,
        generation: u64,
    },
    Output {
        id: SolverId,
        generation: u64,
        event: Event,
    },
    Exited {
        id: SolverId,
        generation: u64,
        success: bool,
        code: Option<i32>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Proved(Winner),
    /// The overall timeout expired.
    Deadline,
    /// Every solver ended without a proof.
    Exhausted,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverReport {
    pub name: String,
    pub phase: Phase,
    pub best_value: Option<ObjectiveValue>,
    pub restarts_used: u32,
    pub suspensions: u32,
    pub termination: Option<TerminationCause>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: Outcome,
    pub best_bound: Option<ObjectiveValue>,
    /// Solutions written to stdout.
    pub solutions: usize,
    pub solvers: Vec<SolverReport>,
}

pub struct Supervisor {
    config: SupervisorConfig,
    goal: ObjectiveType,
    tracking_var: String,
    solvers: Arc<Solvers>,
    compiler: Arc<CachedCompiler>,
    ctx: Arc<RunContext>,
    signals: Option<mpsc::UnboundedReceiver<SignalEvent>>,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        problem: &Problem,
        solvers: Arc<Solvers>,
        ctx: Arc<RunContext>,
    ) -> Self {
        Self {
            config,
            goal: problem.goal,
            tracking_var: problem.tracking_var.clone(),
            solvers,
            compiler: Arc::new(CachedCompiler::new(
                problem.model.clone(),
                problem.data.clone(),
            )),
            ctx,
            signals: None,
        }
    }

    pub fn with_signals(mut self, signals: mpsc::UnboundedReceiver<SignalEvent>) -> Self {
        self.signals = Some(signals);
        self
    }

    pub async fn run(self, schedule: ParallelSchedule) -> RunReport {
        let Supervisor {
            config,
            goal,
            tracking_var,
            solvers,
            compiler,
            ctx,
            mut signals,
        } = self;
        let (tx, mut rx) = mpsc::unbounded_channel::<Msg>();
        let start = Instant::now();
        let deadline = start + config.timeout;

        let mut monitor = tokio::time::interval(config.monitor_interval);
        monitor.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut run = Run {
            memory: MemoryMonitor::new(config.mem_limit),
            config,
            goal,
            tracking_var,
            table: solvers,
            compiler,
            ctx: ctx.clone(),
            tx,
            deadline,
            solvers: Vec::new(),
            running: HashMap::new(),
            queue: VecDeque::new(),
            current: None,
            carry: Duration::ZERO,
            suspended: VecDeque::new(),
            last_printed: None,
            solutions: 0,
            aborted: false,
            externally_paused: false,
        };
        logging::info!("running schedule {schedule}");
        run.start(schedule, start);

        let overall = sleep_until(deadline);
        tokio::pin!(overall);

        while !run.is_exhausted() {
            let slot_deadline = run.current.as_ref().map(|current| current.deadline);
            tokio::select! {
                // The overall deadline takes precedence over a slot ending at the same time.
                biased;
                _ = ctx.token().cancelled() => break,
                _ = &mut overall => break,
                msg = rx.recv() => {
                    if let Some(msg) = msg {
                        run.handle_msg(msg);
                    }
                }
                _ = sleep_until_opt(slot_deadline) => run.on_slot_expired(Instant::now()),
                _ = monitor.tick() => run.monitor(Instant::now()),
                Some(event) = next_signal(&mut signals) => run.on_signal(event),
            }
        }

        run.shutdown(&mut rx).await
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => futures::future::pending().await,
    }
}

async fn next_signal(
    signals: &mut Option<mpsc::UnboundedReceiver<SignalEvent>>,
) -> Option<SignalEvent> {
    match signals {
        Some(rx) => rx.recv().await,
        None => futures::future::pending().await,
    }
}

/// Slot of the shared core currently being served.
#[derive(Debug, Clone, Copy)]
struct CurrentSlot {
    id: SolverId,
    deadline: Instant,
}

struct Run {
    config: SupervisorConfig,
    goal: ObjectiveType,
    tracking_var: String,
    table: Arc<Solvers>,
    compiler: Arc<CachedCompiler>,
    ctx: Arc<RunContext>,
    tx: mpsc::UnboundedSender<Msg>,
    deadline: Instant,
    solvers: Vec<RunningSolver>,
    /// Process groups launched and not yet reaped, by solver generation.
    running: HashMap<(SolverId, u64), u32>,
    queue: VecDeque<Slot>,
    current: Option<CurrentSlot>,
    /// Unused time of slots that ended early, handed to the next slot.
    carry: Duration,
    /// Suspended queue solvers, in suspension order.
    suspended: VecDeque<SolverId>,
    memory: MemoryMonitor,
    last_printed: Option<ObjectiveValue>,
    solutions: usize,
    aborted: bool,
    externally_paused: bool,
}

impl Run {
    fn start(&mut self, schedule: ParallelSchedule, now: Instant) {
        for name in schedule.dedicated {
            let id = self.add_solver(name, Placement::Dedicated);
            self.launch(id, now);
        }
        self.queue = schedule.shared.into();
        self.advance_queue(now);
    }

    fn add_solver(&mut self, name: String, placement: Placement) -> SolverId {
        let id = self.solvers.len();
        self.solvers.push(RunningSolver::new(
            id,
            name,
            placement,
            self.config.free_search,
        ));
        id
    }

    fn launch(&mut self, id: SolverId, now: Instant) {
        let solver = &mut self.solvers[id];
        let Some(config) = self.table.get_by_id(&solver.name) else {
            logging::error_msg!("solver '{}' is not in the solver table", solver.name);
            solver.terminate(TerminationCause::ConversionFailure);
            return;
        };
        if solver.phase == Phase::Ready {
            solver.start_converting();
        }

        let remaining = self.deadline.saturating_duration_since(now);
        let request = LaunchRequest {
            id,
            generation: solver.generation,
            solver: config.clone(),
            goal: self.goal,
            tracking_var: self.tracking_var.clone(),
            bound: self.ctx.best_bound(),
            all_solutions: self.config.all_solutions,
            free_search: solver.free_search,
            timeout_secs: remaining.as_secs_f64().ceil() as u64,
        };
        spawn_solver(
            request,
            self.compiler.clone(),
            self.tx.clone(),
            self.ctx.token().clone(),
        );
    }

    fn is_exhausted(&self) -> bool {
        self.current.is_none()
            && self.queue.is_empty()
            && self.solvers.iter().all(|solver| !solver.is_live())
    }

    fn next_slot(&mut self, now: Instant) -> Option<Slot> {
        if let Some(slot) = self.queue.pop_front() {
            return Some(slot);
        }

        let solvers = &self.solvers;
        self.suspended
            .retain(|&id| solvers[id].phase == Phase::Suspended);
        let remaining = self.deadline.saturating_duration_since(now);
        if self.suspended.is_empty() || remaining < MIN_SLOT {
            return None;
        }

        let share = remaining.as_secs_f64() / self.suspended.len() as f64;
        for &id in &self.suspended {
            self.queue
                .push_back(Slot::new(self.solvers[id].name.clone(), share));
        }
        self.queue.pop_front()
    }

    fn advance_queue(&mut self, now: Instant) {
        self.current = None;
        if self.ctx.is_cancelled() {
            return;
        }

        while let Some(slot) = self.next_slot(now) {
            if slot.seconds.is_nan() || slot.seconds <= 0.0 {
                logging::info!("solver '{}' has no time allocated", slot.solver);
                continue;
            }
            let remaining = self.deadline.saturating_duration_since(now);
            if remaining < MIN_SLOT {
                return;
            }
            let allotted = Duration::try_from_secs_f64(slot.seconds)
                .unwrap_or(remaining)
                .saturating_add(std::mem::take(&mut self.carry));
            let deadline = now + allotted.min(remaining);

            let existing = self
                .solvers
                .iter()
                .rposition(|s| s.placement == Placement::Queued && s.name == slot.solver);
            let id = match existing {
                Some(id) if self.solvers[id].is_live() => {
                    if self.solvers[id].phase == Phase::Suspended {
                        self.resume_suspended(id);
                    }
                    id
                }
                Some(id)
                    if !self.solvers[id]
                        .termination
                        .as_ref()
                        .is_some_and(TerminationCause::allows_relaunch) =>
                {
                    logging::info!("skipping slot of terminated solver '{}'", slot.solver);
                    self.carry += allotted;
                    continue;
                }
                _ => {
                    let id = self.add_solver(slot.solver, Placement::Queued);
                    self.launch(id, now);
                    if !self.solvers[id].is_live() {
                        self.carry += allotted;
                        continue;
                    }
                    id
                }
            };
            self.current = Some(CurrentSlot { id, deadline });
            return;
        }
    }

    fn resume_suspended(&mut self, id: SolverId) {
        let solver = &mut self.solvers[id];
        if let Some(process) = &solver.process
            && let Err(e) = process.resume()
        {
            logging::error!(Error::Signal(solver.name.clone(), e).into());
        }
        solver.resume();
        self.suspended.retain(|&other| other != id);
        logging::info!("resumed solver '{}'", solver.name);
    }

    /// Ends `id`, handing the rest of its slot to the next one.
    fn terminate(&mut self, id: SolverId, cause: TerminationCause, now: Instant) {
        self.solvers[id].terminate(cause);
        if let Some(current) = self.current
            && current.id == id
        {
            self.carry += current.deadline.saturating_duration_since(now);
            self.advance_queue(now);
        }
    }

    fn on_slot_expired(&mut self, now: Instant) {
        let Some(CurrentSlot { id, .. }) = self.current.take() else {
            return;
        };
        let wait_time = self.config.wait_time;
        let solver = &mut self.solvers[id];

        let expiry = match solver.phase {
            Phase::Solving => solver.on_slot_expired(now, wait_time),
            _ => SlotExpiry::Terminate,
        };
        match expiry {
            SlotExpiry::Suspend => {
                if let Some(process) = &solver.process
                    && let Err(e) = process.suspend()
                {
                    logging::error!(Error::Signal(solver.name.clone(), e).into());
                }
                solver.suspend();
                self.suspended.push_back(id);
                logging::info!("suspended solver '{}'", solver.name);
            }
            SlotExpiry::Terminate => {
                logging::info!("slot of solver '{}' expired", solver.name);
                solver.terminate(TerminationCause::SlotExpired);
            }
        }
        self.advance_queue(now);
    }

    fn handle_msg(&mut self, msg: Msg) {
        let now = Instant::now();
        match msg {
            Msg::Launched {
                id,
                generation,
                process,
                injected,
            } => {
                self.running.insert((id, generation), process.pid());
                let solver = &mut self.solvers[id];
                let expected = matches!(solver.phase, Phase::Converting | Phase::Restarting);
                if solver.generation != generation || !expected {
                    // Dropping the process kills it.
                    return;
                }
                if self.externally_paused
                    && let Err(e) = process.suspend()
                {
                    logging::error!(Error::Signal(solver.name.clone(), e).into());
                }
                solver.on_launched(now, process, injected);
            }
            Msg::LaunchFailed { id, generation } => {
                let solver = &self.solvers[id];
                if solver.generation == generation && solver.is_live() {
                    self.terminate(id, TerminationCause::ConversionFailure, now);
                }
            }
            Msg::Output {
                id,
                generation,
                event,
            } => {
                let solver = &self.solvers[id];
                if solver.generation == generation && solver.is_live() {
                    self.handle_event(id, event, now);
                }
            }
            Msg::Exited {
                id,
                generation,
                success,
                code,
            } => {
                self.running.remove(&(id, generation));
                let solver = &self.solvers[id];
                if solver.generation != generation
                    || !matches!(solver.phase, Phase::Solving | Phase::Suspended)
                {
                    return;
                }
                let cause = if success {
                    logging::info!("solver '{}' finished", solver.name);
                    TerminationCause::Finished
                } else {
                    logging::error!(Error::SolverCrash(solver.name.clone(), code).into());
                    TerminationCause::Crashed(code)
                };
                self.terminate(id, cause, now);
            }
        }
    }

    fn handle_event(&mut self, id: SolverId, event: Event, now: Instant) {
        match event {
            Event::BoundUpdate(value) => {
                if self.ctx.offer_bound(value) {
                    logging::info!(
                        "new best bound {value} from solver '{}'",
                        self.solvers[id].name
                    );
                }
            }
            Event::NewSolution(solution) => self.on_solution(id, solution, now),
            Event::Completed(status) => self.on_completed(id, status, now),
        }
    }

    fn on_solution(&mut self, id: SolverId, solution: Solution, now: Instant) {
        let solver = &mut self.solvers[id];
        solver.record_solution(now, self.goal, solution.objective);

        match (self.goal, solution.objective) {
            (ObjectiveType::Satisfy, _) => {
                if self.config.all_solutions {
                    self.print_solution(&solution);
                } else if self.ctx.declare_winner(&solver.name, Proof::Satisfied) {
                    let name = solver.name.clone();
                    self.print_solution(&solution);
                    self.terminate(id, TerminationCause::Finished, now);
                    logging::info!("solver '{name}' found a solution");
                }
            }
            (_, Some(value)) => {
                if self.ctx.best_bound() == Some(value) && self.last_printed != Some(value) {
                    self.last_printed = Some(value);
                    self.print_solution(&solution);
                }
            }
            (_, None) => {
                logging::warning!(
                    "solver '{}' reported a solution without objective value",
                    solver.name
                );
                if self.solutions == 0 {
                    self.print_solution(&solution);
                }
            }
        }
    }

    fn on_completed(&mut self, id: SolverId, status: Status, now: Instant) {
        let solver = &self.solvers[id];
        let proof = match (self.goal, status) {
            (_, Status::Unknown) => None,
            (_, Status::Unbounded) => Some(Proof::Unbounded),
            (_, Status::OptimalSolution) => Some(Proof::Optimal),
            (ObjectiveType::Satisfy, Status::Unsatisfiable) => Some(Proof::Unsatisfiable),
            // No solution beats the injected bound, so the best one is optimal.
            (_, Status::Unsatisfiable) if solver.injected_bound.is_some() => Some(Proof::Optimal),
            (_, Status::Unsatisfiable) if self.ctx.best_bound().is_none() => {
                Some(Proof::Unsatisfiable)
            }
            (_, Status::Unsatisfiable) => {
                logging::warning!(
                    "solver '{}' reports unsatisfiable but a solution is known",
                    solver.name
                );
                None
            }
        };

        if let Some(proof) = proof
            && self.ctx.declare_winner(&solver.name, proof)
        {
            logging::info!("solver '{}' proved {proof:?}", solver.name);
            print_line(match proof {
                Proof::Satisfied | Proof::Optimal => DONE_TERMINATOR,
                Proof::Unsatisfiable => UNSATISFIABLE_TERMINATOR,
                Proof::Unbounded => UNBOUNDED_TERMINATOR,
            });
        }
        self.terminate(id, TerminationCause::Completed(status), now);
    }

    fn monitor(&mut self, now: Instant) {
        self.memory.refresh();
        let limit = self.memory.limit_bytes();
        let over_limit: Vec<(SolverId, u64)> = self
            .solvers
            .iter()
            .filter(|solver| solver.is_live())
            .filter_map(|solver| {
                let usage = self.memory.usage(solver.process.as_ref()?.pid());
                (usage > limit).then_some((solver.id, usage))
            })
            .collect();
        for (id, usage) in over_limit {
            logging::error!(
                Error::MemoryLimitExceeded {
                    name: self.solvers[id].name.clone(),
                    usage,
                    limit,
                }
                .into()
            );
            self.terminate(id, TerminationCause::MemoryLimitExceeded, now);
        }

        if !self.goal.is_optimization() {
            return;
        }
        let best = self.ctx.best_bound();
        for id in 0..self.solvers.len() {
            let stagnation = self.solvers[id].check_stagnation(
                now,
                self.goal,
                best,
                self.config.restart_time,
                self.config.max_restarts,
            );
            match stagnation {
                Stagnation::Healthy => {}
                Stagnation::Restart => self.restart(id, now),
                Stagnation::Exhausted => {
                    let solver = &self.solvers[id];
                    logging::warning!(
                        "{}",
                        Error::StagnationRestartExhausted(solver.name.clone(), solver.restarts_used)
                    );
                    self.terminate(id, TerminationCause::RestartsExhausted, now);
                }
            }
        }
    }

    fn restart(&mut self, id: SolverId, now: Instant) {
        let solver = &mut self.solvers[id];
        solver.begin_restart(self.config.switch_search);
        logging::info!(
            "restarting solver '{}' ({}/{}) with bound {:?}",
            solver.name,
            solver.restarts_used,
            self.config.max_restarts,
            self.ctx.best_bound()
        );
        self.launch(id, now);
    }

    fn on_signal(&mut self, event: SignalEvent) {
        match event {
            SignalEvent::Abort => {
                logging::warning!("run aborted by signal");
                self.aborted = true;
                self.ctx.cancel();
            }
            SignalEvent::Suspend | SignalEvent::Resume => {
                self.externally_paused = event == SignalEvent::Suspend;
                for solver in &self.solvers {
                    let Some(process) = &solver.process else {
                        continue;
                    };
                    if solver.phase != Phase::Solving {
                        continue;
                    }
                    let result = match event {
                        SignalEvent::Suspend => process.suspend(),
                        _ => process.resume(),
                    };
                    if let Err(e) = result {
                        logging::error!(Error::Signal(solver.name.clone(), e).into());
                    }
                }
            }
        }
    }

    fn print_solution(&mut self, solution: &Solution) {
        self.solutions += 1;
        let mut stdout = std::io::stdout().lock();
        let assignment = solution.assignment.trim_end();
        if !assignment.is_empty() {
            let _ = writeln!(stdout, "{assignment}");
        }
        let _ = writeln!(stdout, "{SOLUTION_TERMINATOR}");
        let _ = stdout.flush();
    }

    /// Collects exits until every launched group is reaped or `within` passes.
    async fn reap(&mut self, rx: &mut mpsc::UnboundedReceiver<Msg>, within: Duration) {
        let timeout = sleep(within);
        tokio::pin!(timeout);
        while !self.running.is_empty() {
            tokio::select! {
                _ = &mut timeout => return,
                msg = rx.recv() => match msg {
                    // Late launches are dropped, which terminates them.
                    Some(Msg::Launched { id, generation, process, .. }) => {
                        self.running.insert((id, generation), process.pid());
                    }
                    Some(Msg::Exited { id, generation, .. }) => {
                        self.running.remove(&(id, generation));
                    }
                    Some(_) => {}
                    None => return,
                },
            }
        }
    }

    /// Ends every solver and waits until their process groups are reaped.
    /// Groups still alive after the grace period are killed.
    async fn shutdown(mut self, rx: &mut mpsc::UnboundedReceiver<Msg>) -> RunReport {
        let now = Instant::now();
        let outcome = match self.ctx.winner() {
            Some(winner) => Outcome::Proved(winner),
            None if self.aborted || self.ctx.is_cancelled() => Outcome::Aborted,
            None if now >= self.deadline => Outcome::Deadline,
            None => Outcome::Exhausted,
        };
        self.ctx.cancel();

        for solver in &mut self.solvers {
            if solver.is_live() {
                solver.terminate(TerminationCause::Cancelled);
            }
        }
        self.reap(rx, KILL_GRACE_PERIOD).await;
        for (&(id, _), &pid) in &self.running {
            logging::warning!(
                "killing solver '{}' (pid {pid}) after the grace period",
                self.solvers[id].name
            );
            if let Err(e) = force_kill(pid) {
                logging::error!(Error::Signal(self.solvers[id].name.clone(), e).into());
            }
        }
        self.reap(rx, REAP_TIMEOUT).await;
        if !self.running.is_empty() {
            logging::warning!("{} solver processes were not reaped", self.running.len());
        }
        if self.solutions == 0 && !matches!(outcome, Outcome::Proved(_)) {
            print_line(UNKNOWN_TERMINATOR);
        }
        logging::info!("run ended: {outcome:?}");

        RunReport {
            outcome,
            best_bound: self.ctx.best_bound(),
            solutions: self.solutions,
            solvers: self
                .solvers
                .iter()
                .map(|solver| SolverReport {
                    name: solver.name.clone(),
                    phase: solver.phase,
                    best_value: solver.best_value,
                    restarts_used: solver.restarts_used,
                    suspensions: solver.suspensions,
                    termination: solver.termination.clone(),
                })
                .collect(),
        }
    }
}

fn print_line(line: &str) {
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "{line}");
    let _ = stdout.flush();
}
