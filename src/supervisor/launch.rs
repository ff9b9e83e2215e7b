//! Spawning one solver process and streaming its events to the supervisor.

use super::{Error, Msg, running_solver::SolverId};
use crate::insert_objective::insert_objective;
use crate::is_cancelled::IsErrorCancelled;
use crate::logging;
use crate::mzn_to_fzn::Conversion;
use crate::mzn_to_fzn::cached_compiler::CachedCompiler;
use crate::problem::{ObjectiveType, ObjectiveValue};
use crate::process_tree::{recursive_force_kill, send_signals_to_process_tree};
use crate::solver_config::{Placeholders, Solver, expand};
use crate::solver_output::{self, OutputAdapter};
use async_tempfile::TempFile;
use nix::sys::signal::Signal;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cores handed to each solver through the `{cores}` placeholder.
const SOLVER_CORES: usize = 1;

/// A live solver process group. Dropping it terminates the whole group.
pub struct SolverProcess {
    pid: u32,
    _fzn_guard: Option<TempFile>,
    _conversion: Arc<Conversion>,
}

impl SolverProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn suspend(&self) -> nix::Result<()> {
        send_signals_to_process_tree(self.pid, vec![Signal::SIGSTOP])
    }

    pub fn resume(&self) -> nix::Result<()> {
        send_signals_to_process_tree(self.pid, vec![Signal::SIGCONT])
    }
}

impl std::fmt::Debug for SolverProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolverProcess")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl Drop for SolverProcess {
    fn drop(&mut self) {
        let _ = send_signals_to_process_tree(self.pid, vec![Signal::SIGTERM, Signal::SIGCONT]);
        let pid_clone = self.pid;

        std::thread::spawn(move || {
            let _ = recursive_force_kill(pid_clone);
        });
    }
}

/// Everything needed to bring up one generation of a solver.
pub struct LaunchRequest {
    pub id: SolverId,
    pub generation: u64,
    pub solver: Solver,
    pub goal: ObjectiveType,
    pub tracking_var: String,
    /// Best bound known when the launch was requested.
    pub bound: Option<ObjectiveValue>,
    pub all_solutions: bool,
    pub free_search: bool,
    pub timeout_secs: u64,
}

struct PipeCommand {
    left: Child,
    right: Child,
    pipe: JoinHandle<std::io::Result<u64>>,
}

pub fn spawn_solver(
    request: LaunchRequest,
    compiler: Arc<CachedCompiler>,
    tx: mpsc::UnboundedSender<Msg>,
    token: CancellationToken,
) {
    tokio::spawn(async move {
        let LaunchRequest { id, generation, .. } = request;
        let name = request.solver.name.clone();
        if let Err(error) = launch_and_stream(request, compiler, &tx, token).await {
            logging::error!(anyhow::Error::from(error).context(format!("solver '{name}'")));
            let _ = tx.send(Msg::LaunchFailed { id, generation });
        }
    });
}

async fn launch_and_stream(
    request: LaunchRequest,
    compiler: Arc<CachedCompiler>,
    tx: &mpsc::UnboundedSender<Msg>,
    token: CancellationToken,
) -> Result<(), Error> {
    let LaunchRequest {
        id,
        generation,
        solver,
        goal,
        tracking_var,
        bound,
        all_solutions,
        free_search,
        timeout_secs,
    } = request;

    let conversion = compiler.compile(&solver, token.clone()).await;
    if conversion.is_error_cancelled() {
        return Ok(());
    }
    let conversion =
        conversion.map_err(|e| Error::ConversionFailure(solver.name.clone(), e.to_string()))?;

    let (fzn_guard, injected) = match bound.filter(|_| goal.is_optimization()) {
        Some(bound) => match insert_objective(&solver, conversion.fzn(), goal, bound).await {
            Ok(file) => (Some(file), Some(bound)),
            Err(e) => {
                logging::warning!("running '{}' without bound {bound}: {e}", solver.name);
                (None, None)
            }
        },
        None => (None, None),
    };
    let fzn_path = fzn_guard
        .as_ref()
        .map_or_else(|| conversion.fzn().to_path_buf(), |f| f.file_path().to_path_buf());

    let values = Placeholders {
        fzn: Some(&fzn_path),
        ozn: Some(conversion.ozn()),
        cores: Some(SOLVER_CORES),
        timeout: Some(timeout_secs),
        all: (all_solutions || goal.is_optimization()).then_some(solver.all_solutions_flag.as_str()),
        free: free_search.then_some(solver.free_search_flag.as_str()),
        ..Default::default()
    };
    let run_cmd = command(&solver, &expand(&solver.run, &values))?;
    let output_cmd = solver
        .output
        .as_ref()
        .map(|template| command(&solver, &expand(template, &values)))
        .transpose()?;

    if token.is_cancelled() {
        return Ok(());
    }

    let (mut solver_child, output_child, pipe) = match output_cmd {
        Some(output_cmd) => {
            let PipeCommand { left, right, pipe } = self::pipe(run_cmd, output_cmd)?;
            (left, Some(right), Some(pipe))
        }
        None => {
            let mut run_cmd = run_cmd;
            (run_cmd.stdout(Stdio::piped()).spawn()?, None, None)
        }
    };
    let pid = solver_child
        .id()
        .ok_or_else(|| Error::Launch(solver.name.clone(), "process has no pid".to_owned()))?;

    let stdout = match output_child {
        Some(mut child) => {
            let stdout = child.stdout.take();
            if let Some(stderr) = child.stderr.take() {
                tokio::spawn(handle_solver_stderr(solver.name.clone(), stderr));
            }
            tokio::spawn(async move {
                let _ = child.wait().await;
            });
            stdout
        }
        None => solver_child.stdout.take(),
    }
    .ok_or_else(|| Error::Launch(solver.name.clone(), "could not capture stdout".to_owned()))?;

    if let Some(stderr) = solver_child.stderr.take() {
        tokio::spawn(handle_solver_stderr(solver.name.clone(), stderr));
    }

    let process = SolverProcess {
        pid,
        _fzn_guard: fzn_guard,
        _conversion: conversion,
    };
    if tx
        .send(Msg::Launched {
            id,
            generation,
            process,
            injected,
        })
        .is_err()
    {
        return Ok(());
    }
    logging::info!("solver '{}' is running with pid {pid}", solver.name);

    let mut parser = solver_output::Parser::new(&tracking_var);
    stream_events(stdout, &mut parser, id, generation, tx).await;

    if let Some(pipe) = pipe
        && let Err(e) = pipe.await
    {
        logging::error!(anyhow::Error::from(e).context("failed to pipe solver output"));
    }
    let status = solver_child.wait().await?;
    let _ = tx.send(Msg::Exited {
        id,
        generation,
        success: status.success(),
        code: status.code(),
    });
    Ok(())
}

fn command(solver: &Solver, argv: &[String]) -> Result<Command, Error> {
    let Some((program, args)) = argv.split_first() else {
        return Err(Error::Launch(
            solver.name.clone(),
            "empty command template".to_owned(),
        ));
    };
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.stdin(Stdio::null());
    cmd.stderr(Stdio::piped());
    #[cfg(unix)]
    cmd.process_group(0);
    Ok(cmd)
}

async fn stream_events(
    stdout: impl AsyncRead + Unpin,
    parser: &mut dyn OutputAdapter,
    id: SolverId,
    generation: u64,
    tx: &mpsc::UnboundedSender<Msg>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                logging::error!(anyhow::Error::from(e).context("failed to read solver stdout"));
                break;
            }
        };
        let event = match parser.next_line(&line) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(e) => {
                logging::error!(e.into());
                continue;
            }
        };
        if tx
            .send(Msg::Output {
                id,
                generation,
                event,
            })
            .is_err()
        {
            break;
        }
    }
}

async fn handle_solver_stderr(name: String, stderr: tokio::process::ChildStderr) {
    let reader = BufReader::new(stderr);
    let mut lines = reader.lines();

    while let Ok(Some(line)) = lines.next_line().await {
        logging::warning!("solver '{name}' stderr: {line}");
    }
}

fn pipe(mut left: Command, mut right: Command) -> Result<PipeCommand, Error> {
    let mut left_child = left.stdout(Stdio::piped()).spawn()?;

    #[cfg(unix)]
    {
        let left_pid = left_child
            .id()
            .ok_or_else(|| Error::Pipe("Could not get PID for process".to_string()))?;
        right.process_group(left_pid as i32);
    }

    let mut right_child = right.stdin(Stdio::piped()).stdout(Stdio::piped()).spawn()?;

    let mut left_stdout = left_child
        .stdout
        .take()
        .ok_or_else(|| Error::Pipe("Could not capture the left process' stdout".to_string()))?;
    let mut right_stdin = right_child
        .stdin
        .take()
        .ok_or_else(|| Error::Pipe("Could not capture the right process' stdin".to_string()))?;

    let pipe_task =
        tokio::spawn(async move { tokio::io::copy(&mut left_stdout, &mut right_stdin).await });

    Ok(PipeCommand {
        left: left_child,
        right: right_child,
        pipe: pipe_task,
    })
}
