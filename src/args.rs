use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum Verbosity {
    Quiet = 0,
    Error = 1,
    Warning = 2,
    Info = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GoalArg {
    Sat,
    Min,
    Max,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Args {
    /// MiniZinc model to solve.
    pub model: PathBuf,

    /// Optional data file for the model.
    pub data: Option<PathBuf>,

    /// Knowledge base: one `instance|features|solver infos` row per training instance.
    #[arg(long)]
    pub kb: PathBuf,

    /// Feature limits produced together with the knowledge base.
    #[arg(long)]
    pub lims: PathBuf,

    /// Comma-separated feature vector of the instance. The extractor is run when absent.
    #[arg(long)]
    pub features: Option<PathBuf>,

    #[arg(long, default_value = "mzn2feat")]
    pub extractor: String,

    /// Skip probing the model for its solve method.
    #[arg(long, value_enum, ignore_case = true)]
    pub goal: Option<GoalArg>,

    #[arg(long, default_value = "minizinc")]
    pub minizinc_exe: PathBuf,

    /// Overall solving timeout in seconds.
    #[arg(short = 'T', long, value_parser = parse_non_negative)]
    pub timeout: Option<f64>,

    /// Timeout the knowledge base was recorded with. Defaults to the solving timeout.
    #[arg(long, value_parser = parse_non_negative)]
    pub kb_timeout: Option<f64>,

    /// Skip the consistency checks on the knowledge base rows.
    #[arg(long)]
    pub no_kb_check: bool,

    /// Neighborhood size. Defaults to the square root of the knowledge base size.
    #[arg(short = 'k')]
    pub neighbors: Option<usize>,

    /// Comma-separated portfolio. Defaults to every solver of the solver table.
    #[arg(short = 'P', long)]
    pub portfolio: Option<String>,

    #[arg(short = 'b', long)]
    pub backup: Option<String>,

    #[arg(short = 'p', long)]
    pub cores: Option<usize>,

    /// Minimum cardinality of the selected sub-portfolio.
    #[arg(long)]
    pub min_size: Option<usize>,

    /// File of `solver,seconds` lines run before the predicted schedule.
    #[arg(short = 's', long)]
    pub static_schedule: Option<PathBuf>,

    /// JSON solver table. Defaults to the built-in MiniZinc solver table.
    #[arg(long)]
    pub solvers: Option<PathBuf>,

    #[arg(long, value_parser = parse_non_negative)]
    pub wait_time: Option<f64>,

    #[arg(long, value_parser = parse_non_negative)]
    pub restart_time: Option<f64>,

    #[arg(long)]
    pub max_restarts: Option<u32>,

    /// Per-solver memory limit, in percent of the system memory.
    #[arg(long, value_parser = parse_non_negative)]
    pub mem_limit: Option<f64>,

    #[arg(short = 'a', long)]
    pub all_solutions: bool,

    #[arg(short = 'f', long)]
    pub free_search: bool,

    /// Toggle free search every time a solver is restarted.
    #[arg(long)]
    pub switch_search: bool,

    #[arg(long, value_enum, default_value = "warning")]
    pub debug_verbosity: Verbosity,
}

/// A finite, non-negative number.
fn parse_non_negative(s: &str) -> Result<f64, String> {
    let value: f64 = s.trim().parse().map_err(|e| format!("{e}"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("'{s}' is not a finite non-negative number"));
    }
    Ok(value)
}
