//! One solving run: predict a schedule, spread it over the cores and
//! supervise the solvers.

use crate::ai::{self, Ai, SunnyAi, SunnyParams};
use crate::args::{Args, GoalArg};
use crate::config::Config;
use crate::features;
use crate::knowledge_base::limits::{self, Limits};
use crate::knowledge_base::{self, KnowledgeBase, LoadOptions};
use crate::logging;
use crate::problem::{self, ObjectiveType, Problem, get_objective_type};
use crate::run_context::RunContext;
use crate::schedule::{Schedule, parallelize};
use crate::signal_handler::spawn_signal_handler;
use crate::solver_config::{self, Solvers};
use crate::solvers::DEFAULT_BACKUP;
use crate::static_schedule::{self, static_schedule};
use crate::supervisor::{RunReport, Supervisor};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load the solver table")]
    SolverConfig(#[from] solver_config::Error),
    #[error("failed to load the knowledge base")]
    KnowledgeBase(#[from] knowledge_base::Error),
    #[error("failed to load the feature limits")]
    Limits(#[from] limits::Error),
    #[error("invalid static schedule")]
    StaticSchedule(#[from] static_schedule::Error),
    #[error("failed to obtain the instance features")]
    Features(#[from] features::Error),
    #[error("failed to determine the objective of the model")]
    Problem(#[from] problem::Error),
    #[error("failed to predict a schedule")]
    Ai(#[from] ai::Error),
    #[error("portfolio solver '{0}' is not in the solver table")]
    UnknownSolver(String),
    #[error("the portfolio is empty")]
    EmptyPortfolio,
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<GoalArg> for ObjectiveType {
    fn from(goal: GoalArg) -> Self {
        match goal {
            GoalArg::Sat => ObjectiveType::Satisfy,
            GoalArg::Min => ObjectiveType::Minimize,
            GoalArg::Max => ObjectiveType::Maximize,
        }
    }
}

pub async fn sunny(args: &Args, config: &Config, token: CancellationToken) -> Result<RunReport> {
    let solvers = Arc::new(solver_config::load(args.solvers.as_deref(), &args.minizinc_exe).await?);
    let (portfolio, backup) = resolve_portfolio(args, &solvers)?;
    logging::info!("portfolio: {} (backup {backup})", portfolio.join(", "));

    let kb = KnowledgeBase::load(
        &args.kb,
        LoadOptions {
            timeout: Some(config.kb_timeout()),
            check_invariants: config.check_kb,
        },
    )
    .await?;
    logging::info!(
        "loaded knowledge base with {} instances of dimension {}",
        kb.len(),
        kb.dimension()
    );
    let limits = Limits::load(&args.lims).await?;

    let static_slots: Schedule = match &args.static_schedule {
        Some(path) => static_schedule(path, &solvers, config.timeout).await?,
        None => Schedule::new(),
    };

    let goal = match args.goal {
        Some(goal) => goal.into(),
        None => get_objective_type(&args.minizinc_exe, &args.model).await?,
    };
    let mut problem = Problem::new(args.model.clone(), args.data.clone(), goal);
    problem.features = match &args.features {
        Some(path) => features::read_features(path).await?,
        None => {
            features::extract_features(&args.extractor, &args.model, args.data.as_deref()).await?
        }
    };

    let mut ai = SunnyAi::new(
        Arc::new(kb),
        limits,
        SunnyParams {
            portfolio,
            backup,
            timeout: config.timeout,
            k: config.neighbors,
            min_size: config.min_size,
        },
        static_slots,
    );
    let prediction = ai.schedule(&problem.features, goal)?;
    logging::info!(
        "sequential schedule: {}",
        prediction
            .sequential()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    let schedule = parallelize(&prediction, config.cores, config.timeout);

    let ctx = Arc::new(RunContext::new(goal, token));
    let supervisor = Supervisor::new(config.supervisor(), &problem, solvers, ctx)
        .with_signals(spawn_signal_handler());
    Ok(supervisor.run(schedule).await)
}

fn resolve_portfolio(args: &Args, solvers: &Solvers) -> Result<(Vec<String>, String)> {
    let portfolio: Vec<String> = match &args.portfolio {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .collect(),
        None => solvers.names(),
    };
    if portfolio.is_empty() {
        return Err(Error::EmptyPortfolio);
    }
    if let Some(unknown) = portfolio
        .iter()
        .find(|name| solvers.get_by_id(name).is_none())
    {
        return Err(Error::UnknownSolver(unknown.clone()));
    }

    let backup = match &args.backup {
        Some(backup) => backup.clone(),
        None if solvers.get_by_id(DEFAULT_BACKUP).is_some() => DEFAULT_BACKUP.to_owned(),
        None => portfolio[0].clone(),
    };
    if solvers.get_by_id(&backup).is_none() {
        return Err(Error::UnknownSolver(backup));
    }
    Ok((portfolio, backup))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver_config::Solver;
    use clap::Parser;

    fn table(names: &[&str]) -> Solvers {
        let solvers = names
            .iter()
            .map(|name| {
                serde_json::from_value::<Solver>(serde_json::json!({
                    "name": name,
                    "convert": ["cp", "{model}", "{fzn}"],
                    "run": ["cat", "{fzn}"],
                }))
                .unwrap()
            })
            .collect();
        Solvers::new(solvers).unwrap()
    }

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["sunny-portfolio", "m.mzn", "--kb", "kb", "--lims", "lims"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_portfolio_defaults_to_table() {
        let solvers = table(&["gecode", "chuffed", "highs"]);
        let (portfolio, backup) = resolve_portfolio(&args(&[]), &solvers).unwrap();
        assert_eq!(portfolio, vec!["gecode", "chuffed", "highs"]);
        assert_eq!(backup, "chuffed");

        let solvers = table(&["gecode", "highs"]);
        let (_, backup) = resolve_portfolio(&args(&[]), &solvers).unwrap();
        assert_eq!(backup, "gecode");
    }

    #[test]
    fn test_explicit_portfolio_is_validated() {
        let solvers = table(&["gecode", "chuffed"]);
        let (portfolio, backup) =
            resolve_portfolio(&args(&["-P", "chuffed, gecode", "-b", "gecode"]), &solvers).unwrap();
        assert_eq!(portfolio, vec!["chuffed", "gecode"]);
        assert_eq!(backup, "gecode");

        assert!(matches!(
            resolve_portfolio(&args(&["-P", "gecode,yuck"]), &solvers),
            Err(Error::UnknownSolver(name)) if name == "yuck"
        ));
        assert!(matches!(
            resolve_portfolio(&args(&["-b", "yuck"]), &solvers),
            Err(Error::UnknownSolver(_))
        ));
        assert!(matches!(
            resolve_portfolio(&args(&["-P", ","]), &solvers),
            Err(Error::EmptyPortfolio)
        ));
    }
}
