use std::path::{Path, PathBuf};

use crate::schedule::{Schedule, Slot, merge, total_seconds};
use crate::solver_config::Solvers;

/// Reads, validates and merges the warm-start schedule in `path`.
pub async fn static_schedule(path: &Path, solvers: &Solvers, timeout: f64) -> Result<Schedule> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Io(path.to_path_buf(), e))?;
    let schedule = parse_schedule(&contents)?;
    validate(&schedule, solvers, timeout)?;
    Ok(merge(&schedule, &[]))
}

pub fn parse_schedule(s: &str) -> std::result::Result<Schedule, ParseError> {
    s.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(parse_schedule_line)
        .collect()
}

fn parse_schedule_line(line: &str) -> std::result::Result<Slot, ParseError> {
    let (solver, seconds_str) =
        line.split_once(',')
            .ok_or_else(|| ParseError::LineDoesNotContainComma {
                line: line.to_owned(),
            })?;

    let seconds = seconds_str
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
        .ok_or_else(|| ParseError::SecondsNotPositive {
            line: line.to_owned(),
            seconds_str: seconds_str.to_owned(),
        })?;

    Ok(Slot::new(solver.trim(), seconds))
}

fn validate(schedule: &[Slot], solvers: &Solvers, timeout: f64) -> Result<()> {
    if let Some(slot) = schedule
        .iter()
        .find(|slot| solvers.get_by_id(&slot.solver).is_none())
    {
        return Err(Error::UnknownSolver(slot.solver.clone()));
    }
    let total = total_seconds(schedule);
    if total > timeout {
        return Err(Error::TooLong { total, timeout });
    }
    Ok(())
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read static schedule '{0}'")]
    Io(PathBuf, #[source] tokio::io::Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("static schedule names unknown solver '{0}'")]
    UnknownSolver(String),
    #[error("static schedule lasts {total}s, more than the {timeout}s timeout")]
    TooLong { total: f64, timeout: f64 },
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("static schedule line does not contain a ',': '{line}'")]
    LineDoesNotContainComma { line: String },
    #[error("static schedule seconds are not a positive number: '{seconds_str}' on the following line: {line}")]
    SecondsNotPositive { line: String, seconds_str: String },
}
