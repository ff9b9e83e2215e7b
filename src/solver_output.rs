//! Classification of a solver's stdout into supervisor events.

pub mod dzn;

use crate::problem::ObjectiveValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    OptimalSolution,
    Unsatisfiable,
    Unbounded,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    /// Solution text as printed by the solver, terminator excluded.
    pub assignment: String,
    pub objective: Option<ObjectiveValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    NewSolution(Solution),
    BoundUpdate(ObjectiveValue),
    Completed(Status),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot parse objective value from '{0}'")]
    ObjectiveParse(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Turns the lines of one solver's output into events, in emission order.
pub trait OutputAdapter: Send {
    fn next_line(&mut self, line: &str) -> Result<Option<Event>>;
}

/// Adapter for the MiniZinc dzn output mode.
#[derive(Debug)]
pub struct Parser {
    input: String,
    objective: Option<ObjectiveValue>,
    objective_prefix: String,
}

impl Parser {
    pub fn new(tracking_var: &str) -> Self {
        Self {
            input: String::new(),
            objective: None,
            objective_prefix: format!("{tracking_var} = "),
        }
    }

    fn to_solution(&mut self) -> Solution {
        Solution {
            assignment: std::mem::take(&mut self.input),
            objective: self.objective.take(),
        }
    }

    fn parse_objective(&self, line: &str) -> Result<ObjectiveValue> {
        let value = line[self.objective_prefix.len()..]
            .trim_end_matches(';')
            .trim();
        value
            .parse::<ObjectiveValue>()
            .or_else(|_| {
                // Some solvers print integral objectives as floats.
                value
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.fract() == 0.0)
                    .map(|v| v as ObjectiveValue)
                    .ok_or(())
            })
            .map_err(|_| Error::ObjectiveParse(line.to_owned()))
    }
}

impl OutputAdapter for Parser {
    fn next_line(&mut self, line: &str) -> Result<Option<Event>> {
        let line = line.trim_end();

        if line == dzn::SOLUTION_TERMINATOR {
            return Ok(Some(Event::NewSolution(self.to_solution())));
        }
        if let Some(status) = Status::from_dzn_line(line) {
            self.input.clear();
            return Ok(Some(Event::Completed(status)));
        }
        if line.starts_with(&self.objective_prefix) {
            let objective = self.parse_objective(line)?;
            self.objective = Some(objective);
            return Ok(Some(Event::BoundUpdate(objective)));
        }

        self.input += line;
        self.input += "\n";
        Ok(None)
    }
}
