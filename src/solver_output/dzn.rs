use super::Status;

pub const SOLUTION_TERMINATOR: &str = "----------";
pub const DONE_TERMINATOR: &str = "==========";
pub const UNSATISFIABLE_TERMINATOR: &str = "=====UNSATISFIABLE=====";
pub const UNBOUNDED_TERMINATOR: &str = "=====UNBOUNDED=====";
pub const UNKNOWN_TERMINATOR: &str = "=====UNKNOWN=====";
pub const ERROR_TERMINATOR: &str = "=====ERROR=====";

impl Status {
    pub fn to_dzn_string(&self) -> &str {
        match self {
            Status::OptimalSolution => DONE_TERMINATOR,
            Status::Unsatisfiable => UNSATISFIABLE_TERMINATOR,
            Status::Unbounded => UNBOUNDED_TERMINATOR,
            Status::Unknown => UNKNOWN_TERMINATOR,
        }
    }

    pub fn from_dzn_line(line: &str) -> Option<Self> {
        match line {
            DONE_TERMINATOR => Some(Status::OptimalSolution),
            UNSATISFIABLE_TERMINATOR => Some(Status::Unsatisfiable),
            UNBOUNDED_TERMINATOR => Some(Status::Unbounded),
            UNKNOWN_TERMINATOR => Some(Status::Unknown),
            _ => None,
        }
    }
}
