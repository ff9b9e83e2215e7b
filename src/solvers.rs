//! Built-in solver table driving MiniZinc.

use crate::solver_config::Solver;
use std::path::Path;

pub const CHUFFED_ID: &str = "chuffed";
pub const GECODE_ID: &str = "gecode";
pub const CP_SAT_ID: &str = "cp-sat";
pub const COIN_BC_ID: &str = "coin-bc";
pub const CHOCO_ID: &str = "choco";
pub const PICAT_ID: &str = "picat";
pub const HIGHS_ID: &str = "highs";

pub const ALL_IDS: [&str; 7] = [
    CHUFFED_ID, GECODE_ID, CP_SAT_ID, COIN_BC_ID, CHOCO_ID, PICAT_ID, HIGHS_ID,
];

/// Solver preferred as backup when it is part of the table.
pub const DEFAULT_BACKUP: &str = CHUFFED_ID;

fn args(template: &[&str]) -> Vec<String> {
    template.iter().map(|arg| (*arg).to_owned()).collect()
}

pub fn minizinc_solver(minizinc_exe: &Path, id: &str) -> Solver {
    let exe = minizinc_exe.to_string_lossy();
    let exe: &str = &exe;
    Solver {
        name: id.to_owned(),
        convert: args(&[
            exe,
            "-c",
            "--solver",
            id,
            "{model}",
            "{data}",
            "-o",
            "{fzn}",
            "--ozn",
            "{ozn}",
            "--output-objective",
            "--output-mode",
            "dzn",
        ]),
        run: args(&[exe, "--solver", id, "{fzn}", "{all}", "{free}", "-p", "{cores}"]),
        output: Some(args(&[exe, "--ozn-file", "{ozn}"])),
        minimize_constraint: "constraint int_lt({obj}, {bound})".to_owned(),
        maximize_constraint: "constraint int_lt({bound}, {obj})".to_owned(),
        all_solutions_flag: "-a".to_owned(),
        free_search_flag: "-f".to_owned(),
    }
}

pub fn default_table(minizinc_exe: &Path) -> Vec<Solver> {
    ALL_IDS
        .iter()
        .map(|id| minizinc_solver(minizinc_exe, id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver_config::{Placeholders, expand};

    #[test]
    fn test_default_run_command() {
        let gecode = minizinc_solver(Path::new("minizinc"), GECODE_ID);
        let values = Placeholders {
            fzn: Some(Path::new("m.fzn")),
            all: Some("-a"),
            cores: Some(1),
            ..Default::default()
        };
        assert_eq!(
            expand(&gecode.run, &values),
            args(&["minizinc", "--solver", "gecode", "m.fzn", "-a", "-p", "1"])
        );
    }

    #[test]
    fn test_table_contains_backup() {
        let table = default_table(Path::new("minizinc"));
        assert_eq!(table.len(), ALL_IDS.len());
        assert!(table.iter().any(|solver| solver.name == DEFAULT_BACKUP));
    }
}
