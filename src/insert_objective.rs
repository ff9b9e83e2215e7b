//! Splices "strictly better than bound" constraints into converted models.

use std::path::{Path, PathBuf};

use async_tempfile::TempFile;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::problem::{ObjectiveType, ObjectiveValue};
use crate::solver_config::Solver;

/// Name of the variable the solve item optimizes.
pub fn objective_variable(content: &str) -> Result<&str> {
    let (_, solve_statement) = split_solve_item(content)?;
    let objective_name = solve_statement
        .split_whitespace()
        .next_back()
        .ok_or(Error::SplitReturnedEmptyIterator)?;
    if objective_name == "satisfy" {
        return Err(Error::GetObjectiveOnSatisfyType);
    }
    Ok(objective_name)
}

/// Instantiates the solver's constraint template for `bound`.
pub fn bound_constraint(
    solver: &Solver,
    objective_type: ObjectiveType,
    objective_name: &str,
    bound: ObjectiveValue,
) -> Result<String> {
    let template = match objective_type {
        ObjectiveType::Satisfy => return Err(Error::GetObjectiveOnSatisfyType),
        ObjectiveType::Minimize => &solver.minimize_constraint,
        ObjectiveType::Maximize => &solver.maximize_constraint,
    };
    let constraint = template
        .replace("{obj}", objective_name)
        .replace("{bound}", &bound.to_string());
    Ok(constraint.trim_end().trim_end_matches(';').to_owned())
}

/// Returns `content` with `constraint` inserted right before the solve item.
pub fn insert_constraint(content: &str, constraint: &str) -> Result<String> {
    // NOTE: The FlatZinc grammar always ends with a "solve-item" and all statements end with a ';': https://docs.minizinc.dev/en/latest/fzn-spec.html#grammar
    let (head, solve_statement) = split_solve_item(content)?;
    let mut new_content = String::with_capacity(content.len() + constraint.len() + 4);
    new_content.push_str(head);
    if !head.is_empty() {
        new_content.push('\n');
    }
    new_content.push_str(constraint);
    new_content.push_str(";\n");
    new_content.push_str(solve_statement.trim());
    new_content.push_str(";\n");
    Ok(new_content)
}

/// `(everything up to the last ';' before the solve item, solve item)`.
fn split_solve_item(content: &str) -> Result<(&str, &str)> {
    let body = content.trim_end();
    let body = body.strip_suffix(';').unwrap_or(body);
    if body.trim().is_empty() {
        return Err(Error::NoStatements(content.to_owned()));
    }
    let (head, solve_statement) = match body.rfind(';') {
        Some(index) => body.split_at(index + 1),
        None => ("", body),
    };
    if !solve_statement.trim_start().starts_with("solve") {
        return Err(Error::LastStatementNotSolve(
            solve_statement.trim().to_owned(),
        ));
    }
    Ok((head, solve_statement))
}

pub async fn insert_objective(
    solver: &Solver,
    fzn_path: &Path,
    objective_type: ObjectiveType,
    objective: ObjectiveValue,
) -> Result<TempFile> {
    let content = tokio::fs::read_to_string(fzn_path)
        .await
        .map_err(|e| Error::ReadFznFile(fzn_path.to_path_buf(), e))?;
    let objective_name = objective_variable(&content)?;
    let constraint = bound_constraint(solver, objective_type, objective_name, objective)?;
    let new_content = insert_constraint(&content, &constraint)?;

    let uuid = Uuid::new_v4();
    let mut file = TempFile::new_with_name(format!("temp-{uuid}.fzn")).await?;

    file.write_all(new_content.as_bytes()).await?;
    file.flush().await?;

    Ok(file)
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to read FlatZinc file: {0}")]
    ReadFznFile(PathBuf, #[source] tokio::io::Error),
    #[error("FlatZinc contains no statements: {0}")]
    NoStatements(String),
    #[error("the last statement is not a solve statement: {0}")]
    LastStatementNotSolve(String),
    #[error("split returned an empty iterator (should be impossible)")]
    SplitReturnedEmptyIterator,
    #[error(transparent)]
    TempFile(#[from] async_tempfile::Error),
    #[error(transparent)]
    Io(#[from] tokio::io::Error),
    #[error("tried to create the objective constraint on a satisfaction problem")]
    GetObjectiveOnSatisfyType,
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solvers;

    const FZN: &str = "var 0..10: x;\nvar 0..20: obj :: output_var;\nconstraint int_lin_eq([1,-2],[obj,x],0);\nsolve :: int_search([x], input_order, indomain_min) minimize obj;\n";

    fn gecode() -> Solver {
        solvers::minizinc_solver(Path::new("minizinc"), solvers::GECODE_ID)
    }

    #[test]
    fn test_objective_variable() {
        assert_eq!(objective_variable(FZN).unwrap(), "obj");
        assert!(matches!(
            objective_variable("var int: x;\nsolve satisfy;\n"),
            Err(Error::GetObjectiveOnSatisfyType)
        ));
        assert!(matches!(
            objective_variable("var int: x;\n"),
            Err(Error::LastStatementNotSolve(_))
        ));
    }

    #[test]
    fn test_bound_constraint_uses_template() {
        let solver = gecode();
        assert_eq!(
            bound_constraint(&solver, ObjectiveType::Minimize, "obj", 12).unwrap(),
            "constraint int_lt(obj, 12)"
        );
        assert_eq!(
            bound_constraint(&solver, ObjectiveType::Maximize, "obj", -3).unwrap(),
            "constraint int_lt(-3, obj)"
        );
        assert!(bound_constraint(&solver, ObjectiveType::Satisfy, "obj", 0).is_err());
    }

    #[test]
    fn test_insert_before_solve_item() {
        let out = insert_constraint(FZN, "constraint int_lt(obj, 12)").unwrap();
        assert!(out.ends_with(
            "\nconstraint int_lt(obj, 12);\nsolve :: int_search([x], input_order, indomain_min) minimize obj;\n"
        ));
        assert!(out.starts_with("var 0..10: x;\n"));
        assert!(!out.contains(";;"));
    }

    #[tokio::test]
    async fn test_insert_objective_writes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.fzn");
        tokio::fs::write(&path, FZN).await.unwrap();

        let file = insert_objective(&gecode(), &path, ObjectiveType::Minimize, 5)
            .await
            .unwrap();
        let content = tokio::fs::read_to_string(file.file_path()).await.unwrap();
        assert!(content.contains("constraint int_lt(obj, 5);\nsolve"));
    }
}
