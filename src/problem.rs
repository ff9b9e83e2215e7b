use crate::ai::Features;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use tokio::process::Command;

pub type ObjectiveValue = i64;

/// Output variable the rewritten model uses to report the objective value.
pub const DEFAULT_TRACKING_VAR: &str = "_objective";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to run the model interface command")]
    Io(#[from] std::io::Error),
    #[error("model interface command failed with {0}")]
    CommandFailed(ExitStatus),
    #[error("model interface output is not a JSON object")]
    NonJsonOutput,
    #[error("model interface output has no usable 'method' field: {0}")]
    Method(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ObjectiveType {
    #[serde(rename = "sat")]
    Satisfy,
    #[serde(rename = "min")]
    Minimize,
    #[serde(rename = "max")]
    Maximize,
}

impl ObjectiveType {
    pub fn is_better(&self, old: Option<ObjectiveValue>, new: ObjectiveValue) -> bool {
        match (self, old) {
            (_, None) => true,
            (Self::Maximize, Some(val)) => val < new,
            (Self::Minimize, Some(val)) => val > new,
            (Self::Satisfy, _) => true,
        }
    }

    pub fn is_optimization(&self) -> bool {
        !matches!(self, Self::Satisfy)
    }
}

/// The instance being solved. The objective bound shared between solvers is
/// not stored here but in [`crate::run_context::RunContext`].
#[derive(Debug, Clone)]
pub struct Problem {
    pub model: PathBuf,
    pub data: Option<PathBuf>,
    pub goal: ObjectiveType,
    pub features: Features,
    pub tracking_var: String,
}

impl Problem {
    pub fn new(model: PathBuf, data: Option<PathBuf>, goal: ObjectiveType) -> Self {
        Self {
            model,
            data,
            goal,
            features: Features::new(),
            tracking_var: DEFAULT_TRACKING_VAR.to_owned(),
        }
    }
}

pub async fn get_objective_type(minizinc_exe: &Path, model_path: &Path) -> Result<ObjectiveType> {
    let output = run_model_interface_cmd(minizinc_exe, model_path).await?;
    parse_model_interface(&output)
}

fn parse_model_interface(output: &str) -> Result<ObjectiveType> {
    let json: serde_json::Value =
        serde_json::from_str(output).map_err(|_| Error::NonJsonOutput)?;
    let serde_json::Value::Object(object) = json else {
        return Err(Error::NonJsonOutput);
    };

    let Some(method_json) = object.get("method") else {
        return Err(Error::Method("'method' field does not exist".to_owned()));
    };
    let serde_json::Value::String(method) = method_json else {
        return Err(Error::Method("'method' field is not a string".to_owned()));
    };

    match method.as_str() {
        "min" => Ok(ObjectiveType::Minimize),
        "max" => Ok(ObjectiveType::Maximize),
        "sat" => Ok(ObjectiveType::Satisfy),
        other => Err(Error::Method(format!("method '{other}' not recognised"))),
    }
}

async fn run_model_interface_cmd(minizinc_exe: &Path, model_path: &Path) -> Result<String> {
    let mut cmd = Command::new(minizinc_exe);
    cmd.kill_on_drop(true);
    cmd.arg(model_path);
    cmd.arg("--model-interface-only");

    let output = cmd.output().await?;
    if !output.status.success() {
        return Err(Error::CommandFailed(output.status));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_better() {
        assert!(ObjectiveType::Minimize.is_better(None, 10));
        assert!(ObjectiveType::Minimize.is_better(Some(10), 9));
        assert!(!ObjectiveType::Minimize.is_better(Some(10), 10));
        assert!(!ObjectiveType::Minimize.is_better(Some(10), 11));
        assert!(ObjectiveType::Maximize.is_better(Some(10), 11));
        assert!(!ObjectiveType::Maximize.is_better(Some(10), 10));
    }

    #[test]
    fn test_parse_model_interface() {
        let output = r#"{"type": "problem", "method": "max", "has_output_item": true}"#;
        assert_eq!(
            parse_model_interface(output).unwrap(),
            ObjectiveType::Maximize
        );
        assert!(matches!(
            parse_model_interface(r#"{"method": 3}"#),
            Err(Error::Method(_))
        ));
        assert!(matches!(
            parse_model_interface("not json"),
            Err(Error::NonJsonOutput)
        ));
    }

    #[tokio::test]
    async fn test_goal_detection_failure_is_reported() {
        let result = get_objective_type(Path::new("false"), Path::new("model.mzn")).await;
        assert!(matches!(result, Err(Error::CommandFailed(_))));
    }
}
