//! In-memory index of past instances.
//!
//! Each row of the knowledge-base file is `instance|[features]|{solver infos}`.
//! The knowledge base is read once before any solver is launched and is then
//! shared read-only for the whole run.

pub mod limits;

use crate::problem::ObjectiveType;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

const TIME_TOLERANCE: f64 = 1e-6;

static PYTHON_NAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bnan\b").expect("static regex is valid"));

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read '{0}'")]
    Read(PathBuf, #[source] std::io::Error),
    #[error("corrupt knowledge base: {0}")]
    CorruptKb(String),
    #[error("invariant '{invariant}' violated by solver '{solver}' on instance '{instance}'")]
    InvariantViolation {
        invariant: &'static str,
        instance: String,
        solver: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Info {
    Sat,
    Uns,
    Unk,
    Opt,
}

/// Historical outcome of one solver on one instance.
#[derive(Debug, Clone, Deserialize)]
pub struct SolverOutcome {
    #[serde(alias = "otime", alias = "tot_time")]
    pub time: f64,
    #[serde(default)]
    pub info: Option<Info>,
    #[serde(default)]
    pub goal: Option<ObjectiveType>,
    /// Closeness to the best value among the runs on this instance; 1 = proved.
    #[serde(default)]
    pub score: Option<f64>,
    /// Time-weighted integral of normalized solution quality.
    #[serde(default)]
    pub area: Option<f64>,
    /// Last objective value found. `None` stands for NaN.
    #[serde(default)]
    pub val: Option<f64>,
}

impl SolverOutcome {
    pub fn is_optimization(&self) -> bool {
        self.score.is_some()
            || matches!(
                self.goal,
                Some(ObjectiveType::Minimize) | Some(ObjectiveType::Maximize)
            )
    }

    fn has_value(&self) -> bool {
        self.val.is_some_and(|v| !v.is_nan())
    }
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub id: String,
    pub features: Vec<f64>,
    pub outcomes: HashMap<String, SolverOutcome>,
}

impl Entry {
    pub fn outcome(&self, solver: &str) -> Option<&SolverOutcome> {
        self.outcomes.get(solver)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Timeout the runs were recorded with; enables the time invariants.
    pub timeout: Option<f64>,
    pub check_invariants: bool,
}

#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    entries: Vec<Entry>,
    dimension: usize,
}

impl KnowledgeBase {
    pub async fn load(path: &Path, options: LoadOptions) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Read(path.to_path_buf(), e))?;
        Self::parse(&content, options)
    }

    pub fn parse(content: &str, options: LoadOptions) -> Result<Self> {
        let mut kb = Self::default();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry = parse_row(line).map_err(|e| {
                Error::CorruptKb(format!("line {}: {e}", number + 1))
            })?;
            if options.check_invariants {
                check_entry(&entry, options.timeout)?;
            }
            kb.push(entry)?;
        }
        Ok(kb)
    }

    pub fn from_entries(entries: impl IntoIterator<Item = Entry>) -> Result<Self> {
        let mut kb = Self::default();
        for entry in entries {
            kb.push(entry)?;
        }
        Ok(kb)
    }

    fn push(&mut self, entry: Entry) -> Result<()> {
        if self.entries.is_empty() {
            self.dimension = entry.features.len();
        } else if entry.features.len() != self.dimension {
            return Err(Error::CorruptKb(format!(
                "instance '{}' has {} features, expected {}",
                entry.id,
                entry.features.len(),
                self.dimension
            )));
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Entries in file order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.id == id)
    }
}

fn parse_row(line: &str) -> std::result::Result<Entry, String> {
    let mut columns = line.splitn(3, '|');
    let (Some(id), Some(features), Some(infos)) = (columns.next(), columns.next(), columns.next())
    else {
        return Err("expected three '|'-separated columns".to_owned());
    };

    // `nan` components arrive as `null`.
    let features: Vec<Option<f64>> = serde_json::from_str(&as_json(features))
        .map_err(|e| format!("invalid feature vector: {e}"))?;
    let features = features
        .into_iter()
        .map(|value| value.unwrap_or(f64::NAN))
        .collect();
    let outcomes: HashMap<String, SolverOutcome> = serde_json::from_str(&as_json(infos))
        .map_err(|e| format!("invalid solver infos: {e}"))?;

    Ok(Entry {
        id: id.trim().to_owned(),
        features,
        outcomes,
    })
}

/// Rows written by Python tooling use single quotes and bare `nan`.
fn as_json(column: &str) -> String {
    PYTHON_NAN
        .replace_all(&column.trim().replace('\'', "\""), "null")
        .into_owned()
}

fn check_entry(entry: &Entry, timeout: Option<f64>) -> Result<()> {
    for (solver, outcome) in &entry.outcomes {
        let violation = |invariant| Error::InvariantViolation {
            invariant,
            instance: entry.id.clone(),
            solver: solver.clone(),
        };

        if let Some(timeout) = timeout
            && outcome.time > timeout + TIME_TOLERANCE
        {
            return Err(violation("time <= T"));
        }

        let Some(info) = outcome.info else {
            continue;
        };
        let is_satisfaction = matches!(outcome.goal, None | Some(ObjectiveType::Satisfy));

        if outcome.is_optimization() {
            let no_value_expected = outcome.goal == Some(ObjectiveType::Satisfy)
                || matches!(info, Info::Unk | Info::Uns);
            if no_value_expected == outcome.has_value() {
                return Err(violation(
                    "goal = sat \\/ info = unk \\/ info = uns <==> val = nan",
                ));
            }
        }

        if let Some(timeout) = timeout {
            let timed_out = info == Info::Unk || (!is_satisfaction && info == Info::Sat);
            let hit_timeout = (outcome.time - timeout).abs() <= TIME_TOLERANCE;
            if timed_out != hit_timeout {
                return Err(violation(
                    "info = unk \\/ (goal != sat /\\ info = sat) <==> time = T",
                ));
            }
        }
    }
    Ok(())
}
