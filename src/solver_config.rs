use crate::logging;
use crate::solvers;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read solver table '{0}'")]
    Read(PathBuf, #[source] std::io::Error),
    #[error("failed to parse solver table")]
    Json(#[from] serde_json::Error),
    #[error("solver table is empty")]
    Empty,
    #[error("solver '{0}' appears twice in the solver table")]
    Duplicate(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Immutable description of one solver: how to convert a model for it, how
/// to run it and how to express a bound in its native language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solver {
    pub name: String,
    /// Converts `{model}` (+ `{data}`) into `{fzn}` and `{ozn}`.
    pub convert: Vec<String>,
    /// Runs the converted `{fzn}`.
    pub run: Vec<String>,
    /// Optional post-processor the raw solver output is piped through.
    #[serde(default)]
    pub output: Option<Vec<String>>,
    #[serde(default = "default_minimize_constraint")]
    pub minimize_constraint: String,
    #[serde(default = "default_maximize_constraint")]
    pub maximize_constraint: String,
    #[serde(default = "default_all_solutions_flag")]
    pub all_solutions_flag: String,
    #[serde(default = "default_free_search_flag")]
    pub free_search_flag: String,
}

fn default_minimize_constraint() -> String {
    "constraint int_lt({obj}, {bound})".to_owned()
}

fn default_maximize_constraint() -> String {
    "constraint int_lt({bound}, {obj})".to_owned()
}

fn default_all_solutions_flag() -> String {
    "-a".to_owned()
}

fn default_free_search_flag() -> String {
    "-f".to_owned()
}

/// Values substituted into a solver's command templates.
#[derive(Debug, Clone, Default)]
pub struct Placeholders<'a> {
    pub model: Option<&'a Path>,
    pub data: Option<&'a Path>,
    pub fzn: Option<&'a Path>,
    pub ozn: Option<&'a Path>,
    pub cores: Option<usize>,
    pub timeout: Option<u64>,
    pub all: Option<&'a str>,
    pub free: Option<&'a str>,
}

impl Placeholders<'_> {
    fn lookup(&self, name: &str) -> Option<Option<String>> {
        let path = |p: Option<&Path>| p.map(|p| p.to_string_lossy().into_owned());
        let value = match name {
            "model" => path(self.model),
            "data" => path(self.data),
            "fzn" => path(self.fzn),
            "ozn" => path(self.ozn),
            "cores" => self.cores.map(|c| c.to_string()),
            "timeout" => self.timeout.map(|t| t.to_string()),
            "all" => self.all.map(str::to_owned),
            "free" => self.free.map(str::to_owned),
            _ => return None,
        };
        Some(value)
    }
}

/// Expands `{name}` placeholders in every argument of `template`.
///
/// An argument that is exactly a placeholder without a value is dropped, so
/// optional flags disappear instead of becoming empty arguments.
pub fn expand(template: &[String], values: &Placeholders) -> Vec<String> {
    template
        .iter()
        .filter_map(|arg| {
            if let Some(name) = arg.strip_prefix('{').and_then(|a| a.strip_suffix('}'))
                && let Some(value) = values.lookup(name)
            {
                return value;
            }
            let mut expanded = arg.clone();
            for name in ["model", "data", "fzn", "ozn", "cores", "timeout", "all", "free"] {
                let key = format!("{{{name}}}");
                if expanded.contains(&key) {
                    let value = values.lookup(name).flatten().unwrap_or_default();
                    expanded = expanded.replace(&key, &value);
                }
            }
            Some(expanded)
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Solvers(Vec<Solver>);

impl Solvers {
    pub fn new(solvers: Vec<Solver>) -> Result<Self> {
        if solvers.is_empty() {
            return Err(Error::Empty);
        }
        for (i, solver) in solvers.iter().enumerate() {
            if solvers[..i].iter().any(|other| other.name == solver.name) {
                return Err(Error::Duplicate(solver.name.clone()));
            }
        }
        Ok(Self(solvers))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Solver> {
        self.0.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|solver| solver.name.clone()).collect()
    }

    pub fn get_by_id(&self, name: &str) -> Option<&Solver> {
        self.0.iter().find(|solver| solver.name == name)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Self::new(serde_json::from_str(content)?)
    }

    pub async fn load_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Read(path.to_path_buf(), e))?;
        Self::parse(&content)
    }
}

fn config_path() -> Option<PathBuf> {
    let base_dirs = BaseDirs::new()?;
    Some(
        base_dirs
            .config_dir()
            .join("sunny-portfolio")
            .join("solvers.json"),
    )
}

/// Loads the solver table from `path`, else from the user configuration
/// directory, else falls back to the built-in MiniZinc table.
pub async fn load(path: Option<&Path>, minizinc_exe: &Path) -> Result<Solvers> {
    if let Some(path) = path {
        return Solvers::load_file(path).await;
    }

    if let Some(path) = config_path()
        && path.is_file()
    {
        logging::info!("loading solver table from {}", path.display());
        return Solvers::load_file(&path).await;
    }

    Solvers::new(solvers::default_table(minizinc_exe))
}
