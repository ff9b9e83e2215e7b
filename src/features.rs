use crate::ai::Features;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read feature file '{0}'")]
    Read(PathBuf, #[source] std::io::Error),
    #[error("failed to run feature extractor")]
    Io(#[from] std::io::Error),
    #[error("feature extractor failed with {0}")]
    CommandFailed(ExitStatus),
    #[error("failed to parse feature vector '{0}'")]
    FeatureParseFailed(String, #[source] std::num::ParseFloatError),
    #[error("feature vector is empty")]
    Empty,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Reads a comma-separated feature vector from `path`.
pub async fn read_features(path: &Path) -> Result<Features> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Read(path.to_path_buf(), e))?;
    parse_features(&content)
}

/// Runs `extractor -i <model> [-d <data>]` and parses its output.
pub async fn extract_features(
    extractor: &str,
    model: &Path,
    data: Option<&Path>,
) -> Result<Features> {
    let mut cmd = Command::new(extractor);
    cmd.kill_on_drop(true);
    cmd.arg("-i").arg(model);
    if let Some(data) = data {
        cmd.arg("-d").arg(data);
    }

    let output = cmd.output().await?;
    if !output.status.success() {
        return Err(Error::CommandFailed(output.status));
    }
    parse_features(&String::from_utf8_lossy(&output.stdout))
}

/// `nan` entries are kept and left to normalization.
pub fn parse_features(content: &str) -> Result<Features> {
    let joined = content.replace(['\n', '\r'], "");
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        return Err(Error::Empty);
    }
    trimmed
        .split(',')
        .map(|s| s.trim().parse::<f64>())
        .collect::<std::result::Result<Features, _>>()
        .map_err(|e| Error::FeatureParseFailed(trimmed.to_owned(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_features() {
        let features = parse_features("1.5, -2,0\n,nan\n").unwrap();
        assert_eq!(features.len(), 4);
        assert_eq!(&features[..3], &[1.5, -2.0, 0.0]);
        assert!(features[3].is_nan());
    }

    #[test]
    fn test_parse_features_rejects_garbage() {
        assert!(matches!(
            parse_features("1,two,3"),
            Err(Error::FeatureParseFailed(..))
        ));
        assert!(matches!(parse_features(" \n"), Err(Error::Empty)));
    }

    #[tokio::test]
    async fn test_read_features_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "0.25,4").unwrap();
        let features = read_features(file.path()).await.unwrap();
        assert_eq!(features, vec![0.25, 4.0]);
    }

    #[tokio::test]
    async fn test_extract_features_runs_command() {
        // `echo -i model` prints something that is not a feature vector.
        let result = extract_features("echo", Path::new("model.mzn"), None).await;
        assert!(matches!(result, Err(Error::FeatureParseFailed(..))));

        let result = extract_features("false", Path::new("model.mzn"), None).await;
        assert!(matches!(result, Err(Error::CommandFailed(_))));
    }
}
