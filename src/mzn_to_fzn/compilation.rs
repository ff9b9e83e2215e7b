use super::Conversion;
use crate::is_cancelled::IsCancelled;
use crate::logging;
use crate::solver_config::{Placeholders, Solver, expand};
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Runs the solver's conversion command on `model` (+ `data`).
pub async fn convert_mzn(
    solver: &Solver,
    model: &Path,
    data: Option<&Path>,
    cancellation_token: CancellationToken,
) -> Result<Conversion> {
    let fzn_file = tempfile::Builder::new()
        .prefix("sunny-")
        .suffix(".fzn")
        .tempfile()
        .map_err(ConversionError::TempFile)?;
    let ozn_file = tempfile::Builder::new()
        .prefix("sunny-")
        .suffix(".ozn")
        .tempfile()
        .map_err(ConversionError::TempFile)?;

    let values = Placeholders {
        model: Some(model),
        data,
        fzn: Some(fzn_file.path()),
        ozn: Some(ozn_file.path()),
        ..Default::default()
    };
    run_conversion_cmd(solver, &expand(&solver.convert, &values), cancellation_token).await?;

    Ok(Conversion { fzn_file, ozn_file })
}

async fn run_conversion_cmd(
    solver: &Solver,
    argv: &[String],
    cancellation_token: CancellationToken,
) -> Result<()> {
    let Some((program, args)) = argv.split_first() else {
        return Err(ConversionError::EmptyCommand(solver.name.clone()).into());
    };
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(ConversionError::from)?;

    if logging::enabled(crate::args::Verbosity::Warning)
        && let Some(stderr) = child.stderr.take()
    {
        let solver_name = solver.name.clone();
        tokio::spawn(async move {
            let reader = BufReader::new(stderr);
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                logging::warning!("conversion for '{solver_name}': {line}");
            }
        });
    }

    let status = tokio::select! {
        _ = cancellation_token.cancelled() => {
            Err(Error::Cancelled(solver.name.clone()))
        }
        result = child.wait() => {
            result.map_err(|e| Error::Conversion(ConversionError::from(e)))
        }
    };

    let status = status?;
    if !status.success() {
        return Err(ConversionError::CommandFailed(status).into());
    }
    Ok(())
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("conversion was cancelled for solver '{0}'")]
    Cancelled(String),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("command failed: {0}")]
    CommandFailed(std::process::ExitStatus),
    #[error("solver '{0}' has an empty conversion command")]
    EmptyCommand(String),
    #[error("IO error during temporary file use")]
    TempFile(std::io::Error),
    #[error("IO error")]
    Io(#[from] tokio::io::Error),
}

impl IsCancelled for Error {
    fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled(_) => true,
            Error::Conversion(_) => false,
        }
    }
}
