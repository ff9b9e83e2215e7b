use crate::args::Args;
use crate::config::Config;
use crate::logging;
use crate::solver_output::dzn::ERROR_TERMINATOR;
use crate::sunny::sunny;
use crate::supervisor::Outcome;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

/// Runs the portfolio for `args`. Infrastructure errors are reported on
/// stdout with the MiniZinc error status line and exit code 1.
pub async fn run(args: Args) -> ExitCode {
    logging::init(args.debug_verbosity);
    let config = Config::new(&args);
    let token = CancellationToken::new();

    match sunny(&args, &config, token).await {
        Ok(report) => {
            match &report.outcome {
                Outcome::Proved(winner) => {
                    logging::info!("solver '{}' won: {:?}", winner.solver, winner.proof)
                }
                outcome => logging::info!("no proof found: {outcome:?}"),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            logging::error!(e.into());
            println!("{ERROR_TERMINATOR}");
            ExitCode::FAILURE
        }
    }
}
