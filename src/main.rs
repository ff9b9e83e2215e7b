use clap::Parser;
use std::process::ExitCode;
use sunny_portfolio::args::Args;
use sunny_portfolio::cli;

#[tokio::main]
async fn main() -> ExitCode {
    cli::run(Args::parse()).await
}
