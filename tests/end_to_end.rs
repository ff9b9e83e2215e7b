use assert_cmd::Command;

use predicates::prelude::PredicateBooleanExt;
use predicates::prelude::predicate::str::contains;

fn sunny() -> Command {
    let path = assert_cmd::cargo::cargo_bin!("sunny-portfolio");
    let mut cmd = Command::new(path);
    cmd.args([
        "tests/data/model.mzn",
        "--lims",
        "tests/data/lims.json",
        "--features",
        "tests/data/features.csv",
        "--solvers",
        "tests/data/solvers.json",
        "--goal",
        "sat",
        "-T",
        "10",
        "--kb-timeout",
        "10",
        "-p",
        "1",
        "--debug-verbosity",
        "warning",
    ]);
    cmd
}

#[test]
fn test_cli_success() {
    sunny()
        .args(["--kb", "tests/data/kb.txt", "-P", "good,idle", "-b", "good"])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(contains("x = 3;").and(contains("----------")));
}

#[test]
fn test_cli_static_schedule() {
    sunny()
        .args(["--kb", "tests/data/kb.txt", "-s", "tests/data/static.csv"])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(contains("x = 3;"));
}

#[test]
fn test_cli_corrupt_kb() {
    sunny()
        .args(["--kb", "tests/data/kb_corrupt.txt"])
        .assert()
        .failure()
        .code(1)
        .stdout(contains("=====ERROR====="))
        .stderr(contains("corrupt knowledge base"));
}

#[test]
fn test_cli_unknown_portfolio_solver() {
    sunny()
        .args(["--kb", "tests/data/kb.txt", "-P", "good,yuck"])
        .assert()
        .failure()
        .code(1)
        .stdout(contains("=====ERROR====="));
}
