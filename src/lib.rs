pub mod ai;
pub mod args;
pub mod cli;
pub mod combinations;
pub mod config;
pub mod features;
pub mod insert_objective;
pub mod is_cancelled;
pub mod knowledge_base;
pub mod logging;
pub mod mzn_to_fzn;
pub mod problem;
pub mod process_tree;
pub mod run_context;
pub mod schedule;
pub mod signal_handler;
pub mod solver_config;
pub mod solver_output;
pub mod solvers;
pub mod static_schedule;
pub mod sunny;
pub mod supervisor;
