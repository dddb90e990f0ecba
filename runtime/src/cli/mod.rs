//! CLI subcommand implementations for the StatWatch binary.

pub mod check_cmd;
pub mod run_cmd;
