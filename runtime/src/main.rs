// Copyright 2026 StatWatch Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use statwatch_runtime::cli;
use statwatch_runtime::config::{RunArgs, SourceArgs};

#[derive(Parser)]
#[command(
    name = "statwatch",
    about = "StatWatch — watch a statistics page and push changed figures to Telegram",
    version,
    after_help = "Run 'statwatch <command> --help' for details on each command.\nWith no command, 'statwatch' runs the watch loop configured from STATWATCH_* variables."
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the page and push a report whenever a value changes
    Run(RunArgs),
    /// Fetch the page once and print the extracted values
    Check {
        #[command(flatten)]
        source: SourceArgs,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let result = match cli.command {
        None => cli::run_cmd::run(&RunArgs::default()).await,
        Some(Commands::Run(args)) => cli::run_cmd::run(&args).await,
        Some(Commands::Check { source, json }) => cli::check_cmd::run(&source, json).await,
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "statwatch", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        eprintln!("  Error: {e:#}");
        std::process::exit(1);
    }

    result
}
