mod cli;
mod commands;
mod declarations;
mod executor;
mod paths;
mod plan;
mod progress;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// Declaration file
    pub file: PathBuf,
    /// Explicit state file, if one was given
    pub state: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        file: cli.file,
        state: cli.state,
    };

    match cli.command {
        Command::Apply(args) => commands::apply::run(&ctx, &args),
        Command::Destroy(args) => commands::destroy::run(&ctx, &args),
        Command::Import(args) => commands::import::run(&ctx, &args),
        Command::Kinds { kind } => commands::kinds::run(&ctx, kind.as_deref()),
        Command::State => commands::state::run(&ctx),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "dockhand", &mut io::stdout());
            Ok(())
        }
    }
}
