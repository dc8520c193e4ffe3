use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dockhand")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Keep a Portainer instance in line with a declaration file", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Declaration file
    #[arg(short, long, global = true, default_value = "dockhand.toml", env = "DOCKHAND_FILE")]
    pub file: PathBuf,

    /// State file (defaults to state.json under the state directory)
    #[arg(long, global = true)]
    pub state: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create or update every declared resource
    Apply(ApplyArgs),

    /// Delete tracked resources
    Destroy(DestroyArgs),

    /// Adopt an existing remote resource into the state file
    Import(ImportArgs),

    /// List resource kinds, or show the fields of one kind
    Kinds {
        /// Kind to describe
        kind: Option<String>,
    },

    /// Show tracked resources
    State,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Apply / Destroy
// ============================================================================

#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// Only apply this resource (`kind.name`) or kind, plus what it references
    #[arg(short, long)]
    pub target: Option<String>,

    /// Number of resources reconciled in parallel
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,

    /// Destroy tracked resources that are no longer declared
    #[arg(long)]
    pub prune: bool,

    /// Skip confirmation prompts
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Debug, Args)]
pub struct DestroyArgs {
    /// Only destroy this resource (`kind.name`) or kind, plus what references it
    #[arg(short, long)]
    pub target: Option<String>,

    /// Skip confirmation prompts
    #[arg(short, long)]
    pub yes: bool,
}

// ============================================================================
// Import
// ============================================================================

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Resource kind, e.g. `team`
    pub kind: String,

    /// Name to track the resource under
    pub name: String,

    /// Remote identifier of the existing resource
    pub identity: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_defaults() {
        let cli = Cli::parse_from(["dockhand", "apply"]);
        assert_eq!(cli.file, PathBuf::from("dockhand.toml"));
        assert!(cli.state.is_none());
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.jobs, 4);
        assert!(!args.prune);
        assert!(!args.yes);
        assert!(args.target.is_none());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "dockhand", "destroy", "--target", "team.ops", "-vv", "--file", "prod.toml", "-y",
        ]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.file, PathBuf::from("prod.toml"));
        let Command::Destroy(args) = cli.command else {
            panic!("expected destroy");
        };
        assert_eq!(args.target.as_deref(), Some("team.ops"));
        assert!(args.yes);
    }

    #[test]
    fn test_import_positionals() {
        let cli = Cli::parse_from(["dockhand", "import", "team", "ops", "7"]);
        let Command::Import(args) = cli.command else {
            panic!("expected import");
        };
        assert_eq!((args.kind.as_str(), args.name.as_str(), args.identity.as_str()), ("team", "ops", "7"));
    }
}
