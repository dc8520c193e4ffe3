pub mod apply;
pub mod destroy;
pub mod import;
pub mod kinds;
pub mod state;

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use portainer::{ClientConfig, HttpClient, ProviderSettings};
use reconcile::{Reconciler, Severity};
use std::path::PathBuf;

use crate::Context;
use crate::executor::{Outcome, Report, Summary};
use crate::paths;
use crate::ui;

/// Resources reconciled in parallel when a command has no `--jobs`
pub const DEFAULT_JOBS: usize = 4;

fn state_path(ctx: &Context) -> Result<PathBuf> {
    let path = paths::state_file(ctx.state.as_deref())?;
    log::debug!("Using state file {}", path.display());
    Ok(path)
}

fn connect(provider: &ProviderSettings) -> Result<Reconciler<HttpClient>> {
    let config =
        ClientConfig::resolve(provider).context("Failed to resolve Portainer connection settings")?;
    log::info!("Connecting to {}", config.endpoint);
    portainer::connect(&config).context("Failed to build resource registry")
}

fn confirm(prompt: &str) -> Result<bool> {
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}

/// Print one line per resource, with its diagnostics
fn print_report(ctx: &Context, report: &Report) {
    if ctx.quiet {
        for (key, outcome) in &report.entries {
            if let Outcome::Failed(message) = outcome {
                ui::error(&format!("{key}: {message}"));
            }
        }
        return;
    }

    println!();
    for (key, outcome) in &report.entries {
        match outcome {
            Outcome::Done(result) => {
                let identity = if result.identity.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", result.identity)
                };
                println!(
                    "  {} {}{} {}",
                    ui::action_symbol(result.action),
                    key,
                    identity.dimmed(),
                    ui::state_label(result.state)
                );
                for diag in &result.diagnostics {
                    if diag.severity > Severity::Info || ctx.verbose > 0 {
                        ui::diagnostic(diag);
                    }
                }
            }
            Outcome::Failed(message) => {
                println!("  {} {}", "✗".red(), key);
                println!("    {}", message.red());
            }
            Outcome::Skipped(reason) => {
                println!("  {} {} {}", "⊘".dimmed(), key, reason.dimmed());
            }
        }
    }
}

fn print_summary(ctx: &Context, summary: &Summary) {
    if ctx.quiet {
        return;
    }
    println!();
    if summary.is_success() && summary.total_changes() == 0 && summary.imported == 0 {
        ui::success("Everything is up to date");
    } else if summary.is_success() {
        ui::success("Done");
    } else {
        ui::warn("Finished with problems");
    }

    let counts = [
        (summary.created, "created"),
        (summary.updated, "updated"),
        (summary.unchanged, "unchanged"),
        (summary.deleted, "deleted"),
        (summary.imported, "imported"),
        (summary.pending, "pending (run apply again)"),
        (summary.skipped, "skipped"),
        (summary.failed, "failed"),
    ];
    for (count, label) in counts {
        if count > 0 {
            println!("    • {count} {label}");
        }
    }
}

/// Turn an unsuccessful summary into a non-zero exit
fn finish(summary: &Summary) -> Result<()> {
    if summary.is_success() {
        Ok(())
    } else {
        anyhow::bail!(
            "{} resource(s) failed, {} skipped, {} pending",
            summary.failed,
            summary.skipped,
            summary.pending
        )
    }
}
