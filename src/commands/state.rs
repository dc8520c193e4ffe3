//! `dockhand state`

use anyhow::Result;
use colored::Colorize;
use reconcile::Severity;

use crate::Context;
use crate::state::{ResourceState, StateFile};
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let path = super::state_path(ctx)?;
    let state = StateFile::load(&path)?;

    ui::header(&format!("State: {}", path.display()));
    if state.is_empty() {
        ui::dim("Nothing is tracked");
        return Ok(());
    }
    if let Some(updated) = state.last_updated {
        ui::kv("updated", &updated.format("%Y-%m-%d %H:%M:%S UTC").to_string());
    }
    println!();

    for (key, entry) in &state.resources {
        println!(
            "  {:<36} {:<10} {}",
            key.to_string().bold(),
            identity_label(entry),
            ui::state_label(entry.status)
        );
        for diag in &entry.diagnostics {
            if diag.severity > Severity::Info || ctx.verbose > 0 {
                ui::diagnostic(diag);
            }
        }
        if !entry.pending_steps.is_empty() {
            ui::dim(&format!("  pending steps: {}", entry.pending_steps.join(", ")));
        }
        if ctx.verbose > 1 {
            if !entry.depends_on.is_empty() {
                let deps: Vec<String> = entry.depends_on.iter().map(ToString::to_string).collect();
                ui::dim(&format!("  depends on {}", deps.join(", ")));
            }
            ui::dim(&format!("  updated {}", entry.updated_at.to_rfc3339()));
        }
    }

    println!();
    ui::dim(&format!("{} resource(s) tracked", state.len()));
    Ok(())
}

fn identity_label(entry: &ResourceState) -> String {
    if entry.unresolved {
        "unresolved".to_string()
    } else if entry.identity.is_empty() {
        "-".to_string()
    } else {
        ui::truncate(entry.identity.as_str(), 10)
    }
}
