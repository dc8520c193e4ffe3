//! `dockhand destroy`

use anyhow::Result;
use colored::Colorize;

use crate::Context;
use crate::cli::DestroyArgs;
use crate::declarations::DeclarationFile;
use crate::executor::Executor;
use crate::plan::Plan;
use crate::progress;
use crate::state::StateFile;
use crate::ui;

pub fn run(ctx: &Context, args: &DestroyArgs) -> Result<()> {
    let state_path = super::state_path(ctx)?;
    let mut state = StateFile::load(&state_path)?;
    if state.is_empty() {
        ui::info("Nothing is tracked");
        return Ok(());
    }

    let plan = teardown(&state, args.target.as_deref())?;

    if !ctx.quiet {
        ui::header(&format!("Destroying {} resource(s)", plan.len()));
        for key in plan.keys() {
            let identity = state
                .get(key)
                .map(|entry| entry.identity.to_string())
                .unwrap_or_default();
            println!("  {} {} {}", "-".red(), key, identity.dimmed());
        }
        println!();
    }

    if !args.yes && !super::confirm(&format!("Destroy {} resource(s)?", plan.len()))? {
        ui::warn("Aborted");
        return Ok(());
    }

    // Credentials still come from the declaration file when there is one
    let declarations = DeclarationFile::load_or_default(&ctx.file)?;
    let engine = super::connect(&declarations.provider)?;
    let executor = Executor::new(&engine, super::DEFAULT_JOBS)?;

    let pb = progress::bar(plan.len() as u64, "Destroying", ctx.quiet);
    let report = executor.destroy(&plan, &mut state, &pb, |s| s.save(&state_path))?;
    pb.finish_and_clear();

    super::print_report(ctx, &report);
    let summary = report.summary();
    super::print_summary(ctx, &summary);
    super::finish(&summary)
}

/// Tracked resources in teardown order, optionally narrowed to a target
/// and everything that references it
fn teardown(state: &StateFile, target: Option<&str>) -> Result<Plan> {
    let plan = Plan::build(state.nodes())?.reversed();
    match target {
        Some(target) => Ok(plan.select(target)?),
        None => Ok(plan),
    }
}
