//! `dockhand apply`

use anyhow::Result;
use reconcile::RemoteClient;
use std::collections::BTreeSet;
use std::path::Path;

use crate::Context;
use crate::cli::ApplyArgs;
use crate::declarations::{DeclarationFile, ResourceKey};
use crate::executor::{Executor, Report, Summary};
use crate::plan::Plan;
use crate::progress;
use crate::state::StateFile;
use crate::ui;

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let declarations = DeclarationFile::load(&ctx.file)?;
    let engine = super::connect(&declarations.provider)?;
    declarations.check(engine.registry())?;

    let mut plan = Plan::build(declarations.nodes())?;
    if let Some(target) = &args.target {
        plan = plan.select(target)?;
    }

    let state_path = super::state_path(ctx)?;
    let mut state = StateFile::load(&state_path)?;
    let executor = Executor::new(&engine, args.jobs)?;

    if !ctx.quiet {
        ui::header(&format!(
            "Applying {} resource(s) from {}",
            plan.len(),
            ctx.file.display()
        ));
    }

    let mut summary = converge(ctx, &executor, &plan, &declarations, &mut state, &state_path)?;

    if args.prune {
        if args.target.is_some() {
            ui::warn("--prune is ignored together with --target");
        } else if let Some(pruned) =
            prune(ctx, args, &executor, &declarations, &mut state, &state_path)?
        {
            summary.deleted += pruned.deleted;
            summary.failed += pruned.failed;
            summary.skipped += pruned.skipped;
        }
    }

    super::print_summary(ctx, &summary);
    super::finish(&summary)
}

fn converge<C: RemoteClient>(
    ctx: &Context,
    executor: &Executor<'_, C>,
    plan: &Plan,
    declarations: &DeclarationFile,
    state: &mut StateFile,
    state_path: &Path,
) -> Result<Summary> {
    if plan.is_empty() {
        ui::dim("Nothing declared");
        return Ok(Summary::default());
    }

    let pb = progress::bar(plan.len() as u64, "Applying", ctx.quiet);
    let report = executor.apply(plan, declarations, state, &pb, |s| s.save(state_path))?;
    pb.finish_and_clear();

    super::print_report(ctx, &report);
    Ok(report.summary())
}

/// Tracked resources that are no longer declared, in teardown order
fn orphans(declarations: &DeclarationFile, state: &StateFile) -> Result<Plan> {
    let declared = declarations.keys();
    let orphaned: BTreeSet<ResourceKey> = state
        .resources
        .keys()
        .filter(|k| !declared.contains(*k))
        .cloned()
        .collect();

    let nodes = state
        .nodes()
        .into_iter()
        .filter(|(key, _)| orphaned.contains(key))
        .map(|(key, deps)| {
            let deps = deps.into_iter().filter(|d| orphaned.contains(d)).collect();
            (key, deps)
        });
    Ok(Plan::build(nodes)?.reversed())
}

fn prune<C: RemoteClient>(
    ctx: &Context,
    args: &ApplyArgs,
    executor: &Executor<'_, C>,
    declarations: &DeclarationFile,
    state: &mut StateFile,
    state_path: &Path,
) -> Result<Option<Summary>> {
    let plan = orphans(declarations, state)?;
    if plan.is_empty() {
        return Ok(None);
    }

    if !ctx.quiet {
        ui::section(&format!("{} resource(s) are no longer declared", plan.len()));
        for key in plan.keys() {
            ui::dim(&key.to_string());
        }
    }
    if !args.yes && !super::confirm("Destroy them?")? {
        ui::warn("Pruning skipped");
        return Ok(None);
    }

    let pb = progress::bar(plan.len() as u64, "Pruning", ctx.quiet);
    let report: Report = executor.destroy(&plan, state, &pb, |s| s.save(state_path))?;
    pb.finish_and_clear();

    super::print_report(ctx, &report);
    Ok(Some(report.summary()))
}
