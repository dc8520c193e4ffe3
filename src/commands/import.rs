//! `dockhand import`

use anyhow::{Context as AnyhowContext, Result};
use reconcile::{DesiredState, Identity, ResourceSpec};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::Context;
use crate::cli::ImportArgs;
use crate::declarations::{Declaration, DeclarationFile, ResourceKey};
use crate::state::StateFile;
use crate::ui;

pub fn run(ctx: &Context, args: &ImportArgs) -> Result<()> {
    let key = ResourceKey::new(&args.kind, &args.name);
    let declarations = DeclarationFile::load_or_default(&ctx.file)?;
    let engine = super::connect(&declarations.provider)?;
    let spec = engine.registry().get(&args.kind)?;

    let state_path = super::state_path(ctx)?;
    let mut state = StateFile::load(&state_path)?;
    if let Some(existing) = state.identity(&key) {
        anyhow::bail!("{key} is already tracked as {existing}; destroy it first to import again");
    }

    let declared = declarations.get(&key);
    let (hints, depends_on) = match declared {
        Some(declaration) => (
            declaration.resolve(spec, |target| state.identity(target))?,
            declaration.references(),
        ),
        None => (DesiredState::new(), BTreeSet::new()),
    };

    let result = engine
        .import(&args.kind, &Identity::new(&args.identity), &hints)
        .with_context(|| format!("Failed to import {key}"))?;
    state.record(&key, &result, depends_on);
    state.save(&state_path)?;

    ui::success(&format!("Imported {key} ({})", result.identity));
    for diag in &result.diagnostics {
        ui::diagnostic(diag);
    }

    if declared.is_none() && !ctx.quiet {
        ui::section(&format!("Add this to {}:", ctx.file.display()));
        println!();
        print!("{}", snippet(spec, &key, &result.desired)?);
    }
    Ok(())
}

#[derive(Serialize)]
struct Snippet<'a> {
    resource: [&'a Declaration; 1],
}

/// `[[resource]]` block for an imported resource, without computed or
/// sensitive fields
fn snippet(spec: &ResourceSpec, key: &ResourceKey, desired: &DesiredState) -> Result<String> {
    let fields: BTreeMap<String, serde_json::Value> = desired
        .iter()
        .filter(|(name, value)| {
            !value.is_null()
                && spec
                    .field(name)
                    .is_some_and(|field| !field.computed && !field.sensitive)
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    let declaration = Declaration {
        kind: key.kind.clone(),
        name: key.name.clone(),
        fields,
    };
    toml::to_string(&Snippet {
        resource: [&declaration],
    })
    .context("Failed to render declaration")
}
