//! `dockhand kinds`

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use reconcile::{DeleteOp, FieldSpec, IdentitySource, Mutability, ResourceSpec, SpecRegistry};

use crate::Context;
use crate::ui;

pub fn run(ctx: &Context, kind: Option<&str>) -> Result<()> {
    let registry = portainer::spec_registry().context("Failed to build resource registry")?;
    match kind {
        None => {
            list(&registry);
            Ok(())
        }
        Some(kind) => {
            describe(ctx, registry.get(kind)?);
            Ok(())
        }
    }
}

fn list(registry: &SpecRegistry) {
    ui::header("Resource kinds");
    for spec in registry.iter() {
        println!(
            "  {:<18} {}",
            spec.kind().bold(),
            spec.description().dimmed()
        );
    }
    println!();
    ui::dim("Run `dockhand kinds <kind>` for its fields");
}

fn describe(ctx: &Context, spec: &ResourceSpec) {
    ui::header(spec.kind());
    if !spec.description().is_empty() {
        println!("{}", spec.description());
    }

    ui::section("Operations");
    for (name, value) in operations(spec) {
        ui::kv(name, &value);
    }

    ui::section("Fields");
    for field in spec.fields() {
        println!(
            "  {:<22} {:<13} {}",
            field.name.bold(),
            field.field_type.to_string(),
            field_flags(field).join(", ").dimmed()
        );
        if !field.description.is_empty() && !ctx.quiet {
            ui::dim(&format!("  {}", field.description));
        }
    }
}

/// Human summary of what the engine can do with a kind
fn operations(spec: &ResourceSpec) -> Vec<(&'static str, String)> {
    let identity = match spec.identity_source() {
        IdentitySource::Response(path) if spec.natural_key().is_empty() => {
            format!("create response `{path}`")
        }
        IdentitySource::Response(path) => format!(
            "create response `{path}`, else lookup by {}",
            spec.natural_key().join(", ")
        ),
        IdentitySource::Field(name) => format!("value of `{name}`"),
        IdentitySource::Fixed(id) => format!("fixed `{id}`"),
        IdentitySource::Template(template) => format!("template `{template}`"),
    };
    let read = match spec.read() {
        Some(route) if spec.reads_via_list() => {
            format!("{} {} (falls back to listing)", route.method, route.path)
        }
        Some(route) => format!("{} {}", route.method, route.path),
        None => "unsupported; state echoes the last apply".to_string(),
    };
    let update = match spec.update() {
        Some(op) => format!("{} {}", op.route.method, op.route.path),
        None => "none; changes conflict".to_string(),
    };
    let delete = match spec.delete() {
        DeleteOp::Remote(route) => format!("{} {}", route.method, route.path),
        DeleteOp::Forget => "forget only".to_string(),
    };
    let create = spec.create();
    let mut ops = vec![
        ("identity", identity),
        ("create", format!("{} {}", create.route.method, create.route.path)),
        ("read", read),
        ("update", update),
        ("delete", delete),
        ("import", if spec.is_importable() { "yes" } else { "no" }.to_string()),
    ];
    if !spec.compensation().is_empty() {
        let steps: Vec<&str> = spec.compensation().iter().map(|s| s.name.as_str()).collect();
        ops.push(("follow-up", steps.join(", ")));
    }
    ops
}

fn field_flags(field: &FieldSpec) -> Vec<String> {
    let mut flags = Vec::new();
    if field.required {
        flags.push("required".to_string());
    }
    if field.computed {
        flags.push("computed".to_string());
    } else if field.mutability == Mutability::Mutable {
        flags.push("mutable".to_string());
    } else {
        flags.push("immutable".to_string());
    }
    if field.sensitive {
        flags.push("sensitive".to_string());
    }
    flags.push(format!("{} authority", field.authority()));
    if let Some(default) = &field.default {
        flags.push(format!("default {default}"));
    }
    flags
}
