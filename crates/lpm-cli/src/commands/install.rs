//! `lpm add` and `lpm remove`.

use super::{print_json, Context};
use lpm_core::pkg::{AddOptions, AddOutcome};
use miette::Result;

pub fn add(ctx: &Context, references: &[String], options: &AddOptions) -> Result<()> {
    let tracker = ctx.tracker();
    let dir = ctx.project_dir();

    let mut added: Vec<AddOutcome> = Vec::new();
    for reference in references {
        added.extend(ctx.check(tracker.add(reference, &dir, options))?);
    }

    if ctx.json {
        print_json(&serde_json::json!({ "ok": true, "dir": dir, "added": added }));
    } else {
        for outcome in &added {
            let via = if outcome.traversed { " (imported)" } else { "" };
            println!(
                "Added {}@{}{via} [{}, {}]",
                outcome.name,
                outcome.version,
                outcome.entry.dependency_scope,
                outcome.entry.install_type.as_str()
            );
        }
    }
    Ok(())
}

pub fn remove(ctx: &Context, names: &[String]) -> Result<()> {
    let tracker = ctx.tracker();
    let dir = ctx.project_dir();

    for name in names {
        ctx.check(tracker.remove(name, &dir))?;
        if !ctx.json {
            println!("Removed {name}");
        }
    }

    if ctx.json {
        print_json(&serde_json::json!({ "ok": true, "dir": dir, "removed": names }));
    }
    Ok(())
}
