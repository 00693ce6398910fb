//! `lpm publish` and `lpm unpublish`.

use super::{print_json, Context};
use miette::Result;
use std::path::PathBuf;

/// Publish the package in the current project directory.
pub fn publish(ctx: &Context, dir: Option<PathBuf>) -> Result<()> {
    let dir = dir.map_or_else(|| ctx.project_dir(), |d| ctx.config.cwd.join(d));
    let outcome = ctx.check(ctx.tracker().publish(&dir))?;

    if ctx.json {
        print_json(&serde_json::json!({ "ok": true, "published": outcome }));
    } else {
        println!(
            "Published {}@{} -> {}",
            outcome.name,
            outcome.version,
            outcome.resolve.display()
        );
        if !outcome.installations.is_empty() {
            println!(
                "{} installation(s) can be updated with `lpm push {}`",
                outcome.installations.len(),
                outcome.name
            );
        }
    }
    Ok(())
}

pub fn unpublish(ctx: &Context, reference: &str) -> Result<()> {
    let entry = ctx.check(ctx.tracker().unpublish(reference))?;

    if ctx.json {
        print_json(&serde_json::json!({
            "ok": true,
            "removed": entry.resolve,
            "orphaned": entry.installations,
        }));
    } else {
        println!("Unpublished {reference}");
        for dir in &entry.installations {
            println!("  warning: still installed in {}", dir.display());
        }
    }
    Ok(())
}
