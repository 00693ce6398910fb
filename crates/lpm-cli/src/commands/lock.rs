//! `lpm lock` and `lpm check`.

use super::{print_json, Context};
use miette::Result;

/// Regenerate the project's lock file from the registry.
pub fn lock(ctx: &Context) -> Result<()> {
    let dir = ctx.project_dir();
    let lock = ctx.check(ctx.tracker().regenerate_lock(&dir))?;

    if ctx.json {
        print_json(&serde_json::json!({ "ok": true, "dir": dir, "lock": lock }));
    } else {
        println!(
            "Wrote {} ({} package{})",
            lpm_core::paths::lock_path(&dir).display(),
            lock.pkgs.len(),
            if lock.pkgs.len() == 1 { "" } else { "s" }
        );
    }
    Ok(())
}

/// Report disagreements between the lock file and the registry. Exits 1 if any.
pub fn check(ctx: &Context) -> Result<()> {
    let dir = ctx.project_dir();
    let issues = ctx.check(ctx.tracker().check(&dir))?;

    if ctx.json {
        print_json(&serde_json::json!({ "ok": issues.is_empty(), "issues": issues }));
    } else if issues.is_empty() {
        println!("Lock file is up to date");
    } else {
        for issue in &issues {
            println!("{issue}");
        }
        println!("Run `lpm pull <name>` or `lpm lock` to refresh.");
    }

    if !issues.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}
