//! `lpm backup ls` and `lpm backup revert`.

use super::{print_json, Context, CONFIRMATION_REQUIRED};
use miette::Result;
use std::time::{Duration, UNIX_EPOCH};

pub fn list(ctx: &Context) -> Result<()> {
    let tracker = ctx.tracker();
    let backups = ctx.check(tracker.store().backups().list())?;

    if ctx.json {
        print_json(&serde_json::json!({ "ok": true, "backups": backups }));
        return Ok(());
    }

    if backups.is_empty() {
        println!("No backups in {}", tracker.store().backups().dir().display());
    }
    for backup in &backups {
        let age = UNIX_EPOCH
            .checked_add(Duration::from_millis(backup.modified_ms))
            .and_then(|t| t.elapsed().ok())
            .map_or_else(|| "?".to_string(), |d| format!("{}s ago", d.as_secs()));
        let packages = backup
            .packages
            .map_or_else(|| "unreadable".to_string(), |n| format!("{n} packages"));
        println!("{}  {age:>10}  {:>8} bytes  {packages}", backup.id, backup.size);
    }
    Ok(())
}

/// Replace the live registry with snapshot `id`. Refuses without `yes`.
pub fn revert(ctx: &Context, id: &str, yes: bool) -> Result<()> {
    let tracker = ctx.tracker();
    if !yes {
        let message = format!(
            "reverting overwrites {} with backup {id}",
            tracker.store().path().display()
        );
        if ctx.json {
            print_json(&serde_json::json!({
                "ok": false,
                "error": {
                    "code": CONFIRMATION_REQUIRED,
                    "message": message,
                    "hint": "re-run with --yes",
                }
            }));
        } else {
            eprintln!("error: {message}");
            eprintln!("hint: re-run with --yes");
        }
        std::process::exit(1);
    }

    let registry = ctx.check(tracker.store().revert(id))?;
    if ctx.json {
        print_json(&serde_json::json!({
            "ok": true,
            "reverted": id,
            "packages": registry.packages.len(),
        }));
    } else {
        println!(
            "Restored backup {id} ({} packages) to {}",
            registry.packages.len(),
            tracker.store().path().display()
        );
    }
    Ok(())
}
