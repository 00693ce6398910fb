//! `lpm upgrade`, `lpm pull` and `lpm push`: moving consumers to newer publishes.

use super::{print_json, Context};
use miette::Result;

pub fn upgrade(ctx: &Context, name: Option<&str>, latest: bool) -> Result<()> {
    let dir = ctx.project_dir();
    let upgrades = ctx.check(ctx.tracker().upgrade(name, &dir, latest, ctx.no_install))?;

    if ctx.json {
        print_json(&serde_json::json!({ "ok": true, "upgraded": upgrades }));
    } else if upgrades.is_empty() {
        println!("Everything is up to date");
    } else {
        for upgrade in &upgrades {
            println!(
                "{} {} -> {}",
                upgrade.name,
                upgrade.from.as_deref().unwrap_or("?"),
                upgrade.to
            );
        }
    }
    Ok(())
}

pub fn pull(ctx: &Context, name: &str) -> Result<()> {
    let dir = ctx.project_dir();
    let outcome = ctx.check(ctx.tracker().pull(name, &dir, ctx.no_install))?;

    if ctx.json {
        print_json(&serde_json::json!({ "ok": true, "pulled": outcome }));
    } else {
        println!("Pulled {}@{}", outcome.name, outcome.to);
    }
    Ok(())
}

/// Push a package to its consumers. Without a reference, pushes the current project.
pub fn push(ctx: &Context, reference: Option<&str>) -> Result<()> {
    let reference = match reference {
        Some(r) => r.to_string(),
        None => ctx.project_name()?,
    };
    let report = ctx.check(ctx.tracker().push(&reference, ctx.no_install))?;

    if ctx.json {
        print_json(&serde_json::json!({
            "ok": report.is_success(),
            "packages": report.packages,
            "updated": report.updated,
            "failures": report.failures,
            "cycles": report.cycles,
        }));
    } else {
        for target in &report.updated {
            print!(
                "Updated {} -> {}@{}",
                target.dir.display(),
                target.package,
                target.version
            );
            match &target.republished {
                Some(name) => println!(" (republished {name})"),
                None => println!(),
            }
        }
        for cycle in &report.cycles {
            println!("warning: cycle {} -> {} not followed", cycle.from, cycle.to);
        }
        for failure in &report.failures {
            eprintln!(
                "error: [{}] {}: {}",
                failure.code,
                failure.dir.display(),
                failure.message
            );
        }
        println!(
            "Pushed {} to {} director{} ({} failed)",
            report.packages.join(", "),
            report.updated.len(),
            if report.updated.len() == 1 { "y" } else { "ies" },
            report.failures.len()
        );
    }

    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
