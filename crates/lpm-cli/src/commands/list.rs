//! `lpm ls` and `lpm installations`.

use super::{print_json, Context};
use miette::Result;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PublishedVersion {
    version: String,
    resolve: PathBuf,
    publish_signature: String,
    installations: usize,
}

#[derive(Serialize)]
struct PublishedPackage {
    name: String,
    versions: Vec<PublishedVersion>,
}

/// List everything in the registry.
pub fn ls(ctx: &Context) -> Result<()> {
    let registry = ctx.check(ctx.tracker().store().read())?;

    let packages: Vec<PublishedPackage> = registry
        .version_tree
        .iter()
        .map(|(name, versions)| PublishedPackage {
            name: name.clone(),
            versions: versions
                .iter()
                .filter_map(|v| {
                    registry.get(name, v).map(|entry| PublishedVersion {
                        version: v.clone(),
                        resolve: entry.resolve.clone(),
                        publish_signature: entry.publish_signature.clone(),
                        installations: entry.installations.len(),
                    })
                })
                .collect(),
        })
        .collect();

    if ctx.json {
        print_json(&serde_json::json!({ "ok": true, "packages": packages }));
        return Ok(());
    }

    if packages.is_empty() {
        println!("No packages published");
    }
    for package in &packages {
        println!("{}", package.name);
        for v in &package.versions {
            println!(
                "  {} ({}) {} installation{}",
                v.version,
                v.publish_signature,
                v.installations,
                if v.installations == 1 { "" } else { "s" }
            );
        }
    }
    Ok(())
}

pub fn installations(ctx: &Context, reference: &str) -> Result<()> {
    let by_version = ctx.check(ctx.tracker().installations(reference))?;

    if ctx.json {
        print_json(&serde_json::json!({ "ok": true, "installations": by_version }));
        return Ok(());
    }

    for (version, dirs) in &by_version {
        println!("{version}");
        if dirs.is_empty() {
            println!("  (not installed)");
        }
        for dir in dirs {
            println!("  {}", dir.display());
        }
    }
    Ok(())
}
