#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::unnecessary_wraps)]

mod commands;
mod logging;

use clap::Parser;
use commands::Context;
use lpm_core::paths;
use lpm_core::pkg::{AddOptions, InstallType, PackageManagerKind, VersionSymbol};
use lpm_core::{Config, DependencyScope};
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "lpm")]
#[command(author, version, about = "A local filesystem-backed package registry", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    /// Root of the registry, backups and package store
    #[arg(long, global = true, value_name = "PATH", env = "LPM_HOME")]
    home: Option<PathBuf>,

    /// Package manager to run after dependency entries change
    #[arg(long, global = true, value_name = "yarn|pnpm|npm")]
    package_manager: Option<PackageManagerKind>,

    /// Only update lpm bookkeeping; do not run the package manager
    #[arg(long, global = true)]
    no_install: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Publish the package in the current directory to the local registry
    Publish {
        /// Package directory (defaults to the current project)
        dir: Option<PathBuf>,
    },

    /// Remove a published version from the registry and the store
    Unpublish {
        /// Package reference, e.g. `@scope/name@1.2.0`
        reference: String,
    },

    /// Install published packages into the current project
    Add {
        /// Package references, e.g. `ui`, `ui@^1.2.0`, `@scope/ui@!1.0.0`
        #[arg(required = true)]
        references: Vec<String>,

        /// Save to devDependencies
        #[arg(short = 'D', long, conflicts_with_all = ["peer", "optional"])]
        dev: bool,

        /// Save to peerDependencies
        #[arg(long, conflicts_with = "optional")]
        peer: bool,

        /// Save to optionalDependencies
        #[arg(long)]
        optional: bool,

        /// Link the store copy instead of importing it
        #[arg(long)]
        link: bool,

        /// Pin the exact version
        #[arg(long, conflicts_with = "tilde")]
        exact: bool,

        /// Allow patch updates only
        #[arg(long)]
        tilde: bool,

        /// Also add what the imported package's own lpm.lock lists
        #[arg(long)]
        traverse: bool,
    },

    /// Stop consuming packages in the current project
    Remove {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Move locked packages to the newest version their range allows
    Upgrade {
        /// Upgrade only this package
        name: Option<String>,

        /// Ignore the recorded range and take the newest version
        #[arg(long)]
        latest: bool,
    },

    /// Propagate a published package to every directory consuming it
    Push {
        /// Package reference (defaults to the current project's package)
        reference: Option<String>,

        /// Worker threads for updating consumers
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Refresh one locked package in the current project
    Pull { name: String },

    /// Regenerate lpm.lock from the registry
    Lock,

    /// Compare lpm.lock with the registry
    Check,

    /// List the directories consuming a package
    Installations { reference: String },

    /// List published packages
    Ls,

    /// Inspect and restore registry backups
    Backup {
        #[command(subcommand)]
        backup_cmd: BackupCommands,
    },
}

#[derive(clap::Subcommand, Debug)]
enum BackupCommands {
    /// List snapshots, newest first
    Ls,

    /// Replace the registry with a snapshot
    Revert {
        /// Snapshot id as shown by `lpm backup ls`
        id: String,

        /// Confirm overwriting the live registry
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Version) {
        return commands::version::run(cli.json);
    }

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .map_or_else(|| PathBuf::from("."), |dir| paths::normalize_dir(&dir));
    // Store paths are written into lock files; the home must be absolute.
    let home = paths::normalize_dir(&cli.home.unwrap_or_else(paths::default_home));

    logging::init(cli.verbose, cli.json);

    let mut config = commands::check(cli.json, Config::load(&home))?
        .with_cwd(cwd)
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);
    if let Some(kind) = cli.package_manager {
        config = config.with_package_manager(kind);
    }
    let mut ctx = Context {
        config,
        json: cli.json,
        no_install: cli.no_install,
    };

    tracing::debug!(
        home = %ctx.config.home.display(),
        cwd = %ctx.config.cwd.display(),
        "Starting lpm"
    );

    match cli.command {
        Commands::Version => commands::version::run(ctx.json),
        Commands::Publish { dir } => commands::publish::publish(&ctx, dir),
        Commands::Unpublish { reference } => commands::publish::unpublish(&ctx, &reference),
        Commands::Add {
            references,
            dev,
            peer,
            optional,
            link,
            exact,
            tilde,
            traverse,
        } => {
            let scope = if dev {
                Some(DependencyScope::DevDependencies)
            } else if peer {
                Some(DependencyScope::PeerDependencies)
            } else if optional {
                Some(DependencyScope::OptionalDependencies)
            } else {
                None
            };
            let symbol = if exact {
                Some(VersionSymbol::Exact)
            } else if tilde {
                Some(VersionSymbol::Tilde)
            } else {
                None
            };
            let options = AddOptions {
                scope,
                install_type: link.then_some(InstallType::Link),
                symbol,
                traverse_imports: traverse.then_some(true),
                skip_install: ctx.no_install,
            };
            commands::install::add(&ctx, &references, &options)
        }
        Commands::Remove { names } => commands::install::remove(&ctx, &names),
        Commands::Upgrade { name, latest } => {
            commands::sync::upgrade(&ctx, name.as_deref(), latest)
        }
        Commands::Push { reference, jobs } => {
            if let Some(jobs) = jobs {
                ctx.config = ctx.config.with_jobs(jobs);
            }
            commands::sync::push(&ctx, reference.as_deref())
        }
        Commands::Pull { name } => commands::sync::pull(&ctx, &name),
        Commands::Lock => commands::lock::lock(&ctx),
        Commands::Check => commands::lock::check(&ctx),
        Commands::Installations { reference } => {
            commands::list::installations(&ctx, &reference)
        }
        Commands::Ls => commands::list::ls(&ctx),
        Commands::Backup { backup_cmd } => match backup_cmd {
            BackupCommands::Ls => commands::backup::list(&ctx),
            BackupCommands::Revert { id, yes } => commands::backup::revert(&ctx, &id, yes),
        },
    }
}
