//! `shotline` command-line front end.
//!
//! Every command prints one [`OperationStatus`] message and exits with code
//! 1 when it failed.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use shotline_pipeline::OperationStatus;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "shotline")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Shot pipeline: WIP versions, publishing, assemblies, and file locks")]
pub struct Cli {
    /// Project root (overrides SHOTLINE_PROJECT)
    #[arg(short, long, global = true, value_name = "DIR")]
    pub project: Option<PathBuf>,

    /// Acting user (overrides SHOTLINE_USER)
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a new project at ROOT
    Init {
        root: PathBuf,
        /// Project name; the file prefix is derived from it
        name: String,
        /// Allow free-form shot names
        #[arg(long)]
        single_user: bool,
    },

    /// Manage shots
    #[command(subcommand)]
    Shot(EntityCommand),

    /// Manage library assets
    #[command(subcommand)]
    Asset(EntityCommand),

    /// Work with WIP versions
    #[command(subcommand)]
    Version(VersionCommand),

    /// Promote a WIP file to its publish artifact
    Publish { wip: PathBuf },

    /// Open a publish artifact: lands on (and locks) its newest WIP
    Open { publish: PathBuf },

    /// Build and open shot assemblies
    #[command(subcommand)]
    Assembly(AssemblyCommand),

    /// Collaborative file locks
    #[command(subcommand)]
    Lock(LockCommand),
}

#[derive(Subcommand)]
pub enum EntityCommand {
    /// Register and create the folders of a shot or asset
    Create {
        /// Name; shots default to the next SHOT_### number
        name: Option<String>,
        /// Roles to create (comma-separated); all eligible roles when omitted
        #[arg(long, value_delimiter = ',')]
        roles: Vec<String>,
    },
}

/// Which artifact a version command targets.
#[derive(clap::Args)]
pub struct Target {
    /// Shot (or asset, with --asset) name
    pub entity: String,
    pub role: String,
    /// Treat ENTITY as a library asset
    #[arg(long)]
    pub asset: bool,
}

#[derive(Subcommand)]
pub enum VersionCommand {
    /// Save a new WIP version
    New {
        #[command(flatten)]
        target: Target,
        /// Content of the new version; defaults to a copy of the latest
        #[arg(long, value_name = "FILE")]
        from: Option<PathBuf>,
    },
    /// Show the newest WIP version
    Latest {
        #[command(flatten)]
        target: Target,
    },
    /// List every WIP version
    List {
        #[command(flatten)]
        target: Target,
    },
    /// Show where the next WIP version would go
    Next {
        #[command(flatten)]
        target: Target,
    },
    /// Compare a WIP with its publish artifact
    Status { wip: PathBuf },
}

#[derive(Subcommand)]
pub enum AssemblyCommand {
    /// Link every role's publish artifact into the shot assembly
    Rebuild { shot: String },
    /// Open the shot assembly, creating an empty one if needed
    Open { shot: String },
}

#[derive(Subcommand)]
pub enum LockCommand {
    /// Lock a file
    Acquire {
        path: PathBuf,
        #[arg(long, default_value = "")]
        note: String,
    },
    /// Release your lock on a file
    Release { path: PathBuf },
    /// Change the note on your lock
    Note { path: PathBuf, note: String },
    /// List every lock in the project
    List,
    /// Release anyone's lock (admins only)
    ForceRelease { path: PathBuf },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "shotline=info,shotline_pipeline=info,shotline_core=warn".into()
                }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let status = match commands::run(cli).await {
        Ok(status) => status,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            OperationStatus::failure(format!("{e:#}"))
        }
    };

    println!("{status}");
    if status.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
