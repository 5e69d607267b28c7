//! StoryVault Administration CLI

mod export;
mod integrity;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use storyvault_core::{ProjectId, RevisionStore, SqliteStore, VaultConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "storyvault-admin")]
#[command(author = "StoryVault Contributors")]
#[command(version)]
#[command(about = "StoryVault content database maintenance")]
struct Cli {
    /// JSON vault configuration
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database, overrides the configured path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the database schema
    Init,

    /// List every version of a project
    Versions {
        #[arg(short, long)]
        project: ProjectId,
    },

    /// Export a project's full history as backup JSON
    Export {
        #[arg(short, long)]
        project: ProjectId,
        /// Output file, `-` for stdout
        #[arg(short, long, default_value = "-")]
        output: String,
    },

    /// Restore the single-active invariant
    Repair {
        /// Only this project; all projects when omitted
        #[arg(short, long)]
        project: Option<ProjectId>,
    },

    /// Report projects without exactly one active revision
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = if cli.debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let mut config = match &cli.config {
        Some(path) => VaultConfig::load(path)?,
        None => VaultConfig::default(),
    };
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    let store = Arc::new(
        SqliteStore::open(&config.database_path)
            .with_context(|| format!("Failed to open {}", config.database_path.display()))?,
    );

    match cli.command {
        Commands::Init => {
            println!("Database ready at {}", config.database_path.display());
        }

        Commands::Versions { project } => {
            let versions = store.list_all(project).await?;
            if versions.is_empty() {
                println!("Project {} has no revisions", project);
            }
            for rev in versions {
                println!(
                    "{}v{:<5} {:<17} {:<11} {:>7} words  {}",
                    if rev.is_active { "* " } else { "  " },
                    rev.version,
                    rev.save_reason.as_str(),
                    rev.content_type.as_str(),
                    storyvault_core::word_count(rev.text()),
                    rev.created_at.format("%Y-%m-%d %H:%M:%S"),
                );
            }
        }

        Commands::Export { project, output } => {
            let backup = export::build_backup(store.clone(), store.as_ref(), project).await?;
            export::write_backup(&backup, &output)?;
            if output != "-" {
                println!(
                    "Exported {} versions of project {} to {}",
                    backup.content_versions.len(),
                    project,
                    output
                );
            }
        }

        Commands::Repair { project } => {
            let repaired = integrity::repair(store.clone(), &config, project).await?;
            if repaired.is_empty() {
                println!("Nothing to repair");
            }
            for (project, version) in repaired {
                println!("Project {}: v{} is now active", project, version);
            }
        }

        Commands::Check => {
            let violations = integrity::check(store.as_ref()).await?;
            if violations.is_empty() {
                println!("All projects have exactly one active revision");
            } else {
                for v in &violations {
                    println!("Project {}: {} active revisions", v.project, v.active);
                }
                anyhow::bail!("{} project(s) need repair", violations.len());
            }
        }
    }

    Ok(())
}
