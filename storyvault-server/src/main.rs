//! StoryVault Server
//!
//! HTTP/1 JSON front end for the StoryVault content versioning engine.

mod api;
mod config;

use anyhow::{Context, Result};
use api::ApiHandler;
use clap::{Parser, Subcommand};
use config::ServerConfig;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use storyvault_core::ContentService;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "storyvault")]
#[command(author = "StoryVault Contributors")]
#[command(version)]
#[command(about = "Versioned manuscript content server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the server
    Start {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Listen address (e.g., 0.0.0.0:8080), overrides the config file
        #[arg(short, long)]
        addr: Option<String>,

        /// SQLite database path, overrides the config file
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Enable debug logging
        #[arg(long)]
        debug: bool,
    },

    /// Write a default configuration file
    Init {
        /// Destination of the TOML file
        #[arg(default_value = "storyvault.toml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { config, addr, database, debug } => {
            let mut server_config = match config {
                Some(path) => ServerConfig::from_file(&path)?,
                None => ServerConfig::default(),
            };
            if let Some(addr) = addr {
                server_config.listen_addr = addr;
            }
            if let Some(database) = database {
                server_config.vault.database_path = database;
            }
            server_config.debug |= debug;

            init_tracing(server_config.debug);
            serve(server_config).await?;
        }

        Commands::Init { path } => {
            if path.exists() {
                anyhow::bail!("{} already exists", path.display());
            }
            let content = ServerConfig::default().to_toml()?;
            std::fs::write(&path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote default configuration to {}", path.display());
            println!("Start the server with:");
            println!("  storyvault start --config {}", path.display());
        }
    }

    Ok(())
}

fn init_tracing(debug: bool) {
    let env_filter = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();
}

async fn serve(config: ServerConfig) -> Result<()> {
    info!("Opening content database at {}", config.vault.database_path.display());
    let service = ContentService::open_sqlite(config.vault.clone())
        .context("Failed to open content database")?;
    let service = Arc::new(service);
    let handler = Arc::new(ApiHandler::new(service.clone(), config.max_body_size));

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.listen_addr))?;
    let listener = TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested, draining project writers");
                let drained = service.flush_all().await?;
                info!("Drained {} project writer(s)", drained);
                return Ok(());
            }
        };
        let handler = handler.clone();
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let handler = handler.clone();
                async move {
                    info!("Request: {} {}", req.method(), req.uri());
                    let response = handler.handle(req).await;
                    info!("Response: {}", response.status());
                    Ok::<_, Infallible>(response)
                }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Error serving connection from {}: {:?}", peer, e);
            }
        });
    }
}
