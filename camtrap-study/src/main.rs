//! camtrap-study - Camtrap DP study importer and query service
//!
//! `serve` runs the JSON HTTP API; the other subcommands work on the study
//! store directly and print JSON to stdout.

use anyhow::{Context, Result};
use camtrap_common::config::{default_config_path, RootFolderResolver, TomlConfig};
use camtrap_study::importer::ImportOptions;
use camtrap_study::queries;
use camtrap_study::store::StudyStore;
use camtrap_study::{build_router, AppState};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "camtrap-study")]
#[command(about = "Camtrap DP study importer and query service")]
#[command(version)]
struct Args {
    /// Folder holding imported studies (also read from CAMTRAP_ROOT_FOLDER)
    #[arg(long, global = true)]
    root_folder: Option<PathBuf>,

    /// Config file (default: <config dir>/camtrap/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Import a Camtrap DP dataset directory
    Import { dir: PathBuf },
    /// List imported studies
    List,
    /// Delete a study
    Delete { id: String },
    /// Print a query result for a study
    Query { id: String, kind: QueryKind },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum QueryKind {
    Species,
    Deployments,
    Overview,
    TopSpecies,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_path);
    let config = TomlConfig::load_or_default(config_path.as_deref());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut resolver = RootFolderResolver::new("camtrap-study").with_cli_arg(args.root_folder);
    if let Some(path) = config_path {
        resolver = resolver.with_config_path(path);
    }
    let root_folder = resolver.resolve();
    info!("Root folder: {}", root_folder.display());

    let store = StudyStore::new(root_folder.clone()).with_context(|| {
        format!("Failed to initialize study store in {}", root_folder.display())
    })?;
    let import = ImportOptions::from(&config.import);

    match args.command {
        Command::Serve { host, port } => {
            let host = host.unwrap_or(config.server.host);
            let port = port.unwrap_or(config.server.port);
            serve(AppState::new(store, import), &host, port).await
        }
        Command::Import { dir } => {
            let summary = store
                .import_study(&dir, &import)
                .await
                .with_context(|| format!("Failed to import {}", dir.display()))?;
            print_json(&summary)
        }
        Command::List => print_json(&store.list_studies().await?),
        Command::Delete { id } => {
            store
                .delete_study(&id)
                .await
                .with_context(|| format!("Failed to delete study {}", id))?;
            Ok(())
        }
        Command::Query { id, kind } => {
            let pool = store
                .open_study(&id)
                .await
                .with_context(|| format!("Failed to open study {}", id))?;
            match kind {
                QueryKind::Species => print_json(&queries::species_distribution(&pool).await?),
                QueryKind::Deployments => print_json(&queries::deployments(&pool).await?),
                QueryKind::Overview => print_json(&queries::study_overview(&pool).await?),
                QueryKind::TopSpecies => print_json(
                    &queries::top_species_timeseries(
                        &pool,
                        queries::timeseries::DEFAULT_TOP_SPECIES,
                    )
                    .await?,
                ),
            }
        }
    }
}

async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    info!(
        "Starting camtrap-study v{} on {}:{}",
        env!("CARGO_PKG_VERSION"),
        host,
        port
    );

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind to {}:{}", host, port))?;
    info!("Health check: http://{}:{}/health", host, port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
