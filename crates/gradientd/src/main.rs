//! gradientd — the Gradient daemon.
//!
//! Single binary that assembles the release controller:
//! - Release store (redb)
//! - Plugin clients (mesh, workloads, metrics)
//! - Provider + one state machine per release
//! - Metrics collector
//! - REST API
//!
//! # Usage
//!
//! ```text
//! gradientd server --port 9443 --data-dir /var/lib/gradient
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use gradient_lifecycle::Timing;
use gradient_metrics::MetricsCollector;
use gradient_plugins::memory::{MemoryMesh, MemoryWorkloads, StaticMetrics};
use gradient_provider::{Clients, Provider};
use gradient_store::ReleaseStore;

#[derive(Parser)]
#[command(name = "gradientd", about = "Gradient release controller daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the controller with the API server.
    Server {
        /// Port to listen on.
        #[arg(long, default_value = "9443")]
        port: u16,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/gradient")]
        data_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gradientd=debug,gradient=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Server { port, data_dir } => run_server(port, data_dir).await,
    }
}

async fn run_server(port: u16, data_dir: PathBuf) -> anyhow::Result<()> {
    info!("Gradient daemon starting");

    // Ensure data directory exists.
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("gradient.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = ReleaseStore::open(&db_path)?;
    info!(path = ?db_path, "release store opened");

    // Local single-process backends. Platform connectors plug in here;
    // the rest of the controller only sees the client traits.
    let mesh = Arc::new(MemoryMesh::default());
    mesh.set_healthy(true).await;
    let clients = Clients {
        mesh,
        workloads: Arc::new(MemoryWorkloads::default()),
        metrics: Arc::new(StaticMetrics::default()),
    };

    let metrics = MetricsCollector::new();
    let provider = Provider::new(store, clients, metrics, Timing::default());
    info!("provider initialized");

    // Pick interrupted rollouts back up from the store.
    let resumed = provider.resume_all().await?;
    info!(resumed, "releases resumed");

    // ── Start API server ───────────────────────────────────────

    let router = gradient_api::build_router(provider);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C. In-flight rollouts keep their
    // persisted state and are resumed on the next start.
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install CTRL+C handler");
            info!("shutdown signal received");
        })
        .await?;

    info!("Gradient daemon stopped");
    Ok(())
}
