//! routed - Skill Routing Daemon
//!
//! Main entry point for the daemon binary.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::path::PathBuf;

use clap::Parser;
use routed::{Daemon, DaemonConfig};
use tracing::error;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "routed", about = "Skill Routing Daemon", version)]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value = "7700")]
    port: u16,

    /// Router config file (key=value); overrides .router/config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long)]
    db: Option<PathBuf>,

    /// Workspace root for .router/config and the skill catalog
    #[arg(long, default_value = ".")]
    workspace: PathBuf,
}

fn main() -> eyre::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing.
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let defaults = DaemonConfig::default();
    let config = DaemonConfig {
        port: cli.port,
        config_path: cli.config,
        db_path: cli.db.unwrap_or(defaults.db_path),
        workspace_root: cli.workspace,
        auth_token: defaults.auth_token,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let daemon = match Daemon::new(config).await {
            Ok(daemon) => daemon,
            Err(e) => {
                error!("failed to initialize daemon: {:#}", e);
                std::process::exit(1);
            }
        };

        let run = daemon.run();
        tokio::pin!(run);
        tokio::select! {
            result = &mut run => return result,
            signal = shutdown_signal() => signal?,
        }
        daemon.shutdown();
        run.await
    })
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigint.recv() => tracing::info!("received SIGINT, initiating graceful shutdown"),
        _ = sigterm.recv() => tracing::info!("received SIGTERM, initiating graceful shutdown"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!("received SIGINT, initiating graceful shutdown");
    Ok(())
}
