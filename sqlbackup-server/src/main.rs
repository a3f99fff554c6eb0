//! SQL backup server - command line entry point
//!
//! `serve` runs the HTTP API and the cron scheduler. The other subcommands
//! run a single operation and print its result as JSON.

mod error;
mod routes;
mod services;
mod state;

use crate::services::scheduler::BackupScheduler;
use crate::state::AppState;
use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use sqlbackup_core::remote::{Connector, SshConnector};
use sqlbackup_core::{operations, utils, Config, OperationResult, RetentionPolicy};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

const DEFAULT_CONFIG: &str = "sqlbackup.toml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API and scheduled operations
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Dump every master, or a single one
    Backup {
        #[arg(short, long)]
        server: Option<String>,
    },
    /// Apply the retention policy to every master's backup directory
    Rotate {
        #[arg(long)]
        max_hourly: Option<usize>,
        #[arg(long)]
        max_daily: Option<usize>,
        /// Report planned changes without touching any file
        #[arg(long)]
        dry_run: bool,
    },
    /// List a master's backups, newest first
    List {
        #[arg(short, long)]
        server: String,
    },
    /// Push one backup file to every secondary
    Distribute {
        #[arg(short, long)]
        server: String,
        #[arg(short, long)]
        file: String,
    },
    /// Print the configured inventory
    Servers,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    config.apply_env_overrides();
    config.validate()?;

    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    let connector: Arc<dyn Connector> =
        Arc::new(SshConnector::new(config.backup.ssh_key_path.clone()));

    match args.command {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.http.port = port;
            }
            serve(config, connector).await
        }
        Command::Backup { server } => {
            let result = run_blocking(config, connector, move |config, connector| {
                operations::backup_all(config, connector, server.as_deref())
            })
            .await??;
            report(&result)
        }
        Command::Rotate {
            max_hourly,
            max_daily,
            dry_run,
        } => {
            let policy = RetentionPolicy {
                max_hourly: max_hourly.unwrap_or(config.retention.max_hourly),
                max_daily: max_daily.unwrap_or(config.retention.max_daily),
            };
            if policy.max_hourly == 0 || policy.max_daily == 0 {
                bail!("--max-hourly and --max-daily must be at least 1");
            }
            let result = run_blocking(config, connector, move |config, _| {
                operations::rotate_all(config, &policy, Local::now().date_naive(), dry_run)
            })
            .await?;
            report(&result)
        }
        Command::List { server } => {
            let result = run_blocking(config, connector, move |config, _| {
                operations::list_server_backups(config, &server)
            })
            .await??;
            report(&result)
        }
        Command::Distribute { server, file } => {
            let result = run_blocking(config, connector, move |config, connector| {
                operations::distribute_backup(config, connector, &server, &file)
            })
            .await??;
            report(&result)
        }
        Command::Servers => {
            for (role, servers) in [("master", &config.masters), ("secondary", &config.secondaries)] {
                for s in servers {
                    println!("{role:<10} {:<16} {}@{}:{}", s.name, s.user, s.host, s.port);
                }
            }
            Ok(())
        }
    }
}

/// Explicit `--config` must exist; otherwise `sqlbackup.toml` in the working
/// directory is used when present, falling back to defaults.
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None if Path::new(DEFAULT_CONFIG).is_file() => Ok(Config::from_file(Path::new(DEFAULT_CONFIG))?),
        None => Ok(Config::default()),
    }
}

async fn run_blocking<T, F>(config: Config, connector: Arc<dyn Connector>, work: F) -> Result<T>
where
    F: FnOnce(&Config, &dyn Connector) -> T + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(move || work(&config, connector.as_ref())).await?)
}

fn report(result: &OperationResult) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    let failures = result.failures().count();
    if failures > 0 {
        bail!("{failures} step(s) failed");
    }
    Ok(())
}

async fn serve(config: Config, connector: Arc<dyn Connector>) -> Result<()> {
    let addr = format!("{}:{}", config.http.bind, config.http.port);
    tracing::info!(
        "Starting sqlbackup v{} ({} masters, {} secondaries)",
        env!("CARGO_PKG_VERSION"),
        config.masters.len(),
        config.secondaries.len()
    );

    let state = Arc::new(AppState::new(config, connector));
    let cancel = CancellationToken::new();

    let scheduler = match BackupScheduler::new(state.clone()).await {
        Ok(s) => {
            if let Err(e) = s.init_schedules().await {
                tracing::warn!("Failed to initialize schedules: {}", e);
            }
            if let Err(e) = s.start().await {
                tracing::warn!("Failed to start scheduler: {}", e);
            }
            Some(s)
        }
        Err(e) => {
            tracing::warn!("Failed to create scheduler: {}", e);
            None
        }
    };

    let app = routes::create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    tracing::info!("Shutting down...");
    cancel.cancel();

    if let Some(s) = scheduler {
        if let Err(e) = s.shutdown().await {
            tracing::warn!("Scheduler shutdown error: {}", e);
        }
    }

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl+c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
        _ = cancel.cancelled() => {}
    }

    cancel.cancel();
}
