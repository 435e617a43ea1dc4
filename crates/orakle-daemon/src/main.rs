//! Process entry point for the Orakle middleware: loads configuration,
//! builds every collaborator, launches the managed subprocesses, and
//! serves the HTTP façade. Grounded on the teacher's
//! `gateway::daemon::start_gateway` (port-fallback bind loop) and
//! `bin/cli.rs`'s `clap`-driven entry point.

mod auth;
mod error;
mod pipeline;
mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use orakle_core::config::{default_config_path, load_config};

use state::AppState;

const DEFAULT_PORT: u16 = 18790;
const MAX_PORT_ATTEMPTS: u16 = 10;

#[derive(Debug, Parser)]
#[command(name = "orakle", about = "Orakle LLM-skill dispatch middleware", version)]
struct Cli {
    /// Path to `config.toml`. Defaults to `~/.orakle/config.toml`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port to bind the HTTP façade on; falls forward if already in use.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Skip launching the skills host and bridge subprocesses (useful for
    /// local development against services started separately).
    #[arg(long)]
    no_supervise: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(|| default_config_path().unwrap_or_else(|_| PathBuf::from("config.toml")));
    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, path = %config_path.display(), "failed to load configuration, exiting");
            std::process::exit(1);
        }
    };

    let state = Arc::new(AppState::build(config, config_path));

    if !cli.no_supervise {
        let report = state.supervisor.start_all().await;
        if !report.success {
            tracing::warn!(message = ?report.message, "one or more managed services failed to start; continuing in degraded mode");
        }
        spawn_health_poller(state.clone());
    }

    if let Err(err) = state.registry.reload().await {
        tracing::warn!(error = %err, "initial skill catalog load failed; serving with an empty catalog");
    } else {
        tracing::info!(count = state.registry.len(), "loaded skill catalog");
    }

    let app = routes::build_router(state.clone());

    let listener = match bind_with_fallback(cli.port).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, "failed to bind HTTP façade");
            std::process::exit(1);
        }
    };
    let addr = listener.local_addr().expect("bound listener has a local address");
    tracing::info!(%addr, "orakle daemon listening");

    let shutdown_state = state.clone();
    let shutdown_signal = async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received shutdown signal, stopping managed services");
        shutdown_state.supervisor.stop_all(false).await;
    };

    if let Err(err) = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal).await {
        tracing::error!(error = %err, "HTTP façade exited with an error");
    }
}

/// Bind to `127.0.0.1` starting at `start_port`, incrementing up to
/// [`MAX_PORT_ATTEMPTS`] times if the port is already taken, grounded on
/// the teacher's `gateway::daemon::bind_with_fallback`.
async fn bind_with_fallback(start_port: u16) -> Result<TcpListener, String> {
    for offset in 0..MAX_PORT_ATTEMPTS {
        let port = start_port + offset;
        let addr: SocketAddr = format!("127.0.0.1:{port}").parse().expect("valid loopback address");
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(_) if offset + 1 < MAX_PORT_ATTEMPTS => continue,
            Err(e) => return Err(format!("could not bind to any port in {start_port}\u{2013}{}: {e}", start_port + MAX_PORT_ATTEMPTS - 1)),
        }
    }
    unreachable!()
}

/// Periodic health-check timer; does not block start/stop operations,
/// per §5's concurrency model.
fn spawn_health_poller(state: Arc<AppState>) {
    tokio::spawn(async move {
        let interval_secs = state.config_snapshot().await.supervisor.health_poll_secs.max(1);
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            state.supervisor.check_health().await;
        }
    });
}
