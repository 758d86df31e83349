mod api;
mod config;
mod error;
mod logging;
mod proxy_handler;
mod state;

use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use room_core::error::{Error, Result};
use room_core::host::DockerHost;
use room_core::proxy::Proxy;
use room_core::pull_manager::PullManager;
use room_core::room_manager::RoomManager;

use crate::config::Cli;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    logging::init();
    if let Err(err) = run().await {
        error!(error = %err, "roomd exited with an error");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let host: Arc<dyn room_core::host::Host> = match &cli.docker_socket {
        Some(path) => Arc::new(DockerHost::connect_with_socket(path)?),
        None => Arc::new(DockerHost::connect()?),
    };

    let manager_config = cli.manager_config();
    let rooms = Arc::new(RoomManager::new(host.clone(), manager_config.clone()));
    let pulls = PullManager::new(host.clone(), manager_config.image_allowlist.clone());
    let proxy = Proxy::new(manager_config.wait_mode_enabled);

    let fleet = rooms.list(&HashMap::new()).await?;
    let seed: Vec<_> = fleet
        .iter()
        .map(|room| (room.id.clone(), room.container_labels.clone(), room.running, room.paused))
        .collect();
    proxy.seed(&seed);

    rooms.events_loop_start();
    let bridge = spawn_event_bridge(rooms.clone(), proxy.clone());

    let state = AppState {
        rooms: rooms.clone(),
        pulls: pulls.clone(),
        proxy: proxy.clone(),
        http: reqwest::Client::new(),
    };

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(&cli.bind)
        .await
        .map_err(|err| Error::host_failure("failed to bind roomd listen address", err))?;
    info!(bind = %cli.bind, "roomd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| Error::fatal(format!("http server exited: {err}")))?;

    info!("shutting down");
    proxy.shutdown();
    pulls.shutdown();
    rooms.events_loop_stop();
    bridge.abort();

    Ok(())
}

/// Forwards every projected room event into the proxy's prefix tree, the
/// same relationship `ServerManager` wires up between the projector and
/// the router before accepting traffic.
fn spawn_event_bridge(rooms: Arc<RoomManager>, proxy: Arc<Proxy>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut sub = rooms.events();
        loop {
            tokio::select! {
                event = sub.events.recv() => {
                    match event {
                        Some(event) => proxy.apply_event(&event),
                        None => break,
                    }
                }
                err = sub.errors.recv() => {
                    match err {
                        Some(err) => error!(error = %err, "event projector reported an error"),
                        None => break,
                    }
                }
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
