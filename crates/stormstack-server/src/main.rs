//! StormStack engine-node daemon.

use stormstack_core::{exit, EngineConfig};
use stormstack_net::ServerBuilder;
use stormstack_server::{create_router, AppState};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = EngineConfig::from_env();
    tracing::info!(port = config.http_port, "StormStack engine node starting");

    let state = AppState::new(config.clone());
    let shutdown = CancellationToken::new();

    let heartbeat = tokio::spawn(stormstack_server::heartbeat::run(
        state.clone(),
        shutdown.clone(),
    ));

    let router = create_router(state.clone());
    let served = ServerBuilder::new()
        .port(config.http_port)
        .router(router)
        .run_with_shutdown(stormstack_net::shutdown_signal())
        .await;

    shutdown.cancel();
    let _ = heartbeat.await;
    state.release_all();

    match served {
        Ok(()) => std::process::exit(exit::SUCCESS),
        Err(error) => {
            tracing::error!(%error, "server failed");
            std::process::exit(exit::UNEXPECTED);
        }
    }
}
