//! StormStack control-plane daemon.

use stormstack_control::{create_router, ControlState};
use stormstack_core::{exit, ControlConfig};
use stormstack_net::ServerBuilder;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ControlConfig::from_env();
    tracing::info!(port = config.http_port, "StormStack control plane starting");

    let state = ControlState::new(config.clone());
    let shutdown = CancellationToken::new();

    let sweeper = tokio::spawn(stormstack_control::sweeper::run(
        state.clone(),
        shutdown.clone(),
    ));

    let router = create_router(state);
    let served = ServerBuilder::new()
        .port(config.http_port)
        .router(router)
        .run_with_shutdown(stormstack_net::shutdown_signal())
        .await;

    shutdown.cancel();
    let _ = sweeper.await;

    match served {
        Ok(()) => std::process::exit(exit::SUCCESS),
        Err(error) => {
            tracing::error!(%error, "control plane failed");
            std::process::exit(exit::UNEXPECTED);
        }
    }
}
