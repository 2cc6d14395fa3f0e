//! Heartbeat sweeper.
//!
//! Periodically marks silent nodes Offline and, once a node's reattach
//! window elapses, forgets the node and purges its routed matches.

use crate::state::SharedControlState;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Run the sweeper until cancelled. Sweeps at the heartbeat cadence.
pub async fn run(state: SharedControlState, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(state.config.heartbeat_interval());

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let forgotten = state.registry.sweep();
                for node_id in forgotten {
                    debug!(node = %node_id, "purging matches of forgotten node");
                    state.router.purge_node(node_id);
                }
            }
        }
    }
}
