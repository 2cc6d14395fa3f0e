//! Heartbeat reporter.
//!
//! Posts this node's metrics to the control plane's
//! `POST /api/nodes/register` endpoint at the configured cadence. The
//! first response assigns the node id; later beats carry it so the
//! registry updates in place.

use crate::state::SharedAppState;
use serde::Deserialize;
use stormstack_cluster::{NodeHeartbeat, NodeMetrics};
use stormstack_core::NodeId;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct RegisterEnvelope {
    data: RegisterResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
    node_id: NodeId,
}

/// Gather this node's current metrics.
///
/// A command queue at ≥ 90 % of capacity elevates the reported CPU score
/// so the control plane steers new matches elsewhere.
#[must_use]
pub fn collect_metrics(state: &SharedAppState) -> NodeMetrics {
    let (memory_used, memory_max) = proc_memory();
    let queue_saturation = state.containers.saturation();
    let mut cpu_usage = proc_cpu();
    if queue_saturation >= 0.9 {
        cpu_usage = cpu_usage.max(queue_saturation);
    }
    NodeMetrics {
        containers: state.containers.container_count() as u32,
        matches: state.containers.match_count() as u32,
        cpu_usage,
        memory_used,
        memory_max,
    }
}

// Resident set and total memory from procfs; zeros off Linux.
fn proc_memory() -> (u64, u64) {
    let page_size = 4096u64;
    let used = std::fs::read_to_string("/proc/self/statm")
        .ok()
        .and_then(|statm| {
            statm
                .split_whitespace()
                .nth(1)
                .and_then(|pages| pages.parse::<u64>().ok())
        })
        .map_or(0, |pages| pages * page_size);
    let max = std::fs::read_to_string("/proc/meminfo")
        .ok()
        .and_then(|meminfo| {
            meminfo.lines().find_map(|line| {
                line.strip_prefix("MemTotal:").and_then(|rest| {
                    rest.trim()
                        .split_whitespace()
                        .next()
                        .and_then(|kb| kb.parse::<u64>().ok())
                })
            })
        })
        .map_or(0, |kb| kb * 1024);
    (used, max)
}

// One-minute load normalized by core count as a CPU proxy.
fn proc_cpu() -> f64 {
    let cores = std::thread::available_parallelism().map_or(1, |n| n.get()) as f64;
    std::fs::read_to_string("/proc/loadavg")
        .ok()
        .and_then(|loadavg| {
            loadavg
                .split_whitespace()
                .next()
                .and_then(|load| load.parse::<f64>().ok())
        })
        .map_or(0.0, |load| (load / cores).clamp(0.0, 1.0))
}

/// Run the heartbeat loop until cancelled. No-op without a configured
/// control plane URL (single-node deployments).
pub async fn run(state: SharedAppState, shutdown: CancellationToken) {
    let Some(base_url) = state.config.control_plane_url.clone() else {
        debug!("no control plane configured, heartbeats disabled");
        return;
    };

    let client = reqwest::Client::new();
    let url = format!("{base_url}/api/nodes/register");
    let mut interval = tokio::time::interval(state.config.heartbeat_interval());

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let heartbeat = NodeHeartbeat {
                    node_id: *state.node_id.lock(),
                    address: state.config.advertised_address.clone(),
                    supported_modules: state.containers.catalog().names(),
                    metrics: collect_metrics(&state),
                };

                match client
                    .post(&url)
                    .bearer_auth(&state.config.token_secret)
                    .json(&heartbeat)
                    .send()
                    .await
                {
                    Ok(response) => match response.json::<RegisterEnvelope>().await {
                        Ok(envelope) => {
                            let mut node_id = state.node_id.lock();
                            if node_id.is_none() {
                                debug!(node = %envelope.data.node_id, "registered with control plane");
                            }
                            *node_id = Some(envelope.data.node_id);
                        }
                        Err(error) => warn!(%error, "malformed register response"),
                    },
                    Err(error) => warn!(%error, "heartbeat failed"),
                }
            }
        }
    }
}
