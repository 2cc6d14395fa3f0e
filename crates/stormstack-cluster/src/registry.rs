//! Cluster node registry.
//!
//! Engine nodes heartbeat their metrics; a node silent for
//! `3 × heartbeat_interval` is marked Offline. Its matches become
//! unreachable but are not destroyed: reattachment within the configured
//! window restores the node, after which it is forgotten entirely.
//! Liveness accounting uses the monotonic clock throughout.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use stormstack_core::{NodeId, Result, StormError};
use tracing::{debug, info, warn};

/// Lifecycle status of an engine node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeStatus {
    /// Heartbeating and accepting matches.
    Healthy,
    /// Accepting no new matches; existing matches may complete.
    Draining,
    /// Missed heartbeats; unreachable until it reattaches.
    Offline,
}

/// Metrics reported with every heartbeat.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetrics {
    /// Hosted containers.
    pub containers: u32,
    /// Hosted matches.
    pub matches: u32,
    /// CPU usage in [0, 1].
    pub cpu_usage: f64,
    /// Memory in use, bytes.
    pub memory_used: u64,
    /// Memory limit, bytes.
    pub memory_max: u64,
}

/// A heartbeat payload from an engine node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeHeartbeat {
    /// The node's id, absent on first registration.
    pub node_id: Option<NodeId>,
    /// Address the node serves its HTTP surface on.
    pub address: String,
    /// Module names the node supports.
    pub supported_modules: Vec<String>,
    /// Current metrics.
    pub metrics: NodeMetrics,
}

#[derive(Debug)]
struct NodeRecord {
    address: String,
    status: NodeStatus,
    metrics: NodeMetrics,
    supported_modules: Vec<String>,
    registration_seq: u64,
    last_heartbeat: Instant,
    offline_since: Option<Instant>,
}

/// Serializable node view for API responses and placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSummary {
    /// Node id.
    pub id: NodeId,
    /// Advertised address.
    pub address: String,
    /// Lifecycle status.
    pub status: NodeStatus,
    /// Latest reported metrics.
    pub metrics: NodeMetrics,
    /// Supported module names.
    pub supported_modules: Vec<String>,
    /// Registration order (earlier registers first).
    pub registration_seq: u64,
    /// Milliseconds since the last heartbeat.
    pub heartbeat_age_ms: u64,
    /// Saturation score in [0, 1].
    pub saturation: f64,
}

/// Registry of engine nodes.
pub struct NodeRegistry {
    nodes: DashMap<NodeId, NodeRecord>,
    offline_after: Duration,
    reattach_window: Duration,
    max_matches_per_node: u32,
    seq: AtomicU64,
}

impl NodeRegistry {
    /// Create a registry.
    #[must_use]
    pub fn new(offline_after: Duration, reattach_window: Duration, max_matches_per_node: u32) -> Self {
        Self {
            nodes: DashMap::new(),
            offline_after,
            reattach_window,
            max_matches_per_node: max_matches_per_node.max(1),
            seq: AtomicU64::new(1),
        }
    }

    /// Register a node or refresh it from a heartbeat; returns its id.
    pub fn heartbeat(&self, heartbeat: NodeHeartbeat) -> NodeId {
        let id = heartbeat.node_id.unwrap_or_else(|| NodeId(rand::random()));
        match self.nodes.get_mut(&id) {
            Some(mut record) => {
                record.address = heartbeat.address;
                record.metrics = heartbeat.metrics;
                record.supported_modules = heartbeat.supported_modules;
                record.last_heartbeat = Instant::now();
                if record.status == NodeStatus::Offline {
                    info!(node = %id, "node reattached");
                    record.status = NodeStatus::Healthy;
                    record.offline_since = None;
                }
            }
            None => {
                debug!(node = %id, address = %heartbeat.address, "registered node");
                self.nodes.insert(
                    id,
                    NodeRecord {
                        address: heartbeat.address,
                        status: NodeStatus::Healthy,
                        metrics: heartbeat.metrics,
                        supported_modules: heartbeat.supported_modules,
                        registration_seq: self.seq.fetch_add(1, Ordering::Relaxed),
                        last_heartbeat: Instant::now(),
                        offline_since: None,
                    },
                );
            }
        }
        id
    }

    /// Put a node into Draining: no new matches, existing ones complete.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` for an unknown id.
    pub fn drain(&self, id: NodeId) -> Result<()> {
        let mut record = self.nodes.get_mut(&id).ok_or(StormError::NodeNotFound(id))?;
        if record.status != NodeStatus::Offline {
            record.status = NodeStatus::Draining;
            info!(node = %id, "node draining");
        }
        Ok(())
    }

    /// Mark silent nodes Offline and forget nodes whose reattach window
    /// has elapsed. Returns the ids that were forgotten.
    pub fn sweep(&self) -> Vec<NodeId> {
        let mut forgotten = Vec::new();
        for mut entry in self.nodes.iter_mut() {
            if entry.status != NodeStatus::Offline
                && entry.last_heartbeat.elapsed() > self.offline_after
            {
                warn!(node = %entry.key(), "node missed heartbeats, marking offline");
                entry.status = NodeStatus::Offline;
                entry.offline_since = Some(Instant::now());
            }
        }
        self.nodes.retain(|id, record| {
            let expired = record
                .offline_since
                .is_some_and(|since| since.elapsed() > self.reattach_window);
            if expired {
                warn!(node = %id, "reattach window elapsed, forgetting node");
                forgotten.push(*id);
            }
            !expired
        });
        forgotten
    }

    /// Saturation score:
    /// `0.5·(matches/max) + 0.3·cpu + 0.2·(mem_used/mem_max)`, clamped.
    #[must_use]
    pub fn saturation(&self, metrics: &NodeMetrics) -> f64 {
        let match_density = f64::from(metrics.matches) / f64::from(self.max_matches_per_node);
        let memory = if metrics.memory_max == 0 {
            0.0
        } else {
            metrics.memory_used as f64 / metrics.memory_max as f64
        };
        (0.5 * match_density + 0.3 * metrics.cpu_usage + 0.2 * memory).clamp(0.0, 1.0)
    }

    /// Summary of one node.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<NodeSummary> {
        self.nodes.get(&id).map(|record| self.summarize(id, &record))
    }

    /// Summaries of every known node, ordered by registration.
    #[must_use]
    pub fn list(&self) -> Vec<NodeSummary> {
        let mut nodes: Vec<NodeSummary> = self
            .nodes
            .iter()
            .map(|entry| self.summarize(*entry.key(), entry.value()))
            .collect();
        nodes.sort_by_key(|n| n.registration_seq);
        nodes
    }

    /// Healthy nodes supporting every requested module.
    #[must_use]
    pub fn candidates(&self, modules: &[String]) -> Vec<NodeSummary> {
        self.list()
            .into_iter()
            .filter(|node| node.status == NodeStatus::Healthy)
            .filter(|node| {
                modules
                    .iter()
                    .all(|module| node.supported_modules.contains(module))
            })
            .collect()
    }

    /// Module names supported by at least one healthy node.
    #[must_use]
    pub fn supported_modules(&self) -> Vec<String> {
        let mut modules: Vec<String> = self
            .list()
            .into_iter()
            .filter(|node| node.status == NodeStatus::Healthy)
            .flat_map(|node| node.supported_modules)
            .collect();
        modules.sort();
        modules.dedup();
        modules
    }

    /// Number of known nodes.
    #[must_use]
    pub fn count(&self) -> usize {
        self.nodes.len()
    }

    fn summarize(&self, id: NodeId, record: &NodeRecord) -> NodeSummary {
        NodeSummary {
            id,
            address: record.address.clone(),
            status: record.status,
            metrics: record.metrics,
            supported_modules: record.supported_modules.clone(),
            registration_seq: record.registration_seq,
            heartbeat_age_ms: record.last_heartbeat.elapsed().as_millis() as u64,
            saturation: self.saturation(&record.metrics),
        }
    }
}
