//! WebSocket message types.

use serde::{Deserialize, Serialize};
use stormstack_core::{DeltaSnapshot, MatchId, MatchSnapshot};
use stormstack_engine::ErrorEvent;

/// Client to server message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Submit a command on the command-in channel.
    Command {
        /// Target match.
        #[serde(rename = "matchId")]
        match_id: MatchId,
        /// Command name.
        name: String,
        /// Raw payload, coerced against the declared schema.
        payload: serde_json::Value,
    },
    /// Keepalive.
    Ping {
        /// Client timestamp.
        timestamp: i64,
    },
}

/// Server to client message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Full snapshot. `resync` marks a forced full on a delta stream.
    Snapshot {
        /// True when a delta subscriber must rebase on this snapshot.
        resync: bool,
        /// The snapshot.
        snapshot: MatchSnapshot,
    },
    /// Delta against the previously delivered tick.
    Delta {
        /// The change set.
        delta: DeltaSnapshot,
    },
    /// A submitted command was accepted into the queue.
    CommandAccepted {
        /// Command name.
        name: String,
    },
    /// A captured command/system failure (receive_errors scope).
    CommandError {
        /// The event.
        event: ErrorEvent,
    },
    /// Request-level error.
    Error {
        /// Taxonomy code.
        code: String,
        /// Description.
        message: String,
    },
    /// Keepalive response.
    Pong {
        /// Client timestamp echoed back.
        timestamp: i64,
        /// Server wall-clock timestamp.
        #[serde(rename = "serverTime")]
        server_time: i64,
    },
}

impl ServerMessage {
    /// Serialize for the wire.
    #[must_use]
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            "{\"type\":\"Error\",\"code\":\"INTERNAL\",\"message\":\"serialization failed\"}"
                .to_string()
        })
    }
}
