//! Per-connection bounded outbound queue.
//!
//! Writers feed a bounded channel drained by the connection's write task.
//! A full channel means the consumer cannot keep up even after snapshot
//! coalescing; the connection is closed with `SlowConsumer`.

use crate::messages::ServerMessage;
use stormstack_core::{ConnectionId, Result, StormError};
use tokio::sync::mpsc;
use tracing::warn;

/// Default outbound capacity per connection.
pub const OUTBOUND_CAPACITY: usize = 64;

/// Sending half of a connection's outbound queue.
#[derive(Debug, Clone)]
pub struct Outbound {
    connection_id: ConnectionId,
    tx: mpsc::Sender<String>,
}

impl Outbound {
    /// Create the queue; the receiver feeds the socket write loop.
    #[must_use]
    pub fn new(connection_id: ConnectionId) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        (Self { connection_id, tx }, rx)
    }

    /// The connection this queue belongs to.
    #[must_use]
    pub const fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Enqueue a message without waiting.
    ///
    /// # Errors
    ///
    /// - `SlowConsumer` when the queue is full.
    /// - `ConnectionClosed` when the write loop is gone.
    pub fn send(&self, message: &ServerMessage) -> Result<()> {
        match self.tx.try_send(message.to_text()) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(connection = %self.connection_id, "outbound queue full, closing as slow consumer");
                Err(StormError::SlowConsumer(self.connection_id))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(StormError::ConnectionClosed(self.connection_id))
            }
        }
    }
}
