//! Connection Transport
//!
//! The session core only needs a handful of primitives from the
//! real-time layer: stable connection ids, unicast, rooms and room
//! broadcast. [`Transport`] names that contract; [`Hub`] implements it
//! in-process with one bounded channel per connection.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use async_trait::async_trait;
use serde::{Serialize, Deserialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::network::protocol::ServerMessage;

/// Stable per-connection identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Wrap an existing id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// No such connection is registered.
    #[error("Unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// The connection's outbound channel is closed.
    #[error("Connection {0} closed")]
    Closed(ConnectionId),

    /// The connection stopped draining its outbound buffer and was dropped.
    #[error("Connection {0} lagged and was dropped")]
    Lagged(ConnectionId),
}

/// Real-time transport as seen by the session core.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether `conn` is currently registered.
    async fn is_connected(&self, conn: &ConnectionId) -> bool;

    /// Unicast to one connection.
    async fn send(&self, conn: &ConnectionId, message: ServerMessage) -> Result<(), TransportError>;

    /// Send to every member of `room`. An empty or unknown room is not an error.
    async fn broadcast(&self, room: &str, message: ServerMessage) -> Result<(), TransportError>;

    /// Add `conn` to `room`.
    async fn join(&self, conn: &ConnectionId, room: &str) -> Result<(), TransportError>;

    /// Remove `conn` from `room`. Removing a non-member is a no-op.
    async fn leave(&self, conn: &ConnectionId, room: &str);
}

// =============================================================================
// HUB
// =============================================================================

/// In-process transport backed by per-connection mpsc channels.
///
/// Sends never wait. A connection whose buffer is full is unregistered,
/// which closes its receiver.
pub struct Hub {
    /// Outbound channel per connection.
    connections: RwLock<BTreeMap<ConnectionId, mpsc::Sender<ServerMessage>>>,
    /// Room membership.
    rooms: RwLock<BTreeMap<String, BTreeSet<ConnectionId>>>,
    /// Capacity of each outbound channel.
    buffer: usize,
}

impl Hub {
    /// Create a hub whose outbound channels hold `buffer` messages.
    pub fn new(buffer: usize) -> Self {
        Self {
            connections: RwLock::new(BTreeMap::new()),
            rooms: RwLock::new(BTreeMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// Register a connection and return the receiving end of its
    /// outbound channel. Re-registering replaces the old channel.
    pub async fn register(&self, conn: ConnectionId) -> mpsc::Receiver<ServerMessage> {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.connections.write().await.insert(conn, tx);
        rx
    }

    /// Drop a connection and remove it from every room.
    pub async fn unregister(&self, conn: &ConnectionId) {
        self.connections.write().await.remove(conn);

        let mut rooms = self.rooms.write().await;
        rooms.retain(|_, members| {
            members.remove(conn);
            !members.is_empty()
        });
    }

    /// Number of registered connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Members of a room.
    pub async fn room_members(&self, room: &str) -> Vec<ConnectionId> {
        self.rooms.read().await
            .get(room)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn sender_for(&self, conn: &ConnectionId) -> Result<mpsc::Sender<ServerMessage>, TransportError> {
        self.connections.read().await
            .get(conn)
            .cloned()
            .ok_or_else(|| TransportError::UnknownConnection(conn.clone()))
    }

    /// Queue `message` without waiting, evicting the connection if its
    /// buffer is full.
    async fn deliver(
        &self,
        conn: &ConnectionId,
        sender: &mpsc::Sender<ServerMessage>,
        message: ServerMessage,
    ) -> Result<(), TransportError> {
        match sender.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Closed(_)) => Err(TransportError::Closed(conn.clone())),
            Err(TrySendError::Full(_)) => {
                warn!(connection = %conn, buffer = self.buffer, "outbound buffer full, dropping connection");
                self.evict(conn, sender).await;
                Err(TransportError::Lagged(conn.clone()))
            }
        }
    }

    /// Unregister `conn` if it is still backed by `sender`.
    async fn evict(&self, conn: &ConnectionId, sender: &mpsc::Sender<ServerMessage>) {
        {
            let mut connections = self.connections.write().await;
            match connections.get(conn) {
                Some(current) if current.same_channel(sender) => {
                    connections.remove(conn);
                }
                _ => return,
            }
        }

        let mut rooms = self.rooms.write().await;
        rooms.retain(|_, members| {
            members.remove(conn);
            !members.is_empty()
        });
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl Transport for Hub {
    async fn is_connected(&self, conn: &ConnectionId) -> bool {
        self.connections.read().await.contains_key(conn)
    }

    async fn send(&self, conn: &ConnectionId, message: ServerMessage) -> Result<(), TransportError> {
        let sender = self.sender_for(conn).await?;
        self.deliver(conn, &sender, message).await
    }

    async fn broadcast(&self, room: &str, message: ServerMessage) -> Result<(), TransportError> {
        // Snapshot recipients so no lock is held across sends.
        let recipients: Vec<(ConnectionId, mpsc::Sender<ServerMessage>)> = {
            let rooms = self.rooms.read().await;
            let connections = self.connections.read().await;
            rooms.get(room)
                .into_iter()
                .flatten()
                .filter_map(|c| connections.get(c).map(|tx| (c.clone(), tx.clone())))
                .collect()
        };

        let mut result = Ok(());
        for (conn, sender) in recipients {
            if let Err(e) = self.deliver(&conn, &sender, message.clone()).await {
                debug!(connection = %conn, room, error = %e, "broadcast not delivered");
                result = result.and(Err(e));
            }
        }
        result
    }

    async fn join(&self, conn: &ConnectionId, room: &str) -> Result<(), TransportError> {
        if !self.is_connected(conn).await {
            return Err(TransportError::UnknownConnection(conn.clone()));
        }
        self.rooms.write().await
            .entry(room.to_string())
            .or_default()
            .insert(conn.clone());
        Ok(())
    }

    async fn leave(&self, conn: &ConnectionId, room: &str) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(room) {
            members.remove(conn);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
    }
}
