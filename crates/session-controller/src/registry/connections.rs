//! Connection bookkeeping and outbound delivery handles.
//!
//! A connection is registered when the transport front-end accepts it,
//! carrying the client-supplied participant id, and is removed on
//! transport loss. Room membership is attached after a successful join.
//! Pure bookkeeping; no signaling logic lives here.

use crate::protocol::ServerMessage;

use common::{ConnectionId, PeerId, RoomId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

/// Outbound side of one connection.
///
/// Cheap to clone; held by the registry and by every `Peer` record so
/// room broadcasts can reach members without a registry lookup.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    connection_id: ConnectionId,
    peer_id: PeerId,
    sender: mpsc::Sender<ServerMessage>,
}

impl ConnectionHandle {
    /// Get the connection ID.
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Get the participant ID supplied at registration.
    #[must_use]
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// Deliver an outbound message to this connection.
    ///
    /// Delivery failure means the receiving side is gone or hopelessly
    /// backlogged; either way the disconnect path owns recovery, so the
    /// failure is only logged.
    pub async fn deliver(&self, message: ServerMessage) {
        if self.sender.send(message).await.is_err() {
            debug!(
                target: "sc.connections",
                connection_id = %self.connection_id,
                peer_id = %self.peer_id,
                "Dropped outbound message for closed connection"
            );
        }
    }
}

/// Per-connection registry state.
#[derive(Debug)]
struct ConnectionEntry {
    handle: ConnectionHandle,
    /// Set once the connection's peer has joined a room.
    room: Option<RoomId>,
}

/// Maps connection ids to their live handles and room membership.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    inner: Mutex<HashMap<ConnectionId, ConnectionEntry>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection for `peer_id`.
    ///
    /// Returns the connection handle and the receiving half the
    /// transport front-end drains toward the client.
    pub fn register(
        &self,
        peer_id: PeerId,
        outbound_buffer: usize,
    ) -> (ConnectionHandle, mpsc::Receiver<ServerMessage>) {
        let (sender, receiver) = mpsc::channel(outbound_buffer);
        let handle = ConnectionHandle {
            connection_id: ConnectionId::new(),
            peer_id,
            sender,
        };

        self.lock().insert(
            handle.connection_id,
            ConnectionEntry {
                handle: handle.clone(),
                room: None,
            },
        );

        (handle, receiver)
    }

    /// Look up a connection's handle and current room membership.
    #[must_use]
    pub fn session(&self, connection_id: ConnectionId) -> Option<(ConnectionHandle, Option<RoomId>)> {
        self.lock()
            .get(&connection_id)
            .map(|entry| (entry.handle.clone(), entry.room.clone()))
    }

    /// Record that the connection's peer joined `room_id`.
    pub fn set_room(&self, connection_id: ConnectionId, room_id: RoomId) {
        if let Some(entry) = self.lock().get_mut(&connection_id) {
            entry.room = Some(room_id);
        }
    }

    /// Clear the connection's room membership (explicit leave).
    pub fn clear_room(&self, connection_id: ConnectionId) {
        if let Some(entry) = self.lock().get_mut(&connection_id) {
            entry.room = None;
        }
    }

    /// Remove a connection, returning its membership at removal time.
    #[must_use]
    pub fn remove(&self, connection_id: ConnectionId) -> Option<(ConnectionHandle, Option<RoomId>)> {
        self.lock()
            .remove(&connection_id)
            .map(|entry| (entry.handle, entry.room))
    }

    /// Drain every registered connection (shutdown path).
    #[must_use]
    pub fn drain(&self) -> Vec<(ConnectionHandle, Option<RoomId>)> {
        self.lock()
            .drain()
            .map(|(_, entry)| (entry.handle, entry.room))
            .collect()
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no connections are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, ConnectionEntry>> {
        // Production code never panics (workspace lints), so poisoning is
        // unreachable; recover rather than propagate.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::protocol::ServerEvent;

    #[tokio::test]
    async fn test_register_and_deliver() {
        let registry = ConnectionRegistry::new();
        let (handle, mut rx) = registry.register(PeerId::from("alice"), 8);

        assert_eq!(registry.len(), 1);
        assert_eq!(handle.peer_id(), &PeerId::from("alice"));

        handle.deliver(ServerMessage::push(ServerEvent::Left)).await;
        let message = rx.recv().await.unwrap();
        assert_eq!(message.event, ServerEvent::Left);
    }

    #[tokio::test]
    async fn test_membership_lifecycle() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = registry.register(PeerId::from("alice"), 8);
        let id = handle.connection_id();

        let (_, room) = registry.session(id).unwrap();
        assert_eq!(room, None);

        registry.set_room(id, RoomId::from("r1"));
        let (_, room) = registry.session(id).unwrap();
        assert_eq!(room, Some(RoomId::from("r1")));

        registry.clear_room(id);
        let (_, room) = registry.session(id).unwrap();
        assert_eq!(room, None);
    }

    #[tokio::test]
    async fn test_remove_returns_membership() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = registry.register(PeerId::from("bob"), 8);
        let id = handle.connection_id();
        registry.set_room(id, RoomId::from("r2"));

        let (removed, room) = registry.remove(id).unwrap();
        assert_eq!(removed.peer_id(), &PeerId::from("bob"));
        assert_eq!(room, Some(RoomId::from("r2")));
        assert!(registry.is_empty());

        // Second remove is a no-op
        assert!(registry.remove(id).is_none());
    }

    #[tokio::test]
    async fn test_deliver_after_receiver_dropped_is_silent() {
        let registry = ConnectionRegistry::new();
        let (handle, rx) = registry.register(PeerId::from("carol"), 1);
        drop(rx);

        // Must not panic or error
        handle.deliver(ServerMessage::push(ServerEvent::Left)).await;
    }
}
