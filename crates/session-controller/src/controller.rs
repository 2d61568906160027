//! The embedding point for a transport front-end.
//!
//! `SessionController` owns every registry plus the root cancellation
//! token. A front-end (whatever accepts the real-time connections) drives
//! it with four calls:
//!
//! 1. [`register_connection`](SessionController::register_connection)
//!    when a connection is accepted, keeping the returned receiver to
//!    pump outbound messages to the client;
//! 2. [`handle_message`](SessionController::handle_message) (or the typed
//!    [`handle_request`](SessionController::handle_request)) for every
//!    inbound envelope, in arrival order per connection;
//! 3. [`disconnect`](SessionController::disconnect) on connection loss;
//! 4. [`shutdown`](SessionController::shutdown) on process teardown.
//!
//! Messages from different connections may be dispatched concurrently;
//! the registries carry the synchronization.

use crate::cleanup::CleanupCoordinator;
use crate::config::Config;
use crate::dispatch::SignalingDispatcher;
use crate::errors::ScError;
use crate::metrics::{MetricsSnapshot, SessionMetrics};
use crate::protocol::{ClientMessage, ServerEvent, ServerMessage};
use crate::registry::connections::ConnectionRegistry;
use crate::registry::rooms::{Room, RoomRegistry};

use common::{ConnectionId, PeerId, RoomId};
use media_engine::MediaEngine;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Authoritative session and resource lifecycle state for one controller
/// instance.
pub struct SessionController {
    sc_id: String,
    connections: Arc<ConnectionRegistry>,
    rooms: Arc<RoomRegistry>,
    dispatcher: SignalingDispatcher,
    cleanup: Arc<CleanupCoordinator>,
    metrics: Arc<SessionMetrics>,
    outbound_buffer: usize,
    shutdown: CancellationToken,
}

impl SessionController {
    /// Build a controller around the given engine.
    #[must_use]
    pub fn new(engine: Arc<dyn MediaEngine>, config: Config) -> Self {
        let metrics = SessionMetrics::new();
        let shutdown = CancellationToken::new();

        let connections = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomRegistry::new(
            engine,
            config.router_options(),
            Arc::clone(&metrics),
        ));
        let cleanup = Arc::new(CleanupCoordinator::new(
            Arc::clone(&connections),
            Arc::clone(&rooms),
            Arc::clone(&metrics),
            shutdown.child_token(),
        ));
        let dispatcher = SignalingDispatcher::new(
            Arc::clone(&connections),
            Arc::clone(&rooms),
            Arc::clone(&cleanup),
            Arc::clone(&metrics),
            config.max_peers_per_room,
        );

        info!(
            target: "sc.controller",
            sc_id = %config.sc_id,
            max_peers_per_room = config.max_peers_per_room,
            "Session controller initialized"
        );

        Self {
            sc_id: config.sc_id,
            connections,
            rooms,
            dispatcher,
            cleanup,
            metrics,
            outbound_buffer: config.outbound_buffer,
            shutdown,
        }
    }

    /// Get the controller instance ID.
    #[must_use]
    pub fn sc_id(&self) -> &str {
        &self.sc_id
    }

    /// Register an accepted connection carrying the client-supplied
    /// participant id.
    ///
    /// Returns the connection id for subsequent calls and the receiver
    /// the front-end drains toward the client.
    pub fn register_connection(
        &self,
        peer_id: PeerId,
    ) -> (ConnectionId, mpsc::Receiver<ServerMessage>) {
        let (handle, receiver) = self.connections.register(peer_id, self.outbound_buffer);
        self.metrics.connection_registered();

        debug!(
            target: "sc.controller",
            connection_id = %handle.connection_id(),
            peer_id = %handle.peer_id(),
            "Connection registered"
        );

        (handle.connection_id(), receiver)
    }

    /// Dispatch one typed request for `connection_id`.
    ///
    /// # Errors
    ///
    /// See [`ScError`]; callers turn the error into an error reply.
    pub async fn handle_request(
        &self,
        connection_id: ConnectionId,
        request: crate::protocol::ClientRequest,
    ) -> Result<ServerEvent, ScError> {
        self.dispatcher.dispatch(connection_id, request).await
    }

    /// Parse and dispatch one raw envelope, producing the wire reply.
    /// Malformed input and handler errors both become error replies; the
    /// connection stays usable.
    pub async fn handle_message(&self, connection_id: ConnectionId, raw: &str) -> ServerMessage {
        match serde_json::from_str::<ClientMessage>(raw) {
            Ok(message) => {
                let seq = message.seq;
                match self.dispatcher.dispatch(connection_id, message.request).await {
                    Ok(event) => ServerMessage::reply(seq, event),
                    Err(err) => {
                        debug!(
                            target: "sc.controller",
                            connection_id = %connection_id,
                            error = %err,
                            "Request rejected"
                        );
                        ServerMessage::reply(seq, ServerEvent::error(&err))
                    }
                }
            }
            Err(err) => {
                let err = ScError::MalformedMessage(err.to_string());
                debug!(
                    target: "sc.controller",
                    connection_id = %connection_id,
                    error = %err,
                    "Unparseable message"
                );
                ServerMessage::reply(None, ServerEvent::error(&err))
            }
        }
    }

    /// Connection lost: cascade cleanup for everything its peer owned.
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        self.cleanup.on_disconnect(connection_id).await;
    }

    /// Drain the controller: reject new joins, release every peer and
    /// every router, drop every connection.
    pub async fn shutdown(&self) {
        info!(
            target: "sc.controller",
            sc_id = %self.sc_id,
            rooms = self.rooms.len(),
            connections = self.connections.len(),
            "Shutting down"
        );

        self.shutdown.cancel();

        for room in self.rooms.drain() {
            self.cleanup.drain_room(&room).await;
        }

        for _ in self.connections.drain() {
            self.metrics.connection_removed();
        }

        info!(target: "sc.controller", sc_id = %self.sc_id, "Shutdown complete");
    }

    /// Look up a live room.
    #[must_use]
    pub fn room(&self, room_id: &RoomId) -> Option<Arc<Room>> {
        self.rooms.get(room_id)
    }

    /// Number of live rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Point-in-time metrics snapshot.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Token cancelled when the controller shuts down; front-ends can
    /// tie their accept loops to it.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}
