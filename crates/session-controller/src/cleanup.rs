//! Teardown cascades.
//!
//! Whatever kills a peer - explicit `leave`, transport loss, or the
//! engine reporting a resource dead - ends up in the detach primitives
//! here, so every teardown path maintains the same guarantees:
//!
//! - local records are always removed, even when engine calls fail
//!   (failures are logged, never retried; a leaked engine resource is the
//!   engine's failure model, a leaked record would be ours);
//! - owners of consumers bound to a dying producer get exactly one
//!   producer-closed notice, delivered directly, before the records are
//!   purged;
//! - a room whose last participant leaves is removed and its router
//!   released.

use crate::metrics::SessionMetrics;
use crate::protocol::{ServerEvent, ServerMessage};
use crate::registry::connections::ConnectionRegistry;
use crate::registry::rooms::{PeerRemoval, ProducerDetach, Room, RoomRegistry};
use crate::registry::{ConsumerRecord, ProducerRecord, TransportRecord};

use common::{ConnectionId, ConsumerId, PeerId, ProducerId, RoomId, TransportId};
use media_engine::{ConsumerHandle, EngineError, ProducerHandle, RouterHandle, TransportHandle};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cascades resource release on peer departure and engine-side closures.
pub struct CleanupCoordinator {
    connections: Arc<ConnectionRegistry>,
    rooms: Arc<RoomRegistry>,
    metrics: Arc<SessionMetrics>,
    shutdown: CancellationToken,
}

impl CleanupCoordinator {
    #[must_use]
    pub fn new(
        connections: Arc<ConnectionRegistry>,
        rooms: Arc<RoomRegistry>,
        metrics: Arc<SessionMetrics>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            connections,
            rooms,
            metrics,
            shutdown,
        }
    }

    /// Connection lost: unregister it and release everything its peer
    /// owned. Safe to call for connections that never joined.
    pub async fn on_disconnect(&self, connection_id: ConnectionId) {
        let Some((handle, membership)) = self.connections.remove(connection_id) else {
            return;
        };
        self.metrics.connection_removed();

        debug!(
            target: "sc.cleanup",
            connection_id = %connection_id,
            peer_id = %handle.peer_id(),
            "Connection removed"
        );

        if let Some(room_id) = membership {
            self.release_from_room(&room_id, handle.peer_id()).await;
        }
    }

    /// Explicit leave: release the peer but keep the connection
    /// registered so it may join again.
    pub async fn release_peer(&self, connection_id: ConnectionId) {
        let Some((handle, membership)) = self.connections.session(connection_id) else {
            return;
        };
        let Some(room_id) = membership else {
            return;
        };

        self.connections.clear_room(connection_id);
        self.release_from_room(&room_id, handle.peer_id()).await;
    }

    /// Remove `peer_id` from its room and cascade in dependency order:
    /// consumers, producers (with their dependent consumers), transports.
    async fn release_from_room(&self, room_id: &RoomId, peer_id: &PeerId) {
        let Some(room) = self.rooms.get(room_id) else {
            return;
        };
        let Some(removal) = room.remove_peer(peer_id) else {
            return;
        };
        self.metrics.peer_left();

        // Notify before purging anything engine-side so remote rendering
        // pipelines can unwind first.
        for detach in &removal.producers {
            notify_dependents(detach).await;
        }

        let targets = removal.targets.clone();
        let now_empty = removal.now_empty;
        let (consumers_removed, producers_removed, transports_removed) =
            self.close_peer_resources(removal).await;

        for target in &targets {
            target
                .deliver(ServerMessage::push(ServerEvent::PeerLeft {
                    peer_id: peer_id.clone(),
                }))
                .await;
        }

        info!(
            target: "sc.cleanup",
            room_id = %room_id,
            peer_id = %peer_id,
            consumers = consumers_removed,
            producers = producers_removed,
            transports = transports_removed,
            remaining_participants = targets.len(),
            "Peer released"
        );

        if now_empty {
            self.remove_room_if_empty(room_id).await;
        }
    }

    /// Close the engine side of everything a peer removal detached, in
    /// dependency order. Returns (consumers, producers, transports)
    /// removed.
    async fn close_peer_resources(&self, removal: PeerRemoval) -> (usize, usize, usize) {
        let mut consumers_removed = removal.consumers.len();
        for record in removal.consumers {
            self.close_consumer(&record).await;
        }

        let producers_removed = removal.producers.len();
        for detach in removal.producers {
            for dependent in detach.dependents {
                consumers_removed += 1;
                self.close_consumer(&dependent.record).await;
            }
            self.close_producer(&detach.record).await;
        }

        let transports_removed = removal.transports.len();
        for record in removal.transports {
            self.close_transport(&record).await;
        }

        self.metrics.consumers_removed(consumers_removed);
        self.metrics.producers_removed(producers_removed);
        self.metrics.transports_removed(transports_removed);

        (consumers_removed, producers_removed, transports_removed)
    }

    /// Shutdown drain: release every peer of an already-deregistered room
    /// and close its router. No notifications - every connection is about
    /// to be dropped anyway.
    pub(crate) async fn drain_room(&self, room: &Arc<Room>) {
        for peer_id in room.participant_ids() {
            if let Some(removal) = room.remove_peer(&peer_id) {
                self.metrics.peer_left();
                let _ = self.close_peer_resources(removal).await;
            }
        }
        self.close_router(room.id(), room.router().as_ref()).await;
    }

    /// Remove the room and release its router if it has no participants.
    pub async fn remove_room_if_empty(&self, room_id: &RoomId) {
        if let Some(router) = self.rooms.remove_if_empty(room_id) {
            self.close_router(room_id, router.as_ref()).await;
        }
    }

    // --- engine-initiated closures -------------------------------------

    /// Watch a producer's closed-signal and cascade when it fires.
    ///
    /// The signal also fires after cascades we ran ourselves; the detach
    /// is a no-op then, so both paths stay converged on this one.
    pub fn watch_producer(self: Arc<Self>, room: Arc<Room>, handle: Arc<dyn ProducerHandle>) {
        let closed = handle.closed();
        let shutdown = self.shutdown.clone();
        let producer_id = handle.id();

        tokio::spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => {}
                () = closed.cancelled() => {
                    self.producer_closed(&room, producer_id).await;
                }
            }
        });
    }

    /// Watch a transport's closed-signal.
    pub fn watch_transport(self: Arc<Self>, room: Arc<Room>, handle: Arc<dyn TransportHandle>) {
        let closed = handle.closed();
        let shutdown = self.shutdown.clone();
        let transport_id = handle.id();

        tokio::spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => {}
                () = closed.cancelled() => {
                    self.transport_closed(&room, transport_id);
                }
            }
        });
    }

    /// Watch a consumer's closed-signal.
    pub fn watch_consumer(self: Arc<Self>, room: Arc<Room>, handle: Arc<dyn ConsumerHandle>) {
        let closed = handle.closed();
        let shutdown = self.shutdown.clone();
        let consumer_id = handle.id();

        tokio::spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => {}
                () = closed.cancelled() => {
                    self.consumer_closed(&room, consumer_id).await;
                }
            }
        });
    }

    /// The engine closed a producer (e.g. its transport died): purge it,
    /// close its consumers, and notify their owners directly.
    async fn producer_closed(&self, room: &Arc<Room>, producer_id: ProducerId) {
        let Some(detach) = room.detach_producer(producer_id) else {
            return; // already cascaded
        };

        debug!(
            target: "sc.cleanup",
            room_id = %room.id(),
            producer_id = %producer_id,
            dependents = detach.dependents.len(),
            "Engine closed producer"
        );

        notify_dependents(&detach).await;

        let consumers_removed = detach.dependents.len();
        for dependent in detach.dependents {
            self.close_consumer(&dependent.record).await;
        }

        self.metrics.consumers_removed(consumers_removed);
        self.metrics.producers_removed(1);
    }

    /// The engine closed a transport: drop the record. Producers and
    /// consumers riding on it get their own closed-signals from the
    /// engine and cascade through their own watchers.
    fn transport_closed(&self, room: &Arc<Room>, transport_id: TransportId) {
        if room.detach_transport(transport_id).is_some() {
            debug!(
                target: "sc.cleanup",
                room_id = %room.id(),
                transport_id = %transport_id,
                "Engine closed transport"
            );
            self.metrics.transports_removed(1);
        }
    }

    /// The engine closed a consumer on its own: drop the record and tell
    /// the owner.
    async fn consumer_closed(&self, room: &Arc<Room>, consumer_id: ConsumerId) {
        let Some((record, connection)) = room.detach_consumer(consumer_id) else {
            return; // already cascaded
        };

        debug!(
            target: "sc.cleanup",
            room_id = %room.id(),
            consumer_id = %consumer_id,
            producer_id = %record.producer_id,
            "Engine closed consumer"
        );

        if let Some(connection) = connection {
            connection
                .deliver(ServerMessage::push(ServerEvent::ConsumerClosed { consumer_id }))
                .await;
        }

        self.metrics.consumers_removed(1);
    }

    // --- best-effort engine closes -------------------------------------

    async fn close_consumer(&self, record: &ConsumerRecord) {
        self.log_close("consumer", &record.id.to_string(), record.handle.close().await);
    }

    async fn close_producer(&self, record: &ProducerRecord) {
        self.log_close("producer", &record.id.to_string(), record.handle.close().await);
    }

    async fn close_transport(&self, record: &TransportRecord) {
        self.log_close(
            "transport",
            &record.id.to_string(),
            record.handle.close().await,
        );
    }

    async fn close_router(&self, room_id: &RoomId, router: &dyn RouterHandle) {
        self.log_close("router", &room_id.to_string(), router.close().await);
    }

    fn log_close(&self, kind: &str, id: &str, result: Result<(), EngineError>) {
        match result {
            Ok(()) => {}
            Err(EngineError::Closed) => {
                // Engine got there first; nothing leaked.
                debug!(target: "sc.cleanup", kind, id, "Resource already closed by engine");
            }
            Err(err) => {
                // Cleanup is unconditional: the record is gone either way
                // and the engine owns its own inconsistency from here.
                self.metrics.engine_close_failed();
                warn!(
                    target: "sc.cleanup",
                    kind,
                    id,
                    error = %err,
                    "Engine close failed during teardown"
                );
            }
        }
    }
}

async fn notify_dependents(detach: &ProducerDetach) {
    for dependent in &detach.dependents {
        if let Some(connection) = &dependent.owner_connection {
            connection
                .deliver(ServerMessage::push(ServerEvent::ProducerClosed {
                    producer_id: detach.record.id,
                    consumer_id: dependent.record.id,
                }))
                .await;
        }
    }
}
