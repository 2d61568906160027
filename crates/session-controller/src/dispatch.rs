//! The signaling state machine.
//!
//! One dispatcher instance serves every connection. Handlers validate
//! preconditions against registry state, call the engine, then re-check
//! that the peer (and, for consumers, the producer) survived the call
//! before recording anything - a connection can drop while an engine
//! call for it is in flight, and results arriving for a vanished peer
//! must create no records.
//!
//! Room locks are never held across an engine call; each handler takes
//! them in short sessions around discrete state mutations.

use crate::cleanup::CleanupCoordinator;
use crate::errors::ScError;
use crate::metrics::SessionMetrics;
use crate::protocol::{ClientRequest, PeerInfo, ServerEvent, ServerMessage};
use crate::registry::connections::{ConnectionHandle, ConnectionRegistry};
use crate::registry::rooms::{AddPeerError, AttachConsumerError, Room, RoomRegistry};
use crate::registry::resources::{ConsumerRecord, Peer, ProducerRecord, TransportRecord};

use common::{ConnectionId, ConsumerId, PeerId, ProducerId, RoomId, TransportId};
use media_engine::{
    DtlsParameters, MediaKind, RtpCapabilities, RtpParameters, TransportDirection,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Protocol state machine: routes each inbound request to its handler.
pub struct SignalingDispatcher {
    connections: Arc<ConnectionRegistry>,
    rooms: Arc<RoomRegistry>,
    cleanup: Arc<CleanupCoordinator>,
    metrics: Arc<SessionMetrics>,
    max_peers_per_room: usize,
}

impl SignalingDispatcher {
    #[must_use]
    pub fn new(
        connections: Arc<ConnectionRegistry>,
        rooms: Arc<RoomRegistry>,
        cleanup: Arc<CleanupCoordinator>,
        metrics: Arc<SessionMetrics>,
        max_peers_per_room: usize,
    ) -> Self {
        Self {
            connections,
            rooms,
            cleanup,
            metrics,
            max_peers_per_room,
        }
    }

    /// Handle one request from `connection_id`, returning the direct
    /// reply. Out-of-order requests produce error replies, never a
    /// dropped connection.
    ///
    /// # Errors
    ///
    /// See [`ScError`]; every variant maps to an error reply.
    pub async fn dispatch(
        &self,
        connection_id: ConnectionId,
        request: ClientRequest,
    ) -> Result<ServerEvent, ScError> {
        match request {
            ClientRequest::Join { room_id, metadata } => {
                self.handle_join(connection_id, room_id, metadata).await
            }
            ClientRequest::CreateTransport { direction } => {
                self.handle_create_transport(connection_id, direction).await
            }
            ClientRequest::ConnectTransport {
                transport_id,
                dtls_parameters,
            } => {
                self.handle_connect_transport(connection_id, transport_id, dtls_parameters)
                    .await
            }
            ClientRequest::Produce {
                transport_id,
                kind,
                rtp_parameters,
            } => {
                self.handle_produce(connection_id, transport_id, kind, rtp_parameters)
                    .await
            }
            ClientRequest::ListProducers => self.handle_list_producers(connection_id),
            ClientRequest::Consume {
                transport_id,
                producer_id,
                rtp_capabilities,
            } => {
                self.handle_consume(connection_id, transport_id, producer_id, rtp_capabilities)
                    .await
            }
            ClientRequest::ResumeConsumer { consumer_id } => {
                self.handle_resume_consumer(connection_id, consumer_id).await
            }
            ClientRequest::Relay { to, payload } => {
                self.handle_relay(connection_id, to, payload).await
            }
            ClientRequest::Leave => {
                self.cleanup.release_peer(connection_id).await;
                Ok(ServerEvent::Left)
            }
        }
    }

    /// `join`: find or create the room, register the peer, return the
    /// router capabilities and the current roster, and tell everyone
    /// already there.
    async fn handle_join(
        &self,
        connection_id: ConnectionId,
        room_id: RoomId,
        metadata: serde_json::Value,
    ) -> Result<ServerEvent, ScError> {
        let (handle, membership) = self
            .connections
            .session(connection_id)
            .ok_or_else(|| ScError::Internal("connection not registered".to_string()))?;
        if membership.is_some() {
            return Err(ScError::DuplicateJoin);
        }

        let peer_id = handle.peer_id().clone();

        // A room emptied by a concurrent disconnect closes between our
        // lookup and add_peer; retry from the registry until we land in a
        // live room.
        let (room, snapshot) = loop {
            let room = self.rooms.get_or_create(&room_id).await?;
            let peer = Peer::new(handle.clone(), metadata.clone());
            match room.add_peer(peer, self.max_peers_per_room) {
                Ok(snapshot) => break (room, snapshot),
                Err(AddPeerError::Closed) => continue,
                Err(AddPeerError::Duplicate) => return Err(ScError::DuplicateJoin),
                Err(AddPeerError::Full) => return Err(ScError::RoomFull(room_id.to_string())),
            }
        };

        self.connections.set_room(connection_id, room_id.clone());
        self.metrics.peer_joined();

        info!(
            target: "sc.dispatch",
            room_id = %room_id,
            peer_id = %peer_id,
            participants = snapshot.roster.len() + 1,
            "Peer joined"
        );

        let joined = PeerInfo {
            peer_id,
            metadata,
        };
        for target in &snapshot.targets {
            target
                .deliver(ServerMessage::push(ServerEvent::PeerJoined {
                    peer: joined.clone(),
                }))
                .await;
        }

        Ok(ServerEvent::Joined {
            room_id,
            router_rtp_capabilities: room.router().rtp_capabilities(),
            peers: snapshot.roster,
        })
    }

    /// `createTransport`: ask the engine for a transport endpoint and
    /// record it against the peer.
    async fn handle_create_transport(
        &self,
        connection_id: ConnectionId,
        direction: TransportDirection,
    ) -> Result<ServerEvent, ScError> {
        let (handle, room) = self.member(connection_id)?;

        let transport = room
            .router()
            .create_transport(direction)
            .await
            .map_err(|err| self.engine_create_failure(err))?;

        let transport_id = transport.id();
        let record = TransportRecord {
            id: transport_id,
            owner: handle.peer_id().clone(),
            direction,
            connected: false,
            handle: Arc::clone(&transport),
        };

        if room.attach_transport(record).is_err() {
            // Peer disconnected while the engine call was in flight.
            self.discard_transport(transport.as_ref()).await;
            return Err(ScError::NotJoined);
        }

        self.metrics.transport_created();
        Arc::clone(&self.cleanup).watch_transport(Arc::clone(&room), Arc::clone(&transport));

        debug!(
            target: "sc.dispatch",
            room_id = %room.id(),
            peer_id = %handle.peer_id(),
            transport_id = %transport_id,
            direction = direction.as_str(),
            "Transport created"
        );

        Ok(ServerEvent::TransportCreated {
            transport_id,
            direction,
            ice_parameters: transport.ice_parameters(),
            ice_candidates: transport.ice_candidates(),
            dtls_parameters: transport.dtls_parameters(),
        })
    }

    /// `connectTransport`: complete the security handshake.
    async fn handle_connect_transport(
        &self,
        connection_id: ConnectionId,
        transport_id: TransportId,
        dtls_parameters: DtlsParameters,
    ) -> Result<ServerEvent, ScError> {
        let (handle, room) = self.member(connection_id)?;
        let transport = room.owned_transport(handle.peer_id(), transport_id)?;

        transport
            .connect(dtls_parameters)
            .await
            .map_err(|err| self.engine_create_failure(err))?;

        // No-op if the record was torn down while the engine connected.
        room.mark_transport_connected(transport_id);

        Ok(ServerEvent::TransportConnected { transport_id })
    }

    /// `produce`: publish media through a connected producing transport
    /// and notify everyone already in the room.
    async fn handle_produce(
        &self,
        connection_id: ConnectionId,
        transport_id: TransportId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<ServerEvent, ScError> {
        let (handle, room) = self.member(connection_id)?;
        let peer_id = handle.peer_id().clone();

        let (transport, connected) =
            room.transport_for(&peer_id, transport_id, TransportDirection::Producing)?;
        if !connected {
            return Err(ScError::TransportNotConnected(transport_id.to_string()));
        }

        let producer = transport
            .produce(kind, rtp_parameters)
            .await
            .map_err(|err| self.engine_create_failure(err))?;

        let producer_id = producer.id();
        let record = ProducerRecord {
            id: producer_id,
            owner: peer_id.clone(),
            kind,
            handle: Arc::clone(&producer),
        };

        // The broadcast target set is snapshotted in the same lock session
        // that records the producer: exactly the peers joined at the time
        // of production. Later joiners discover it via listProducers.
        let targets = match room.attach_producer(record) {
            Ok(targets) => targets,
            Err(()) => {
                self.discard_producer(producer.as_ref()).await;
                return Err(ScError::NotJoined);
            }
        };

        self.metrics.producer_created();
        Arc::clone(&self.cleanup).watch_producer(Arc::clone(&room), Arc::clone(&producer));

        info!(
            target: "sc.dispatch",
            room_id = %room.id(),
            peer_id = %peer_id,
            producer_id = %producer_id,
            kind = kind.as_str(),
            notified = targets.len(),
            "Producer created"
        );

        for target in &targets {
            target
                .deliver(ServerMessage::push(ServerEvent::NewProducer {
                    peer_id: peer_id.clone(),
                    producer_id,
                    kind,
                }))
                .await;
        }

        Ok(ServerEvent::Produced { producer_id })
    }

    /// `listProducers`: producers in the room excluding the caller's own.
    fn handle_list_producers(&self, connection_id: ConnectionId) -> Result<ServerEvent, ScError> {
        let (handle, room) = self.member(connection_id)?;
        Ok(ServerEvent::ProducerList {
            producers: room.producers_except(handle.peer_id()),
        })
    }

    /// `consume`: subscribe to a producer, paused, after a compatibility
    /// check. Creates nothing when the capabilities cannot match.
    async fn handle_consume(
        &self,
        connection_id: ConnectionId,
        transport_id: TransportId,
        producer_id: ProducerId,
        rtp_capabilities: RtpCapabilities,
    ) -> Result<ServerEvent, ScError> {
        let (handle, room) = self.member(connection_id)?;
        let peer_id = handle.peer_id().clone();

        let (transport, _connected) =
            room.transport_for(&peer_id, transport_id, TransportDirection::Consuming)?;

        if !room.producer_exists(producer_id) {
            return Err(ScError::ProducerNotFound(producer_id.to_string()));
        }
        if !room.router().can_consume(producer_id, &rtp_capabilities) {
            return Err(ScError::IncompatibleCapabilities(producer_id.to_string()));
        }

        let consumer = transport
            .consume(producer_id, rtp_capabilities)
            .await
            .map_err(|err| self.engine_create_failure(err))?;

        let consumer_id = consumer.id();
        let record = ConsumerRecord {
            id: consumer_id,
            owner: peer_id.clone(),
            producer_id,
            paused: true,
            handle: Arc::clone(&consumer),
        };

        // Re-validate after the engine call: the producer (or this very
        // peer) may have gone away while the consumer was being created.
        match room.attach_consumer(record) {
            Ok(()) => {}
            Err(AttachConsumerError::ProducerGone) => {
                self.discard_consumer(consumer.as_ref()).await;
                return Err(ScError::ProducerNotFound(producer_id.to_string()));
            }
            Err(AttachConsumerError::PeerGone) => {
                self.discard_consumer(consumer.as_ref()).await;
                return Err(ScError::NotJoined);
            }
        }

        self.metrics.consumer_created();
        Arc::clone(&self.cleanup).watch_consumer(Arc::clone(&room), Arc::clone(&consumer));

        debug!(
            target: "sc.dispatch",
            room_id = %room.id(),
            peer_id = %peer_id,
            consumer_id = %consumer_id,
            producer_id = %producer_id,
            "Consumer created (paused)"
        );

        Ok(ServerEvent::Consumed {
            consumer_id,
            producer_id,
            kind: consumer.kind(),
            rtp_parameters: consumer.rtp_parameters(),
        })
    }

    /// `resumeConsumer`: unpause; acknowledged without an engine call if
    /// already resumed.
    async fn handle_resume_consumer(
        &self,
        connection_id: ConnectionId,
        consumer_id: ConsumerId,
    ) -> Result<ServerEvent, ScError> {
        let (handle, room) = self.member(connection_id)?;
        let (consumer, paused) = room.consumer_for(handle.peer_id(), consumer_id)?;

        if paused {
            consumer
                .resume()
                .await
                .map_err(|err| self.engine_create_failure(err))?;
            room.mark_consumer_resumed(consumer_id);
        }

        Ok(ServerEvent::ConsumerResumed { consumer_id })
    }

    /// `relay`: forward an opaque payload to one peer in the same room,
    /// stamping the sender. Unknown targets are dropped silently.
    async fn handle_relay(
        &self,
        connection_id: ConnectionId,
        to: PeerId,
        payload: serde_json::Value,
    ) -> Result<ServerEvent, ScError> {
        let (handle, room) = self.member(connection_id)?;

        match room.peer_connection(&to) {
            Some(target) => {
                target
                    .deliver(ServerMessage::push(ServerEvent::Relay {
                        from: handle.peer_id().clone(),
                        payload,
                    }))
                    .await;
            }
            None => {
                debug!(
                    target: "sc.dispatch",
                    room_id = %room.id(),
                    from = %handle.peer_id(),
                    to = %to,
                    "Dropping relay to unknown peer"
                );
            }
        }

        Ok(ServerEvent::Relayed)
    }

    /// Resolve a connection to its handle and joined room.
    fn member(&self, connection_id: ConnectionId) -> Result<(ConnectionHandle, Arc<Room>), ScError> {
        let (handle, membership) = self
            .connections
            .session(connection_id)
            .ok_or(ScError::NotJoined)?;
        let room_id = membership.ok_or(ScError::NotJoined)?;
        let room = self.rooms.get(&room_id).ok_or(ScError::NotJoined)?;
        Ok((handle, room))
    }

    fn engine_create_failure(&self, err: media_engine::EngineError) -> ScError {
        self.metrics.engine_create_failed();
        warn!(target: "sc.dispatch", error = %err, "Engine call failed");
        ScError::EngineUnavailable(err.to_string())
    }

    async fn discard_transport(&self, transport: &dyn media_engine::TransportHandle) {
        if let Err(err) = transport.close().await {
            debug!(target: "sc.dispatch", error = %err, "Failed to discard orphaned transport");
        }
    }

    async fn discard_producer(&self, producer: &dyn media_engine::ProducerHandle) {
        if let Err(err) = producer.close().await {
            debug!(target: "sc.dispatch", error = %err, "Failed to discard orphaned producer");
        }
    }

    async fn discard_consumer(&self, consumer: &dyn media_engine::ConsumerHandle) {
        if let Err(err) = consumer.close().await {
            debug!(target: "sc.dispatch", error = %err, "Failed to discard orphaned consumer");
        }
    }
}
