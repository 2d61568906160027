//! Rooms and the room registry.
//!
//! A room exists exactly while it has participants (or is mid-creation).
//! Its router is created lazily on first join, exactly once per room id
//! even when two connections race to create the same brand-new room, and
//! released when the last participant leaves. Rejoining an emptied room
//! id yields a fresh router.
//!
//! # Locking
//!
//! Each room owns one sync mutex guarding its participant map and
//! resource table; it is only ever held for short synchronous sections,
//! never across an engine call. The registry map has its own mutex; lock
//! order is registry -> room where both are needed.

use crate::errors::ScError;
use crate::metrics::SessionMetrics;
use crate::protocol::{PeerInfo, ProducerInfo};
use crate::registry::connections::ConnectionHandle;
use crate::registry::resources::{
    ConsumerRecord, Peer, ProducerRecord, ResourceTable, TransportRecord,
};

use common::{ConsumerId, PeerId, ProducerId, RoomId, TransportId};
use media_engine::{
    ConsumerHandle, MediaEngine, RouterHandle, RouterOptions, TransportDirection, TransportHandle,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{info, warn};

/// Why a peer could not be added to a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AddPeerError {
    /// The room was emptied and torn down after the caller looked it up;
    /// retry from the registry.
    Closed,
    /// A peer with the same id is already in the room.
    Duplicate,
    /// The configured participant cap is reached.
    Full,
}

/// Everything a join needs from the instant the peer became a member.
#[derive(Debug)]
pub(crate) struct JoinSnapshot {
    /// Peers that were already present.
    pub roster: Vec<PeerInfo>,
    /// Their connections, for the peer-joined broadcast.
    pub targets: Vec<ConnectionHandle>,
}

/// A consumer that must be notified and closed because its producer went
/// away, together with its owner's connection.
pub(crate) struct DependentConsumer {
    pub record: ConsumerRecord,
    pub owner_connection: Option<ConnectionHandle>,
}

/// A producer detached from the room with every consumer bound to it.
pub(crate) struct ProducerDetach {
    pub record: ProducerRecord,
    pub dependents: Vec<DependentConsumer>,
}

/// Everything removed by taking one peer out of a room.
pub(crate) struct PeerRemoval {
    pub consumers: Vec<ConsumerRecord>,
    pub producers: Vec<ProducerDetach>,
    pub transports: Vec<TransportRecord>,
    /// Connections of the peers that remain.
    pub targets: Vec<ConnectionHandle>,
    pub now_empty: bool,
}

struct RoomState {
    peers: HashMap<PeerId, Peer>,
    resources: ResourceTable,
    /// Set under the registry lock when the room is being removed; a
    /// joiner holding a stale `Arc<Room>` sees it and retries.
    closed: bool,
}

/// One active room: the engine router plus the participants and
/// resources routed through it.
pub struct Room {
    id: RoomId,
    router: Arc<dyn RouterHandle>,
    created_at: i64,
    state: Mutex<RoomState>,
}

impl Room {
    fn new(id: RoomId, router: Arc<dyn RouterHandle>) -> Self {
        Self {
            id,
            router,
            created_at: chrono::Utc::now().timestamp(),
            state: Mutex::new(RoomState {
                peers: HashMap::new(),
                resources: ResourceTable::new(),
                closed: false,
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &RoomId {
        &self.id
    }

    #[must_use]
    pub fn router(&self) -> &Arc<dyn RouterHandle> {
        &self.router
    }

    #[must_use]
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.lock().peers.len()
    }

    /// Participant ids currently in the room (test and drift-check aid).
    #[must_use]
    pub fn participant_ids(&self) -> Vec<PeerId> {
        self.lock().peers.keys().cloned().collect()
    }

    /// Live resource counts: (transports, producers, consumers).
    #[must_use]
    pub fn resource_counts(&self) -> (usize, usize, usize) {
        let state = self.lock();
        (
            state.resources.transport_count(),
            state.resources.producer_count(),
            state.resources.consumer_count(),
        )
    }

    pub(crate) fn add_peer(&self, peer: Peer, max_peers: usize) -> Result<JoinSnapshot, AddPeerError> {
        let mut state = self.lock();
        if state.closed {
            return Err(AddPeerError::Closed);
        }
        if state.peers.contains_key(peer.id()) {
            return Err(AddPeerError::Duplicate);
        }
        if max_peers > 0 && state.peers.len() >= max_peers {
            return Err(AddPeerError::Full);
        }

        let roster: Vec<PeerInfo> = state.peers.values().map(Peer::to_info).collect();
        let targets: Vec<ConnectionHandle> =
            state.peers.values().map(|p| p.connection().clone()).collect();

        state.peers.insert(peer.id().clone(), peer);

        Ok(JoinSnapshot { roster, targets })
    }

    /// Remove a peer and detach everything it owned, in dependency order:
    /// its consumers first, then its producers (pulling in dependent
    /// consumers owned by the peers that stay), then its transports.
    pub(crate) fn remove_peer(&self, peer_id: &PeerId) -> Option<PeerRemoval> {
        let mut state = self.lock();
        let peer = state.peers.remove(peer_id)?;

        let mut consumers = Vec::new();
        for consumer_id in peer.consumer_ids().collect::<Vec<_>>() {
            if let Some(record) = state.resources.remove_consumer(consumer_id) {
                consumers.push(record);
            }
        }

        let mut producers = Vec::new();
        for producer_id in peer.producer_ids().collect::<Vec<_>>() {
            if let Some(detach) = detach_producer_locked(&mut state, producer_id) {
                producers.push(detach);
            }
        }

        let mut transports = Vec::new();
        for transport_id in peer.transport_ids().collect::<Vec<_>>() {
            if let Some(record) = state.resources.remove_transport(transport_id) {
                transports.push(record);
            }
        }

        let targets: Vec<ConnectionHandle> =
            state.peers.values().map(|p| p.connection().clone()).collect();
        let now_empty = state.peers.is_empty();

        Some(PeerRemoval {
            consumers,
            producers,
            transports,
            targets,
            now_empty,
        })
    }

    /// Record a freshly created transport, failing if the owner
    /// disconnected while the engine call was in flight.
    pub(crate) fn attach_transport(&self, record: TransportRecord) -> Result<(), ()> {
        let mut state = self.lock();
        let Some(peer) = state.peers.get_mut(&record.owner) else {
            return Err(());
        };
        peer.track_transport(record.id);
        state.resources.insert_transport(record);
        Ok(())
    }

    /// Record a freshly created producer. On success returns the
    /// connections of every *other* peer present right now - the exact
    /// recipient set of the new-producer broadcast.
    pub(crate) fn attach_producer(
        &self,
        record: ProducerRecord,
    ) -> Result<Vec<ConnectionHandle>, ()> {
        let mut state = self.lock();
        if !state.peers.contains_key(&record.owner) {
            return Err(());
        }

        let targets: Vec<ConnectionHandle> = state
            .peers
            .values()
            .filter(|p| p.id() != &record.owner)
            .map(|p| p.connection().clone())
            .collect();

        if let Some(peer) = state.peers.get_mut(&record.owner) {
            peer.track_producer(record.id);
        }
        state.resources.insert_producer(record);

        Ok(targets)
    }

    /// Record a freshly created consumer, failing if its owner or its
    /// producer vanished while the engine call was in flight.
    pub(crate) fn attach_consumer(&self, record: ConsumerRecord) -> Result<(), AttachConsumerError> {
        let mut state = self.lock();
        if state.resources.producer(record.producer_id).is_none() {
            return Err(AttachConsumerError::ProducerGone);
        }
        let Some(peer) = state.peers.get_mut(&record.owner) else {
            return Err(AttachConsumerError::PeerGone);
        };
        peer.track_consumer(record.id);
        state.resources.insert_consumer(record);
        Ok(())
    }

    /// Look up a transport owned by `peer_id` with the given direction.
    pub(crate) fn transport_for(
        &self,
        peer_id: &PeerId,
        transport_id: TransportId,
        direction: TransportDirection,
    ) -> Result<(Arc<dyn TransportHandle>, bool), ScError> {
        let state = self.lock();
        match state.resources.transport(transport_id) {
            Some(record) if record.owner == *peer_id && record.direction == direction => {
                Ok((Arc::clone(&record.handle), record.connected))
            }
            _ => Err(ScError::TransportNotFound(transport_id.to_string())),
        }
    }

    /// Look up a transport owned by `peer_id` regardless of direction
    /// (connectTransport addresses transports by id alone).
    pub(crate) fn owned_transport(
        &self,
        peer_id: &PeerId,
        transport_id: TransportId,
    ) -> Result<Arc<dyn TransportHandle>, ScError> {
        let state = self.lock();
        match state.resources.transport(transport_id) {
            Some(record) if record.owner == *peer_id => Ok(Arc::clone(&record.handle)),
            _ => Err(ScError::TransportNotFound(transport_id.to_string())),
        }
    }

    pub(crate) fn mark_transport_connected(&self, transport_id: TransportId) {
        let mut state = self.lock();
        if let Some(record) = state.resources.transport_mut(transport_id) {
            record.connected = true;
        }
    }

    #[must_use]
    pub(crate) fn producer_exists(&self, producer_id: ProducerId) -> bool {
        self.lock().resources.producer(producer_id).is_some()
    }

    /// Producers in the room excluding the caller's own.
    pub(crate) fn producers_except(&self, peer_id: &PeerId) -> Vec<ProducerInfo> {
        self.lock()
            .resources
            .producers()
            .filter(|record| record.owner != *peer_id)
            .map(|record| ProducerInfo {
                producer_id: record.id,
                peer_id: record.owner.clone(),
                kind: record.kind,
            })
            .collect()
    }

    /// Consumer handle and paused flag, if owned by `peer_id`.
    pub(crate) fn consumer_for(
        &self,
        peer_id: &PeerId,
        consumer_id: ConsumerId,
    ) -> Result<(Arc<dyn ConsumerHandle>, bool), ScError> {
        let state = self.lock();
        match state.resources.consumer(consumer_id) {
            Some(record) if record.owner == *peer_id => {
                Ok((Arc::clone(&record.handle), record.paused))
            }
            _ => Err(ScError::ConsumerNotFound(consumer_id.to_string())),
        }
    }

    pub(crate) fn mark_consumer_resumed(&self, consumer_id: ConsumerId) {
        let mut state = self.lock();
        if let Some(record) = state.resources.consumer_mut(consumer_id) {
            record.paused = false;
        }
    }

    /// Detach one producer and every consumer bound to it (engine-side
    /// closure and the disconnect cascade converge here).
    pub(crate) fn detach_producer(&self, producer_id: ProducerId) -> Option<ProducerDetach> {
        let mut state = self.lock();
        let detach = detach_producer_locked(&mut state, producer_id)?;
        // The producing peer may still be present (engine-side closure);
        // drop the id from its owned set.
        if let Some(owner) = state.peers.get_mut(&detach.record.owner) {
            owner.untrack_producer(producer_id);
        }
        Some(detach)
    }

    /// Detach one transport (engine-side closure).
    pub(crate) fn detach_transport(&self, transport_id: TransportId) -> Option<TransportRecord> {
        let mut state = self.lock();
        let record = state.resources.remove_transport(transport_id)?;
        if let Some(owner) = state.peers.get_mut(&record.owner) {
            owner.untrack_transport(transport_id);
        }
        Some(record)
    }

    /// Detach one consumer (engine-side closure). Returns the record and
    /// its owner's connection for the consumer-closed notice.
    pub(crate) fn detach_consumer(
        &self,
        consumer_id: ConsumerId,
    ) -> Option<(ConsumerRecord, Option<ConnectionHandle>)> {
        let mut state = self.lock();
        let record = state.resources.remove_consumer(consumer_id)?;
        let connection = match state.peers.get_mut(&record.owner) {
            Some(owner) => {
                owner.untrack_consumer(consumer_id);
                Some(owner.connection().clone())
            }
            None => None,
        };
        Some((record, connection))
    }

    /// Connection of a specific peer (directed relay).
    pub(crate) fn peer_connection(&self, peer_id: &PeerId) -> Option<ConnectionHandle> {
        self.lock()
            .peers
            .get(peer_id)
            .map(|p| p.connection().clone())
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn mark_closed(&self) {
        self.lock().closed = true;
    }

    fn is_empty(&self) -> bool {
        self.lock().peers.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, RoomState> {
        // Production code never panics (workspace lints), so poisoning is
        // unreachable; recover rather than propagate.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Why a freshly created consumer could not be recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttachConsumerError {
    PeerGone,
    ProducerGone,
}

fn detach_producer_locked(state: &mut RoomState, producer_id: ProducerId) -> Option<ProducerDetach> {
    let record = state.resources.remove_producer(producer_id)?;

    let mut dependents = Vec::new();
    for consumer_id in state.resources.consumers_of(producer_id) {
        if let Some(consumer) = state.resources.remove_consumer(consumer_id) {
            let owner_connection = match state.peers.get_mut(&consumer.owner) {
                Some(owner) => {
                    owner.untrack_consumer(consumer_id);
                    Some(owner.connection().clone())
                }
                None => None,
            };
            dependents.push(DependentConsumer {
                record: consumer,
                owner_connection,
            });
        }
    }

    Some(ProducerDetach { record, dependents })
}

/// Creation outcome broadcast to every joiner waiting on a new room.
#[derive(Clone)]
enum PendingRouter {
    InFlight,
    Ready(Arc<Room>),
    Failed(String),
}

enum RoomSlot {
    /// Router creation in flight; joiners wait on the channel.
    Pending(watch::Receiver<PendingRouter>),
    Ready(Arc<Room>),
}

/// Maps room ids to rooms; find-or-create is atomic with respect to
/// concurrent first-joins of the same id.
pub struct RoomRegistry {
    engine: Arc<dyn MediaEngine>,
    router_options: RouterOptions,
    metrics: Arc<SessionMetrics>,
    // Shared with detached router-creation tasks.
    slots: Arc<Mutex<HashMap<RoomId, RoomSlot>>>,
    // Once set, no new rooms are created and late creation tasks release
    // their router instead of registering it.
    draining: Arc<AtomicBool>,
}

impl RoomRegistry {
    #[must_use]
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        router_options: RouterOptions,
        metrics: Arc<SessionMetrics>,
    ) -> Self {
        Self {
            engine,
            router_options,
            metrics,
            slots: Arc::new(Mutex::new(HashMap::new())),
            draining: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Return the room for `room_id`, creating it (and its router) if
    /// absent.
    ///
    /// Concurrent first-joins of the same id elect one creator; everyone
    /// else waits for that creation to resolve, so at most one router is
    /// ever created per room id. Creation runs on a detached task: a
    /// joiner disconnecting mid-join cannot orphan the slot.
    ///
    /// # Errors
    ///
    /// `EngineUnavailable` if router creation fails; no room is
    /// registered in that case.
    pub async fn get_or_create(&self, room_id: &RoomId) -> Result<Arc<Room>, ScError> {
        enum Plan {
            Use(Arc<Room>),
            Wait(watch::Receiver<PendingRouter>),
            Create(watch::Receiver<PendingRouter>),
        }

        if self.draining.load(Ordering::SeqCst) {
            return Err(ScError::Draining);
        }

        let plan = {
            let mut slots = self.lock();
            match slots.get(room_id) {
                Some(RoomSlot::Ready(room)) => Plan::Use(Arc::clone(room)),
                Some(RoomSlot::Pending(rx)) => Plan::Wait(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(PendingRouter::InFlight);
                    slots.insert(room_id.clone(), RoomSlot::Pending(rx.clone()));
                    self.spawn_router_creation(room_id.clone(), tx);
                    Plan::Create(rx)
                }
            }
        };

        match plan {
            Plan::Use(room) => Ok(room),
            Plan::Wait(rx) | Plan::Create(rx) => self.await_creation(room_id, rx).await,
        }
    }

    /// Look up an existing room.
    #[must_use]
    pub fn get(&self, room_id: &RoomId) -> Option<Arc<Room>> {
        match self.lock().get(room_id) {
            Some(RoomSlot::Ready(room)) => Some(Arc::clone(room)),
            _ => None,
        }
    }

    /// Remove the room and release its router iff it has no
    /// participants. Idempotent. Returns the router to close, which the
    /// caller must do outside any lock.
    #[must_use]
    pub fn remove_if_empty(&self, room_id: &RoomId) -> Option<Arc<dyn RouterHandle>> {
        let mut slots = self.lock();
        match slots.get(room_id) {
            Some(RoomSlot::Ready(room)) if room.is_empty() && !room.is_closed() => {
                room.mark_closed();
                let router = Arc::clone(room.router());
                slots.remove(room_id);
                self.metrics.room_removed();
                info!(
                    target: "sc.rooms",
                    room_id = %room_id,
                    "Room emptied, releasing router"
                );
                Some(router)
            }
            _ => None,
        }
    }

    /// Number of live rooms (pending creations excluded).
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|slot| matches!(slot, RoomSlot::Ready(_)))
            .count()
    }

    /// Whether no rooms exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every room, returning them for draining (shutdown path).
    /// New joins fail with `Draining` from this point on.
    #[must_use]
    pub fn drain(&self) -> Vec<Arc<Room>> {
        self.draining.store(true, Ordering::SeqCst);
        let mut slots = self.lock();
        let rooms: Vec<Arc<Room>> = slots
            .values()
            .filter_map(|slot| match slot {
                RoomSlot::Ready(room) => Some(Arc::clone(room)),
                RoomSlot::Pending(_) => None,
            })
            .collect();
        for room in &rooms {
            room.mark_closed();
            self.metrics.room_removed();
        }
        slots.clear();
        rooms
    }

    /// Create the router on a detached task and resolve the pending slot.
    ///
    /// Detached so that cancellation of the joining handler (client hung
    /// up mid-join) cannot leave the slot stuck in flight; the engine
    /// call is allowed to complete either way.
    fn spawn_router_creation(&self, room_id: RoomId, tx: watch::Sender<PendingRouter>) {
        let engine = Arc::clone(&self.engine);
        let options = self.router_options.clone();
        let metrics = Arc::clone(&self.metrics);
        let slots = Arc::clone(&self.slots);
        let draining = Arc::clone(&self.draining);

        tokio::spawn(async move {
            match engine.create_router(options).await {
                Ok(router) => {
                    let room = Arc::new(Room::new(room_id.clone(), router));
                    // The draining check must happen under the slots lock
                    // so a drain cannot slip between check and insert.
                    let registered = {
                        let mut guard = slots.lock().unwrap_or_else(PoisonError::into_inner);
                        if draining.load(Ordering::SeqCst) {
                            guard.remove(&room_id);
                            false
                        } else {
                            guard.insert(room_id.clone(), RoomSlot::Ready(Arc::clone(&room)));
                            true
                        }
                    };

                    if registered {
                        metrics.room_created();
                        info!(
                            target: "sc.rooms",
                            room_id = %room_id,
                            "Room created with fresh router"
                        );
                        let _ = tx.send(PendingRouter::Ready(room));
                    } else {
                        // Shutdown won the race; release the router instead
                        // of registering a room nobody will drain.
                        if let Err(err) = room.router().close().await {
                            warn!(
                                target: "sc.rooms",
                                room_id = %room_id,
                                error = %err,
                                "Failed to release router created during drain"
                            );
                        }
                        let _ =
                            tx.send(PendingRouter::Failed("controller is draining".to_string()));
                    }
                }
                Err(err) => {
                    // No room is registered on failure; the next join of
                    // this id starts a fresh creation attempt.
                    slots
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .remove(&room_id);
                    metrics.engine_create_failed();
                    warn!(
                        target: "sc.rooms",
                        room_id = %room_id,
                        error = %err,
                        "Router creation failed"
                    );
                    let _ = tx.send(PendingRouter::Failed(err.to_string()));
                }
            }
        });
    }

    async fn await_creation(
        &self,
        room_id: &RoomId,
        mut rx: watch::Receiver<PendingRouter>,
    ) -> Result<Arc<Room>, ScError> {
        loop {
            let current = rx.borrow().clone();
            match current {
                PendingRouter::Ready(room) => return Ok(room),
                PendingRouter::Failed(reason) => {
                    return Err(ScError::EngineUnavailable(reason));
                }
                PendingRouter::InFlight => {
                    if rx.changed().await.is_err() {
                        // Creator vanished without resolving; treat as failure.
                        warn!(
                            target: "sc.rooms",
                            room_id = %room_id,
                            "Router creation abandoned"
                        );
                        return Err(ScError::EngineUnavailable(
                            "router creation abandoned".to_string(),
                        ));
                    }
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RoomId, RoomSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
