//! Peer session state and the per-room resource table.
//!
//! The canonical record for every transport, producer and consumer lives
//! in [`ResourceTable`]; each [`Peer`] carries the id-sets of what it
//! owns. The two are only ever updated together, under the owning room's
//! lock (see `rooms`), which is what keeps the ownership bookkeeping and
//! the table from drifting apart.

use crate::protocol::PeerInfo;
use crate::registry::connections::ConnectionHandle;

use common::{ConsumerId, PeerId, ProducerId, TransportId};
use media_engine::{
    ConsumerHandle, MediaKind, ProducerHandle, TransportDirection, TransportHandle,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A transport owned by one peer.
pub struct TransportRecord {
    pub id: TransportId,
    pub owner: PeerId,
    pub direction: TransportDirection,
    /// Set once `connectTransport` completed the security handshake.
    pub connected: bool,
    pub handle: Arc<dyn TransportHandle>,
}

/// A producer owned by one peer.
pub struct ProducerRecord {
    pub id: ProducerId,
    pub owner: PeerId,
    pub kind: MediaKind,
    pub handle: Arc<dyn ProducerHandle>,
}

/// A consumer owned by one peer, bound to some peer's producer.
///
/// `producer_id` is a relation, not ownership: the producer belongs to
/// another peer, and closing it must close or notify this consumer.
pub struct ConsumerRecord {
    pub id: ConsumerId,
    pub owner: PeerId,
    pub producer_id: ProducerId,
    /// Consumers are created paused and unpaused by `resumeConsumer`.
    pub paused: bool,
    pub handle: Arc<dyn ConsumerHandle>,
}

/// Per-participant session state.
pub struct Peer {
    id: PeerId,
    connection: ConnectionHandle,
    metadata: serde_json::Value,
    joined_at: i64,
    transports: HashSet<TransportId>,
    producers: HashSet<ProducerId>,
    consumers: HashSet<ConsumerId>,
}

impl Peer {
    #[must_use]
    pub fn new(connection: ConnectionHandle, metadata: serde_json::Value) -> Self {
        Self {
            id: connection.peer_id().clone(),
            connection,
            metadata,
            joined_at: chrono::Utc::now().timestamp(),
            transports: HashSet::new(),
            producers: HashSet::new(),
            consumers: HashSet::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &PeerId {
        &self.id
    }

    #[must_use]
    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    #[must_use]
    pub fn joined_at(&self) -> i64 {
        self.joined_at
    }

    /// Summary used in rosters and join broadcasts.
    #[must_use]
    pub fn to_info(&self) -> PeerInfo {
        PeerInfo {
            peer_id: self.id.clone(),
            metadata: self.metadata.clone(),
        }
    }

    pub(crate) fn track_transport(&mut self, id: TransportId) {
        self.transports.insert(id);
    }

    pub(crate) fn untrack_transport(&mut self, id: TransportId) {
        self.transports.remove(&id);
    }

    pub(crate) fn track_producer(&mut self, id: ProducerId) {
        self.producers.insert(id);
    }

    pub(crate) fn untrack_producer(&mut self, id: ProducerId) {
        self.producers.remove(&id);
    }

    pub(crate) fn track_consumer(&mut self, id: ConsumerId) {
        self.consumers.insert(id);
    }

    pub(crate) fn untrack_consumer(&mut self, id: ConsumerId) {
        self.consumers.remove(&id);
    }

    #[must_use]
    pub fn transport_ids(&self) -> impl Iterator<Item = TransportId> + '_ {
        self.transports.iter().copied()
    }

    #[must_use]
    pub fn producer_ids(&self) -> impl Iterator<Item = ProducerId> + '_ {
        self.producers.iter().copied()
    }

    #[must_use]
    pub fn consumer_ids(&self) -> impl Iterator<Item = ConsumerId> + '_ {
        self.consumers.iter().copied()
    }
}

/// Indexed records for one room: three independent mappings, constant-time
/// lookup by id.
#[derive(Default)]
pub struct ResourceTable {
    transports: HashMap<TransportId, TransportRecord>,
    producers: HashMap<ProducerId, ProducerRecord>,
    consumers: HashMap<ConsumerId, ConsumerRecord>,
}

impl ResourceTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert_transport(&mut self, record: TransportRecord) {
        self.transports.insert(record.id, record);
    }

    pub(crate) fn remove_transport(&mut self, id: TransportId) -> Option<TransportRecord> {
        self.transports.remove(&id)
    }

    #[must_use]
    pub fn transport(&self, id: TransportId) -> Option<&TransportRecord> {
        self.transports.get(&id)
    }

    pub(crate) fn transport_mut(&mut self, id: TransportId) -> Option<&mut TransportRecord> {
        self.transports.get_mut(&id)
    }

    pub(crate) fn insert_producer(&mut self, record: ProducerRecord) {
        self.producers.insert(record.id, record);
    }

    pub(crate) fn remove_producer(&mut self, id: ProducerId) -> Option<ProducerRecord> {
        self.producers.remove(&id)
    }

    #[must_use]
    pub fn producer(&self, id: ProducerId) -> Option<&ProducerRecord> {
        self.producers.get(&id)
    }

    #[must_use]
    pub fn producers(&self) -> impl Iterator<Item = &ProducerRecord> {
        self.producers.values()
    }

    pub(crate) fn insert_consumer(&mut self, record: ConsumerRecord) {
        self.consumers.insert(record.id, record);
    }

    pub(crate) fn remove_consumer(&mut self, id: ConsumerId) -> Option<ConsumerRecord> {
        self.consumers.remove(&id)
    }

    #[must_use]
    pub fn consumer(&self, id: ConsumerId) -> Option<&ConsumerRecord> {
        self.consumers.get(&id)
    }

    pub(crate) fn consumer_mut(&mut self, id: ConsumerId) -> Option<&mut ConsumerRecord> {
        self.consumers.get_mut(&id)
    }

    /// Ids of all consumers bound to `producer_id`, whoever owns them.
    #[must_use]
    pub fn consumers_of(&self, producer_id: ProducerId) -> Vec<ConsumerId> {
        self.consumers
            .values()
            .filter(|c| c.producer_id == producer_id)
            .map(|c| c.id)
            .collect()
    }

    #[must_use]
    pub fn transport_count(&self) -> usize {
        self.transports.len()
    }

    #[must_use]
    pub fn producer_count(&self) -> usize {
        self.producers.len()
    }

    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }
}
