//! Mock media engine for controller testing.
//!
//! Provides a mock engine that can be configured to:
//! - Fail router/transport/producer/consumer creation
//! - Reject capability matches (`can_consume` returns false)
//! - Delay router creation to widen race windows
//!
//! Closed-signals cascade the way a real engine's do: closing a router
//! fires every transport created from it, and closing a transport fires
//! every producer/consumer riding on it (tokens are parent/child).
//! `force_close_producer`/`force_close_transport` simulate engine-side
//! resource death for a resource the test only knows by id.
//!
//! # Example
//!
//! ```rust,ignore
//! let engine = MockMediaEngine::builder()
//!     .reject_consume()
//!     .router_delay(Duration::from_millis(50))
//!     .build();
//! ```

use crate::fixtures;

use async_trait::async_trait;
use common::{ConsumerId, ProducerId, TransportId};
use media_engine::{
    ConsumerHandle, DtlsParameters, EngineError, IceCandidate, IceParameters, MediaEngine,
    MediaKind, ProducerHandle, RouterHandle, RouterOptions, RtpCapabilities, RtpParameters,
    TransportDirection, TransportHandle,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-operation call counters.
#[derive(Debug, Default)]
pub struct MockStats {
    routers_created: AtomicUsize,
    routers_closed: AtomicUsize,
    transports_created: AtomicUsize,
    producers_created: AtomicUsize,
    consumers_created: AtomicUsize,
    connect_calls: AtomicUsize,
    resume_calls: AtomicUsize,
}

impl MockStats {
    pub fn routers_created(&self) -> usize {
        self.routers_created.load(Ordering::SeqCst)
    }

    pub fn routers_closed(&self) -> usize {
        self.routers_closed.load(Ordering::SeqCst)
    }

    pub fn transports_created(&self) -> usize {
        self.transports_created.load(Ordering::SeqCst)
    }

    pub fn producers_created(&self) -> usize {
        self.producers_created.load(Ordering::SeqCst)
    }

    pub fn consumers_created(&self) -> usize {
        self.consumers_created.load(Ordering::SeqCst)
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn resume_calls(&self) -> usize {
        self.resume_calls.load(Ordering::SeqCst)
    }
}

/// Failure injection switches.
#[derive(Debug, Clone, Default)]
struct Behavior {
    fail_router_creation: bool,
    fail_transport_creation: bool,
    fail_produce: bool,
    fail_consume: bool,
    reject_consume: bool,
    router_delay: Option<Duration>,
}

/// State shared by every handle of one mock engine.
#[derive(Default)]
struct MockShared {
    stats: MockStats,
    /// Live producers: kind + closed-token, for consume lookups and
    /// engine-side closure simulation.
    producers: Mutex<HashMap<ProducerId, (MediaKind, CancellationToken)>>,
    /// Live transports' closed-tokens.
    transports: Mutex<HashMap<TransportId, CancellationToken>>,
}

/// Builder for [`MockMediaEngine`].
#[derive(Debug, Default)]
pub struct MockMediaEngineBuilder {
    behavior: Behavior,
}

impl MockMediaEngineBuilder {
    /// Every `create_router` call fails.
    pub fn fail_router_creation(mut self) -> Self {
        self.behavior.fail_router_creation = true;
        self
    }

    /// Every `create_transport` call fails.
    pub fn fail_transport_creation(mut self) -> Self {
        self.behavior.fail_transport_creation = true;
        self
    }

    /// Every `produce` call fails.
    pub fn fail_produce(mut self) -> Self {
        self.behavior.fail_produce = true;
        self
    }

    /// Every `consume` call fails.
    pub fn fail_consume(mut self) -> Self {
        self.behavior.fail_consume = true;
        self
    }

    /// `can_consume` reports incompatibility for everything.
    pub fn reject_consume(mut self) -> Self {
        self.behavior.reject_consume = true;
        self
    }

    /// Sleep this long inside `create_router` (race-window widening).
    pub fn router_delay(mut self, delay: Duration) -> Self {
        self.behavior.router_delay = Some(delay);
        self
    }

    pub fn build(self) -> Arc<MockMediaEngine> {
        Arc::new(MockMediaEngine {
            behavior: self.behavior,
            shared: Arc::new(MockShared::default()),
        })
    }
}

/// Mock media engine.
pub struct MockMediaEngine {
    behavior: Behavior,
    shared: Arc<MockShared>,
}

impl MockMediaEngine {
    pub fn builder() -> MockMediaEngineBuilder {
        MockMediaEngineBuilder::default()
    }

    /// Call counters for assertions.
    pub fn stats(&self) -> &MockStats {
        &self.shared.stats
    }

    /// Simulate the engine killing a producer (e.g. its uplink died).
    /// Returns false if the producer is unknown.
    pub fn force_close_producer(&self, producer_id: ProducerId) -> bool {
        let removed = self
            .shared
            .producers
            .lock()
            .unwrap()
            .remove(&producer_id);
        match removed {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Simulate the engine killing a transport. Producers and consumers
    /// riding on it fire their own closed-signals via token parentage.
    pub fn force_close_transport(&self, transport_id: TransportId) -> bool {
        let removed = self
            .shared
            .transports
            .lock()
            .unwrap()
            .remove(&transport_id);
        match removed {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of producers the engine currently considers live.
    pub fn live_producers(&self) -> usize {
        self.shared.producers.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaEngine for MockMediaEngine {
    async fn create_router(
        &self,
        _options: RouterOptions,
    ) -> Result<Arc<dyn RouterHandle>, EngineError> {
        if let Some(delay) = self.behavior.router_delay {
            tokio::time::sleep(delay).await;
        }
        if self.behavior.fail_router_creation {
            return Err(EngineError::OperationFailed(
                "mock router creation failure".to_string(),
            ));
        }

        self.shared.stats.routers_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockRouter {
            behavior: self.behavior.clone(),
            shared: Arc::clone(&self.shared),
            closed: CancellationToken::new(),
        }))
    }
}

struct MockRouter {
    behavior: Behavior,
    shared: Arc<MockShared>,
    closed: CancellationToken,
}

#[async_trait]
impl RouterHandle for MockRouter {
    fn rtp_capabilities(&self) -> RtpCapabilities {
        fixtures::rtp_capabilities()
    }

    async fn create_transport(
        &self,
        direction: TransportDirection,
    ) -> Result<Arc<dyn TransportHandle>, EngineError> {
        if self.behavior.fail_transport_creation {
            return Err(EngineError::OperationFailed(
                "mock transport creation failure".to_string(),
            ));
        }
        if self.closed.is_cancelled() {
            return Err(EngineError::Closed);
        }

        let id = TransportId::new();
        let closed = self.closed.child_token();
        self.shared
            .transports
            .lock()
            .unwrap()
            .insert(id, closed.clone());
        self.shared
            .stats
            .transports_created
            .fetch_add(1, Ordering::SeqCst);

        Ok(Arc::new(MockTransport {
            id,
            direction,
            connected: AtomicBool::new(false),
            behavior: self.behavior.clone(),
            shared: Arc::clone(&self.shared),
            closed,
        }))
    }

    fn can_consume(&self, _producer_id: ProducerId, _capabilities: &RtpCapabilities) -> bool {
        !self.behavior.reject_consume
    }

    async fn close(&self) -> Result<(), EngineError> {
        if self.closed.is_cancelled() {
            return Err(EngineError::Closed);
        }
        self.closed.cancel();
        self.shared.stats.routers_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockTransport {
    id: TransportId,
    direction: TransportDirection,
    connected: AtomicBool,
    behavior: Behavior,
    shared: Arc<MockShared>,
    closed: CancellationToken,
}

#[async_trait]
impl TransportHandle for MockTransport {
    fn id(&self) -> TransportId {
        self.id
    }

    fn ice_parameters(&self) -> IceParameters {
        fixtures::ice_parameters()
    }

    fn ice_candidates(&self) -> Vec<IceCandidate> {
        fixtures::ice_candidates()
    }

    fn dtls_parameters(&self) -> DtlsParameters {
        fixtures::server_dtls_parameters()
    }

    async fn connect(&self, _dtls: DtlsParameters) -> Result<(), EngineError> {
        if self.closed.is_cancelled() {
            return Err(EngineError::Closed);
        }
        self.connected.store(true, Ordering::SeqCst);
        self.shared.stats.connect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn produce(
        &self,
        kind: MediaKind,
        _rtp_parameters: RtpParameters,
    ) -> Result<Arc<dyn ProducerHandle>, EngineError> {
        if self.behavior.fail_produce {
            return Err(EngineError::OperationFailed(
                "mock produce failure".to_string(),
            ));
        }
        if self.closed.is_cancelled() {
            return Err(EngineError::Closed);
        }
        if self.direction != TransportDirection::Producing {
            return Err(EngineError::OperationFailed(
                "produce on consuming transport".to_string(),
            ));
        }

        let id = ProducerId::new();
        let closed = self.closed.child_token();
        self.shared
            .producers
            .lock()
            .unwrap()
            .insert(id, (kind, closed.clone()));
        self.shared
            .stats
            .producers_created
            .fetch_add(1, Ordering::SeqCst);

        Ok(Arc::new(MockProducer {
            id,
            kind,
            shared: Arc::clone(&self.shared),
            closed,
        }))
    }

    async fn consume(
        &self,
        producer_id: ProducerId,
        _capabilities: RtpCapabilities,
    ) -> Result<Arc<dyn ConsumerHandle>, EngineError> {
        if self.behavior.fail_consume {
            return Err(EngineError::OperationFailed(
                "mock consume failure".to_string(),
            ));
        }
        if self.closed.is_cancelled() {
            return Err(EngineError::Closed);
        }
        if self.direction != TransportDirection::Consuming {
            return Err(EngineError::OperationFailed(
                "consume on producing transport".to_string(),
            ));
        }

        let kind = self
            .shared
            .producers
            .lock()
            .unwrap()
            .get(&producer_id)
            .map_or(MediaKind::Video, |(kind, _)| *kind);

        self.shared
            .stats
            .consumers_created
            .fetch_add(1, Ordering::SeqCst);

        Ok(Arc::new(MockConsumer {
            id: ConsumerId::new(),
            kind,
            paused: AtomicBool::new(true),
            shared: Arc::clone(&self.shared),
            closed: self.closed.child_token(),
        }))
    }

    async fn close(&self) -> Result<(), EngineError> {
        if self.closed.is_cancelled() {
            return Err(EngineError::Closed);
        }
        self.shared.transports.lock().unwrap().remove(&self.id);
        self.closed.cancel();
        Ok(())
    }

    fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }
}

struct MockProducer {
    id: ProducerId,
    kind: MediaKind,
    shared: Arc<MockShared>,
    closed: CancellationToken,
}

#[async_trait]
impl ProducerHandle for MockProducer {
    fn id(&self) -> ProducerId {
        self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    async fn close(&self) -> Result<(), EngineError> {
        if self.closed.is_cancelled() {
            return Err(EngineError::Closed);
        }
        self.shared.producers.lock().unwrap().remove(&self.id);
        self.closed.cancel();
        Ok(())
    }

    fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }
}

struct MockConsumer {
    id: ConsumerId,
    kind: MediaKind,
    paused: AtomicBool,
    shared: Arc<MockShared>,
    closed: CancellationToken,
}

#[async_trait]
impl ConsumerHandle for MockConsumer {
    fn id(&self) -> ConsumerId {
        self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn rtp_parameters(&self) -> RtpParameters {
        fixtures::rtp_parameters(match self.kind {
            MediaKind::Audio => "audio/opus",
            MediaKind::Video => "video/VP8",
        })
    }

    async fn resume(&self) -> Result<(), EngineError> {
        if self.closed.is_cancelled() {
            return Err(EngineError::Closed);
        }
        self.paused.store(false, Ordering::SeqCst);
        self.shared.stats.resume_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn pause(&self) -> Result<(), EngineError> {
        if self.closed.is_cancelled() {
            return Err(EngineError::Closed);
        }
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), EngineError> {
        if self.closed.is_cancelled() {
            return Err(EngineError::Closed);
        }
        self.closed.cancel();
        Ok(())
    }

    fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }
}
