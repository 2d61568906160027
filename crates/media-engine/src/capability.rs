//! Object-safe traits for the engine capability surface.
//!
//! Production engines live out of process or behind FFI; tests use the
//! mock in `sc-test-utils`. Handles are `Arc<dyn _>` so records in the
//! session controller can hold them while the engine retains ownership
//! of the underlying resources.
//!
//! Every closable handle exposes [`closed`](ProducerHandle::closed), a
//! [`CancellationToken`] the engine fires when the resource dies on its
//! side (or after a successful `close` call). Subscribers must tolerate
//! the signal firing for closures they initiated themselves.

use crate::error::EngineError;
use crate::params::{
    DtlsParameters, IceCandidate, IceParameters, MediaKind, RouterOptions, RtpCapabilities,
    RtpParameters, TransportDirection,
};

use async_trait::async_trait;
use common::{ConsumerId, ProducerId, TransportId};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Entry point: creates one router per room.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Create a router configured with the given codecs.
    async fn create_router(
        &self,
        options: RouterOptions,
    ) -> Result<Arc<dyn RouterHandle>, EngineError>;
}

/// Per-room routing context.
#[async_trait]
pub trait RouterHandle: Send + Sync {
    /// Capability descriptor clients need before they can consume.
    fn rtp_capabilities(&self) -> RtpCapabilities;

    /// Create a bidirectional transport endpoint.
    async fn create_transport(
        &self,
        direction: TransportDirection,
    ) -> Result<Arc<dyn TransportHandle>, EngineError>;

    /// Whether a consumer with `capabilities` can receive `producer_id`.
    fn can_consume(&self, producer_id: ProducerId, capabilities: &RtpCapabilities) -> bool;

    /// Release the router and everything routed through it.
    async fn close(&self) -> Result<(), EngineError>;
}

/// A negotiated network path between one client and the engine.
#[async_trait]
pub trait TransportHandle: Send + Sync {
    fn id(&self) -> TransportId;

    fn ice_parameters(&self) -> IceParameters;

    fn ice_candidates(&self) -> Vec<IceCandidate>;

    fn dtls_parameters(&self) -> DtlsParameters;

    /// Complete the security handshake with client-provided parameters.
    async fn connect(&self, dtls: DtlsParameters) -> Result<(), EngineError>;

    /// Create a producer fed by this transport.
    async fn produce(
        &self,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<Arc<dyn ProducerHandle>, EngineError>;

    /// Create a consumer bound to `producer_id`, delivered over this
    /// transport. Consumers start paused.
    async fn consume(
        &self,
        producer_id: ProducerId,
        capabilities: RtpCapabilities,
    ) -> Result<Arc<dyn ConsumerHandle>, EngineError>;

    async fn close(&self) -> Result<(), EngineError>;

    /// Fired when the transport dies on the engine side.
    fn closed(&self) -> CancellationToken;
}

/// A media source published through a producing transport.
#[async_trait]
pub trait ProducerHandle: Send + Sync {
    fn id(&self) -> ProducerId;

    fn kind(&self) -> MediaKind;

    async fn close(&self) -> Result<(), EngineError>;

    /// Fired when the producer dies on the engine side (e.g. its
    /// transport went away).
    fn closed(&self) -> CancellationToken;
}

/// A subscription to a remote producer over a consuming transport.
#[async_trait]
pub trait ConsumerHandle: Send + Sync {
    fn id(&self) -> ConsumerId;

    fn kind(&self) -> MediaKind;

    /// Parameters the client needs to receive this consumer.
    fn rtp_parameters(&self) -> RtpParameters;

    async fn resume(&self) -> Result<(), EngineError>;

    async fn pause(&self) -> Result<(), EngineError>;

    async fn close(&self) -> Result<(), EngineError>;

    /// Fired when the consumer dies on the engine side.
    fn closed(&self) -> CancellationToken;
}
