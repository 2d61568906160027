//! Media engine capability interface for Crossbar.
//!
//! The session controller never touches packets. All media work -
//! routing, codec negotiation, congestion control, encryption - is
//! delegated to an engine reached through the object-safe traits in
//! [`capability`]. The controller only orchestrates: it asks the engine
//! for routers, transports, producers and consumers, records what it was
//! given, and closes handles when their owner goes away.
//!
//! Engines report their side of the lifecycle through a closed-signal
//! per handle (see [`capability::ProducerHandle::closed`]); the
//! controller subscribes at creation time and funnels engine-initiated
//! teardown into the same cascade as client-initiated teardown.

#![warn(clippy::pedantic)]

pub mod capability;
pub mod error;
pub mod params;

pub use capability::{ConsumerHandle, MediaEngine, ProducerHandle, RouterHandle, TransportHandle};
pub use error::EngineError;
pub use params::{
    DtlsFingerprint, DtlsParameters, DtlsRole, IceCandidate, IceParameters, MediaKind,
    RouterOptions, RtpCapabilities, RtpCodecCapability, RtpParameters, TransportDirection,
};
