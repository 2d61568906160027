//! Crossbar Session Controller Library
//!
//! This library provides the signaling and session-orchestration core for
//! a multi-party, server-relayed media exchange (selective-forwarding
//! topology):
//!
//! - Room lifecycle: lazily created on first join, one engine router per
//!   room, released when the last participant leaves
//! - Peer and media resource ownership tracking (transports, producers,
//!   consumers) with multi-entity referential integrity
//! - The signaling state machine driving resource creation in protocol
//!   order, with broadcasts to room members
//! - Cleanup cascades that guarantee no resource outlives its owner or
//!   its room, converging client- and engine-initiated teardown
//!
//! # Architecture
//!
//! ```text
//! SessionController (one per process)
//! ├── ConnectionRegistry   connection id -> outbound handle + membership
//! ├── RoomRegistry         room id -> Room (atomic find-or-create)
//! │   └── Room             router handle + participants + ResourceTable
//! ├── SignalingDispatcher  protocol state machine
//! └── CleanupCoordinator   teardown cascades + engine-event watchers
//! ```
//!
//! The media engine and the raw connection transport are external
//! collaborators: the engine is reached through the `media-engine`
//! capability traits, and the transport front-end drives
//! [`SessionController`] through four calls (register, handle, disconnect,
//! shutdown). All state is in-memory; a restart starts from scratch.
//!
//! # Modules
//!
//! - [`controller`] - the embedding facade
//! - [`dispatch`] - signaling state machine
//! - [`cleanup`] - teardown cascades
//! - [`registry`] - connections, rooms, peers, resources
//! - [`protocol`] - the `{event, data}` wire envelope
//! - [`config`] - service configuration from environment
//! - [`errors`] - error types with wire error codes
//! - [`metrics`] - atomic gauges and counters

#![warn(clippy::pedantic)]

pub mod cleanup;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod errors;
pub mod metrics;
pub mod protocol;
pub mod registry;

pub use config::Config;
pub use controller::SessionController;
pub use errors::ScError;
