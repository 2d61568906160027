//! Common types shared across Crossbar components.

#![warn(clippy::pedantic)]

/// Module for common identifier types
pub mod types;

pub use types::{ConnectionId, ConsumerId, PeerId, ProducerId, RoomId, TransportId};
