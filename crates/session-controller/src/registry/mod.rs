//! Registries owning all in-memory controller state.
//!
//! State is split by lifetime: connections live from transport accept to
//! transport loss, rooms from first join to last leave, and resources
//! from engine creation to the cleanup cascade. Each registry owns its
//! maps and is passed around by `Arc`; nothing is ambient.

pub mod connections;
pub mod resources;
pub mod rooms;

pub use connections::{ConnectionHandle, ConnectionRegistry};
pub use resources::{ConsumerRecord, Peer, ProducerRecord, ResourceTable, TransportRecord};
pub use rooms::{Room, RoomRegistry};
