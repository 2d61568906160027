//! Session controller error types.
//!
//! Error types map to signaling `error_code` values for client replies.
//! Internal details are logged server-side but not exposed to clients.

use thiserror::Error;

/// Session controller error type.
///
/// Maps to signaling `error_code` values:
/// - `NotJoined`, `DuplicateJoin`, `TransportNotConnected`: `PROTOCOL_ORDER` (1)
/// - `MalformedMessage`: `BAD_REQUEST` (2)
/// - `TransportNotFound`, `ProducerNotFound`, `ConsumerNotFound`: `NOT_FOUND` (4)
/// - `IncompatibleCapabilities`: `INCOMPATIBLE` (5)
/// - `EngineUnavailable`, `Internal`: `INTERNAL_ERROR` (6)
/// - `RoomFull`, `Draining`: `CAPACITY_EXCEEDED` (7)
#[derive(Debug, Error)]
pub enum ScError {
    /// Operation requires room membership not yet established.
    #[error("not joined to any room")]
    NotJoined,

    /// The connection already has a joined peer.
    #[error("already joined")]
    DuplicateJoin,

    /// The envelope could not be parsed.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The peer owns no matching transport for the requested direction.
    #[error("transport not found: {0}")]
    TransportNotFound(String),

    /// The transport exists but has not completed its security handshake.
    #[error("transport not connected: {0}")]
    TransportNotConnected(String),

    /// No live producer with that id exists in the peer's room.
    #[error("producer not found: {0}")]
    ProducerNotFound(String),

    /// The peer owns no consumer with that id.
    #[error("consumer not found: {0}")]
    ConsumerNotFound(String),

    /// The engine cannot match the producer to the stated capabilities.
    #[error("incompatible capabilities for producer {0}")]
    IncompatibleCapabilities(String),

    /// An engine call failed during resource creation.
    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The room is at its configured participant capacity.
    #[error("room at capacity: {0}")]
    RoomFull(String),

    /// The controller is draining (graceful shutdown).
    #[error("controller is draining")]
    Draining,

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ScError {
    /// Returns the signaling `error_code` value for this error.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            ScError::NotJoined | ScError::DuplicateJoin | ScError::TransportNotConnected(_) => {
                1 // PROTOCOL_ORDER
            }
            ScError::MalformedMessage(_) => 2, // BAD_REQUEST
            ScError::TransportNotFound(_)
            | ScError::ProducerNotFound(_)
            | ScError::ConsumerNotFound(_) => 4, // NOT_FOUND
            ScError::IncompatibleCapabilities(_) => 5, // INCOMPATIBLE
            ScError::EngineUnavailable(_) | ScError::Internal(_) => 6, // INTERNAL_ERROR
            ScError::RoomFull(_) | ScError::Draining => 7, // CAPACITY_EXCEEDED
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            ScError::NotJoined => "Join a room first".to_string(),
            ScError::DuplicateJoin => "Already joined".to_string(),
            ScError::MalformedMessage(_) => "Malformed message".to_string(),
            ScError::TransportNotFound(_) => "Transport not found".to_string(),
            ScError::TransportNotConnected(_) => "Transport is not connected yet".to_string(),
            ScError::ProducerNotFound(_) => "Producer not found".to_string(),
            ScError::ConsumerNotFound(_) => "Consumer not found".to_string(),
            ScError::IncompatibleCapabilities(_) => {
                "Capabilities cannot consume this producer".to_string()
            }
            ScError::EngineUnavailable(_) | ScError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            ScError::RoomFull(_) => "Room is at capacity".to_string(),
            ScError::Draining => "Server is shutting down, please reconnect".to_string(),
        }
    }
}

impl From<media_engine::EngineError> for ScError {
    fn from(err: media_engine::EngineError) -> Self {
        ScError::EngineUnavailable(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        // Protocol ordering violations -> 1
        assert_eq!(ScError::NotJoined.error_code(), 1);
        assert_eq!(ScError::DuplicateJoin.error_code(), 1);
        assert_eq!(
            ScError::TransportNotConnected("t1".to_string()).error_code(),
            1
        );

        // Bad request -> 2
        assert_eq!(
            ScError::MalformedMessage("expected value".to_string()).error_code(),
            2
        );

        // Not found -> 4
        assert_eq!(ScError::TransportNotFound("t1".to_string()).error_code(), 4);
        assert_eq!(ScError::ProducerNotFound("p1".to_string()).error_code(), 4);
        assert_eq!(ScError::ConsumerNotFound("c1".to_string()).error_code(), 4);

        // Incompatible -> 5
        assert_eq!(
            ScError::IncompatibleCapabilities("p1".to_string()).error_code(),
            5
        );

        // Internal -> 6
        assert_eq!(
            ScError::EngineUnavailable("worker died".to_string()).error_code(),
            6
        );
        assert_eq!(ScError::Internal("bug".to_string()).error_code(), 6);

        // Capacity -> 7
        assert_eq!(ScError::RoomFull("math101".to_string()).error_code(), 7);
        assert_eq!(ScError::Draining.error_code(), 7);
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let engine_err = ScError::EngineUnavailable("worker at 10.0.0.3:9000 crashed".to_string());
        assert!(!engine_err.client_message().contains("10.0.0.3"));
        assert_eq!(engine_err.client_message(), "An internal error occurred");

        let internal = ScError::Internal("resource table drift for peer alice".to_string());
        assert!(!internal.client_message().contains("alice"));
    }

    #[test]
    fn test_engine_error_conversion() {
        let err: ScError =
            media_engine::EngineError::OperationFailed("no capacity".to_string()).into();
        assert!(matches!(err, ScError::EngineUnavailable(_)));
        assert_eq!(err.error_code(), 6);
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!("{}", ScError::TransportNotFound("abc".to_string())),
            "transport not found: abc"
        );
        assert_eq!(format!("{}", ScError::Draining), "controller is draining");
    }
}
