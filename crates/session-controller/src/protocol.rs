//! Signaling protocol: the `{event, data}` message envelope.
//!
//! Every message on the wire is a JSON object with an `event` tag and a
//! `data` payload, plus an optional client-chosen `seq` echoed in direct
//! replies so callers can correlate request and response. Unsolicited
//! pushes carry no `seq`.

use crate::errors::ScError;

use common::{ConsumerId, PeerId, ProducerId, RoomId, TransportId};
use media_engine::{
    DtlsParameters, IceCandidate, IceParameters, MediaKind, RtpCapabilities, RtpParameters,
    TransportDirection,
};
use serde::{Deserialize, Serialize};

/// Summary of a peer, carried in rosters and join broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub peer_id: PeerId,
    /// Opaque client-supplied metadata (display name etc.).
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

/// Summary of a live producer, returned by `listProducers` and carried in
/// new-producer broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerInfo {
    pub producer_id: ProducerId,
    pub peer_id: PeerId,
    pub kind: MediaKind,
}

/// Inbound signaling requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientRequest {
    /// Join a room, creating it (and its router) if needed.
    #[serde(rename_all = "camelCase")]
    Join {
        room_id: RoomId,
        #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
        metadata: serde_json::Value,
    },

    /// Create a transport for one media direction.
    #[serde(rename_all = "camelCase")]
    CreateTransport { direction: TransportDirection },

    /// Complete a transport's security handshake.
    #[serde(rename_all = "camelCase")]
    ConnectTransport {
        transport_id: TransportId,
        dtls_parameters: DtlsParameters,
    },

    /// Publish media through a connected producing transport.
    #[serde(rename_all = "camelCase")]
    Produce {
        transport_id: TransportId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    },

    /// Enumerate other peers' producers in the room.
    ListProducers,

    /// Subscribe to a producer through a consuming transport.
    #[serde(rename_all = "camelCase")]
    Consume {
        transport_id: TransportId,
        producer_id: ProducerId,
        rtp_capabilities: RtpCapabilities,
    },

    /// Unpause a consumer (consumers are created paused).
    #[serde(rename_all = "camelCase")]
    ResumeConsumer { consumer_id: ConsumerId },

    /// Forward an opaque payload to one peer in the same room.
    #[serde(rename_all = "camelCase")]
    Relay {
        to: PeerId,
        payload: serde_json::Value,
    },

    /// Leave the room; the connection stays open.
    Leave,
}

/// Outbound signaling messages: direct replies and unsolicited pushes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    // --- direct replies ---
    /// Reply to `join`.
    #[serde(rename_all = "camelCase")]
    Joined {
        room_id: RoomId,
        router_rtp_capabilities: RtpCapabilities,
        /// Peers already present, so late joiners need no retroactive
        /// broadcasts.
        peers: Vec<PeerInfo>,
    },

    /// Reply to `createTransport`.
    #[serde(rename_all = "camelCase")]
    TransportCreated {
        transport_id: TransportId,
        direction: TransportDirection,
        ice_parameters: IceParameters,
        ice_candidates: Vec<IceCandidate>,
        dtls_parameters: DtlsParameters,
    },

    /// Reply to `connectTransport`.
    #[serde(rename_all = "camelCase")]
    TransportConnected { transport_id: TransportId },

    /// Reply to `produce`.
    #[serde(rename_all = "camelCase")]
    Produced { producer_id: ProducerId },

    /// Reply to `listProducers`.
    #[serde(rename_all = "camelCase")]
    ProducerList { producers: Vec<ProducerInfo> },

    /// Reply to `consume`.
    #[serde(rename_all = "camelCase")]
    Consumed {
        consumer_id: ConsumerId,
        producer_id: ProducerId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    },

    /// Reply to `resumeConsumer`.
    #[serde(rename_all = "camelCase")]
    ConsumerResumed { consumer_id: ConsumerId },

    /// Reply to `relay` (delivery is best-effort, this only acknowledges
    /// acceptance).
    Relayed,

    /// Reply to `leave`.
    Left,

    /// Error reply to any request.
    #[serde(rename_all = "camelCase")]
    Error { code: i32, message: String },

    // --- unsolicited pushes ---
    /// A peer joined the room.
    #[serde(rename_all = "camelCase")]
    PeerJoined { peer: PeerInfo },

    /// A peer left the room (or its connection dropped).
    #[serde(rename_all = "camelCase")]
    PeerLeft { peer_id: PeerId },

    /// A peer started producing; sent to everyone already in the room
    /// except the producer.
    #[serde(rename_all = "camelCase")]
    NewProducer {
        peer_id: PeerId,
        producer_id: ProducerId,
        kind: MediaKind,
    },

    /// A producer this peer consumes was closed; the named consumer is
    /// gone. Direct message, not a broadcast.
    #[serde(rename_all = "camelCase")]
    ProducerClosed {
        producer_id: ProducerId,
        consumer_id: ConsumerId,
    },

    /// The engine closed a consumer on its own.
    #[serde(rename_all = "camelCase")]
    ConsumerClosed { consumer_id: ConsumerId },

    /// Relayed payload from another peer.
    #[serde(rename_all = "camelCase")]
    Relay {
        from: PeerId,
        payload: serde_json::Value,
    },
}

impl ServerEvent {
    /// Build an error reply from a controller error.
    #[must_use]
    pub fn error(err: &ScError) -> Self {
        ServerEvent::Error {
            code: err.error_code(),
            message: err.client_message(),
        }
    }
}

/// Wire envelope for inbound messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Client-chosen correlation number, echoed in the direct reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(flatten)]
    pub request: ClientRequest,
}

/// Wire envelope for outbound messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(flatten)]
    pub event: ServerEvent,
}

impl ServerMessage {
    /// A direct reply correlated to a request.
    #[must_use]
    pub fn reply(seq: Option<u64>, event: ServerEvent) -> Self {
        Self { seq, event }
    }

    /// An unsolicited push.
    #[must_use]
    pub fn push(event: ServerEvent) -> Self {
        Self { seq: None, event }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_join_envelope_shape() {
        let msg = ClientMessage {
            seq: Some(3),
            request: ClientRequest::Join {
                room_id: RoomId::from("math101"),
                metadata: serde_json::json!({"displayName": "Alice"}),
            },
        };

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["seq"], 3);
        assert_eq!(value["event"], "join");
        assert_eq!(value["data"]["roomId"], "math101");
        assert_eq!(value["data"]["metadata"]["displayName"], "Alice");
    }

    #[test]
    fn test_join_without_metadata_parses() {
        let raw = r#"{"event": "join", "data": {"roomId": "r1"}}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();

        assert_eq!(msg.seq, None);
        match msg.request {
            ClientRequest::Join { room_id, metadata } => {
                assert_eq!(room_id, RoomId::from("r1"));
                assert!(metadata.is_null());
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_unit_request_parses_without_data() {
        let raw = r#"{"event": "listProducers"}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.request, ClientRequest::ListProducers);

        let raw = r#"{"event": "leave", "seq": 9}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.request, ClientRequest::Leave);
        assert_eq!(msg.seq, Some(9));
    }

    #[test]
    fn test_new_producer_push_shape() {
        let producer_id = ProducerId::new();
        let push = ServerMessage::push(ServerEvent::NewProducer {
            peer_id: PeerId::from("alice"),
            producer_id,
            kind: MediaKind::Video,
        });

        let value = serde_json::to_value(&push).unwrap();
        assert_eq!(value["event"], "newProducer");
        assert_eq!(value["data"]["peerId"], "alice");
        assert_eq!(value["data"]["kind"], "video");
        assert!(value.get("seq").is_none());
    }

    #[test]
    fn test_error_reply_from_sc_error() {
        let reply = ServerMessage::reply(
            Some(7),
            ServerEvent::error(&ScError::TransportNotFound("t1".to_string())),
        );

        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["seq"], 7);
        assert_eq!(value["event"], "error");
        assert_eq!(value["data"]["code"], 4);
        assert_eq!(value["data"]["message"], "Transport not found");
    }

    #[test]
    fn test_consume_request_round_trip() {
        let request = ClientRequest::Consume {
            transport_id: TransportId::new(),
            producer_id: ProducerId::new(),
            rtp_capabilities: RtpCapabilities(serde_json::json!({"codecs": []})),
        };

        let encoded = serde_json::to_string(&request).unwrap();
        let decoded: ClientRequest = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, request);
    }
}
