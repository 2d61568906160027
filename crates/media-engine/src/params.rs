//! Parameter types exchanged with the media engine.
//!
//! ICE and DTLS parameters are typed because the signaling layer has to
//! hand them to clients field by field. RTP parameters and capabilities
//! are deliberately opaque: clients and the engine agree on their shape,
//! the controller only relays them.

use serde::{Deserialize, Serialize};

/// Media kind of a producer or consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// Returns the kind as a string for log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

/// Direction of a transport relative to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportDirection {
    /// Client sends media to the engine.
    Producing,
    /// Client receives media from the engine.
    Consuming,
}

impl TransportDirection {
    /// Returns the direction as a string for log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransportDirection::Producing => "producing",
            TransportDirection::Consuming => "consuming",
        }
    }
}

/// A codec the router is configured to route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodecCapability {
    pub kind: MediaKind,
    /// MIME type, e.g. `"audio/opus"` or `"video/VP8"`.
    pub mime_type: String,
    pub clock_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
}

/// Configuration for router creation (one router per room).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterOptions {
    pub media_codecs: Vec<RtpCodecCapability>,
}

/// Router or client RTP capabilities, relayed verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RtpCapabilities(pub serde_json::Value);

/// RTP send/receive parameters, relayed verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RtpParameters(pub serde_json::Value);

/// ICE parameters of a transport, handed to the client at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceParameters {
    pub username_fragment: String,
    pub password: String,
    #[serde(default)]
    pub ice_lite: bool,
}

/// A single ICE candidate of a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub foundation: String,
    pub priority: u32,
    pub address: String,
    pub port: u16,
    pub protocol: String,
}

/// DTLS role of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtlsRole {
    Auto,
    Client,
    Server,
}

/// A DTLS certificate fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DtlsFingerprint {
    /// Hash algorithm, e.g. `"sha-256"`.
    pub algorithm: String,
    pub value: String,
}

/// DTLS security parameters used to connect a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DtlsParameters {
    pub role: DtlsRole,
    pub fingerprints: Vec<DtlsFingerprint>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_wire_format() {
        assert_eq!(serde_json::to_string(&MediaKind::Audio).unwrap(), "\"audio\"");
        assert_eq!(serde_json::to_string(&MediaKind::Video).unwrap(), "\"video\"");
        let kind: MediaKind = serde_json::from_str("\"video\"").unwrap();
        assert_eq!(kind, MediaKind::Video);
    }

    #[test]
    fn test_rtp_parameters_are_transparent() {
        let raw = serde_json::json!({"codecs": [{"mimeType": "video/VP8"}]});
        let params = RtpParameters(raw.clone());
        assert_eq!(serde_json::to_value(&params).unwrap(), raw);
    }

    #[test]
    fn test_dtls_parameters_round_trip() {
        let json = r#"{
            "role": "client",
            "fingerprints": [{"algorithm": "sha-256", "value": "AB:CD"}]
        }"#;
        let dtls: DtlsParameters = serde_json::from_str(json).unwrap();
        assert_eq!(dtls.role, DtlsRole::Client);
        assert_eq!(dtls.fingerprints.len(), 1);
        assert_eq!(dtls.fingerprints[0].algorithm, "sha-256");
    }

    #[test]
    fn test_ice_parameters_default_lite_flag() {
        let json = r#"{"usernameFragment": "ufrag", "password": "pwd"}"#;
        let ice: IceParameters = serde_json::from_str(json).unwrap();
        assert!(!ice.ice_lite);
    }
}
