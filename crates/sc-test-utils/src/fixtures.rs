//! Canned parameter values for tests.

use media_engine::{
    DtlsFingerprint, DtlsParameters, DtlsRole, IceCandidate, IceParameters, RtpCapabilities,
    RtpParameters,
};

/// ICE parameters a mock transport hands out.
pub fn ice_parameters() -> IceParameters {
    IceParameters {
        username_fragment: "mockufrag".to_string(),
        password: "mockpassword".to_string(),
        ice_lite: true,
    }
}

/// A single mock ICE candidate.
pub fn ice_candidates() -> Vec<IceCandidate> {
    vec![IceCandidate {
        foundation: "udpcandidate".to_string(),
        priority: 1_076_302_079,
        address: "127.0.0.1".to_string(),
        port: 40_000,
        protocol: "udp".to_string(),
    }]
}

/// DTLS parameters a mock transport hands out (server role).
pub fn server_dtls_parameters() -> DtlsParameters {
    DtlsParameters {
        role: DtlsRole::Server,
        fingerprints: vec![DtlsFingerprint {
            algorithm: "sha-256".to_string(),
            value: "0A:1B:2C:3D:4E:5F".to_string(),
        }],
    }
}

/// DTLS parameters a client sends in `connectTransport`.
pub fn client_dtls_parameters() -> DtlsParameters {
    DtlsParameters {
        role: DtlsRole::Client,
        fingerprints: vec![DtlsFingerprint {
            algorithm: "sha-256".to_string(),
            value: "F5:E4:D3:C2:B1:A0".to_string(),
        }],
    }
}

/// Client RTP capabilities (opaque to the controller).
pub fn rtp_capabilities() -> RtpCapabilities {
    RtpCapabilities(serde_json::json!({
        "codecs": [
            {"mimeType": "audio/opus", "clockRate": 48000, "channels": 2},
            {"mimeType": "video/VP8", "clockRate": 90000}
        ]
    }))
}

/// RTP parameters for a `produce` request (opaque to the controller).
pub fn rtp_parameters(mime_type: &str) -> RtpParameters {
    RtpParameters(serde_json::json!({
        "mimeType": mime_type,
        "encodings": [{"ssrc": 1111}]
    }))
}
