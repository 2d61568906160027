//! Shutdown drain behavior.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use common::{PeerId, RoomId};
use media_engine::TransportDirection;
use sc_test_utils::{fixtures, MockMediaEngine};
use session_controller::protocol::{ClientRequest, ServerEvent};
use session_controller::{Config, ScError, SessionController};

fn controller_with(engine: Arc<MockMediaEngine>) -> SessionController {
    let config = Config::from_vars(&std::collections::HashMap::new()).expect("config");
    SessionController::new(engine, config)
}

#[tokio::test]
async fn test_shutdown_releases_rooms_and_rejects_new_joins() {
    let engine = MockMediaEngine::builder().build();
    let controller = controller_with(Arc::clone(&engine));

    // Two occupied rooms with live resources
    for (peer, room) in [("alice", "r1"), ("bob", "r1"), ("carol", "r2")] {
        let (conn, _rx) = controller.register_connection(PeerId::from(peer));
        controller
            .handle_request(
                conn,
                ClientRequest::Join {
                    room_id: RoomId::from(room),
                    metadata: serde_json::Value::Null,
                },
            )
            .await
            .unwrap();
        if peer == "alice" {
            let reply = controller
                .handle_request(
                    conn,
                    ClientRequest::CreateTransport {
                        direction: TransportDirection::Producing,
                    },
                )
                .await
                .unwrap();
            let transport_id = match reply {
                ServerEvent::TransportCreated { transport_id, .. } => transport_id,
                other => panic!("unexpected reply: {other:?}"),
            };
            controller
                .handle_request(
                    conn,
                    ClientRequest::ConnectTransport {
                        transport_id,
                        dtls_parameters: fixtures::client_dtls_parameters(),
                    },
                )
                .await
                .unwrap();
            controller
                .handle_request(
                    conn,
                    ClientRequest::Produce {
                        transport_id,
                        kind: media_engine::MediaKind::Audio,
                        rtp_parameters: fixtures::rtp_parameters("audio/opus"),
                    },
                )
                .await
                .unwrap();
        }
    }

    assert_eq!(controller.room_count(), 2);
    let shutdown_token = controller.shutdown_token();
    assert!(!shutdown_token.is_cancelled());

    controller.shutdown().await;

    assert!(shutdown_token.is_cancelled());
    assert_eq!(controller.room_count(), 0);
    assert_eq!(engine.stats().routers_closed(), 2);
    assert_eq!(engine.live_producers(), 0);

    let snapshot = controller.metrics();
    assert_eq!(snapshot.rooms, 0);
    assert_eq!(snapshot.peers, 0);
    assert_eq!(snapshot.connections, 0);
    assert_eq!(snapshot.transports, 0);
    assert_eq!(snapshot.producers, 0);

    // New joins are refused while draining
    let (conn, _rx) = controller.register_connection(PeerId::from("dave"));
    let err = controller
        .handle_request(
            conn,
            ClientRequest::Join {
                room_id: RoomId::from("r3"),
                metadata: serde_json::Value::Null,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ScError::Draining));
}

#[tokio::test]
async fn test_teardown_engine_failures_do_not_leak_records() {
    // A transport whose engine-side close fails: the cascade must still
    // purge every record.
    let engine = MockMediaEngine::builder().build();
    let controller = controller_with(Arc::clone(&engine));

    let (conn, _rx) = controller.register_connection(PeerId::from("alice"));
    controller
        .handle_request(
            conn,
            ClientRequest::Join {
                room_id: RoomId::from("r1"),
                metadata: serde_json::Value::Null,
            },
        )
        .await
        .unwrap();
    let reply = controller
        .handle_request(
            conn,
            ClientRequest::CreateTransport {
                direction: TransportDirection::Producing,
            },
        )
        .await
        .unwrap();
    let transport_id = match reply {
        ServerEvent::TransportCreated { transport_id, .. } => transport_id,
        other => panic!("unexpected reply: {other:?}"),
    };

    // Kill the transport engine-side first, so the cascade's close call
    // finds it already gone (EngineError::Closed path).
    assert!(engine.force_close_transport(transport_id));
    controller.disconnect(conn).await;

    assert!(controller.room(&RoomId::from("r1")).is_none());
    let snapshot = controller.metrics();
    assert_eq!(snapshot.peers, 0);
    assert_eq!(snapshot.connections, 0);
}
