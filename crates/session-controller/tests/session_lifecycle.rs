//! End-to-end session lifecycle tests against the mock engine.
//!
//! Drives the controller exactly like a transport front-end would:
//! register a connection, dispatch typed requests in order, read pushes
//! from the outbound receiver, disconnect.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use common::{ConnectionId, PeerId, ProducerId, RoomId, TransportId};
use media_engine::{MediaKind, TransportDirection};
use sc_test_utils::{fixtures, MockMediaEngine};
use session_controller::protocol::{ClientRequest, ServerEvent, ServerMessage};
use session_controller::{Config, ScError, SessionController};
use tokio::sync::mpsc;

fn controller_with(engine: Arc<MockMediaEngine>) -> SessionController {
    let config = Config::from_vars(&std::collections::HashMap::from([(
        "SC_ID".to_string(),
        "sc-test".to_string(),
    )]))
    .expect("config");
    SessionController::new(engine, config)
}

fn controller() -> (Arc<MockMediaEngine>, SessionController) {
    let engine = MockMediaEngine::builder().build();
    (Arc::clone(&engine), controller_with(engine))
}

/// Register a connection and join `room`, returning the connection id,
/// the outbound receiver, and the join reply.
async fn join(
    controller: &SessionController,
    peer: &str,
    room: &str,
) -> (ConnectionId, mpsc::Receiver<ServerMessage>, ServerEvent) {
    let (connection_id, rx) = controller.register_connection(PeerId::from(peer));
    let reply = controller
        .handle_request(
            connection_id,
            ClientRequest::Join {
                room_id: RoomId::from(room),
                metadata: serde_json::Value::Null,
            },
        )
        .await
        .expect("join should succeed");
    (connection_id, rx, reply)
}

/// Create and connect a transport, returning its id.
async fn ready_transport(
    controller: &SessionController,
    connection_id: ConnectionId,
    direction: TransportDirection,
) -> TransportId {
    let reply = controller
        .handle_request(connection_id, ClientRequest::CreateTransport { direction })
        .await
        .expect("createTransport should succeed");
    let transport_id = match reply {
        ServerEvent::TransportCreated { transport_id, .. } => transport_id,
        other => panic!("unexpected reply: {other:?}"),
    };

    controller
        .handle_request(
            connection_id,
            ClientRequest::ConnectTransport {
                transport_id,
                dtls_parameters: fixtures::client_dtls_parameters(),
            },
        )
        .await
        .expect("connectTransport should succeed");

    transport_id
}

async fn produce(
    controller: &SessionController,
    connection_id: ConnectionId,
    transport_id: TransportId,
    kind: MediaKind,
) -> ProducerId {
    let mime = match kind {
        MediaKind::Audio => "audio/opus",
        MediaKind::Video => "video/VP8",
    };
    let reply = controller
        .handle_request(
            connection_id,
            ClientRequest::Produce {
                transport_id,
                kind,
                rtp_parameters: fixtures::rtp_parameters(mime),
            },
        )
        .await
        .expect("produce should succeed");
    match reply {
        ServerEvent::Produced { producer_id } => producer_id,
        other => panic!("unexpected reply: {other:?}"),
    }
}

async fn recv_event(rx: &mut mpsc::Receiver<ServerMessage>) -> ServerEvent {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for push")
        .expect("outbound channel closed")
        .event
}

fn assert_no_pending(rx: &mut mpsc::Receiver<ServerMessage>) {
    assert!(
        rx.try_recv().is_err(),
        "expected no pending outbound messages"
    );
}

// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_join_returns_capabilities_and_roster() {
    let (_engine, controller) = controller();

    let (_conn_a, mut rx_a, reply_a) = join(&controller, "alice", "math101").await;
    match reply_a {
        ServerEvent::Joined { room_id, peers, .. } => {
            assert_eq!(room_id, RoomId::from("math101"));
            assert!(peers.is_empty());
        }
        other => panic!("unexpected reply: {other:?}"),
    }

    let (_conn_b, _rx_b, reply_b) = join(&controller, "bob", "math101").await;
    match reply_b {
        ServerEvent::Joined { peers, .. } => {
            assert_eq!(peers.len(), 1);
            assert_eq!(peers[0].peer_id, PeerId::from("alice"));
        }
        other => panic!("unexpected reply: {other:?}"),
    }

    // Alice hears about Bob
    match recv_event(&mut rx_a).await {
        ServerEvent::PeerJoined { peer } => assert_eq!(peer.peer_id, PeerId::from("bob")),
        other => panic!("unexpected push: {other:?}"),
    }
}

#[tokio::test]
async fn test_duplicate_join_rejected_connection_survives() {
    let (_engine, controller) = controller();
    let (conn_a, _rx_a, _) = join(&controller, "alice", "r1").await;

    let err = controller
        .handle_request(
            conn_a,
            ClientRequest::Join {
                room_id: RoomId::from("r2"),
                metadata: serde_json::Value::Null,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ScError::DuplicateJoin));

    // The connection is still usable after the rejection
    let reply = controller
        .handle_request(conn_a, ClientRequest::ListProducers)
        .await
        .unwrap();
    assert!(matches!(reply, ServerEvent::ProducerList { .. }));
}

/// B (already joined) gets the new-producer broadcast; C
/// (joined after the produce) does not, and discovers the producer via
/// listProducers instead.
#[tokio::test]
async fn test_produce_broadcast_reaches_only_peers_present_at_production() {
    let (_engine, controller) = controller();

    let (conn_a, _rx_a, _) = join(&controller, "alice", "math101").await;
    let (_conn_b, mut rx_b, _) = join(&controller, "bob", "math101").await;

    let transport = ready_transport(&controller, conn_a, TransportDirection::Producing).await;
    let producer_id = produce(&controller, conn_a, transport, MediaKind::Video).await;

    match recv_event(&mut rx_b).await {
        ServerEvent::NewProducer {
            peer_id,
            producer_id: announced,
            kind,
        } => {
            assert_eq!(peer_id, PeerId::from("alice"));
            assert_eq!(announced, producer_id);
            assert_eq!(kind, MediaKind::Video);
        }
        other => panic!("unexpected push: {other:?}"),
    }

    // Carol joins after the fact: no retroactive broadcast ...
    let (conn_c, mut rx_c, _) = join(&controller, "carol", "math101").await;
    assert_no_pending(&mut rx_c);

    // ... but listProducers shows Alice's producer
    let reply = controller
        .handle_request(conn_c, ClientRequest::ListProducers)
        .await
        .unwrap();
    match reply {
        ServerEvent::ProducerList { producers } => {
            assert_eq!(producers.len(), 1);
            assert_eq!(producers[0].producer_id, producer_id);
            assert_eq!(producers[0].peer_id, PeerId::from("alice"));
        }
        other => panic!("unexpected reply: {other:?}"),
    }
}

/// two connections join a brand-new room at effectively
/// the same time - exactly one router is created and both peers land in
/// the same room.
#[tokio::test]
async fn test_concurrent_first_joins_create_one_router() {
    let engine = MockMediaEngine::builder()
        .router_delay(Duration::from_millis(25))
        .build();
    let controller = controller_with(Arc::clone(&engine));

    let (conn_a, _rx_a) = controller.register_connection(PeerId::from("alice"));
    let (conn_b, _rx_b) = controller.register_connection(PeerId::from("bob"));

    let join_req = |conn| {
        controller.handle_request(
            conn,
            ClientRequest::Join {
                room_id: RoomId::from("r1"),
                metadata: serde_json::Value::Null,
            },
        )
    };

    let (a, b) = tokio::join!(join_req(conn_a), join_req(conn_b));
    a.expect("alice join");
    b.expect("bob join");

    assert_eq!(engine.stats().routers_created(), 1);
    let room = controller.room(&RoomId::from("r1")).expect("room exists");
    let mut ids = room.participant_ids();
    ids.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(ids, vec![PeerId::from("alice"), PeerId::from("bob")]);
}

/// room existence is exactly `participants > 0`; emptying
/// a room releases its router and rejoining creates a fresh one.
#[tokio::test]
async fn test_room_released_when_emptied_and_recreated_fresh() {
    let (engine, controller) = controller();

    let (conn_a, _rx_a, _) = join(&controller, "alice", "r1").await;
    assert!(controller.room(&RoomId::from("r1")).is_some());

    controller.disconnect(conn_a).await;
    assert!(controller.room(&RoomId::from("r1")).is_none());
    assert_eq!(engine.stats().routers_closed(), 1);
    assert_eq!(controller.metrics().rooms, 0);

    let (_conn_b, _rx_b, _) = join(&controller, "alice", "r1").await;
    assert_eq!(engine.stats().routers_created(), 2);
}

#[tokio::test]
async fn test_router_creation_failure_surfaces_and_registers_nothing() {
    let engine = MockMediaEngine::builder().fail_router_creation().build();
    let controller = controller_with(Arc::clone(&engine));

    let (conn_a, _rx_a) = controller.register_connection(PeerId::from("alice"));
    let err = controller
        .handle_request(
            conn_a,
            ClientRequest::Join {
                room_id: RoomId::from("r1"),
                metadata: serde_json::Value::Null,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ScError::EngineUnavailable(_)));
    assert!(controller.room(&RoomId::from("r1")).is_none());
    assert_eq!(controller.metrics().rooms, 0);
    assert_eq!(controller.metrics().peers, 0);
}

#[tokio::test]
async fn test_protocol_order_violations_are_rejected_not_fatal() {
    let (_engine, controller) = controller();
    let (conn, _rx) = controller.register_connection(PeerId::from("alice"));

    // Anything before join
    let err = controller
        .handle_request(
            conn,
            ClientRequest::CreateTransport {
                direction: TransportDirection::Producing,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ScError::NotJoined));

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

    // Produce with no transport at all
    let err = controller
        .handle_request(
            conn,
            ClientRequest::Produce {
                transport_id: TransportId::new(),
                kind: MediaKind::Audio,
                rtp_parameters: fixtures::rtp_parameters("audio/opus"),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ScError::TransportNotFound(_)));

    // Produce on a created but unconnected transport
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
    let err = controller
        .handle_request(
            conn,
            ClientRequest::Produce {
                transport_id,
                kind: MediaKind::Audio,
                rtp_parameters: fixtures::rtp_parameters("audio/opus"),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ScError::TransportNotConnected(_)));

    // Consume through a producing transport: wrong direction, not found
    let err = controller
        .handle_request(
            conn,
            ClientRequest::Consume {
                transport_id,
                producer_id: ProducerId::new(),
                rtp_capabilities: fixtures::rtp_capabilities(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ScError::TransportNotFound(_)));

    // The connection survived all of it
    let reply = controller
        .handle_request(conn, ClientRequest::ListProducers)
        .await
        .unwrap();
    assert!(matches!(reply, ServerEvent::ProducerList { .. }));
}

/// `consume` never succeeds when `canConsume` reports
/// incompatibility, and creates no records.
#[tokio::test]
async fn test_incompatible_capabilities_create_nothing() {
    let engine = MockMediaEngine::builder().reject_consume().build();
    let controller = controller_with(Arc::clone(&engine));

    let (conn_a, _rx_a, _) = join(&controller, "alice", "r1").await;
    let (conn_b, _rx_b, _) = join(&controller, "bob", "r1").await;

    let send = ready_transport(&controller, conn_a, TransportDirection::Producing).await;
    let producer_id = produce(&controller, conn_a, send, MediaKind::Video).await;

    let recv = ready_transport(&controller, conn_b, TransportDirection::Consuming).await;
    let err = controller
        .handle_request(
            conn_b,
            ClientRequest::Consume {
                transport_id: recv,
                producer_id,
                rtp_capabilities: fixtures::rtp_capabilities(),
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ScError::IncompatibleCapabilities(_)));
    assert_eq!(engine.stats().consumers_created(), 0);
    let room = controller.room(&RoomId::from("r1")).unwrap();
    let (_, _, consumers) = room.resource_counts();
    assert_eq!(consumers, 0);
}

#[tokio::test]
async fn test_consume_unknown_producer() {
    let (_engine, controller) = controller();
    let (conn_b, _rx_b, _) = join(&controller, "bob", "r1").await;
    let recv = ready_transport(&controller, conn_b, TransportDirection::Consuming).await;

    let err = controller
        .handle_request(
            conn_b,
            ClientRequest::Consume {
                transport_id: recv,
                producer_id: ProducerId::new(),
                rtp_capabilities: fixtures::rtp_capabilities(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ScError::ProducerNotFound(_)));
}

#[tokio::test]
async fn test_consumer_starts_paused_and_resume_is_idempotent() {
    let (engine, controller) = controller();

    let (conn_a, _rx_a, _) = join(&controller, "alice", "r1").await;
    let (conn_b, _rx_b, _) = join(&controller, "bob", "r1").await;

    let send = ready_transport(&controller, conn_a, TransportDirection::Producing).await;
    let producer_id = produce(&controller, conn_a, send, MediaKind::Audio).await;

    let recv = ready_transport(&controller, conn_b, TransportDirection::Consuming).await;
    let reply = controller
        .handle_request(
            conn_b,
            ClientRequest::Consume {
                transport_id: recv,
                producer_id,
                rtp_capabilities: fixtures::rtp_capabilities(),
            },
        )
        .await
        .unwrap();
    let consumer_id = match reply {
        ServerEvent::Consumed {
            consumer_id,
            producer_id: bound,
            kind,
            ..
        } => {
            assert_eq!(bound, producer_id);
            assert_eq!(kind, MediaKind::Audio);
            consumer_id
        }
        other => panic!("unexpected reply: {other:?}"),
    };

    assert_eq!(engine.stats().resume_calls(), 0);

    controller
        .handle_request(conn_b, ClientRequest::ResumeConsumer { consumer_id })
        .await
        .unwrap();
    assert_eq!(engine.stats().resume_calls(), 1);

    // Second resume is acknowledged without another engine call
    controller
        .handle_request(conn_b, ClientRequest::ResumeConsumer { consumer_id })
        .await
        .unwrap();
    assert_eq!(engine.stats().resume_calls(), 1);

    // Someone else's consumer id is rejected
    let err = controller
        .handle_request(conn_a, ClientRequest::ResumeConsumer { consumer_id })
        .await
        .unwrap_err();
    assert!(matches!(err, ScError::ConsumerNotFound(_)));
}

/// a peer disconnects while owning two producers and a
/// consumer bound to another peer's producer. Everything it owned is
/// removed, the other peer's dependent consumer is notified exactly
/// once, and the peer is gone from the participant set.
#[tokio::test]
async fn test_disconnect_cascade_releases_everything() {
    let (engine, controller) = controller();

    let (conn_a, _rx_a, _) = join(&controller, "alice", "r1").await;
    let (conn_b, mut rx_b, _) = join(&controller, "bob", "r1").await;

    // Alice: two producers
    let a_send = ready_transport(&controller, conn_a, TransportDirection::Producing).await;
    let a_audio = produce(&controller, conn_a, a_send, MediaKind::Audio).await;
    let _a_video = produce(&controller, conn_a, a_send, MediaKind::Video).await;

    // Bob: one producer; Alice consumes it
    let b_send = ready_transport(&controller, conn_b, TransportDirection::Producing).await;
    let b_video = produce(&controller, conn_b, b_send, MediaKind::Video).await;

    let a_recv = ready_transport(&controller, conn_a, TransportDirection::Consuming).await;
    controller
        .handle_request(
            conn_a,
            ClientRequest::Consume {
                transport_id: a_recv,
                producer_id: b_video,
                rtp_capabilities: fixtures::rtp_capabilities(),
            },
        )
        .await
        .unwrap();

    // Bob consumes Alice's audio (the dependent consumer)
    let b_recv = ready_transport(&controller, conn_b, TransportDirection::Consuming).await;
    let reply = controller
        .handle_request(
            conn_b,
            ClientRequest::Consume {
                transport_id: b_recv,
                producer_id: a_audio,
                rtp_capabilities: fixtures::rtp_capabilities(),
            },
        )
        .await
        .unwrap();
    let b_consumer = match reply {
        ServerEvent::Consumed { consumer_id, .. } => consumer_id,
        other => panic!("unexpected reply: {other:?}"),
    };

    // Drain Bob's broadcasts so far (Alice's two newProducer pushes)
    while let Ok(message) = rx_b.try_recv() {
        assert!(matches!(message.event, ServerEvent::NewProducer { .. }));
    }

    controller.disconnect(conn_a).await;

    // Bob is told his consumer lost its producer, then that Alice left
    match recv_event(&mut rx_b).await {
        ServerEvent::ProducerClosed {
            producer_id,
            consumer_id,
        } => {
            assert_eq!(producer_id, a_audio);
            assert_eq!(consumer_id, b_consumer);
        }
        other => panic!("unexpected push: {other:?}"),
    }
    match recv_event(&mut rx_b).await {
        ServerEvent::PeerLeft { peer_id } => assert_eq!(peer_id, PeerId::from("alice")),
        other => panic!("unexpected push: {other:?}"),
    }
    assert_no_pending(&mut rx_b);

    // Room state: only Bob, only Bob's resources
    let room = controller.room(&RoomId::from("r1")).unwrap();
    assert_eq!(room.participant_ids(), vec![PeerId::from("bob")]);
    let (transports, producers, consumers) = room.resource_counts();
    assert_eq!(transports, 2); // Bob's send + recv
    assert_eq!(producers, 1); // Bob's video
    assert_eq!(consumers, 0); // Alice's consumer and Bob's dependent both gone

    // Engine agrees: only Bob's producer is still live
    assert_eq!(engine.live_producers(), 1);
    assert_eq!(controller.metrics().peers, 1);
}

/// Engine-initiated producer death converges on the same cascade as a
/// disconnect: records purged, owners of bound consumers notified.
#[tokio::test]
async fn test_engine_closing_producer_notifies_consumers() {
    let (engine, controller) = controller();

    let (conn_a, _rx_a, _) = join(&controller, "alice", "r1").await;
    let (conn_b, mut rx_b, _) = join(&controller, "bob", "r1").await;

    let send = ready_transport(&controller, conn_a, TransportDirection::Producing).await;
    let producer_id = produce(&controller, conn_a, send, MediaKind::Video).await;

    // Bob's newProducer push
    match recv_event(&mut rx_b).await {
        ServerEvent::NewProducer { .. } => {}
        other => panic!("unexpected push: {other:?}"),
    }

    let recv = ready_transport(&controller, conn_b, TransportDirection::Consuming).await;
    let reply = controller
        .handle_request(
            conn_b,
            ClientRequest::Consume {
                transport_id: recv,
                producer_id,
                rtp_capabilities: fixtures::rtp_capabilities(),
            },
        )
        .await
        .unwrap();
    let consumer_id = match reply {
        ServerEvent::Consumed { consumer_id, .. } => consumer_id,
        other => panic!("unexpected reply: {other:?}"),
    };

    assert!(engine.force_close_producer(producer_id));

    match recv_event(&mut rx_b).await {
        ServerEvent::ProducerClosed {
            producer_id: closed,
            consumer_id: dead,
        } => {
            assert_eq!(closed, producer_id);
            assert_eq!(dead, consumer_id);
        }
        other => panic!("unexpected push: {other:?}"),
    }

    // Records are gone on both sides of the relation
    let room = controller.room(&RoomId::from("r1")).unwrap();
    let (_, producers, consumers) = room.resource_counts();
    assert_eq!(producers, 0);
    assert_eq!(consumers, 0);

    let reply = controller
        .handle_request(conn_b, ClientRequest::ListProducers)
        .await
        .unwrap();
    match reply {
        ServerEvent::ProducerList { producers } => assert!(producers.is_empty()),
        other => panic!("unexpected reply: {other:?}"),
    }

    // Alice can keep using her connection
    let _ = produce(&controller, conn_a, send, MediaKind::Audio).await;
}

#[tokio::test]
async fn test_leave_keeps_connection_for_rejoin() {
    let (_engine, controller) = controller();
    let (conn_a, _rx_a, _) = join(&controller, "alice", "r1").await;

    let reply = controller
        .handle_request(conn_a, ClientRequest::Leave)
        .await
        .unwrap();
    assert!(matches!(reply, ServerEvent::Left));
    assert!(controller.room(&RoomId::from("r1")).is_none());

    // Same connection joins a different room
    let reply = controller
        .handle_request(
            conn_a,
            ClientRequest::Join {
                room_id: RoomId::from("r2"),
                metadata: serde_json::Value::Null,
            },
        )
        .await
        .unwrap();
    assert!(matches!(reply, ServerEvent::Joined { .. }));
}

#[tokio::test]
async fn test_relay_is_directed_and_stamped() {
    let (_engine, controller) = controller();

    let (conn_a, _rx_a, _) = join(&controller, "alice", "r1").await;
    let (_conn_b, mut rx_b, _) = join(&controller, "bob", "r1").await;
    let (_conn_c, mut rx_c, _) = join(&controller, "carol", "r1").await;

    // Drain join pushes
    while rx_b.try_recv().is_ok() {}
    while rx_c.try_recv().is_ok() {}

    let payload = serde_json::json!({"sdp": "v=0"});
    let reply = controller
        .handle_request(
            conn_a,
            ClientRequest::Relay {
                to: PeerId::from("bob"),
                payload: payload.clone(),
            },
        )
        .await
        .unwrap();
    assert!(matches!(reply, ServerEvent::Relayed));

    match recv_event(&mut rx_b).await {
        ServerEvent::Relay { from, payload: got } => {
            assert_eq!(from, PeerId::from("alice"));
            assert_eq!(got, payload);
        }
        other => panic!("unexpected push: {other:?}"),
    }
    // Not a broadcast
    assert_no_pending(&mut rx_c);

    // Unknown target: acknowledged, dropped
    let reply = controller
        .handle_request(
            conn_a,
            ClientRequest::Relay {
                to: PeerId::from("nobody"),
                payload,
            },
        )
        .await
        .unwrap();
    assert!(matches!(reply, ServerEvent::Relayed));
}

#[tokio::test]
async fn test_malformed_message_yields_error_reply() {
    let (_engine, controller) = controller();
    let (conn, _rx) = controller.register_connection(PeerId::from("alice"));

    let reply = controller.handle_message(conn, "{not json").await;
    match reply.event {
        ServerEvent::Error { code, .. } => assert_eq!(code, 2),
        other => panic!("unexpected reply: {other:?}"),
    }

    // seq is echoed on handled requests
    let reply = controller
        .handle_message(conn, r#"{"seq": 42, "event": "listProducers"}"#)
        .await;
    assert_eq!(reply.seq, Some(42));
    match reply.event {
        ServerEvent::Error { code, .. } => assert_eq!(code, 1), // not joined
        other => panic!("unexpected reply: {other:?}"),
    }

    let reply = controller
        .handle_message(
            conn,
            r#"{"seq": 43, "event": "join", "data": {"roomId": "r1"}}"#,
        )
        .await;
    assert_eq!(reply.seq, Some(43));
    assert!(matches!(reply.event, ServerEvent::Joined { .. }));
}

/// the participant set tracked by a room never drifts
/// from the set of peers whose membership points at it.
#[tokio::test]
async fn test_membership_never_drifts_across_join_leave_sequences() {
    let (_engine, controller) = controller();

    let (conn_a, _rx_a, _) = join(&controller, "alice", "r1").await;
    let (conn_b, _rx_b, _) = join(&controller, "bob", "r1").await;
    let (_conn_c, _rx_c, _) = join(&controller, "carol", "r2").await;

    let sorted = |room: &str| {
        controller.room(&RoomId::from(room)).map(|r| {
            let mut ids = r.participant_ids();
            ids.sort_by(|a, b| a.0.cmp(&b.0));
            ids
        })
    };

    assert_eq!(
        sorted("r1").unwrap(),
        vec![PeerId::from("alice"), PeerId::from("bob")]
    );
    assert_eq!(sorted("r2").unwrap(), vec![PeerId::from("carol")]);

    controller
        .handle_request(conn_b, ClientRequest::Leave)
        .await
        .unwrap();
    assert_eq!(sorted("r1").unwrap(), vec![PeerId::from("alice")]);

    controller.disconnect(conn_a).await;
    assert!(sorted("r1").is_none());
    assert_eq!(sorted("r2").unwrap(), vec![PeerId::from("carol")]);
    assert_eq!(controller.metrics().peers, 1);
}

/// Open-question policy: a second transport for the same direction
/// coexists with the first.
#[tokio::test]
async fn test_duplicate_direction_transports_coexist() {
    let (_engine, controller) = controller();
    let (conn_a, _rx_a, _) = join(&controller, "alice", "r1").await;

    let first = ready_transport(&controller, conn_a, TransportDirection::Producing).await;
    let second = ready_transport(&controller, conn_a, TransportDirection::Producing).await;
    assert_ne!(first, second);

    // Both usable
    let _ = produce(&controller, conn_a, first, MediaKind::Audio).await;
    let _ = produce(&controller, conn_a, second, MediaKind::Video).await;

    let room = controller.room(&RoomId::from("r1")).unwrap();
    let (transports, producers, _) = room.resource_counts();
    assert_eq!(transports, 2);
    assert_eq!(producers, 2);
}
