use ensemble_core::{ClientMessage, MemberId, PeerEvent, RoomId, ServerMessage};
use ensemble_server::ConnectionSession;

use crate::integration::{create_test_registry, init_tracing};

#[tokio::test]
async fn test_data_channel_fallback() {
    init_tracing();

    let (rooms, signaling) = create_test_registry(5);
    let room: RoomId = "fallback".into();

    let alice = MemberId::new();
    let bob = MemberId::new();
    let carol = MemberId::new();
    let mut alice_session = ConnectionSession::new(alice, rooms.clone());
    alice_session
        .handle(ClientMessage::JoinRoom {
            room_id: room.clone(),
            nickname: "alice".to_string(),
        })
        .await;
    rooms.join(bob, &room, "bob").await.unwrap();
    rooms.join(carol, &room, "carol").await.unwrap();

    let event = PeerEvent::NoteOn {
        instrument: "piano".to_string(),
        note: "C4".to_string(),
        duration: None,
    };
    let payload = serde_json::to_value(&event).unwrap();

    alice_session
        .handle(ClientMessage::DataChannelMessage {
            message: payload.clone(),
        })
        .await;

    let expected = ServerMessage::DataChannelMessage {
        from: alice,
        message: payload,
    };
    for peer in [bob, carol] {
        assert!(signaling.wait_for_messages(&peer, 1, 2000).await);
        let received = signaling.messages_for(&peer).await;
        let relayed = received
            .iter()
            .find(|m| matches!(m, ServerMessage::DataChannelMessage { .. }))
            .expect("Peer should receive the relayed event");
        assert_eq!(relayed, &expected);

        if let ServerMessage::DataChannelMessage { message, .. } = relayed {
            assert_eq!(PeerEvent::from_value(message.clone()).unwrap(), event);
        }
    }
    assert!(!signaling.messages_for(&alice).await.contains(&expected));
}
