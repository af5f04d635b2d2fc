use ensemble_core::{MemberId, RoomId, ServerMessage};
use ensemble_server::JoinError;

use crate::integration::{create_test_registry, init_tracing};

#[tokio::test]
async fn test_room_full() {
    init_tracing();

    let (rooms, signaling) = create_test_registry(5);
    let room: RoomId = "jam".into();

    let mut members = Vec::new();
    for i in 0..5 {
        let id = MemberId::new();
        rooms
            .join(id, &room, &format!("player-{}", i))
            .await
            .expect("Join below capacity should succeed");
        members.push(id);
    }
    assert_eq!(rooms.member_count(&room), 5);

    let sixth = MemberId::new();
    let result = rooms.join(sixth, &room, "late").await;
    assert_eq!(
        result,
        Err(JoinError::RoomFull {
            room: room.clone(),
            capacity: 5,
        })
    );

    assert_eq!(
        signaling.messages_for(&sixth).await,
        vec![ServerMessage::RoomFull {}]
    );
    assert_eq!(rooms.member_count(&room), 5, "Refused join must not change the room");

    // Existing members were never told about the refused join.
    for id in &members {
        let joined: Vec<_> = signaling
            .messages_for(id)
            .await
            .into_iter()
            .filter(|m| matches!(m, ServerMessage::UserJoined(info) if info.id == sixth))
            .collect();
        assert!(joined.is_empty());
    }

    // A freed slot admits the next caller.
    rooms.leave(members[0], &room).await;
    rooms
        .join(sixth, &room, "late")
        .await
        .expect("Join after a leave should succeed");
    assert_eq!(rooms.member_count(&room), 5);
}
