use ensemble_core::{ClientMessage, MemberId, RoomId};
use ensemble_server::ConnectionSession;

use crate::integration::{create_test_registry, init_tracing};

#[tokio::test]
async fn test_malformed_frames() {
    init_tracing();

    let (rooms, _signaling) = create_test_registry(5);
    let room: RoomId = "garbage".into();

    let mut session = ConnectionSession::new(MemberId::new(), rooms.clone());

    assert!(session.handle_text("not json").await.is_err());
    assert!(session.handle_text(r#"{"type":"dance"}"#).await.is_err());
    assert!(session.room().is_none());

    // The connection is still usable afterwards.
    let join = ClientMessage::JoinRoom {
        room_id: room.clone(),
        nickname: "survivor".to_string(),
    };
    session
        .handle_text(&join.to_text().unwrap())
        .await
        .expect("A valid frame should be accepted");
    assert_eq!(session.room(), Some(&room));
    assert_eq!(rooms.member_count(&room), 1);
}
