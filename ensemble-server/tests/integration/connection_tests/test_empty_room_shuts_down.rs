use ensemble_core::{MemberId, ServerMessage};
use ensemble_server::{JoinOutcome, RoomCommand};
use tokio::sync::oneshot;

use crate::integration::{create_test_room, init_tracing};

#[tokio::test]
async fn test_empty_room_shuts_down() {
    init_tracing();

    let (room_cmd_tx, mut delivery_rx, _signaling) = create_test_room(5);

    let member_id = MemberId::new();
    let (reply, rx) = oneshot::channel();
    room_cmd_tx
        .send(RoomCommand::Join {
            member_id,
            nickname: "solo".to_string(),
            reply,
        })
        .await
        .unwrap();

    assert_eq!(
        rx.await.unwrap(),
        JoinOutcome::Accepted { existing: vec![] }
    );
    let delivery = delivery_rx.recv().await.unwrap();
    assert_eq!(delivery.to, member_id);
    assert!(matches!(delivery.msg, ServerMessage::JoinSuccess { .. }));

    let (reply, rx) = oneshot::channel();
    room_cmd_tx
        .send(RoomCommand::Leave {
            member_id,
            reply: Some(reply),
        })
        .await
        .unwrap();
    assert!(rx.await.unwrap().is_empty());

    // The emptied room refuses further work instead of silently reviving.
    let (reply, rx) = oneshot::channel();
    let late_join = RoomCommand::Join {
        member_id: MemberId::new(),
        nickname: "late".to_string(),
        reply,
    };
    if room_cmd_tx.send(late_join).await.is_ok() {
        assert_eq!(rx.await.unwrap(), JoinOutcome::Closed);
    }

    room_cmd_tx.closed().await;
}
