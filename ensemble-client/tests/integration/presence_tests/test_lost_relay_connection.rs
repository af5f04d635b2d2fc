use ensemble_client::MeshError;
use ensemble_core::RoomId;

use crate::integration::{
    MESH_TIMEOUT_MS, Participant, init_tracing, spawn_participant, wait_until,
};
use crate::utils::{InMemoryRelay, LoopbackNetwork};

#[tokio::test]
async fn test_lost_relay_connection() {
    init_tracing();

    let relay = InMemoryRelay::new(5);
    let network = LoopbackNetwork::new();
    let room: RoomId = "flaky".into();

    let ann = spawn_participant(&relay, &network, "Ann");
    ann.handle.join(room.clone(), "Ann").await.unwrap();

    let (bo_sink, bo_inbound) = relay.accept();
    let bo = Participant::start("Bo", bo_sink.clone(), bo_inbound, network.factory());
    let bo_id = bo.handle.join(room.clone(), "Bo").await.unwrap();
    assert_eq!(bo_sink.member_id(), bo_id);
    ann.wait_for_links(1).await;

    // Socket dies under Bo: the relay treats it as a leave, Bo's coordinator stops.
    bo_sink.sever().await;

    bo.task.await.unwrap();
    assert!(matches!(bo.handle.snapshot().await, Err(MeshError::Stopped)));

    let handle = ann.handle.clone();
    assert!(
        wait_until(MESH_TIMEOUT_MS, move || {
            let handle = handle.clone();
            async move {
                let snapshot = handle.snapshot().await.unwrap();
                snapshot.links.is_empty() && snapshot.roster.is_empty()
            }
        })
        .await
    );
    assert_eq!(relay.rooms().member_count(&room), 1);
}
