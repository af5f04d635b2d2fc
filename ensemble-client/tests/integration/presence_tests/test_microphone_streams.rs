use crate::integration::{MESH_TIMEOUT_MS, init_tracing, spawn_participant, wait_until};
use crate::utils::{InMemoryRelay, LoopbackNetwork};

#[tokio::test]
async fn test_microphone_streams() {
    init_tracing();

    let relay = InMemoryRelay::new(5);
    let network = LoopbackNetwork::new();

    let ann = spawn_participant(&relay, &network, "Ann");
    ann.handle.join("studio", "Ann").await.unwrap();
    assert!(ann.handle.set_microphone(true).await.unwrap());
    // Toggling twice is idempotent.
    assert!(ann.handle.set_microphone(true).await.unwrap());

    let bo = spawn_participant(&relay, &network, "Bo");
    bo.handle.join("studio", "Bo").await.unwrap();
    bo.wait_for_links(1).await;
    ann.wait_for_links(1).await;

    // Ann's track was on the link from its creation.
    let handle = bo.handle.clone();
    assert!(
        wait_until(MESH_TIMEOUT_MS, move || {
            let handle = handle.clone();
            async move { handle.remote_streams().await.unwrap() == vec!["mic-Ann".to_string()] }
        })
        .await
    );
    assert!(ann.snapshot().await.microphone);

    // Enabled on an already connected link.
    assert!(bo.handle.set_microphone(true).await.unwrap());
    let handle = ann.handle.clone();
    assert!(
        wait_until(MESH_TIMEOUT_MS, move || {
            let handle = handle.clone();
            async move { handle.remote_streams().await.unwrap() == vec!["mic-Bo".to_string()] }
        })
        .await
    );

    assert!(!ann.handle.set_microphone(false).await.unwrap());
    assert!(!ann.snapshot().await.microphone);

    // Leaving releases Bo's inbound stream along with the link.
    bo.handle.leave().await.unwrap();
    let handle = ann.handle.clone();
    assert!(
        wait_until(MESH_TIMEOUT_MS, move || {
            let handle = handle.clone();
            async move { handle.remote_streams().await.unwrap().is_empty() }
        })
        .await
    );
}
