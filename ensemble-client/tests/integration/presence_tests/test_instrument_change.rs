use ensemble_client::MeshError;

use crate::integration::{MESH_TIMEOUT_MS, init_tracing, spawn_participant, wait_until};
use crate::utils::{InMemoryRelay, LoopbackNetwork};

#[tokio::test]
async fn test_instrument_change() {
    init_tracing();

    let relay = InMemoryRelay::new(5);
    let network = LoopbackNetwork::new();

    let ann = spawn_participant(&relay, &network, "Ann");
    let bo = spawn_participant(&relay, &network, "Bo");
    let cy = spawn_participant(&relay, &network, "Cy");
    ann.handle.join("trio", "Ann").await.unwrap();
    let bo_id = bo.handle.join("trio", "Bo").await.unwrap();
    cy.handle.join("trio", "Cy").await.unwrap();
    for p in [&ann, &bo, &cy] {
        p.wait_for_links(2).await;
    }

    bo.handle.set_instrument("violin").await.unwrap();

    for p in [&ann, &cy] {
        let handle = p.handle.clone();
        let updated = wait_until(MESH_TIMEOUT_MS, move || {
            let handle = handle.clone();
            async move {
                let snapshot = handle.snapshot().await.unwrap();
                snapshot
                    .roster
                    .iter()
                    .any(|m| m.id == bo_id && m.instrument == "violin")
            }
        })
        .await;
        assert!(updated, "{} should see Bo on violin", p.nickname);
        assert!(p.player.loaded().contains(&"violin".to_string()));
    }

    // Only Bo's entry changed.
    let ann_view = ann.snapshot().await;
    assert!(
        ann_view
            .roster
            .iter()
            .filter(|m| m.id != bo_id)
            .all(|m| m.instrument == "piano")
    );
    assert_eq!(bo.snapshot().await.instrument, "violin");

    // Bo's notes now carry the new instrument.
    bo.handle.note_on("E5").await.unwrap();
    let player = cy.player.clone();
    assert!(
        wait_until(MESH_TIMEOUT_MS, move || {
            let player = player.clone();
            async move { player.heard("violin", "E5") }
        })
        .await
    );

    // Late joiners are seeded with the stored instrument.
    let di = spawn_participant(&relay, &network, "Di");
    di.handle.join("trio", "Di").await.unwrap();
    let di_view = di.snapshot().await;
    let bo_entry = di_view.roster.iter().find(|m| m.id == bo_id).unwrap();
    assert_eq!(bo_entry.instrument, "violin");

    let refused = bo.handle.set_instrument("theremin").await;
    assert!(matches!(refused, Err(MeshError::InstrumentUnavailable(_))));
    assert_eq!(bo.snapshot().await.instrument, "violin");
}
