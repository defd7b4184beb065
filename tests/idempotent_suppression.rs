mod common;

use std::time::Duration;

use common::{chat, channel_snapshot, presence_snapshot, scope, service_with, RecordingGateway};
use statusbridge::domain::{EntityId, EntityKind};
use statusbridge::infrastructure::memory_store::InMemoryKvStore;
use tokio::time::sleep;

/// Identical rendered text never produces a sink call, cooldown or not.
#[tokio::test(start_paused = true)]
async fn repeated_equal_projections_hit_sink_once() {
    let gateway = RecordingGateway::new();
    let service = service_with(gateway.clone(), InMemoryKvStore::new());

    let entity = EntityId::new("chan1");
    service
        .subscribe(&scope(), EntityKind::VoiceChannel, &entity, chat("chat1"))
        .await;

    for _ in 0..5 {
        service
            .dispatch(&channel_snapshot("chan1", "General", &["alice"]))
            .await;
        sleep(Duration::from_secs(7)).await; // outside any cooldown
    }

    assert_eq!(gateway.creates().len(), 1);
    assert_eq!(gateway.updates().len(), 0);
}

/// Updates for an entity nobody subscribed to are dropped silently.
#[tokio::test]
async fn dispatch_without_subscription_is_a_noop() {
    let gateway = RecordingGateway::new();
    let service = service_with(gateway.clone(), InMemoryKvStore::new());

    service
        .dispatch(&channel_snapshot("chan1", "General", &["alice"]))
        .await;

    assert_eq!(gateway.call_count(), 0);
}

/// Subscribing twice with the same target changes nothing.
#[tokio::test(start_paused = true)]
async fn double_subscribe_is_idempotent() {
    let gateway = RecordingGateway::new();
    let service = service_with(gateway.clone(), InMemoryKvStore::new());

    let entity = EntityId::new("chan1");
    for _ in 0..2 {
        service
            .subscribe(&scope(), EntityKind::VoiceChannel, &entity, chat("chat1"))
            .await;
    }

    service
        .dispatch(&channel_snapshot("chan1", "General", &["alice"]))
        .await;

    assert_eq!(gateway.creates().len(), 1, "one target, one message");
}

/// Presence watchers are keyed per sink target; two targets watching the
/// same user get independent messages.
#[tokio::test(start_paused = true)]
async fn presence_targets_get_independent_messages() {
    let gateway = RecordingGateway::new();
    let service = service_with(gateway.clone(), InMemoryKvStore::new());

    let entity = EntityId::new("user1");
    service
        .subscribe(&scope(), EntityKind::Presence, &entity, chat("chat1"))
        .await;
    service
        .subscribe(&scope(), EntityKind::Presence, &entity, chat("chat2"))
        .await;

    service
        .dispatch(&presence_snapshot("user1", "alice", true, Some("chess")))
        .await;

    let creates = gateway.creates();
    assert_eq!(creates.len(), 2);

    // Going offline is "empty": both messages come down.
    service
        .dispatch(&presence_snapshot("user1", "alice", false, None))
        .await;
    assert_eq!(gateway.removes().len(), 2);
}
