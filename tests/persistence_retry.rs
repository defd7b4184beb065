mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use common::{chat, channel_snapshot, scope, RecordingGateway};
use statusbridge::application::{
    AppError, AppResult, KeyValueStore, PersistenceAdapter, WatcherRecord, SAVE_RETRY_LIMIT,
};
use statusbridge::domain::{EntityId, EntityKind, WatcherKey};
use statusbridge::infrastructure::memory_store::InMemoryKvStore;
use tokio::time::sleep;

/// Store fake that rejects the first `failures` writes, counting attempts.
#[derive(Clone)]
struct FlakyStore {
    inner: InMemoryKvStore,
    failures_left: Arc<Mutex<u32>>,
    write_attempts: Arc<Mutex<u32>>,
}

impl FlakyStore {
    fn failing(failures: u32) -> Self {
        Self {
            inner: InMemoryKvStore::new(),
            failures_left: Arc::new(Mutex::new(failures)),
            write_attempts: Arc::new(Mutex::new(0)),
        }
    }

    fn attempts(&self) -> u32 {
        *self.write_attempts.lock().unwrap()
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn set_hash(&self, key: &str, fields: &HashMap<String, String>) -> AppResult<()> {
        *self.write_attempts.lock().unwrap() += 1;
        {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(AppError::Storage("store unavailable".into()));
            }
        }
        self.inner.set_hash(key, fields).await
    }

    async fn get_hash(&self, key: &str) -> AppResult<Option<HashMap<String, String>>> {
        self.inner.get_hash(key).await
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        self.inner.exists(key).await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> AppResult<Vec<String>> {
        self.inner.keys_with_prefix(prefix).await
    }
}

/// Store fake whose first write parks until released, simulating a slow
/// store call with a newer write racing it.
#[derive(Clone)]
struct GatedStore {
    inner: InMemoryKvStore,
    gate: Arc<Notify>,
    gate_next_write: Arc<AtomicBool>,
}

impl GatedStore {
    fn new() -> Self {
        Self {
            inner: InMemoryKvStore::new(),
            gate: Arc::new(Notify::new()),
            gate_next_write: Arc::new(AtomicBool::new(true)),
        }
    }
}

#[async_trait]
impl KeyValueStore for GatedStore {
    async fn set_hash(&self, key: &str, fields: &HashMap<String, String>) -> AppResult<()> {
        if self.gate_next_write.swap(false, Ordering::SeqCst) {
            self.gate.notified().await;
        }
        self.inner.set_hash(key, fields).await
    }

    async fn get_hash(&self, key: &str) -> AppResult<Option<HashMap<String, String>>> {
        self.inner.get_hash(key).await
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        self.inner.exists(key).await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> AppResult<Vec<String>> {
        self.inner.keys_with_prefix(prefix).await
    }
}

fn sample_key() -> WatcherKey {
    WatcherKey::new(scope(), EntityKind::VoiceChannel, EntityId::new("chan1"))
}

fn sample_record() -> WatcherRecord {
    WatcherRecord {
        active: true,
        subscribers: vec![chat("chat1")],
        rendered_text: Some("text".into()),
        handles: HashMap::new(),
    }
}

/// A save that fails twice lands on the third attempt, 15s apart.
#[tokio::test(start_paused = true)]
async fn save_retries_until_store_recovers() {
    let store = FlakyStore::failing(2);
    let adapter = PersistenceAdapter::new(Arc::new(store.clone()));

    adapter.save(&sample_key(), sample_record());

    sleep(Duration::from_millis(10)).await;
    assert_eq!(store.attempts(), 1);
    assert!(!store.exists("guild1:channel:chan1").await.unwrap());

    sleep(Duration::from_secs(16)).await;
    assert_eq!(store.attempts(), 2);

    sleep(Duration::from_secs(16)).await;
    assert_eq!(store.attempts(), 3);
    assert!(store.exists("guild1:channel:chan1").await.unwrap());

    // Settled: no further writes.
    sleep(Duration::from_secs(60)).await;
    assert_eq!(store.attempts(), 3);
}

/// A permanently down store is abandoned after the attempt limit.
#[tokio::test(start_paused = true)]
async fn save_gives_up_after_attempt_limit() {
    let store = FlakyStore::failing(u32::MAX);
    let adapter = PersistenceAdapter::new(Arc::new(store.clone()));

    adapter.save(&sample_key(), sample_record());

    sleep(Duration::from_secs(16 * SAVE_RETRY_LIMIT as u64)).await;
    assert_eq!(store.attempts(), SAVE_RETRY_LIMIT);

    sleep(Duration::from_secs(120)).await;
    assert_eq!(store.attempts(), SAVE_RETRY_LIMIT, "no retries past the limit");
}

/// A newer save for the same key supersedes an in-flight retry loop; only
/// the latest record reaches the store.
#[tokio::test(start_paused = true)]
async fn newer_save_supersedes_pending_retries() {
    let store = FlakyStore::failing(1);
    let adapter = PersistenceAdapter::new(Arc::new(store.clone()));

    adapter.save(&sample_key(), sample_record());
    sleep(Duration::from_millis(10)).await; // first attempt fails

    let mut newer = sample_record();
    newer.rendered_text = Some("newer text".into());
    adapter.save(&sample_key(), newer);

    sleep(Duration::from_secs(60)).await;

    let stored = store.get_hash("guild1:channel:chan1").await.unwrap().unwrap();
    assert_eq!(stored.get("rendered_text").map(String::as_str), Some("newer text"));
}

/// A save stuck inside a slow store call cannot land after a newer save
/// for the same key: writes per key are ordered, so the store always ends
/// up holding the latest record.
#[tokio::test(start_paused = true)]
async fn slow_older_write_never_overtakes_a_newer_save() {
    let store = GatedStore::new();
    let adapter = PersistenceAdapter::new(Arc::new(store.clone()));

    adapter.save(&sample_key(), sample_record());
    sleep(Duration::from_millis(10)).await; // parked inside the store call

    let mut newer = sample_record();
    newer.rendered_text = Some("newer text".into());
    adapter.save(&sample_key(), newer);
    sleep(Duration::from_millis(10)).await;

    // The newer save queues behind the parked write instead of racing it.
    assert!(store.get_hash("guild1:channel:chan1").await.unwrap().is_none());

    store.gate.notify_one();
    sleep(Duration::from_millis(10)).await;

    let stored = store.get_hash("guild1:channel:chan1").await.unwrap().unwrap();
    assert_eq!(
        stored.get("rendered_text").map(String::as_str),
        Some("newer text")
    );
}

/// Persistence trouble never reaches the sink path: updates keep flowing
/// while the store is down.
#[tokio::test(start_paused = true)]
async fn sink_updates_continue_while_store_is_down() {
    let gateway = RecordingGateway::new();
    let failing = FlakyStore::failing(u32::MAX);
    let service = statusbridge::application::SyncService::new(
        statusbridge::application::SubscriptionRegistry::new(),
        Arc::new(gateway.clone()),
        PersistenceAdapter::new(Arc::new(failing)),
        common::COOLDOWN,
    );

    let entity = EntityId::new("chan1");
    service
        .subscribe(&scope(), EntityKind::VoiceChannel, &entity, chat("chat1"))
        .await;
    service
        .dispatch(&channel_snapshot("chan1", "General", &["alice"]))
        .await;

    assert_eq!(gateway.creates().len(), 1);
}
