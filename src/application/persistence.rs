use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use crate::application::ports::KeyValueStore;
use crate::domain::{MessageHandle, SinkTargetId, WatcherKey};

pub const SAVE_RETRY_DELAY: Duration = Duration::from_secs(15);
pub const SAVE_RETRY_LIMIT: u32 = 15;

/// Resumable slice of a watcher's state, stored as a hash of strings.
/// Enough to survive a restart without duplicating or orphaning sink
/// messages; everything else is re-derived from live source state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WatcherRecord {
    pub active: bool,
    pub subscribers: Vec<SinkTargetId>,
    pub rendered_text: Option<String>,
    pub handles: HashMap<SinkTargetId, MessageHandle>,
}

impl WatcherRecord {
    pub fn to_fields(&self) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        fields.insert("active".to_string(), self.active.to_string());
        fields.insert(
            "subscribers".to_string(),
            serde_json::to_string(&self.subscribers).unwrap_or_else(|_| "[]".to_string()),
        );
        if let Some(text) = &self.rendered_text {
            fields.insert("rendered_text".to_string(), text.clone());
        }
        fields.insert(
            "handles".to_string(),
            serde_json::to_string(&self.handles).unwrap_or_else(|_| "{}".to_string()),
        );
        fields
    }

    /// Tolerant of missing or malformed fields; a half-written record
    /// degrades to an empty one rather than failing rehydration.
    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        Self {
            active: fields.get("active").map(|v| v == "true").unwrap_or(false),
            subscribers: fields
                .get("subscribers")
                .and_then(|v| serde_json::from_str(v).ok())
                .unwrap_or_default(),
            rendered_text: fields.get("rendered_text").cloned(),
            handles: fields
                .get("handles")
                .and_then(|v| serde_json::from_str(v).ok())
                .unwrap_or_default(),
        }
    }
}

/// Best-effort durability for watcher records. Saves retry in the
/// background on a fixed delay; loads and deletes degrade to `None`/no-op
/// with a logged warning. Callers never see a persistence failure.
#[derive(Clone)]
pub struct PersistenceAdapter {
    store: Arc<dyn KeyValueStore>,
    // One generation per storage key; an in-flight retry loop stops as
    // soon as a newer save or a delete supersedes it.
    generations: Arc<Mutex<HashMap<String, u64>>>,
    // One async lock per storage key. Writes for a key go through it, and
    // the generation re-check happens under it, so a slow superseded write
    // can never land after its replacement.
    write_locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl PersistenceAdapter {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            generations: Arc::new(Mutex::new(HashMap::new())),
            write_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn bump_generation(&self, storage_key: &str) -> u64 {
        let mut generations = self.generations.lock().unwrap();
        let entry = generations.entry(storage_key.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    fn current_generation(&self, storage_key: &str) -> u64 {
        let generations = self.generations.lock().unwrap();
        generations.get(storage_key).copied().unwrap_or(0)
    }

    fn write_lock(&self, storage_key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.write_locks.lock().unwrap();
        locks.entry(storage_key.to_string()).or_default().clone()
    }

    /// Fire-and-forget durable write. The first attempt happens on the
    /// spawned task too, so the calling watcher is never blocked on a
    /// slow or down store.
    pub fn save(&self, key: &WatcherKey, record: WatcherRecord) {
        let storage_key = key.storage_key();
        let generation = self.bump_generation(&storage_key);
        let this = self.clone();

        tokio::spawn(async move {
            let fields = record.to_fields();
            let lock = this.write_lock(&storage_key);
            for attempt in 1..=SAVE_RETRY_LIMIT {
                {
                    let _write = lock.lock().await;
                    if this.current_generation(&storage_key) != generation {
                        // A newer save or delete took over this key.
                        return;
                    }
                    match this.store.set_hash(&storage_key, &fields).await {
                        Ok(()) => {
                            if attempt > 1 {
                                debug!(key = %storage_key, attempt, "watcher state saved after retry");
                            }
                            return;
                        }
                        Err(e) => {
                            warn!(key = %storage_key, attempt, error = %e, "watcher state save failed");
                        }
                    }
                }
                tokio::time::sleep(SAVE_RETRY_DELAY).await;
            }
            warn!(
                key = %storage_key,
                limit = SAVE_RETRY_LIMIT,
                "giving up on watcher state save"
            );
        });
    }

    pub async fn load(&self, key: &WatcherKey) -> Option<WatcherRecord> {
        let storage_key = key.storage_key();
        match self.store.get_hash(&storage_key).await {
            Ok(Some(fields)) => Some(WatcherRecord::from_fields(&fields)),
            Ok(None) => None,
            Err(e) => {
                warn!(key = %storage_key, error = %e, "watcher state load failed");
                None
            }
        }
    }

    pub async fn delete(&self, key: &WatcherKey) {
        let storage_key = key.storage_key();
        self.bump_generation(&storage_key);
        let lock = self.write_lock(&storage_key);
        let _write = lock.lock().await;
        if let Err(e) = self.store.delete(&storage_key).await {
            warn!(key = %storage_key, error = %e, "watcher state delete failed");
        }
    }

    pub async fn stored_keys(
        &self,
        scope: &crate::domain::OwnerScopeId,
        kind: crate::domain::EntityKind,
    ) -> Vec<WatcherKey> {
        let prefix = WatcherKey::storage_prefix(scope, kind);
        let raw = match self.store.keys_with_prefix(&prefix).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(%scope, %kind, error = %e, "listing persisted watcher keys failed");
                return vec![];
            }
        };
        raw.iter()
            .filter_map(|k| match WatcherKey::parse(k) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!(raw = %k, error = %e, "skipping unparsable persisted key");
                    None
                }
            })
            .collect()
    }
}
