#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use statusbridge::application::{
    PersistenceAdapter, SinkError, SinkGateway, SubscriptionRegistry, SyncService,
};
use statusbridge::domain::{
    EntityAttributes, EntityId, EntityKind, MessageHandle, Occupant, OwnerScopeId, Projection,
    RawSnapshot, SinkTargetId, WatchedEntity,
};
use statusbridge::infrastructure::memory_store::InMemoryKvStore;

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Create { target: String, text: String },
    Update { target: String, handle: String, text: String },
    Remove { target: String, handle: String },
    Pin { target: String, handle: String },
}

#[derive(Default)]
struct GatewayState {
    calls: Vec<Call>,
    next_id: u64,
    // One-shot: the next update returns NotFound, then behaves normally.
    update_not_found_once: bool,
    fail_transient: bool,
}

/// Sink fake that records every call and hands out sequential handles.
#[derive(Clone, Default)]
pub struct RecordingGateway {
    inner: Arc<Mutex<GatewayState>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.lock().unwrap().calls.len()
    }

    pub fn creates(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Create { .. }))
            .collect()
    }

    pub fn updates(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Update { .. }))
            .collect()
    }

    pub fn removes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Remove { .. }))
            .collect()
    }

    pub fn fail_next_update_not_found(&self) {
        self.inner.lock().unwrap().update_not_found_once = true;
    }

    pub fn set_fail_transient(&self, fail: bool) {
        self.inner.lock().unwrap().fail_transient = fail;
    }
}

#[async_trait]
impl SinkGateway for RecordingGateway {
    async fn create(
        &self,
        target: &SinkTargetId,
        projection: &Projection,
    ) -> Result<MessageHandle, SinkError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_transient {
            return Err(SinkError::Transient("injected".into()));
        }
        inner.next_id += 1;
        let handle = format!("m{}", inner.next_id);
        inner.calls.push(Call::Create {
            target: target.to_string(),
            text: projection.rendered_text.clone(),
        });
        Ok(MessageHandle::new(handle))
    }

    async fn update(
        &self,
        target: &SinkTargetId,
        handle: &MessageHandle,
        projection: &Projection,
    ) -> Result<MessageHandle, SinkError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.update_not_found_once {
            inner.update_not_found_once = false;
            return Err(SinkError::NotFound("message to edit not found".into()));
        }
        if inner.fail_transient {
            return Err(SinkError::Transient("injected".into()));
        }
        inner.calls.push(Call::Update {
            target: target.to_string(),
            handle: handle.to_string(),
            text: projection.rendered_text.clone(),
        });
        Ok(handle.clone())
    }

    async fn remove(&self, target: &SinkTargetId, handle: &MessageHandle) -> Result<(), SinkError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_transient {
            return Err(SinkError::Transient("injected".into()));
        }
        inner.calls.push(Call::Remove {
            target: target.to_string(),
            handle: handle.to_string(),
        });
        Ok(())
    }

    async fn pin(&self, target: &SinkTargetId, handle: &MessageHandle) -> Result<(), SinkError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Pin {
            target: target.to_string(),
            handle: handle.to_string(),
        });
        Ok(())
    }
}

pub const COOLDOWN: Duration = Duration::from_secs(5);

pub fn service_with(gateway: RecordingGateway, store: InMemoryKvStore) -> SyncService {
    SyncService::new(
        SubscriptionRegistry::new(),
        Arc::new(gateway),
        PersistenceAdapter::new(Arc::new(store)),
        COOLDOWN,
    )
}

pub fn scope() -> OwnerScopeId {
    OwnerScopeId::new("guild1")
}

pub fn channel_entity(id: &str, name: &str) -> WatchedEntity {
    WatchedEntity {
        id: EntityId::new(id),
        kind: EntityKind::VoiceChannel,
        scope: scope(),
        name: name.to_string(),
    }
}

pub fn channel_snapshot(id: &str, name: &str, occupant_names: &[&str]) -> RawSnapshot {
    RawSnapshot {
        entity: channel_entity(id, name),
        attributes: EntityAttributes::VoiceChannel {
            occupants: occupant_names
                .iter()
                .map(|n| Occupant {
                    display_name: n.to_string(),
                    activity: None,
                    muted: false,
                })
                .collect(),
        },
    }
}

pub fn presence_snapshot(id: &str, user: &str, online: bool, activity: Option<&str>) -> RawSnapshot {
    RawSnapshot {
        entity: WatchedEntity {
            id: EntityId::new(id),
            kind: EntityKind::Presence,
            scope: scope(),
            name: user.to_string(),
        },
        attributes: EntityAttributes::Presence {
            user_name: user.to_string(),
            online,
            activity: activity.map(|a| a.to_string()),
        },
    }
}

pub fn event_snapshot(id: &str, title: &str, ended: bool) -> RawSnapshot {
    RawSnapshot {
        entity: WatchedEntity {
            id: EntityId::new(id),
            kind: EntityKind::ScheduledEvent,
            scope: scope(),
            name: title.to_string(),
        },
        attributes: EntityAttributes::ScheduledEvent {
            title: title.to_string(),
            description: None,
            starts_at: None,
            location: None,
            cover_image: None,
            event_url: None,
            ended,
        },
    }
}

pub fn chat(id: &str) -> SinkTargetId {
    SinkTargetId::new(id)
}
