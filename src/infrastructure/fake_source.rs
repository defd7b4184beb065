use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::application::{AppResult, SourceClient};
use crate::domain::{EntityId, EntityKind, OwnerScopeId, RawSnapshot};

/// Canned source state for tests and dry runs. Snapshots are registered
/// up front and served back by identity.
#[derive(Clone, Default)]
pub struct FakeSourceClient {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    snapshots: HashMap<(OwnerScopeId, EntityKind, EntityId), RawSnapshot>,
    events: HashMap<OwnerScopeId, Vec<EntityId>>,
}

impl FakeSourceClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_snapshot(&self, snapshot: RawSnapshot) {
        let mut inner = self.inner.lock().unwrap();
        let entity = &snapshot.entity;
        inner.snapshots.insert(
            (entity.scope.clone(), entity.kind, entity.id.clone()),
            snapshot.clone(),
        );
    }

    pub fn clear_snapshot(&self, scope: &OwnerScopeId, kind: EntityKind, entity: &EntityId) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .snapshots
            .remove(&(scope.clone(), kind, entity.clone()));
    }

    pub fn set_live_events(&self, scope: OwnerScopeId, events: Vec<EntityId>) {
        let mut inner = self.inner.lock().unwrap();
        inner.events.insert(scope, events);
    }
}

#[async_trait]
impl SourceClient for FakeSourceClient {
    async fn fetch_snapshot(
        &self,
        scope: &OwnerScopeId,
        kind: EntityKind,
        entity: &EntityId,
    ) -> AppResult<Option<RawSnapshot>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .snapshots
            .get(&(scope.clone(), kind, entity.clone()))
            .cloned())
    }

    async fn list_scheduled_events(&self, scope: &OwnerScopeId) -> AppResult<Vec<EntityId>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.events.get(scope).cloned().unwrap_or_default())
    }
}
