use std::sync::Arc;
use std::time::Duration;

use crate::application::persistence::PersistenceAdapter;
use crate::application::ports::SinkGateway;
use crate::application::registry::SubscriptionRegistry;
use crate::application::watcher::Watcher;
use crate::domain::{
    strategy_for, EntityId, EntityKind, OwnerScopeId, RawSnapshot, SinkTargetId, WatcherKey,
};

/// The operations exposed to command-handling callers, plus the raw
/// update dispatch entry point. Safe to call concurrently with in-flight
/// update processing for the same entity; the per-watcher mutex does the
/// sequencing.
#[derive(Clone)]
pub struct SyncService {
    registry: SubscriptionRegistry,
    gateway: Arc<dyn SinkGateway>,
    persistence: PersistenceAdapter,
    cooldown: Duration,
}

impl SyncService {
    pub fn new(
        registry: SubscriptionRegistry,
        gateway: Arc<dyn SinkGateway>,
        persistence: PersistenceAdapter,
        cooldown: Duration,
    ) -> Self {
        Self {
            registry,
            gateway,
            persistence,
            cooldown,
        }
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn persistence(&self) -> &PersistenceAdapter {
        &self.persistence
    }

    /// Watcher identity for a kind: single-target kinds key per sink
    /// target, the rest share one watcher per entity.
    fn key_for(
        scope: &OwnerScopeId,
        kind: EntityKind,
        entity: &EntityId,
        target: Option<&SinkTargetId>,
    ) -> WatcherKey {
        let base = WatcherKey::new(scope.clone(), kind, entity.clone());
        match target {
            Some(t) if kind.is_single_target() => base.with_target(t.clone()),
            _ => base,
        }
    }

    pub fn build_watcher(&self, key: WatcherKey) -> Arc<Watcher> {
        Watcher::new(
            key.clone(),
            strategy_for(key.kind),
            self.gateway.clone(),
            self.persistence.clone(),
            self.cooldown,
        )
    }

    pub async fn subscribe(
        &self,
        scope: &OwnerScopeId,
        kind: EntityKind,
        entity: &EntityId,
        target: SinkTargetId,
    ) {
        let key = Self::key_for(scope, kind, entity, Some(&target));
        loop {
            let watcher = self
                .registry
                .get_or_create(&key, || self.build_watcher(key.clone()));
            if watcher.subscribe(target.clone()).await {
                return;
            }
            // Lost a race against a full unsubscribe: that instance is
            // retired. Make sure it is out of the map and start over.
            self.registry.remove_if_same(&key, &watcher);
        }
    }

    pub async fn unsubscribe(
        &self,
        scope: &OwnerScopeId,
        kind: EntityKind,
        entity: &EntityId,
        target: Option<&SinkTargetId>,
    ) {
        let base = WatcherKey::new(scope.clone(), kind, entity.clone());

        if kind.is_single_target() {
            // Per-target watchers: removing a target removes its whole
            // watcher; removing all targets removes all of them.
            let watchers = match target {
                Some(t) => self
                    .registry
                    .find(&base.with_target(t.clone()))
                    .into_iter()
                    .collect::<Vec<_>>(),
                None => self.registry.find_for_entity(&base),
            };
            for watcher in watchers {
                if watcher.unsubscribe(None).await {
                    self.registry.remove_if_same(watcher.key(), &watcher);
                }
            }
            return;
        }

        if let Some(watcher) = self.registry.find(&base) {
            if watcher.unsubscribe(target).await {
                self.registry.remove_if_same(watcher.key(), &watcher);
            }
        }
    }

    pub async fn is_active(
        &self,
        scope: &OwnerScopeId,
        kind: EntityKind,
        entity: &EntityId,
        target: Option<&SinkTargetId>,
    ) -> bool {
        let base = WatcherKey::new(scope.clone(), kind, entity.clone());

        if kind.is_single_target() {
            let watchers = match target {
                Some(t) => self
                    .registry
                    .find(&base.with_target(t.clone()))
                    .into_iter()
                    .collect::<Vec<_>>(),
                None => self.registry.find_for_entity(&base),
            };
            for watcher in watchers {
                if watcher.is_active(None).await {
                    return true;
                }
            }
            return false;
        }

        match self.registry.find(&base) {
            Some(watcher) => watcher.is_active(target).await,
            None => false,
        }
    }

    /// Fans a raw source update out to every watcher of that entity.
    /// No-ops when nobody is subscribed.
    pub async fn dispatch(&self, snapshot: &RawSnapshot) {
        let entity = &snapshot.entity;
        let base = WatcherKey::new(entity.scope.clone(), entity.kind, entity.id.clone());

        let watchers = if entity.kind.is_single_target() {
            self.registry.find_for_entity(&base)
        } else {
            self.registry.find(&base).into_iter().collect()
        };

        for watcher in watchers {
            watcher.on_raw_update(snapshot).await;
        }
    }
}
