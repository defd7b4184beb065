use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::application::ports::SourceClient;
use crate::application::service::SyncService;
use crate::domain::{EntityKind, OwnerScopeId, WatcherKey};

/// Startup pass: rehydrate watchers from the durable store and reconcile
/// them against current live source state, so drift accumulated while the
/// process was down gets resolved before the first live event arrives.
pub struct RecoveryCoordinator {
    service: SyncService,
    source: Arc<dyn SourceClient>,
}

impl RecoveryCoordinator {
    pub fn new(service: SyncService, source: Arc<dyn SourceClient>) -> Self {
        Self { service, source }
    }

    pub async fn recover_scope(&self, scope: &OwnerScopeId) {
        for kind in EntityKind::ALL {
            let keys = self.service.persistence().stored_keys(scope, kind).await;
            if !keys.is_empty() {
                info!(%scope, %kind, count = keys.len(), "restoring persisted watchers");
            }

            for key in &keys {
                self.restore_one(key).await;
            }

            // Scheduled events can disappear without a clean "ended"
            // transition ever being observed; sweep those explicitly.
            if kind == EntityKind::ScheduledEvent {
                self.sweep_stale_events(scope, &keys).await;
            }
        }
    }

    async fn restore_one(&self, key: &WatcherKey) {
        if self.service.registry().contains(key) {
            // A live watcher already exists; no need for restoration.
            return;
        }

        let Some(record) = self.service.persistence().load(key).await else {
            return;
        };

        let hydrated = self.service.build_watcher(key.clone());
        hydrated.hydrate(record).await;
        let watcher = self
            .service
            .registry()
            .get_or_create(key, || hydrated.clone());

        match self
            .source
            .fetch_snapshot(&key.scope, key.kind, &key.entity)
            .await
        {
            Ok(Some(snapshot)) => watcher.on_raw_update(&snapshot).await,
            Ok(None) => {
                // Entity not visible right now; scheduled events get
                // swept separately, everything else self-heals on its
                // next live event.
                warn!(watcher = %key, "no live snapshot for restored watcher");
            }
            Err(e) => {
                warn!(watcher = %key, error = %e, "reconcile fetch failed, skipping this pass");
            }
        }
    }

    async fn sweep_stale_events(&self, scope: &OwnerScopeId, persisted: &[WatcherKey]) {
        let live: HashSet<_> = match self.source.list_scheduled_events(scope).await {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                warn!(%scope, error = %e, "live event enumeration failed, skipping sweep");
                return;
            }
        };

        for key in persisted {
            if live.contains(&key.entity) {
                continue;
            }
            if let Some(watcher) = self.service.registry().find(key) {
                info!(watcher = %key, "event no longer exists, removing its notification");
                if watcher.unsubscribe(None).await {
                    self.service.registry().remove_if_same(key, &watcher);
                }
            }
        }
    }
}
