use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::application::persistence::{PersistenceAdapter, WatcherRecord};
use crate::application::ports::{SinkError, SinkGateway};
use crate::domain::{MessageHandle, Projection, ProjectionStrategy, RawSnapshot, SinkTargetId, WatcherKey};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5);

/// Per-entity state machine that coalesces raw source updates into a
/// bounded rate of sink edits, with at most one live status message per
/// subscribed sink target.
///
/// All operations lock the inner state for their full duration, sink
/// calls included. That single mutex is what provides the one ordering
/// guarantee this subsystem exists for: applies for one watcher never
/// interleave, so a stale edit can never overwrite a fresher one.
/// Different watchers are fully independent.
pub struct Watcher {
    key: WatcherKey,
    strategy: Arc<dyn ProjectionStrategy>,
    gateway: Arc<dyn SinkGateway>,
    persistence: PersistenceAdapter,
    cooldown: Duration,
    weak: Weak<Watcher>,
    state: Mutex<WatcherState>,
}

#[derive(Default)]
struct WatcherState {
    active: bool,
    subscribers: BTreeSet<SinkTargetId>,
    /// Last projection actually applied to the sink.
    current: Option<Projection>,
    /// One live message per subscribed target, at most.
    handles: HashMap<SinkTargetId, MessageHandle>,
    /// Queued value awaiting cooldown expiry. Last write wins; there is
    /// never more than one queued value.
    pending: Option<Projection>,
    cooldown_until: Option<Instant>,
    /// Single-slot delayed flush task. Armed at most once per cooldown
    /// window; replaced payloads reuse the armed task.
    timer: Option<JoinHandle<()>>,
    /// The persisted-handle lookup runs once per process lifetime, the
    /// first time an update finds no live handle.
    restore_attempted: bool,
    /// Set when the last subscriber leaves. A retired watcher never comes
    /// back; late subscribers get refused and must go through the registry
    /// again, which hands them a fresh instance.
    retired: bool,
}

impl Watcher {
    pub fn new(
        key: WatcherKey,
        strategy: Arc<dyn ProjectionStrategy>,
        gateway: Arc<dyn SinkGateway>,
        persistence: PersistenceAdapter,
        cooldown: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            key,
            strategy,
            gateway,
            persistence,
            cooldown,
            weak: weak.clone(),
            state: Mutex::new(WatcherState::default()),
        })
    }

    pub fn key(&self) -> &WatcherKey {
        &self.key
    }

    /// Idempotent. Does not send anything; the next raw update does.
    /// Returns false when this instance has already been retired by a
    /// concurrent full unsubscribe; the caller must fetch a fresh watcher
    /// from the registry and try again.
    pub async fn subscribe(&self, target: SinkTargetId) -> bool {
        let mut state = self.state.lock().await;
        if state.retired {
            return false;
        }
        // Pick up any persisted handles first so this save cannot clobber
        // them across a restart mid-session.
        self.maybe_restore(&mut state).await;
        state.subscribers.insert(target);
        state.active = true;
        self.persist(&state);
        true
    }

    /// Removes one target, or all of them when `target` is `None`, taking
    /// down each removed target's status message. Returns true once the
    /// subscriber set is empty: the watcher retires itself and the caller
    /// should drop it from the registry.
    pub async fn unsubscribe(&self, target: Option<&SinkTargetId>) -> bool {
        let mut state = self.state.lock().await;

        let removed: Vec<SinkTargetId> = match target {
            Some(t) => state.subscribers.take(t).into_iter().collect(),
            None => std::mem::take(&mut state.subscribers).into_iter().collect(),
        };

        for t in &removed {
            if let Some(handle) = state.handles.remove(t) {
                self.remove_message(t, &handle).await;
            }
        }

        if state.subscribers.is_empty() {
            state.active = false;
            state.retired = true;
            state.pending = None;
            state.current = None;
            self.cancel_timer(&mut state);
            self.persistence.delete(&self.key).await;
            true
        } else {
            if !removed.is_empty() {
                self.persist(&state);
            }
            false
        }
    }

    pub async fn is_active(&self, target: Option<&SinkTargetId>) -> bool {
        let state = self.state.lock().await;
        match target {
            Some(t) => state.active && state.subscribers.contains(t),
            None => state.active,
        }
    }

    /// Entry point for every raw source update. Projects, then either
    /// tears down (entity went quiet), applies immediately, or coalesces
    /// behind the cooldown window.
    pub async fn on_raw_update(&self, snapshot: &RawSnapshot) {
        let mut state = self.state.lock().await;
        if !state.active {
            return;
        }

        // Emptiness takes priority over debounce: an ended event or a
        // drained channel takes its message down right away.
        if self.strategy.is_empty(snapshot) {
            self.clear_notifications(&mut state).await;
            return;
        }

        let projection = self.strategy.project(snapshot);

        // Before treating "no handle" as "never notified", check the
        // store once; this is what prevents duplicate messages across a
        // restart mid-session.
        if state.handles.is_empty() {
            self.maybe_restore(&mut state).await;
        }

        let unchanged = state
            .current
            .as_ref()
            .map_or(false, |c| c.same_rendering(&projection));

        let now = Instant::now();
        if let Some(deadline) = state.cooldown_until.filter(|d| now < *d) {
            if unchanged {
                // Nothing changed relative to what the sink already shows;
                // this also supersedes any queued pending value.
                state.pending = None;
                self.cancel_timer(&mut state);
            } else {
                state.pending = Some(projection);
                if state.timer.is_none() {
                    self.arm_timer(&mut state, deadline);
                }
            }
            return;
        }

        if unchanged {
            return;
        }
        self.apply(&mut state, projection).await;
    }

    /// Seeds state from a persisted record during startup recovery.
    pub async fn hydrate(&self, record: WatcherRecord) {
        let mut state = self.state.lock().await;
        state.active = record.active;
        state.subscribers = record.subscribers.into_iter().collect();
        state.handles = record.handles;
        state.current = record.rendered_text.map(Projection::text);
        state.restore_attempted = true;
    }

    /// One-time lookup of the persisted record, merging back handles and
    /// subscribers written by a previous process lifetime.
    async fn maybe_restore(&self, state: &mut WatcherState) {
        if state.restore_attempted || !state.handles.is_empty() {
            return;
        }
        state.restore_attempted = true;
        if let Some(record) = self.persistence.load(&self.key).await {
            debug!(watcher = %self.key, "restored watcher state from store");
            state.handles = record.handles;
            state.subscribers.extend(record.subscribers);
            if state.current.is_none() {
                state.current = record.rendered_text.map(Projection::text);
            }
        }
    }

    async fn flush_pending(&self) {
        let mut state = self.state.lock().await;
        state.timer = None;
        if !state.active {
            return;
        }
        let Some(projection) = state.pending.take() else {
            return;
        };
        let unchanged = state
            .current
            .as_ref()
            .map_or(false, |c| c.same_rendering(&projection));
        if unchanged {
            return;
        }
        self.apply(&mut state, projection).await;
    }

    /// Pushes `projection` to every subscribed target. The cooldown
    /// window restarts at apply time whether or not the sink cooperated,
    /// so a flapping sink cannot blow the rate bound.
    async fn apply(&self, state: &mut WatcherState, projection: Projection) {
        state.cooldown_until = Some(Instant::now() + self.cooldown);

        let mut all_ok = true;
        let targets: Vec<SinkTargetId> = state.subscribers.iter().cloned().collect();
        for target in targets {
            let applied = match state.handles.get(&target).cloned() {
                Some(handle) => match self.gateway.update(&target, &handle, &projection).await {
                    Ok(new_handle) => {
                        state.handles.insert(target.clone(), new_handle);
                        true
                    }
                    Err(SinkError::NotFound(_)) => {
                        // The message went away under us; fall back to a
                        // fresh create rather than surfacing the error.
                        debug!(watcher = %self.key, %target, "status message gone, recreating");
                        state.handles.remove(&target);
                        self.create_message(state, &target, &projection).await
                    }
                    Err(e) => {
                        error!(watcher = %self.key, %target, error = %e, "status message edit failed");
                        false
                    }
                },
                None => self.create_message(state, &target, &projection).await,
            };
            all_ok &= applied;
        }

        // On partial failure the current projection stays put, so the next
        // update re-attempts the same diff instead of silently drifting.
        if all_ok {
            state.current = Some(projection);
        }
        self.persist(state);
    }

    async fn create_message(
        &self,
        state: &mut WatcherState,
        target: &SinkTargetId,
        projection: &Projection,
    ) -> bool {
        match self.gateway.create(target, projection).await {
            Ok(handle) => {
                if let Err(e) = self.gateway.pin(target, &handle).await {
                    debug!(watcher = %self.key, %target, error = %e, "pinning status message failed");
                }
                state.handles.insert(target.clone(), handle);
                true
            }
            Err(e) => {
                error!(watcher = %self.key, %target, error = %e, "status message create failed");
                false
            }
        }
    }

    /// Entity went quiet: take down all live messages and reset to the
    /// not-notified state.
    async fn clear_notifications(&self, state: &mut WatcherState) {
        state.pending = None;
        self.cancel_timer(state);

        if state.handles.is_empty() && state.current.is_none() {
            return;
        }

        let handles: Vec<(SinkTargetId, MessageHandle)> = state.handles.drain().collect();
        for (target, handle) in handles {
            self.remove_message(&target, &handle).await;
        }
        state.current = None;
        state.cooldown_until = None;
        self.persist(state);
    }

    async fn remove_message(&self, target: &SinkTargetId, handle: &MessageHandle) {
        match self.gateway.remove(target, handle).await {
            Ok(()) => {}
            Err(SinkError::NotFound(_)) => {
                debug!(watcher = %self.key, %target, "status message already gone");
            }
            Err(e) => {
                warn!(watcher = %self.key, %target, error = %e, "status message delete failed");
            }
        }
    }

    fn arm_timer(&self, state: &mut WatcherState, deadline: Instant) {
        let Some(watcher) = self.weak.upgrade() else {
            return;
        };
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            watcher.flush_pending().await;
        }));
    }

    fn cancel_timer(&self, state: &mut WatcherState) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }

    fn persist(&self, state: &WatcherState) {
        let record = WatcherRecord {
            active: state.active,
            subscribers: state.subscribers.iter().cloned().collect(),
            rendered_text: state.current.as_ref().map(|p| p.rendered_text.clone()),
            handles: state.handles.clone(),
        };
        self.persistence.save(&self.key, record);
    }
}
