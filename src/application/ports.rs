use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::{
    EntityId, EntityKind, MessageHandle, OwnerScopeId, Projection, RawSnapshot, SinkTargetId,
};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The stored message handle no longer exists on the sink side.
    /// Callers recreate instead of surfacing this further.
    #[error("message not found: {0}")]
    NotFound(String),
    #[error("sink error: {0}")]
    Transient(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("source error: {0}")]
    Source(String),
}

pub type AppResult<T> = Result<T, AppError>;

/// Thin operation set against the sink messaging API. Single-shot calls,
/// no internal retry; retry cadence belongs to the watcher's cooldown plus
/// the next real-world state change.
#[async_trait]
pub trait SinkGateway: Send + Sync {
    async fn create(
        &self,
        target: &SinkTargetId,
        projection: &Projection,
    ) -> Result<MessageHandle, SinkError>;

    async fn update(
        &self,
        target: &SinkTargetId,
        handle: &MessageHandle,
        projection: &Projection,
    ) -> Result<MessageHandle, SinkError>;

    async fn remove(&self, target: &SinkTargetId, handle: &MessageHandle) -> Result<(), SinkError>;

    async fn pin(&self, target: &SinkTargetId, handle: &MessageHandle) -> Result<(), SinkError>;
}

/// Durable hash-map-of-strings key-value interface. No transactions; each
/// watcher record is independent.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set_hash(&self, key: &str, fields: &HashMap<String, String>) -> AppResult<()>;
    async fn get_hash(&self, key: &str) -> AppResult<Option<HashMap<String, String>>>;
    async fn delete(&self, key: &str) -> AppResult<()>;
    async fn exists(&self, key: &str) -> AppResult<bool>;
    async fn keys_with_prefix(&self, prefix: &str) -> AppResult<Vec<String>>;
}

/// On-demand view of current source state, used by startup reconciliation.
/// Live change notifications arrive separately as pushed `RawSnapshot`s.
#[async_trait]
pub trait SourceClient: Send + Sync {
    async fn fetch_snapshot(
        &self,
        scope: &OwnerScopeId,
        kind: EntityKind,
        entity: &EntityId,
    ) -> AppResult<Option<RawSnapshot>>;

    async fn list_scheduled_events(&self, scope: &OwnerScopeId) -> AppResult<Vec<EntityId>>;
}
