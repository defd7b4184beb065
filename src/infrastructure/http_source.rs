use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;

use crate::application::{AppError, AppResult, SourceClient};
use crate::domain::{EntityId, EntityKind, OwnerScopeId, RawSnapshot};

/// Pull-side view of the source bridge, used by startup reconciliation.
/// Live change notifications come in pushed over the HTTP API instead.
pub struct HttpSourceClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpSourceClient {
    pub fn new(base_url: String, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    async fn get_json<T: for<'de> serde::Deserialize<'de>>(
        &self,
        url: String,
    ) -> AppResult<Option<T>> {
        let mut req = self.client.get(&url);
        if let Some(token) = &self.token {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| AppError::Source(e.to_string()))?;

        // A vanished entity (404) is an answer, not an error.
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let resp = resp
            .error_for_status()
            .map_err(|e| AppError::Source(e.to_string()))?;

        let body = resp
            .json()
            .await
            .map_err(|e| AppError::Source(e.to_string()))?;
        Ok(Some(body))
    }
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    async fn fetch_snapshot(
        &self,
        scope: &OwnerScopeId,
        kind: EntityKind,
        entity: &EntityId,
    ) -> AppResult<Option<RawSnapshot>> {
        let url = format!(
            "{}/scopes/{}/{}/{}/snapshot",
            self.base_url, scope, kind, entity
        );
        self.get_json(url).await
    }

    async fn list_scheduled_events(&self, scope: &OwnerScopeId) -> AppResult<Vec<EntityId>> {
        let url = format!("{}/scopes/{}/events", self.base_url, scope);
        Ok(self.get_json(url).await?.unwrap_or_default())
    }
}
