use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::application::SyncService;
use crate::domain::{EntityId, EntityKind, OwnerScopeId, RawSnapshot, SinkTargetId};

/// HTTP surface for the source bridge (pushes raw updates) and command
/// handlers (subscribe/unsubscribe/status).
#[derive(Clone)]
pub struct ApiState {
    pub service: SyncService,
    pub api_token: Option<String>,
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/updates", post(push_update))
        .route("/subscriptions", put(subscribe).delete(unsubscribe))
        .route("/subscriptions/status", get(status))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn push_update(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(snapshot): Json<RawSnapshot>,
) -> impl IntoResponse {
    if let Err((code, msg)) = check_auth(&headers, &state.api_token) {
        return (code, msg).into_response();
    }
    if snapshot.attributes.kind() != snapshot.entity.kind {
        return (
            StatusCode::BAD_REQUEST,
            "attributes do not match entity kind".to_string(),
        )
            .into_response();
    }
    state.service.dispatch(&snapshot).await;
    StatusCode::ACCEPTED.into_response()
}

#[derive(Deserialize)]
struct SubscriptionBody {
    scope: String,
    kind: EntityKind,
    entity: String,
    target: String,
}

async fn subscribe(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<SubscriptionBody>,
) -> impl IntoResponse {
    if let Err((code, msg)) = check_auth(&headers, &state.api_token) {
        return (code, msg).into_response();
    }
    state
        .service
        .subscribe(
            &OwnerScopeId::new(body.scope),
            body.kind,
            &EntityId::new(body.entity),
            SinkTargetId::new(body.target),
        )
        .await;
    StatusCode::NO_CONTENT.into_response()
}

#[derive(Deserialize)]
struct UnsubscribeBody {
    scope: String,
    kind: EntityKind,
    entity: String,
    /// Absent means: drop every target for this entity.
    target: Option<String>,
}

async fn unsubscribe(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<UnsubscribeBody>,
) -> impl IntoResponse {
    if let Err((code, msg)) = check_auth(&headers, &state.api_token) {
        return (code, msg).into_response();
    }
    let target = body.target.map(SinkTargetId::new);
    state
        .service
        .unsubscribe(
            &OwnerScopeId::new(body.scope),
            body.kind,
            &EntityId::new(body.entity),
            target.as_ref(),
        )
        .await;
    StatusCode::NO_CONTENT.into_response()
}

#[derive(Deserialize)]
struct StatusQuery {
    scope: String,
    kind: EntityKind,
    entity: String,
    target: Option<String>,
}

async fn status(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(q): Query<StatusQuery>,
) -> impl IntoResponse {
    if let Err((code, msg)) = check_auth(&headers, &state.api_token) {
        return (code, msg).into_response();
    }
    let target = q.target.map(SinkTargetId::new);
    let active = state
        .service
        .is_active(
            &OwnerScopeId::new(q.scope),
            q.kind,
            &EntityId::new(q.entity),
            target.as_ref(),
        )
        .await;
    Json(json!({ "active": active })).into_response()
}

fn check_auth(headers: &HeaderMap, token: &Option<String>) -> Result<(), (StatusCode, String)> {
    let Some(expected) = token else {
        return Ok(());
    }; // no token configured, auth disabled
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let ok = auth == format!("Bearer {}", expected);
    if ok {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "unauthorized".to_string()))
    }
}
