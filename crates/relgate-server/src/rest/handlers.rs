use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::metrics;
use crate::service::Backend;

use super::types::*;
use super::{ALLOWED_TAGS_HEADER, AppState};

fn api_error_to_response(err: ApiError) -> Response {
    let status = match &err {
        ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        ApiError::Storage(_) | ApiError::Reload(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    if status.is_server_error() {
        tracing::warn!(error = %err, "admin operation failed");
    }

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

pub async fn check<B: Backend>(
    State(state): State<AppState<B>>,
    Json(req): Json<CheckRequest>,
) -> Response {
    let ctx = req.into_context();
    let decision = state.service.check(&ctx).await;

    let allowed_tags = decision.allowed.then(|| decision.allowed_tags_header());
    let body = Json(CheckResponse::from(decision));
    match allowed_tags {
        Some(tags) => (StatusCode::OK, [(ALLOWED_TAGS_HEADER, tags)], body).into_response(),
        None => (StatusCode::OK, body).into_response(),
    }
}

pub async fn revoke_credential<B: Backend>(
    State(state): State<AppState<B>>,
    Path((tenant, credential_id, expires_at)): Path<(String, String, i64)>,
) -> Response {
    match state
        .service
        .revoke_credential(&tenant, &credential_id, expires_at)
        .await
    {
        Ok(ttl) => Json(CredentialRevokedResponse {
            revoked: ttl.is_some(),
            ttl_secs: ttl.map(|d| d.as_secs()),
        })
        .into_response(),
        Err(e) => api_error_to_response(e),
    }
}

pub async fn revoke_subject<B: Backend>(
    State(state): State<AppState<B>>,
    Path((tenant, subject_id)): Path<(String, String)>,
) -> Response {
    match state.service.revoke_subject(&tenant, &subject_id).await {
        Ok(ttl) => Json(SubjectRevokedResponse {
            revoked: true,
            ttl_secs: ttl.as_secs(),
        })
        .into_response(),
        Err(e) => api_error_to_response(e),
    }
}

pub async fn unrevoke_subject<B: Backend>(
    State(state): State<AppState<B>>,
    Path((tenant, subject_id)): Path<(String, String)>,
) -> Response {
    match state.service.unrevoke_subject(&tenant, &subject_id).await {
        Ok(removed) => Json(SubjectUnrevokedResponse { removed }).into_response(),
        Err(e) => api_error_to_response(e),
    }
}

pub async fn refresh_cache<B: Backend>(State(state): State<AppState<B>>) -> Response {
    match state.service.refresh_cache().await {
        Ok(marker) => (StatusCode::ACCEPTED, Json(RefreshResponse { marker })).into_response(),
        Err(e) => api_error_to_response(e),
    }
}

pub async fn cache_status<B: Backend>(State(state): State<AppState<B>>) -> impl IntoResponse {
    Json(state.service.cache_status())
}

pub async fn metrics<B: Backend>(State(state): State<AppState<B>>) -> impl IntoResponse {
    metrics::metrics_handler(State(state.service.metrics())).await
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}
