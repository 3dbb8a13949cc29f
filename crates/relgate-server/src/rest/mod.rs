mod handlers;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};

use crate::middleware::auth::{AdminAuthState, admin_auth_middleware};
use crate::service::{Backend, RelgateService};

const MAX_REQUEST_BODY_SIZE: usize = 1024 * 1024; // 1 MB

/// Response header carrying the comma-joined allowed tags on an allow.
pub const ALLOWED_TAGS_HEADER: &str = "x-allowed-tags";

pub struct AppState<B> {
    pub service: Arc<RelgateService<B>>,
}

impl<B> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

pub fn create_router<B: Backend>(state: AppState<B>, auth: AdminAuthState) -> Router {
    Router::new()
        .route("/v1/check", post(handlers::check::<B>))
        .route(
            "/v1/revocations/credentials/:tenant/:credential_id/:expires_at",
            post(handlers::revoke_credential::<B>),
        )
        .route(
            "/v1/revocations/subjects/:tenant/:subject_id",
            post(handlers::revoke_subject::<B>).delete(handlers::unrevoke_subject::<B>),
        )
        .route("/v1/cache/refresh", post(handlers::refresh_cache::<B>))
        .route("/v1/cache/status", get(handlers::cache_status::<B>))
        .route("/metrics", get(handlers::metrics::<B>))
        .route("/healthz", get(handlers::healthz))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_SIZE))
        .layer(middleware::from_fn_with_state(auth, admin_auth_middleware))
        .with_state(state)
}
