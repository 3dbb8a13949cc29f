use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::audit;
use crate::auth::{self, AuthError};

/// Admin credential check for the REST surface. Without a configured key
/// hash every admin route is open.
#[derive(Clone)]
pub struct AdminAuthState {
    key_hash: Option<Arc<str>>,
}

impl AdminAuthState {
    pub fn dev_mode() -> Self {
        Self { key_hash: None }
    }

    pub fn with_key_hash(key_hash: impl Into<Arc<str>>) -> Self {
        Self {
            key_hash: Some(key_hash.into()),
        }
    }

    pub fn from_config(key_hash: Option<&str>) -> Self {
        match key_hash {
            Some(hash) => Self::with_key_hash(hash),
            None => Self::dev_mode(),
        }
    }

    pub fn is_dev_mode(&self) -> bool {
        self.key_hash.is_none()
    }
}

fn requires_admin(path: &str) -> bool {
    path.starts_with("/v1/revocations/") || path.starts_with("/v1/cache/")
}

pub async fn admin_auth_middleware(
    State(auth_state): State<AdminAuthState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if !requires_admin(&path) {
        return next.run(request).await;
    }

    let Some(ref key_hash) = auth_state.key_hash else {
        return next.run(request).await;
    };

    let auth_header = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok());

    let result = match auth_header {
        None => Err(AuthError::MissingHeader),
        Some(h) => match h.strip_prefix("Bearer ") {
            Some(raw_key) => auth::authenticate(raw_key, key_hash),
            None => Err(AuthError::InvalidKeyFormat),
        },
    };

    match result {
        Ok(()) => next.run(request).await,
        Err(AuthError::Internal(e)) => {
            tracing::error!(error = %e, "admin key verification failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        }
        Err(e) => {
            let reason = e.to_string();
            audit::audit_auth_failure(&reason, &path);
            error_json(StatusCode::UNAUTHORIZED, &reason)
        }
    }
}

pub(crate) fn error_json(status: StatusCode, msg: &str) -> Response {
    let body = serde_json::json!({"error": msg});
    (status, axum::Json(body)).into_response()
}
