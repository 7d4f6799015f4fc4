//! # Authentication Module
//!
//! Optional bearer key authentication for the stsdesk HTTP API.
//!
//! The key comes from `STSDESK_API_KEY` (see [`crate::config`]). When it is
//! set, every request except `/health` must send:
//!
//! ```text
//! Authorization: Bearer <your-api-key>
//! ```

use super::types::ErrorResponse;
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// The configured key, shared by the middleware.
#[derive(Clone)]
pub struct ApiKey(Arc<str>);

impl ApiKey {
    pub fn new(key: &str) -> Self {
        Self(Arc::from(key))
    }

    /// Constant-time check of a presented key.
    ///
    /// Both sides are padded to the same length so the comparison does not
    /// leak the expected key's length.
    pub fn matches(&self, provided: &str) -> bool {
        let provided = provided.as_bytes();
        let expected = self.0.as_bytes();
        let len = provided.len().max(expected.len());
        let mut a = vec![0u8; len];
        let mut b = vec![0u8; len];
        a[..provided.len()].copy_from_slice(provided);
        b[..expected.len()].copy_from_slice(expected);
        let same: bool = a.ct_eq(&b).into();
        same && provided.len() == expected.len()
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new("Unauthorized")),
    )
        .into_response()
}

/// Reject requests without the configured bearer key.
pub async fn api_key_auth_middleware(
    State(key): State<ApiKey>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v));

    match provided {
        Some(provided) if key.matches(provided) => next.run(request).await,
        Some(_) => {
            tracing::warn!(
                event = "auth_failure",
                reason = "invalid_api_key",
                "Authentication failed: invalid API key"
            );
            unauthorized()
        }
        None => {
            tracing::warn!(
                event = "auth_failure",
                reason = "missing_authorization_header",
                "Missing Authorization header"
            );
            unauthorized()
        }
    }
}
