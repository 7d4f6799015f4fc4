//! # stsdesk HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Record, lineage and equipment counts
//! - `POST /records/{kind}` - Start a lineage
//! - `GET /records/{kind}` - List heads (`?year=&month=&status=`)
//! - `GET /records/{kind}/{id}` - One version
//! - `PUT /records/{kind}/{id}` - Amend the head
//! - `POST /records/{kind}/{id}/review` - Approve or reject
//! - `GET /records/{kind}/{id}/history` - Whole lineage
//! - `GET /records/{kind}/{id}/attachments/{field}` - Download a file
//! - `GET /dashboard/{kind}` - Metrics (`?year=`)
//! - `POST /equipment`, `GET /equipment`, `GET|PUT /equipment/{code}`
//! - `GET /verify` - Ledger audit
//!
//! ## Security
//!
//! See [`crate::config`]: optional bearer key, global rate limit, CORS
//! allowlist (localhost only by default) and a request body limit.

mod auth;
mod extract;
mod handlers;
mod middleware;
mod types;

pub use auth::ApiKey;
pub use handlers::{ApiError, error_status};
pub use middleware::create_rate_limiter;
pub use types::{
    AttachmentJson, DashboardResponse, EquipmentJson, EquipmentListResponse,
    EquipmentPatchRequest, EquipmentRequest, EquipmentResponse, ErrorResponse, HealthResponse,
    HistoryResponse, ListQuery, ListResponse, RecordJson, RecordResponse, RecordWriteRequest,
    ReviewJson, ReviewRequest, StatusResponse, UploadJson, VerifyResponse, field_to_json,
    json_to_field, payload_from_json, payload_to_json, version_to_json,
};

use crate::config::Config;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::get,
};
use std::sync::Arc;
use stsdesk_core::{Ledger, LedgerError};
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state containing the ledger.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<RwLock<Ledger>>,
}

impl AppState {
    #[must_use]
    pub fn new(ledger: Ledger) -> Self {
        Self {
            ledger: Arc::new(RwLock::new(ledger)),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

const CORS_METHODS: [Method; 4] = [Method::GET, Method::POST, Method::PUT, Method::OPTIONS];

/// CORS layer from `[security] cors_origins`.
///
/// `None` or no valid origin falls back to localhost; `["*"]` allows all.
fn build_cors_layer(origins: Option<&[String]>) -> CorsLayer {
    let Some(origins) = origins else {
        tracing::info!("CORS: no origins configured, allowing localhost only");
        return build_localhost_cors();
    };
    if origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS: allowing ALL origins. This is insecure for production!");
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(hv) => {
                tracing::info!("CORS: allowing origin {}", o);
                Some(hv)
            }
            Err(e) => {
                tracing::warn!("CORS: invalid origin '{}': {}", o, e);
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        tracing::warn!("CORS: no valid origins configured, allowing localhost only");
        return build_localhost_cors();
    }
    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(CORS_METHODS)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(CORS_METHODS)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing
/// 2. CORS
/// 3. Body limit
/// 4. Rate limiting (if enabled)
/// 5. Authentication (if a key is configured)
pub fn create_router(state: AppState, config: &Config) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/verify", get(handlers::verify_handler))
        .route(
            "/records/{kind}",
            get(handlers::list_records_handler).post(handlers::create_record_handler),
        )
        .route(
            "/records/{kind}/{id}",
            get(handlers::get_record_handler).put(handlers::amend_record_handler),
        )
        .route(
            "/records/{kind}/{id}/review",
            axum::routing::post(handlers::review_record_handler),
        )
        .route(
            "/records/{kind}/{id}/history",
            get(handlers::history_handler),
        )
        .route(
            "/records/{kind}/{id}/attachments/{field}",
            get(handlers::attachment_handler),
        )
        .route("/dashboard/{kind}", get(handlers::dashboard_handler))
        .route(
            "/equipment",
            get(handlers::list_equipment_handler).post(handlers::add_equipment_handler),
        )
        .route(
            "/equipment/{code}",
            get(handlers::get_equipment_handler).put(handlers::update_equipment_handler),
        );

    match config.security.api_key.as_deref() {
        Some(key) => {
            tracing::info!("API key authentication enabled");
            router = router.layer(axum_middleware::from_fn_with_state(
                ApiKey::new(key),
                auth::api_key_auth_middleware,
            ));
        }
        None => tracing::warn!(
            "API key authentication DISABLED - all endpoints are publicly accessible! \
             Set STSDESK_API_KEY to enable authentication."
        ),
    }

    match create_rate_limiter(config.security.rate_limit) {
        Some(limiter) => {
            tracing::info!(
                "Rate limiting enabled: {} requests/second",
                config.security.rate_limit
            );
            router = router.layer(axum_middleware::from_fn_with_state(
                limiter,
                middleware::rate_limit_middleware,
            ));
        }
        None => tracing::info!("Rate limiting disabled"),
    }

    router
        .layer(axum::extract::DefaultBodyLimit::max(
            config.server.body_limit_bytes,
        ))
        .layer(build_cors_layer(config.security.cors_origins.as_deref()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Serve `ledger` on `addr` until Ctrl+C.
pub async fn run_server(addr: &str, ledger: Ledger, config: &Config) -> Result<(), LedgerError> {
    let router = create_router(AppState::new(ledger), config);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| LedgerError::Io(format!("Bind failed: {}", e)))?;

    tracing::info!("stsdesk HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .map_err(|e| LedgerError::Io(format!("Server error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn preflight(origin: &str) -> Request<Body> {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/records/ofd-inspection/1")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PUT")
            .body(Body::empty())
            .expect("request")
    }

    #[tokio::test]
    async fn localhost_preflight_is_allowed_by_default() {
        let router = create_router(AppState::new(Ledger::new()), &Config::default());
        let response = router
            .oneshot(preflight("http://localhost:3000"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok()),
            Some("http://localhost:3000")
        );
    }

    #[tokio::test]
    async fn configured_origins_replace_localhost() {
        let mut config = Config::default();
        config.security.cors_origins = Some(vec!["https://ops.example.com".to_string()]);
        let router = create_router(AppState::new(Ledger::new()), &config);
        let response = router
            .oneshot(preflight("http://localhost:3000"))
            .await
            .expect("response");
        assert!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .is_none()
        );
    }
}
