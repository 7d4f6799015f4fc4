//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.

use super::{
    AppState,
    extract::{JsonBody, PathParams, QueryParams},
    types::{
        DashboardResponse, EquipmentJson, EquipmentListResponse, EquipmentPatchRequest,
        EquipmentQuery, EquipmentRequest, EquipmentResponse, ErrorResponse, HealthResponse,
        HistoryResponse, ListQuery, ListResponse, RecordJson, RecordResponse, RecordWriteRequest,
        ReviewRequest, StatusResponse, VerifyResponse, YearQuery,
    },
};
use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use std::fmt::Write;
use stsdesk_core::{Decision, LedgerError, RecordId, attachments::sanitize_file_name};

// =============================================================================
// ERROR MAPPING
// =============================================================================

/// HTTP status for a ledger error.
pub fn error_status(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        LedgerError::UnknownKind(_)
        | LedgerError::RecordNotFound(_)
        | LedgerError::LineageNotFound(_)
        | LedgerError::EquipmentNotFound(_)
        | LedgerError::AttachmentNotFound { .. } => StatusCode::NOT_FOUND,
        LedgerError::NotLatest { .. } | LedgerError::InvalidTransition { .. } => {
            StatusCode::FORBIDDEN
        }
        LedgerError::ConcurrentUpdate { .. } | LedgerError::DuplicateEquipment(_) => {
            StatusCode::CONFLICT
        }
        LedgerError::InvariantViolation(_)
        | LedgerError::Storage(_)
        | LedgerError::Serialization(_)
        | LedgerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Ledger error rendered as `{success: false, error}`.
///
/// Server-side failures are logged in full and answered with a generic message.
#[derive(Debug)]
pub struct ApiError(pub LedgerError);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = error_status(&self.0);
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "Request failed");
            "Internal server error".to_string()
        } else {
            if status == StatusCode::FORBIDDEN || status == StatusCode::CONFLICT {
                tracing::warn!(event = "write_rejected", error = %self.0, "Write rejected");
            }
            self.0.to_string()
        };
        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// HEALTH & STATUS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Record, lineage and equipment counts.
pub async fn status_handler(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    let ledger = state.ledger.read().await;
    Ok(Json(StatusResponse::from_ledger(&ledger)?))
}

// =============================================================================
// RECORDS
// =============================================================================

/// Start a new lineage.
pub async fn create_record_handler(
    State(state): State<AppState>,
    PathParams(kind): PathParams<String>,
    JsonBody(request): JsonBody<RecordWriteRequest>,
) -> ApiResult<impl IntoResponse> {
    let uploads = request.uploads()?;
    let mut ledger = state.ledger.write().await;
    let record = ledger.create(&kind, request.payload(), uploads)?;
    tracing::info!(
        event = "record_created",
        kind = %record.kind,
        lineage = record.lineage.0,
        record = record.id.0,
        form_code = record.form_code.as_ref().map(|c| c.as_str()).unwrap_or(""),
        "Lineage created"
    );
    Ok((
        StatusCode::CREATED,
        Json(RecordResponse::with_message(&record, "Record created")),
    ))
}

/// Heads of a kind, filtered.
pub async fn list_records_handler(
    State(state): State<AppState>,
    PathParams(kind): PathParams<String>,
    QueryParams(query): QueryParams<ListQuery>,
) -> ApiResult<Json<ListResponse>> {
    let filter = query.to_filter()?;
    let ledger = state.ledger.read().await;
    let listing = ledger.list(&kind, &filter)?;
    Ok(Json(ListResponse {
        success: true,
        data: listing.records.iter().map(RecordJson::from).collect(),
        years: listing.years,
    }))
}

/// Any version by id.
pub async fn get_record_handler(
    State(state): State<AppState>,
    PathParams((kind, id)): PathParams<(String, u64)>,
) -> ApiResult<Json<RecordResponse>> {
    let ledger = state.ledger.read().await;
    let record = ledger.get_of_kind(&kind, RecordId(id))?;
    Ok(Json(RecordResponse::new(&record)))
}

/// Append a version; `{id}` must be the current head.
pub async fn amend_record_handler(
    State(state): State<AppState>,
    PathParams((kind, id)): PathParams<(String, u64)>,
    JsonBody(request): JsonBody<RecordWriteRequest>,
) -> ApiResult<Json<RecordResponse>> {
    let uploads = request.uploads()?;
    let mut ledger = state.ledger.write().await;
    let record = ledger.amend(&kind, RecordId(id), request.payload(), uploads)?;
    tracing::info!(
        event = "record_amended",
        kind = %record.kind,
        lineage = record.lineage.0,
        record = record.id.0,
        version = %record.version,
        "Lineage amended"
    );
    Ok(Json(RecordResponse::with_message(&record, "Record updated")))
}

/// Approve or reject a pending head.
pub async fn review_record_handler(
    State(state): State<AppState>,
    PathParams((kind, id)): PathParams<(String, u64)>,
    JsonBody(request): JsonBody<ReviewRequest>,
) -> ApiResult<Json<RecordResponse>> {
    let decision = Decision::parse(&request.decision)?;
    let mut ledger = state.ledger.write().await;
    let record = ledger.review(
        &kind,
        RecordId(id),
        &request.reviewer,
        decision,
        request.comment,
    )?;
    tracing::info!(
        event = "record_reviewed",
        kind = %record.kind,
        lineage = record.lineage.0,
        status = %record.status,
        "Lineage reviewed"
    );
    Ok(Json(RecordResponse::with_message(
        &record,
        format!("Record {}", record.status),
    )))
}

/// Every version of the lineage `{id}` belongs to.
pub async fn history_handler(
    State(state): State<AppState>,
    PathParams((kind, id)): PathParams<(String, u64)>,
) -> ApiResult<Json<HistoryResponse>> {
    let ledger = state.ledger.read().await;
    let record = ledger.get_of_kind(&kind, RecordId(id))?;
    let history = ledger.history(record.lineage)?;
    Ok(Json(HistoryResponse {
        success: true,
        lineage_id: record.lineage.0,
        data: history.iter().map(RecordJson::from).collect(),
    }))
}

/// `Content-Disposition` carrying both a plain fallback name and the
/// original UTF-8 name (RFC 6266 / RFC 5987).
fn content_disposition(original_name: &str) -> String {
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        sanitize_file_name(original_name),
        encode_ext_value(base_name(original_name))
    )
}

fn base_name(file_name: &str) -> &str {
    file_name.rsplit(['/', '\\']).next().unwrap_or(file_name)
}

/// Percent-encode everything outside the RFC 5987 `attr-char` set.
fn encode_ext_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'!'
            | b'#'
            | b'$'
            | b'&'
            | b'+'
            | b'-'
            | b'.'
            | b'^'
            | b'_'
            | b'`'
            | b'|'
            | b'~' => out.push(char::from(byte)),
            _ => {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}

/// Download one attachment.
pub async fn attachment_handler(
    State(state): State<AppState>,
    PathParams((kind, id, field)): PathParams<(String, u64, String)>,
) -> ApiResult<impl IntoResponse> {
    let ledger = state.ledger.read().await;
    let (meta, bytes) = ledger.attachment(&kind, RecordId(id), &field)?;
    let disposition = content_disposition(&meta.original_name);
    Ok((
        [
            (header::CONTENT_TYPE, meta.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

/// Metrics over the heads of a kind.
pub async fn dashboard_handler(
    State(state): State<AppState>,
    PathParams(kind): PathParams<String>,
    QueryParams(query): QueryParams<YearQuery>,
) -> ApiResult<Json<DashboardResponse>> {
    let ledger = state.ledger.read().await;
    let metrics = ledger.metrics(&kind, query.year)?;
    Ok(Json(DashboardResponse {
        success: true,
        kind,
        data: metrics,
    }))
}

/// Full invariant audit.
pub async fn verify_handler(State(state): State<AppState>) -> ApiResult<Json<VerifyResponse>> {
    let ledger = state.ledger.read().await;
    let report = ledger.verify()?;
    if !report.is_clean() {
        tracing::error!(
            event = "audit_failed",
            violations = report.violations.len(),
            "Ledger audit found violations"
        );
    }
    Ok(Json(VerifyResponse::from(report)))
}

// =============================================================================
// EQUIPMENT
// =============================================================================

pub async fn add_equipment_handler(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<EquipmentRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut ledger = state.ledger.write().await;
    let item = ledger.add_equipment(request.to_equipment())?;
    tracing::info!(event = "equipment_added", code = %item.code, "Equipment added");
    Ok((
        StatusCode::CREATED,
        Json(EquipmentResponse {
            success: true,
            message: Some("Equipment added".to_string()),
            data: EquipmentJson::from(&item),
        }),
    ))
}

pub async fn list_equipment_handler(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<EquipmentQuery>,
) -> ApiResult<Json<EquipmentListResponse>> {
    let ledger = state.ledger.read().await;
    let items = ledger.list_equipment(query.category.as_deref(), query.location.as_deref())?;
    Ok(Json(EquipmentListResponse {
        success: true,
        data: items.iter().map(EquipmentJson::from).collect(),
    }))
}

pub async fn get_equipment_handler(
    State(state): State<AppState>,
    PathParams(code): PathParams<String>,
) -> ApiResult<Json<EquipmentResponse>> {
    let ledger = state.ledger.read().await;
    let item = ledger.equipment(&code)?;
    Ok(Json(EquipmentResponse {
        success: true,
        message: None,
        data: EquipmentJson::from(&item),
    }))
}

pub async fn update_equipment_handler(
    State(state): State<AppState>,
    PathParams(code): PathParams<String>,
    JsonBody(request): JsonBody<EquipmentPatchRequest>,
) -> ApiResult<Json<EquipmentResponse>> {
    let mut ledger = state.ledger.write().await;
    let item = ledger.update_equipment(&code, request.into())?;
    Ok(Json(EquipmentResponse {
        success: true,
        message: Some("Equipment updated".to_string()),
        data: EquipmentJson::from(&item),
    }))
}

// =============================================================================
// TESTS
// =============================================================================
