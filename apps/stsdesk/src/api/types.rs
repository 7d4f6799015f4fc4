//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API and the
//! conversions between JSON values and ledger payload fields.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use stsdesk_core::{
    AttachmentRef, AuditReport, Equipment, EquipmentPatch, FieldValue, FormStatus, KindMetrics,
    Ledger, LedgerError, ListFilter, Payload, Timestamp, Upload, Version, VersionedRecord,
};

// =============================================================================
// FIELD CONVERSION
// =============================================================================

/// JSON value to payload field. `null` becomes `FieldValue::Empty`.
///
/// Numbers arrive as their source text (`arbitrary_precision`), so a
/// decimal is stored exactly as the client wrote it: `12.50` stays `12.50`.
pub fn json_to_field(value: &Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Empty,
        Value::Bool(b) => FieldValue::Flag(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => FieldValue::Integer(i),
            None => FieldValue::Decimal(n.as_str().to_string()),
        },
        Value::String(s) => FieldValue::Text(s.clone()),
        Value::Array(items) => FieldValue::List(items.iter().map(json_to_field).collect()),
        Value::Object(map) => FieldValue::Group(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_field(v)))
                .collect(),
        ),
    }
}

/// Payload field to JSON value.
pub fn field_to_json(field: &FieldValue) -> Value {
    match field {
        FieldValue::Empty => Value::Null,
        FieldValue::Flag(b) => Value::Bool(*b),
        FieldValue::Integer(i) => Value::Number(Number::from(*i)),
        FieldValue::Decimal(s) => s
            .parse::<Number>()
            .map(Value::Number)
            .unwrap_or_else(|_| Value::String(s.clone())),
        FieldValue::Text(s) => Value::String(s.clone()),
        FieldValue::List(items) => Value::Array(items.iter().map(field_to_json).collect()),
        FieldValue::Group(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), field_to_json(v)))
                .collect(),
        ),
    }
}

pub fn payload_from_json(map: &Map<String, Value>) -> Payload {
    map.iter()
        .map(|(k, v)| (k.clone(), json_to_field(v)))
        .collect()
}

pub fn payload_to_json(payload: &Payload) -> Map<String, Value> {
    payload
        .iter()
        .map(|(k, v)| (k.clone(), field_to_json(v)))
        .collect()
}

/// `1.1` as a JSON number, the way clients have always seen versions.
pub fn version_to_json(version: Version) -> Value {
    version
        .to_string()
        .parse::<Number>()
        .map(Value::Number)
        .unwrap_or_else(|_| Value::String(version.to_string()))
}

// =============================================================================
// HEALTH / STATUS RESPONSES
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Ledger status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub records: usize,
    pub lineages: usize,
    pub equipment: usize,
    pub kinds: Vec<String>,
    /// Code the next create of each coded kind will receive.
    pub next_form_codes: BTreeMap<String, String>,
    pub backend: String,
}

impl StatusResponse {
    pub fn from_ledger(ledger: &Ledger) -> Result<Self, LedgerError> {
        let summary = ledger.summary()?;
        let mut kinds = Vec::with_capacity(ledger.kinds().len());
        let mut next_form_codes = BTreeMap::new();
        for (kind, _) in ledger.kinds().iter() {
            if let Some(code) = ledger.next_form_code(kind.as_str())? {
                next_form_codes.insert(kind.to_string(), code.to_string());
            }
            kinds.push(kind.to_string());
        }
        Ok(Self {
            records: summary.records,
            lineages: summary.lineages,
            equipment: summary.equipment,
            kinds,
            next_form_codes,
            backend: if summary.persistent { "redb" } else { "memory" }.to_string(),
        })
    }
}

// =============================================================================
// RECORD JSON
// =============================================================================

/// Attachment metadata as returned to clients. The stored path stays private.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentJson {
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    pub digest: String,
    pub uploaded_at: String,
}

impl From<&AttachmentRef> for AttachmentJson {
    fn from(a: &AttachmentRef) -> Self {
        Self {
            file_name: a.original_name.clone(),
            content_type: a.content_type.clone(),
            size: a.size,
            digest: a.digest.clone(),
            uploaded_at: a.uploaded_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewJson {
    pub reviewer: String,
    pub decision: String,
    pub comment: Option<String>,
    pub at: String,
}

/// One record version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordJson {
    pub id: u64,
    pub lineage_id: u64,
    pub kind: String,
    pub version: Value,
    pub is_latest: bool,
    pub form_code: Option<String>,
    pub status: String,
    pub review: Option<ReviewJson>,
    pub created_at: String,
    pub recorded_on: Option<String>,
    pub payload: Map<String, Value>,
    pub attachments: BTreeMap<String, AttachmentJson>,
}

impl From<&VersionedRecord> for RecordJson {
    fn from(r: &VersionedRecord) -> Self {
        Self {
            id: r.id.0,
            lineage_id: r.lineage.0,
            kind: r.kind.to_string(),
            version: version_to_json(r.version),
            is_latest: r.is_latest,
            form_code: r.form_code.as_ref().map(|c| c.0.clone()),
            status: r.status.as_str().to_string(),
            review: r.review.as_ref().map(|rv| ReviewJson {
                reviewer: rv.reviewer.clone(),
                decision: rv.decision.resulting_status().as_str().to_string(),
                comment: rv.comment.clone(),
                at: rv.at.to_rfc3339(),
            }),
            created_at: r.created_at.to_rfc3339(),
            recorded_on: r.recorded_on.map(|d| d.to_string()),
            payload: payload_to_json(&r.payload),
            attachments: r
                .attachments
                .iter()
                .map(|(field, a)| (field.clone(), AttachmentJson::from(a)))
                .collect(),
        }
    }
}

// =============================================================================
// RECORD REQUESTS
// =============================================================================

/// An attachment carried inside a JSON body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadJson {
    pub field: String,
    pub file_name: String,
    /// Standard base64 of the file bytes.
    pub content_base64: String,
}

impl UploadJson {
    pub fn to_upload(&self) -> Result<Upload, LedgerError> {
        let bytes = STANDARD.decode(self.content_base64.trim()).map_err(|e| {
            LedgerError::InvalidInput(format!("attachment '{}' is not base64: {}", self.field, e))
        })?;
        Ok(Upload::new(self.field.clone(), self.file_name.clone(), bytes))
    }
}

/// Body of create and amend calls.
///
/// On create `fields` is the whole payload; on amend only the changed fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordWriteRequest {
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub attachments: Vec<UploadJson>,
}

impl RecordWriteRequest {
    pub fn payload(&self) -> Payload {
        payload_from_json(&self.fields)
    }

    pub fn uploads(&self) -> Result<Vec<Upload>, LedgerError> {
        self.attachments.iter().map(UploadJson::to_upload).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub reviewer: String,
    /// `approve` or `reject`.
    pub decision: String,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Query string of `GET /records/{kind}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListQuery {
    pub year: Option<i32>,
    pub month: Option<u8>,
    pub status: Option<String>,
}

impl ListQuery {
    pub fn to_filter(&self) -> Result<ListFilter, LedgerError> {
        let mut filter = ListFilter::new();
        if let Some(year) = self.year {
            filter = filter.year(year);
        }
        if let Some(month) = self.month {
            filter = filter.month(month);
        }
        if let Some(status) = self.status.as_deref().filter(|s| !s.trim().is_empty()) {
            filter = filter.status(FormStatus::parse(status)?);
        }
        filter.validate()?;
        Ok(filter)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct YearQuery {
    pub year: Option<i32>,
}

// =============================================================================
// RECORD RESPONSES
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub data: RecordJson,
}

impl RecordResponse {
    pub fn new(record: &VersionedRecord) -> Self {
        Self {
            success: true,
            message: None,
            data: RecordJson::from(record),
        }
    }

    pub fn with_message(record: &VersionedRecord, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(record)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub success: bool,
    pub data: Vec<RecordJson>,
    pub years: Vec<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub lineage_id: u64,
    pub data: Vec<RecordJson>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardResponse {
    pub success: bool,
    pub kind: String,
    pub data: KindMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub clean: bool,
    pub lineages_checked: usize,
    pub records_checked: usize,
    pub violations: Vec<String>,
}

impl From<AuditReport> for VerifyResponse {
    fn from(report: AuditReport) -> Self {
        Self {
            success: true,
            clean: report.is_clean(),
            lineages_checked: report.lineages_checked,
            records_checked: report.records_checked,
            violations: report.violations.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Body of every failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            error: msg.into(),
        }
    }
}

// =============================================================================
// EQUIPMENT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentJson {
    pub code: String,
    pub name: String,
    pub category: String,
    pub location: Option<String>,
    pub quantity: u32,
    pub condition: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl From<&Equipment> for EquipmentJson {
    fn from(e: &Equipment) -> Self {
        Self {
            code: e.code.clone(),
            name: e.name.clone(),
            category: e.category.clone(),
            location: e.location.clone(),
            quantity: e.quantity,
            condition: e.condition.clone(),
            updated_at: Some(e.updated_at.to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentRequest {
    pub code: String,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    pub condition: Option<String>,
}

impl EquipmentRequest {
    pub fn to_equipment(&self) -> Equipment {
        Equipment {
            code: self.code.clone(),
            name: self.name.clone(),
            category: self.category.clone(),
            location: self.location.clone().filter(|l| !l.trim().is_empty()),
            quantity: self.quantity,
            condition: self.condition.clone().filter(|c| !c.trim().is_empty()),
            updated_at: Timestamp(0),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EquipmentPatchRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub condition: Option<String>,
}

impl From<EquipmentPatchRequest> for EquipmentPatch {
    fn from(p: EquipmentPatchRequest) -> Self {
        Self {
            name: p.name,
            category: p.category,
            location: p.location,
            quantity: p.quantity,
            condition: p.condition,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EquipmentQuery {
    pub category: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub data: EquipmentJson,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentListResponse {
    pub success: bool,
    pub data: Vec<EquipmentJson>,
}
