//! Unit tests for API types and the JSON mapping of ledger values.

#![allow(clippy::unwrap_used, clippy::panic)]

use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use stsdesk::api::{
    ErrorResponse, HealthResponse, ListQuery, RecordJson, RecordWriteRequest, ReviewRequest,
    UploadJson, field_to_json, json_to_field, payload_from_json, version_to_json,
};
use stsdesk_core::{
    AttachmentRef, Decision, FieldValue, FormCode, FormStatus, LedgerError, LineageId, RecordDate,
    RecordId, RecordKind, Review, Timestamp, Version, VersionedRecord,
};

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {}", other),
    }
}

// =============================================================================
// FIELD VALUES
// =============================================================================

#[test]
fn test_json_null_clears_field() {
    assert_eq!(json_to_field(&Value::Null), FieldValue::Empty);
    assert_eq!(field_to_json(&FieldValue::Empty), Value::Null);
}

#[test]
fn test_integers_and_decimals_keep_their_shape() {
    assert_eq!(json_to_field(&json!(42)), FieldValue::Integer(42));
    assert_eq!(
        json_to_field(&json!(12.75)),
        FieldValue::Decimal("12.75".to_string())
    );
    assert_eq!(field_to_json(&FieldValue::Decimal("12.75".into())), json!(12.75));
    assert_eq!(field_to_json(&FieldValue::Integer(-3)), json!(-3));
}

#[test]
fn test_decimals_keep_their_source_text() {
    let trailing_zero: Value = serde_json::from_str("12.50").unwrap();
    assert_eq!(
        json_to_field(&trailing_zero),
        FieldValue::Decimal("12.50".to_string())
    );

    let long = "0.12345678901234567890123";
    let value: Value = serde_json::from_str(long).unwrap();
    assert_eq!(json_to_field(&value), FieldValue::Decimal(long.to_string()));
    assert_eq!(serde_json::to_string(&field_to_json(&json_to_field(&value))).unwrap(), long);

    let exponent: Value = serde_json::from_str("1e2").unwrap();
    assert_eq!(
        json_to_field(&exponent),
        FieldValue::Decimal("1e2".to_string())
    );
}

#[test]
fn test_payload_decimals_survive_a_request_body() {
    let request: RecordWriteRequest =
        serde_json::from_str(r#"{"fields": {"draft_m": 11.80, "hoses": 4}}"#).unwrap();
    let payload = request.payload();
    assert_eq!(
        payload.get("draft_m"),
        Some(&FieldValue::Decimal("11.80".to_string()))
    );
    assert_eq!(payload.get("hoses"), Some(&FieldValue::Integer(4)));
}

#[test]
fn test_unparseable_decimal_falls_back_to_text() {
    let value = field_to_json(&FieldValue::Decimal("twelve".into()));
    assert_eq!(value, json!("twelve"));
}

#[test]
fn test_nested_values_convert_recursively() {
    let source = json!({
        "crew": ["master", "chief officer"],
        "weather": { "wind_kn": 14, "sea_state": "slight", "swell": null },
        "approved_by_terminal": true
    });

    let payload = payload_from_json(&object(source.clone()));

    assert_eq!(
        payload.get("crew"),
        Some(&FieldValue::List(vec![
            FieldValue::text("master"),
            FieldValue::text("chief officer"),
        ]))
    );
    match payload.get("weather") {
        Some(FieldValue::Group(group)) => {
            assert_eq!(group.get("wind_kn"), Some(&FieldValue::Integer(14)));
            assert_eq!(group.get("swell"), Some(&FieldValue::Empty));
        }
        other => panic!("expected group, got {:?}", other),
    }
    assert_eq!(
        payload.get("approved_by_terminal"),
        Some(&FieldValue::Flag(true))
    );

    let back: Map<String, Value> = payload
        .iter()
        .map(|(k, v)| (k.clone(), field_to_json(v)))
        .collect();
    assert_eq!(Value::Object(back), source);
}

// =============================================================================
// VERSIONS
// =============================================================================

#[test]
fn test_versions_are_json_numbers() {
    assert_eq!(version_to_json(Version::INITIAL), json!(1.0));
    assert_eq!(version_to_json(Version::from_tenths(11)), json!(1.1));
    assert_eq!(version_to_json(Version::from_tenths(23)), json!(2.3));

    let text = serde_json::to_string(&version_to_json(Version::from_tenths(11))).unwrap();
    assert_eq!(text, "1.1");
}

// =============================================================================
// RECORD JSON
// =============================================================================

fn sample_record() -> VersionedRecord {
    let mut payload = BTreeMap::new();
    payload.insert("location".to_string(), FieldValue::text("Sohar"));
    payload.insert("hoses".to_string(), FieldValue::Integer(5));

    let mut attachments = BTreeMap::new();
    attachments.insert(
        "report".to_string(),
        AttachmentRef {
            original_name: "report.pdf".to_string(),
            stored_path: "ofd-inspection/7/report-abc.pdf".to_string(),
            size: 8,
            content_type: "application/pdf".to_string(),
            digest: "abc".to_string(),
            uploaded_at: Timestamp(1_712_016_000),
        },
    );

    VersionedRecord {
        id: RecordId(9),
        lineage: LineageId(7),
        kind: RecordKind::new("ofd-inspection").unwrap(),
        version: Version::from_tenths(12),
        is_latest: true,
        form_code: Some(FormCode("QAF-OFD-003".to_string())),
        status: FormStatus::Rejected,
        review: Some(Review {
            reviewer: "qa.lead".to_string(),
            decision: Decision::Reject,
            comment: Some("missing photos".to_string()),
            at: Timestamp(1_712_016_000),
        }),
        created_at: Timestamp(1_712_016_000),
        recorded_on: Some(RecordDate {
            year: 2024,
            month: 4,
            day: 2,
        }),
        payload,
        attachments,
    }
}

#[test]
fn test_record_json_shape() {
    let json = serde_json::to_value(RecordJson::from(&sample_record())).unwrap();

    assert_eq!(json["id"], json!(9));
    assert_eq!(json["lineage_id"], json!(7));
    assert_eq!(json["kind"], json!("ofd-inspection"));
    assert_eq!(json["version"], json!(1.2));
    assert_eq!(json["is_latest"], json!(true));
    assert_eq!(json["form_code"], json!("QAF-OFD-003"));
    assert_eq!(json["status"], json!("rejected"));
    assert_eq!(json["review"]["decision"], json!("rejected"));
    assert_eq!(json["review"]["comment"], json!("missing photos"));
    assert_eq!(json["recorded_on"], json!("2024-04-02"));
    assert_eq!(json["created_at"], json!("2024-04-02T00:00:00Z"));
    assert_eq!(json["payload"]["hoses"], json!(5));
    assert_eq!(json["attachments"]["report"]["file_name"], json!("report.pdf"));
}

#[test]
fn test_record_json_hides_stored_path() {
    let text = serde_json::to_string(&RecordJson::from(&sample_record())).unwrap();
    assert!(!text.contains("stored_path"));
    assert!(!text.contains("report-abc.pdf"));
}

// =============================================================================
// REQUESTS
// =============================================================================

#[test]
fn test_write_request_defaults_to_empty() {
    let request: RecordWriteRequest = serde_json::from_str("{}").unwrap();
    assert!(request.payload().is_empty());
    assert!(request.uploads().unwrap().is_empty());
}

#[test]
fn test_upload_decodes_base64() {
    let upload = UploadJson {
        field: "report".to_string(),
        file_name: "report.pdf".to_string(),
        content_base64: "JVBERi0xLjc=".to_string(),
    };
    let decoded = upload.to_upload().unwrap();
    assert_eq!(decoded.bytes, b"%PDF-1.7".to_vec());
    assert_eq!(decoded.field, "report");
}

#[test]
fn test_upload_rejects_invalid_base64() {
    let upload = UploadJson {
        field: "report".to_string(),
        file_name: "report.pdf".to_string(),
        content_base64: "not base64!".to_string(),
    };
    assert!(matches!(
        upload.to_upload(),
        Err(LedgerError::InvalidInput(_))
    ));
}

#[test]
fn test_review_request_comment_is_optional() {
    let request: ReviewRequest =
        serde_json::from_str(r#"{"reviewer":"qa.lead","decision":"approve"}"#).unwrap();
    assert_eq!(request.reviewer, "qa.lead");
    assert!(request.comment.is_none());
}

#[test]
fn test_list_query_builds_filter() {
    let query = ListQuery {
        year: Some(2024),
        month: Some(4),
        status: Some("approved".to_string()),
    };
    assert!(query.to_filter().is_ok());

    // Blank status means no status filter
    let query = ListQuery {
        status: Some("  ".to_string()),
        ..ListQuery::default()
    };
    assert!(query.to_filter().is_ok());
}

#[test]
fn test_list_query_rejects_bad_status_and_month() {
    let bad_status = ListQuery {
        status: Some("archived".to_string()),
        ..ListQuery::default()
    };
    assert!(matches!(
        bad_status.to_filter(),
        Err(LedgerError::InvalidInput(_))
    ));

    let bad_month = ListQuery {
        month: Some(0),
        ..ListQuery::default()
    };
    assert!(bad_month.to_filter().is_err());
}

// =============================================================================
// RESPONSES
// =============================================================================

#[test]
fn test_health_response_default() {
    let health = HealthResponse::default();
    assert_eq!(health.status, "ok");
    assert!(!health.version.is_empty());
}

#[test]
fn test_error_response_serialization() {
    let json = serde_json::to_string(&ErrorResponse::new("Record not found: 4")).unwrap();
    assert!(json.contains("\"success\":false"));
    assert!(json.contains("\"error\":\"Record not found: 4\""));
}
