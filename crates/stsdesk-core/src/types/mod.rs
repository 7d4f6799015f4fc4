//! # Core Type Definitions
//!
//! This module contains all core types for the stsdesk ledger:
//! - Identifiers (`RecordId`, `LineageId`, `RecordKind`, `FormCode`)
//! - Versioning (`Version`, stored as integer tenths)
//! - Time (`Timestamp`, `RecordDate`)
//! - Records (`VersionedRecord`, `FormStatus`, `Review`, `AttachmentRef`)
//! - Reference data (`Equipment`)
//! - Error types (`LedgerError`)
//!
//! ## Arithmetic Guarantees
//!
//! No type in this module uses floating point. A version of `1.3` is the
//! integer `13`; its decimal form only exists at the display boundary.

mod field;

pub use field::{FieldValue, Payload};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::primitives::MAX_KIND_LENGTH;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identifier of one stored version. Never reused, never stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u64);

/// Identifier shared by every version of one logical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineageId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LineageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Form type slug, e.g. `sts-operation` or `ofd-inspection`.
///
/// Lowercase ASCII letters, digits and `-` only, so it can be used
/// verbatim as a URL segment and as a directory name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKind(String);

impl RecordKind {
    /// Validate and wrap a kind slug.
    pub fn new(slug: impl Into<String>) -> Result<Self, LedgerError> {
        let slug = slug.into();
        if slug.is_empty() || slug.len() > MAX_KIND_LENGTH {
            return Err(LedgerError::InvalidInput(format!(
                "record kind must be 1..={} characters",
                MAX_KIND_LENGTH
            )));
        }
        let valid = slug
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
        if !valid || slug.starts_with('-') || slug.ends_with('-') {
            return Err(LedgerError::InvalidInput(format!(
                "record kind '{}' must be a lowercase slug",
                slug
            )));
        }
        Ok(Self(slug))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Human-readable sequential code such as `QAF-OFD-003`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FormCode(pub String);

impl FormCode {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FormCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// VERSION
// =============================================================================

/// Record version with exactly one fractional digit.
///
/// Stored as tenths: `Version::INITIAL` is `1.0` (10), each amendment adds
/// one tenth. `0.9 + 0.1` style drift cannot happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u32);

impl Version {
    /// Version of the first record in every lineage.
    pub const INITIAL: Self = Self(10);

    #[must_use]
    pub const fn from_tenths(tenths: u32) -> Self {
        Self(tenths)
    }

    #[must_use]
    pub const fn tenths(self) -> u32 {
        self.0
    }

    /// The version an amendment of `self` receives.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}

// =============================================================================
// TIME
// =============================================================================

/// Seconds since the Unix epoch, UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    #[must_use]
    pub fn now() -> Self {
        Self(time::OffsetDateTime::now_utc().unix_timestamp())
    }

    /// Calendar date of this instant in UTC.
    #[must_use]
    pub fn date(self) -> Option<RecordDate> {
        let at = time::OffsetDateTime::from_unix_timestamp(self.0).ok()?;
        Some(RecordDate::from(at.date()))
    }

    /// RFC 3339 rendering, falling back to the raw seconds.
    #[must_use]
    pub fn to_rfc3339(self) -> String {
        time::OffsetDateTime::from_unix_timestamp(self.0)
            .ok()
            .and_then(|at| {
                at.format(&time::format_description::well_known::Rfc3339)
                    .ok()
            })
            .unwrap_or_else(|| self.0.to_string())
    }
}

/// Business date of a record (operation date, evaluation date, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordDate {
    pub year: i32,
    pub month: u8,
    pub day: u8,
}

impl RecordDate {
    /// Parse `YYYY-MM-DD`, or a full RFC 3339 timestamp whose own
    /// calendar date is taken.
    pub fn parse(text: &str) -> Result<Self, LedgerError> {
        let trimmed = text.trim();
        let format = time::macros::format_description!("[year]-[month]-[day]");
        time::Date::parse(trimmed, &format)
            .or_else(|_| {
                time::OffsetDateTime::parse(
                    trimmed,
                    &time::format_description::well_known::Rfc3339,
                )
                .map(|at| at.date())
            })
            .map(Self::from)
            .map_err(|e| LedgerError::InvalidInput(format!("invalid date '{}': {}", text, e)))
    }

    /// Quarter of the year, 1 to 4.
    #[must_use]
    pub fn quarter(&self) -> u8 {
        (self.month.saturating_sub(1)) / 3 + 1
    }
}

impl From<time::Date> for RecordDate {
    fn from(date: time::Date) -> Self {
        Self {
            year: date.year(),
            month: u8::from(date.month()),
            day: date.day(),
        }
    }
}

impl fmt::Display for RecordDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

// =============================================================================
// STATUS & REVIEW
// =============================================================================

/// Approval state of a form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FormStatus {
    Pending,
    Approved,
    Rejected,
}

impl FormStatus {
    pub const ALL: [Self; 3] = [Self::Pending, Self::Approved, Self::Rejected];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(text: &str) -> Result<Self, LedgerError> {
        match text.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(LedgerError::InvalidInput(format!(
                "unknown status '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for FormStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    /// Status a pending record moves to under this decision.
    #[must_use]
    pub fn resulting_status(self) -> FormStatus {
        match self {
            Self::Approve => FormStatus::Approved,
            Self::Reject => FormStatus::Rejected,
        }
    }

    pub fn parse(text: &str) -> Result<Self, LedgerError> {
        match text.trim().to_ascii_lowercase().as_str() {
            "approve" | "approved" => Ok(Self::Approve),
            "reject" | "rejected" => Ok(Self::Reject),
            other => Err(LedgerError::InvalidInput(format!(
                "unknown decision '{}'",
                other
            ))),
        }
    }
}

/// The review that produced a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub reviewer: String,
    pub decision: Decision,
    pub comment: Option<String>,
    pub at: Timestamp,
}

// =============================================================================
// ATTACHMENTS
// =============================================================================

/// A file stored alongside a record version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// Original filename as uploaded.
    pub original_name: String,
    /// Path relative to the attachment root, `/`-separated.
    pub stored_path: String,
    pub size: u64,
    pub content_type: String,
    /// BLAKE3 hex digest of the stored bytes.
    pub digest: String,
    pub uploaded_at: Timestamp,
}

// =============================================================================
// VERSIONED RECORD
// =============================================================================

/// One immutable version of a business record.
///
/// Only `is_latest` ever changes after insertion, and only from `true`
/// to `false` when a newer version is committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedRecord {
    pub id: RecordId,
    pub lineage: LineageId,
    pub kind: RecordKind,
    pub version: Version,
    pub is_latest: bool,
    pub form_code: Option<FormCode>,
    pub status: FormStatus,
    pub review: Option<Review>,
    pub created_at: Timestamp,
    pub recorded_on: Option<RecordDate>,
    pub payload: Payload,
    pub attachments: BTreeMap<String, AttachmentRef>,
}

impl VersionedRecord {
    /// Business date, or the creation date when the form carries none.
    #[must_use]
    pub fn effective_date(&self) -> Option<RecordDate> {
        self.recorded_on.or_else(|| self.created_at.date())
    }

    /// Text of a payload field, if present and textual.
    #[must_use]
    pub fn text_field(&self, name: &str) -> Option<&str> {
        self.payload.get(name).and_then(FieldValue::as_text)
    }
}

// =============================================================================
// EQUIPMENT (PMS REFERENCE DATA)
// =============================================================================

/// Planned-maintenance equipment item, unique by `code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    pub code: String,
    pub name: String,
    pub category: String,
    pub location: Option<String>,
    pub quantity: u32,
    pub condition: Option<String>,
    pub updated_at: Timestamp,
}

/// Changes to an equipment item. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EquipmentPatch {
    pub name: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub quantity: Option<u32>,
    pub condition: Option<String>,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the ledger.
///
/// The ledger never panics; every failure is one of these.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Input failed validation (missing field, bad extension, oversize, ...).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown record kind: {0}")]
    UnknownKind(String),

    #[error("Record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("Lineage not found: {0}")]
    LineageNotFound(LineageId),

    #[error("Equipment not found: {0}")]
    EquipmentNotFound(String),

    #[error("Attachment '{field}' not found on record {record}")]
    AttachmentNotFound { record: RecordId, field: String },

    /// The addressed record is not the head of its lineage.
    #[error("Record {record} is version {version}, not the latest of lineage {lineage}")]
    NotLatest {
        record: RecordId,
        lineage: LineageId,
        version: Version,
    },

    /// A state transition that the form lifecycle forbids.
    #[error("Cannot {action} a record in status {status}")]
    InvalidTransition {
        action: &'static str,
        status: FormStatus,
    },

    /// The lineage head moved between read and commit.
    #[error("Lineage {lineage} head moved: expected {expected:?}, found {actual:?}")]
    ConcurrentUpdate {
        lineage: LineageId,
        expected: Option<RecordId>,
        actual: Option<RecordId>,
    },

    #[error("Equipment code already exists: {0}")]
    DuplicateEquipment(String),

    /// Stored data breaks a ledger invariant.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_steps_by_one_tenth() {
        let v = Version::INITIAL;
        assert_eq!(v.to_string(), "1.0");
        assert_eq!(v.next().to_string(), "1.1");
        let mut tenth = v;
        for _ in 0..10 {
            tenth = tenth.next();
        }
        assert_eq!(tenth.to_string(), "2.0");
    }

    #[test]
    fn record_kind_rejects_non_slugs() {
        assert!(RecordKind::new("sts-operation").is_ok());
        assert!(RecordKind::new("").is_err());
        assert!(RecordKind::new("STS").is_err());
        assert!(RecordKind::new("../etc").is_err());
        assert!(RecordKind::new("-lead").is_err());
    }

    #[test]
    fn record_date_parses_plain_and_rfc3339() {
        let d = RecordDate::parse("2024-05-17").expect("date");
        assert_eq!((d.year, d.month, d.day), (2024, 5, 17));
        assert_eq!(d.quarter(), 2);

        let t = RecordDate::parse("2023-11-02T08:30:00Z").expect("datetime");
        assert_eq!((t.year, t.month), (2023, 11));
        assert_eq!(t.quarter(), 4);

        assert!(RecordDate::parse("17/05/2024").is_err());
        assert!(RecordDate::parse("2024-05-17garbage").is_err());
        assert!(RecordDate::parse("2024-05-17T25:00:00Z").is_err());
    }

    #[test]
    fn timestamp_date_is_utc() {
        // 2021-01-01T00:00:00Z
        let d = Timestamp(1_609_459_200).date().expect("date");
        assert_eq!(d.to_string(), "2021-01-01");
        assert_eq!(Timestamp(1_609_459_200).to_rfc3339(), "2021-01-01T00:00:00Z");
    }

    #[test]
    fn status_and_decision_parsing() {
        assert_eq!(FormStatus::parse("Approved").expect("status"), FormStatus::Approved);
        assert!(FormStatus::parse("archived").is_err());
        assert_eq!(
            Decision::parse("reject").expect("decision").resulting_status(),
            FormStatus::Rejected
        );
    }
}
