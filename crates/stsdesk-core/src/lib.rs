//! # stsdesk-core
//!
//! The versioned record ledger for stsdesk - THE LOGIC.
//!
//! This crate holds every operations form (STS operations, POAC
//! cross-competency evaluations, OFD inspections, drill reports) as an
//! append-only chain of versions. A chain is a *lineage*; its newest
//! member is the *head*.
//!
//! ## Ledger Rules
//!
//! - A record is never rewritten; an edit appends a successor version
//! - Versions start at 1.0 and step by 0.1
//! - Each lineage has exactly one head, moved by compare-and-swap
//! - Form codes (`QAF-OFD-003`) come from counters that never hand out a
//!   number twice
//!
//! ## Architectural Constraints
//!
//! - Has NO async, NO network dependencies (pure Rust)
//! - No floating point: versions are integer tenths
//! - Every failure is a [`LedgerError`]; nothing panics

// =============================================================================
// MODULES
// =============================================================================

pub mod attachments;
pub mod audit;
pub mod kinds;
pub mod ledger;
pub mod metrics;
pub mod primitives;
pub mod query;
pub mod sequence;
pub mod storage;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    AttachmentRef, Decision, Equipment, EquipmentPatch, FieldValue, FormCode, FormStatus,
    LedgerError, LineageId, Payload, RecordDate, RecordId, RecordKind, Review, Timestamp, Version,
    VersionedRecord,
};

// =============================================================================
// RE-EXPORTS: Ledger
// =============================================================================

pub use attachments::{AttachmentStore, Upload};
pub use audit::{AuditReport, Violation, audit};
pub use kinds::{KindRegistry, KindSpec};
pub use ledger::{Ledger, LedgerSummary, LineageExport, StorageBackend};
pub use metrics::KindMetrics;
pub use query::{ListFilter, Listing};
pub use storage::RedbStore;
pub use store::{HeadCommit, MemoryStore, RecordStore};
