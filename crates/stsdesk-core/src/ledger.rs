//! # Ledger
//!
//! The high-level interface over a record store:
//! - Lineage creation, amendment and review (always append, never rewrite)
//! - Lineage reading and listing
//! - Form code issuing
//! - Equipment registry
//! - Metrics, audit and export
//!
//! ## Storage Backends
//!
//! A ledger runs on either backend:
//! - `InMemory`: `MemoryStore` (fast, volatile)
//! - `Persistent`: `RedbStore` (disk-backed, ACID)
//!
//! ## Head Discipline
//!
//! Every write that adds a version goes through one path: read the head,
//! build the successor, then [`RecordStore::commit_head`] with the head that
//! was read as the expected value. A head that moved in between makes the
//! commit fail with `ConcurrentUpdate`; nothing is written and no sibling
//! version can appear.

use crate::attachments::{AttachmentStore, Upload};
use crate::audit::{AuditReport, audit};
use crate::kinds::{KindRegistry, KindSpec};
use crate::metrics::KindMetrics;
use crate::primitives::{
    LINEAGE_ID_COUNTER, MAX_FIELD_DEPTH, MAX_FIELD_NAME_LENGTH, MAX_FIELD_TEXT_LENGTH,
    MAX_PAYLOAD_FIELDS, MAX_UPLOADS_PER_CALL, RECORD_ID_COUNTER,
};
use crate::query::{ListFilter, Listing};
use crate::sequence;
use crate::storage::RedbStore;
use crate::store::{HeadCommit, MemoryStore, RecordStore};
use crate::{
    AttachmentRef, Decision, Equipment, EquipmentPatch, FieldValue, FormCode, FormStatus,
    LedgerError, LineageId, Payload, RecordDate, RecordId, RecordKind, Review, Timestamp,
    Version, VersionedRecord,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

// =============================================================================
// STORAGE BACKEND
// =============================================================================

/// Storage backend for a Ledger.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory store (fast, volatile).
    InMemory(MemoryStore),
    /// Disk-backed store using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

impl StorageBackend {
    fn store(&self) -> &dyn RecordStore {
        match self {
            Self::InMemory(s) => s,
            Self::Persistent(s) => s,
        }
    }

    fn store_mut(&mut self) -> &mut dyn RecordStore {
        match self {
            Self::InMemory(s) => s,
            Self::Persistent(s) => s,
        }
    }
}

// =============================================================================
// SUMMARY & EXPORT TYPES
// =============================================================================

/// Counts shown by status endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSummary {
    pub records: usize,
    pub lineages: usize,
    pub equipment: usize,
    pub kinds: usize,
    pub persistent: bool,
}

/// One lineage with its full history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineageExport {
    pub lineage: LineageId,
    pub kind: RecordKind,
    /// Ordered by version ascending.
    pub versions: Vec<VersionedRecord>,
}

// =============================================================================
// LEDGER
// =============================================================================

/// Versioned record ledger over a storage backend.
#[derive(Debug, Default)]
pub struct Ledger {
    backend: StorageBackend,
    kinds: KindRegistry,
    attachments: Option<AttachmentStore>,
}

impl Ledger {
    /// In-memory ledger with the built-in kinds and no attachment storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// In-memory ledger accepting `kinds`.
    #[must_use]
    pub fn in_memory(kinds: KindRegistry) -> Self {
        Self {
            backend: StorageBackend::InMemory(MemoryStore::new()),
            kinds,
            attachments: None,
        }
    }

    /// Ledger persisted in a redb database at `path`.
    pub fn with_redb(path: impl AsRef<Path>, kinds: KindRegistry) -> Result<Self, LedgerError> {
        Ok(Self {
            backend: StorageBackend::Persistent(RedbStore::open(path)?),
            kinds,
            attachments: None,
        })
    }

    /// Enable attachment uploads, stored under `store`'s root.
    #[must_use]
    pub fn with_attachments(mut self, store: AttachmentStore) -> Self {
        self.attachments = Some(store);
        self
    }

    #[must_use]
    pub fn kinds(&self) -> &KindRegistry {
        &self.kinds
    }

    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StorageBackend::Persistent(_))
    }

    #[must_use]
    pub fn attachment_root(&self) -> Option<&Path> {
        self.attachments.as_ref().map(AttachmentStore::root)
    }

    // =========================================================================
    // LINEAGE CREATOR
    // =========================================================================

    /// Start a new lineage at version 1.0.
    pub fn create(
        &mut self,
        kind: &str,
        payload: Payload,
        uploads: Vec<Upload>,
    ) -> Result<VersionedRecord, LedgerError> {
        let (kind, spec) = self.kinds.resolve(kind)?;
        let spec = spec.clone();
        validate_payload(&payload)?;
        require_fields(&spec, &payload)?;
        let recorded_on = business_date(&spec, &payload)?;
        self.check_uploads(&uploads)?;

        let store = self.backend.store_mut();
        let lineage = LineageId(store.allocate(LINEAGE_ID_COUNTER)?);
        let id = RecordId(store.allocate(RECORD_ID_COUNTER)?);
        let form_code = match &spec.form_prefix {
            Some(prefix) => Some(sequence::issue(store, prefix)?),
            None => None,
        };

        let now = Timestamp::now();
        let attachments = self.store_uploads(&kind, lineage, Version::INITIAL, &uploads, now)?;
        let record = VersionedRecord {
            id,
            lineage,
            kind,
            version: Version::INITIAL,
            is_latest: true,
            form_code,
            status: FormStatus::Pending,
            review: None,
            created_at: now,
            recorded_on,
            payload,
            attachments: attachments.clone(),
        };
        self.commit(HeadCommit::create(record.clone()), &attachments)?;
        Ok(record)
    }

    // =========================================================================
    // LINEAGE UPDATER
    // =========================================================================

    /// Append a new version to the lineage headed by `id`.
    ///
    /// `changes` overlays the head's payload field by field; a field set to
    /// `FieldValue::Empty` is cleared, not removed. The new version is
    /// `pending` whatever the head's status was. Fails with `NotLatest`
    /// when `id` is an older version.
    pub fn amend(
        &mut self,
        kind: &str,
        id: RecordId,
        changes: Payload,
        uploads: Vec<Upload>,
    ) -> Result<VersionedRecord, LedgerError> {
        let head = self.head_for_write(kind, id)?;
        let spec = self.spec_of(&head.kind)?;
        if changes.is_empty() && uploads.is_empty() {
            return Err(LedgerError::InvalidInput(
                "amendment carries no changes".to_string(),
            ));
        }
        validate_payload(&changes)?;
        self.check_uploads(&uploads)?;

        let mut payload = head.payload.clone();
        payload.extend(changes);
        validate_payload(&payload)?;
        require_fields(&spec, &payload)?;
        let recorded_on = business_date(&spec, &payload)?;

        let id_next = RecordId(self.backend.store_mut().allocate(RECORD_ID_COUNTER)?);
        let version = head.version.next();
        let now = Timestamp::now();
        let stored = self.store_uploads(&head.kind, head.lineage, version, &uploads, now)?;

        let mut attachments = head.attachments.clone();
        attachments.extend(stored.clone());
        let record = VersionedRecord {
            id: id_next,
            version,
            is_latest: true,
            // Changed content needs a fresh review.
            status: FormStatus::Pending,
            review: None,
            created_at: now,
            recorded_on,
            payload,
            attachments,
            ..head
        };
        self.commit(HeadCommit::amend(record.clone(), id), &stored)?;
        Ok(record)
    }

    // =========================================================================
    // REVIEW
    // =========================================================================

    /// Approve or reject the pending head `id`, appending the decision as a
    /// new version.
    pub fn review(
        &mut self,
        kind: &str,
        id: RecordId,
        reviewer: &str,
        decision: Decision,
        comment: Option<String>,
    ) -> Result<VersionedRecord, LedgerError> {
        let reviewer = reviewer.trim();
        if reviewer.is_empty() || reviewer.len() > MAX_FIELD_NAME_LENGTH {
            return Err(LedgerError::InvalidInput(format!(
                "reviewer must be 1..={} characters",
                MAX_FIELD_NAME_LENGTH
            )));
        }
        if comment.as_ref().is_some_and(|c| c.len() > MAX_FIELD_TEXT_LENGTH) {
            return Err(LedgerError::InvalidInput("review comment too long".to_string()));
        }
        let head = self.head_for_write(kind, id)?;
        if head.status != FormStatus::Pending {
            return Err(LedgerError::InvalidTransition {
                action: "review",
                status: head.status,
            });
        }

        let id_next = RecordId(self.backend.store_mut().allocate(RECORD_ID_COUNTER)?);
        let now = Timestamp::now();
        let record = VersionedRecord {
            id: id_next,
            version: head.version.next(),
            is_latest: true,
            status: decision.resulting_status(),
            review: Some(Review {
                reviewer: reviewer.to_string(),
                decision,
                comment: comment.filter(|c| !c.trim().is_empty()),
                at: now,
            }),
            created_at: now,
            ..head
        };
        self.commit(HeadCommit::amend(record.clone(), id), &BTreeMap::new())?;
        Ok(record)
    }

    // =========================================================================
    // LINEAGE READER
    // =========================================================================

    /// Any version by id.
    pub fn get(&self, id: RecordId) -> Result<VersionedRecord, LedgerError> {
        self.backend
            .store()
            .get(id)?
            .ok_or(LedgerError::RecordNotFound(id))
    }

    /// Any version by id, if it belongs to `kind`.
    pub fn get_of_kind(&self, kind: &str, id: RecordId) -> Result<VersionedRecord, LedgerError> {
        let (kind, _) = self.kinds.resolve(kind)?;
        let record = self.get(id)?;
        if record.kind != kind {
            return Err(LedgerError::RecordNotFound(id));
        }
        Ok(record)
    }

    /// Current head of a lineage.
    pub fn head(&self, lineage: LineageId) -> Result<VersionedRecord, LedgerError> {
        let id = self
            .backend
            .store()
            .head(lineage)?
            .ok_or(LedgerError::LineageNotFound(lineage))?;
        self.get(id)
    }

    /// All versions of a lineage, oldest first.
    pub fn history(&self, lineage: LineageId) -> Result<Vec<VersionedRecord>, LedgerError> {
        let history = self.backend.store().history(lineage)?;
        if history.is_empty() {
            return Err(LedgerError::LineageNotFound(lineage));
        }
        Ok(history)
    }

    /// Heads of `kind` passing `filter`, with the year menu.
    pub fn list(&self, kind: &str, filter: &ListFilter) -> Result<Listing, LedgerError> {
        filter.validate()?;
        let (kind, _) = self.kinds.resolve(kind)?;
        let heads = self.backend.store().heads_of_kind(&kind)?;
        Ok(Listing::build(heads, filter))
    }

    /// An attachment of record `id` and its bytes.
    pub fn attachment(
        &self,
        kind: &str,
        id: RecordId,
        field: &str,
    ) -> Result<(AttachmentRef, Vec<u8>), LedgerError> {
        let record = self.get_of_kind(kind, id)?;
        let not_found = || LedgerError::AttachmentNotFound {
            record: id,
            field: field.to_string(),
        };
        let attachment = record.attachments.get(field).cloned().ok_or_else(not_found)?;
        let store = self.attachments.as_ref().ok_or_else(not_found)?;
        let bytes = store.read(&attachment)?.ok_or_else(not_found)?;
        Ok((attachment, bytes))
    }

    // =========================================================================
    // FORM CODES
    // =========================================================================

    /// The form code the next create of `kind` will receive, if the kind has codes.
    pub fn next_form_code(&self, kind: &str) -> Result<Option<FormCode>, LedgerError> {
        let (_, spec) = self.kinds.resolve(kind)?;
        match &spec.form_prefix {
            Some(prefix) => Ok(Some(sequence::peek(self.backend.store(), prefix)?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // EQUIPMENT
    // =========================================================================

    /// Register a new equipment item; the code must be unused.
    pub fn add_equipment(&mut self, mut equipment: Equipment) -> Result<Equipment, LedgerError> {
        equipment.code = equipment.code.trim().to_string();
        equipment.name = equipment.name.trim().to_string();
        equipment.category = equipment.category.trim().to_string();
        if equipment.code.is_empty() || equipment.code.len() > MAX_FIELD_NAME_LENGTH {
            return Err(LedgerError::InvalidInput(format!(
                "equipment code must be 1..={} characters",
                MAX_FIELD_NAME_LENGTH
            )));
        }
        if equipment.name.is_empty() || equipment.category.is_empty() {
            return Err(LedgerError::InvalidInput(
                "equipment name and category are required".to_string(),
            ));
        }
        equipment.updated_at = Timestamp::now();
        self.backend
            .store_mut()
            .insert_equipment(equipment.clone())?;
        Ok(equipment)
    }

    /// Apply `patch` to the item `code`. The code itself never changes.
    pub fn update_equipment(
        &mut self,
        code: &str,
        patch: EquipmentPatch,
    ) -> Result<Equipment, LedgerError> {
        let mut item = self.equipment(code)?;
        if let Some(name) = patch.name {
            if name.trim().is_empty() {
                return Err(LedgerError::InvalidInput("equipment name is required".into()));
            }
            item.name = name.trim().to_string();
        }
        if let Some(category) = patch.category {
            if category.trim().is_empty() {
                return Err(LedgerError::InvalidInput(
                    "equipment category is required".into(),
                ));
            }
            item.category = category.trim().to_string();
        }
        if let Some(location) = patch.location {
            item.location = Some(location).filter(|l| !l.trim().is_empty());
        }
        if let Some(quantity) = patch.quantity {
            item.quantity = quantity;
        }
        if let Some(condition) = patch.condition {
            item.condition = Some(condition).filter(|c| !c.trim().is_empty());
        }
        item.updated_at = Timestamp::now();
        self.backend.store_mut().replace_equipment(item.clone())?;
        Ok(item)
    }

    pub fn equipment(&self, code: &str) -> Result<Equipment, LedgerError> {
        self.backend
            .store()
            .equipment(code.trim())?
            .ok_or_else(|| LedgerError::EquipmentNotFound(code.to_string()))
    }

    /// Equipment ordered by code, optionally filtered (case-insensitive).
    pub fn list_equipment(
        &self,
        category: Option<&str>,
        location: Option<&str>,
    ) -> Result<Vec<Equipment>, LedgerError> {
        let eq = |a: &str, b: &str| a.trim().eq_ignore_ascii_case(b.trim());
        Ok(self
            .backend
            .store()
            .equipment_list()?
            .into_iter()
            .filter(|e| category.is_none_or(|c| eq(&e.category, c)))
            .filter(|e| {
                location.is_none_or(|l| e.location.as_deref().is_some_and(|el| eq(el, l)))
            })
            .collect())
    }

    // =========================================================================
    // METRICS, AUDIT, EXPORT
    // =========================================================================

    /// Dashboard metrics for `kind`; `year` selects the quarterly buckets.
    pub fn metrics(&self, kind: &str, year: Option<i32>) -> Result<KindMetrics, LedgerError> {
        let (kind, spec) = self.kinds.resolve(kind)?;
        let store = self.backend.store();
        let heads = store.heads_of_kind(&kind)?;
        let mut versions = 0usize;
        for head in &heads {
            // Versions run 1.0, 1.1, ... so the head's tenths give the count.
            versions = versions.saturating_add(
                head.version
                    .tenths()
                    .saturating_sub(Version::INITIAL.tenths()) as usize
                    + 1,
            );
        }
        Ok(KindMetrics::compute(
            &heads,
            versions,
            spec.location_field.as_deref(),
            year,
        ))
    }

    /// Check every lineage invariant over the whole store.
    pub fn verify(&self) -> Result<AuditReport, LedgerError> {
        audit(self.backend.store())
    }

    /// Every lineage with its full history, ordered by lineage id.
    pub fn export_lineages(&self) -> Result<Vec<LineageExport>, LedgerError> {
        let mut grouped: BTreeMap<LineageId, Vec<VersionedRecord>> = BTreeMap::new();
        for record in self.backend.store().records()? {
            grouped.entry(record.lineage).or_default().push(record);
        }
        Ok(grouped
            .into_iter()
            .filter_map(|(lineage, mut versions)| {
                versions.sort_by_key(|r| r.version);
                let kind = versions.first()?.kind.clone();
                Some(LineageExport {
                    lineage,
                    kind,
                    versions,
                })
            })
            .collect())
    }

    /// All equipment ordered by code.
    pub fn export_equipment(&self) -> Result<Vec<Equipment>, LedgerError> {
        self.backend.store().equipment_list()
    }

    pub fn summary(&self) -> Result<LedgerSummary, LedgerError> {
        let store = self.backend.store();
        Ok(LedgerSummary {
            records: store.record_count()?,
            lineages: store.lineage_count()?,
            equipment: store.equipment_list()?.len(),
            kinds: self.kinds.len(),
            persistent: self.is_persistent(),
        })
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn spec_of(&self, kind: &RecordKind) -> Result<KindSpec, LedgerError> {
        self.kinds
            .get(kind)
            .cloned()
            .ok_or_else(|| LedgerError::UnknownKind(kind.to_string()))
    }

    /// Load `id` for a write: it must exist, belong to `kind` and be the head.
    fn head_for_write(&self, kind: &str, id: RecordId) -> Result<VersionedRecord, LedgerError> {
        let record = self.get_of_kind(kind, id)?;
        if !record.is_latest {
            return Err(LedgerError::NotLatest {
                record: id,
                lineage: record.lineage,
                version: record.version,
            });
        }
        Ok(record)
    }

    fn check_uploads(&self, uploads: &[Upload]) -> Result<(), LedgerError> {
        if uploads.is_empty() {
            return Ok(());
        }
        if self.attachments.is_none() {
            return Err(LedgerError::InvalidInput(
                "attachments are not enabled on this ledger".to_string(),
            ));
        }
        if uploads.len() > MAX_UPLOADS_PER_CALL {
            return Err(LedgerError::InvalidInput(format!(
                "at most {} attachments per call",
                MAX_UPLOADS_PER_CALL
            )));
        }
        let mut seen = BTreeSet::new();
        for upload in uploads {
            upload.validate()?;
            if !seen.insert(upload.field.as_str()) {
                return Err(LedgerError::InvalidInput(format!(
                    "attachment field '{}' given twice",
                    upload.field
                )));
            }
        }
        Ok(())
    }

    /// Write uploads to disk. On failure, files already written are removed.
    fn store_uploads(
        &self,
        kind: &RecordKind,
        lineage: LineageId,
        version: Version,
        uploads: &[Upload],
        at: Timestamp,
    ) -> Result<BTreeMap<String, AttachmentRef>, LedgerError> {
        let mut stored = BTreeMap::new();
        let Some(store) = &self.attachments else {
            return Ok(stored);
        };
        for upload in uploads {
            match store.save(kind, lineage, version, upload, at) {
                Ok(attachment) => {
                    stored.insert(upload.field.clone(), attachment);
                }
                Err(e) => {
                    self.discard(&stored);
                    return Err(e);
                }
            }
        }
        Ok(stored)
    }

    /// Commit a head; if it fails, files written for it are removed.
    fn commit(
        &mut self,
        commit: HeadCommit,
        written: &BTreeMap<String, AttachmentRef>,
    ) -> Result<(), LedgerError> {
        match self.backend.store_mut().commit_head(commit) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.discard(written);
                Err(e)
            }
        }
    }

    fn discard(&self, written: &BTreeMap<String, AttachmentRef>) {
        if let Some(store) = &self.attachments {
            for attachment in written.values() {
                // Best effort: the original error is what the caller needs.
                let _ = store.remove(attachment);
            }
        }
    }
}

// =============================================================================
// VALIDATION HELPERS
// =============================================================================

fn validate_payload(payload: &Payload) -> Result<(), LedgerError> {
    if payload.len() > MAX_PAYLOAD_FIELDS {
        return Err(LedgerError::InvalidInput(format!(
            "payload has {} fields, limit is {}",
            payload.len(),
            MAX_PAYLOAD_FIELDS
        )));
    }
    for (name, value) in payload {
        if name.trim().is_empty() || name.len() > MAX_FIELD_NAME_LENGTH {
            return Err(LedgerError::InvalidInput(format!(
                "field name must be 1..={} characters",
                MAX_FIELD_NAME_LENGTH
            )));
        }
        if value.text_len() > MAX_FIELD_TEXT_LENGTH {
            return Err(LedgerError::InvalidInput(format!(
                "field '{}' exceeds {} bytes",
                name, MAX_FIELD_TEXT_LENGTH
            )));
        }
        if value.depth() > MAX_FIELD_DEPTH {
            return Err(LedgerError::InvalidInput(format!(
                "field '{}' nests deeper than {}",
                name, MAX_FIELD_DEPTH
            )));
        }
    }
    Ok(())
}

fn require_fields(spec: &KindSpec, payload: &Payload) -> Result<(), LedgerError> {
    let missing = spec.missing_fields(payload);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(LedgerError::InvalidInput(format!(
            "missing required fields: {}",
            missing.join(", ")
        )))
    }
}

fn business_date(spec: &KindSpec, payload: &Payload) -> Result<Option<RecordDate>, LedgerError> {
    let Some(field) = spec.date_field.as_deref() else {
        return Ok(None);
    };
    match payload.get(field) {
        Some(FieldValue::Text(text)) if !text.trim().is_empty() => {
            RecordDate::parse(text).map(Some)
        }
        Some(FieldValue::Text(_) | FieldValue::Empty) | None => Ok(None),
        Some(_) => Err(LedgerError::InvalidInput(format!(
            "field '{}' must be a date string",
            field
        ))),
    }
}

// =============================================================================
// TESTS
// =============================================================================
