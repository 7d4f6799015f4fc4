//! # Record Store
//!
//! The `RecordStore` trait and its in-memory implementation.
//!
//! A store knows nothing about kinds, payload validation or form codes. It
//! keeps records, one head pointer per lineage, named counters and the
//! equipment table, and it offers exactly one way to add a record:
//! [`RecordStore::commit_head`], a compare-and-swap on the lineage head.

use crate::{
    Equipment, LedgerError, LineageId, RecordId, RecordKind, Version, VersionedRecord,
};
use std::collections::BTreeMap;

// =============================================================================
// HEAD COMMIT
// =============================================================================

/// A new head for a lineage, conditional on the current head.
#[derive(Debug, Clone)]
pub struct HeadCommit {
    /// The record to insert; must have `is_latest == true`.
    pub record: VersionedRecord,
    /// Head the caller read. `None` means the lineage must not exist yet.
    pub expected_head: Option<RecordId>,
}

impl HeadCommit {
    /// Start a new lineage with `record`.
    #[must_use]
    pub fn create(record: VersionedRecord) -> Self {
        Self {
            record,
            expected_head: None,
        }
    }

    /// Replace `previous` as head of its lineage.
    #[must_use]
    pub fn amend(record: VersionedRecord, previous: RecordId) -> Self {
        Self {
            record,
            expected_head: Some(previous),
        }
    }

    /// Checks that hold regardless of stored state.
    pub(crate) fn check_shape(&self) -> Result<(), LedgerError> {
        if !self.record.is_latest {
            return Err(LedgerError::InvariantViolation(format!(
                "record {} committed as head without is_latest",
                self.record.id
            )));
        }
        if self.expected_head.is_none() && self.record.version != Version::INITIAL {
            return Err(LedgerError::InvariantViolation(format!(
                "lineage {} must start at version {}, got {}",
                self.record.lineage,
                Version::INITIAL,
                self.record.version
            )));
        }
        Ok(())
    }

    /// Checks against the previous head, once it has been loaded.
    pub(crate) fn check_successor(&self, previous: &VersionedRecord) -> Result<(), LedgerError> {
        if previous.lineage != self.record.lineage || previous.kind != self.record.kind {
            return Err(LedgerError::InvariantViolation(format!(
                "record {} does not belong to lineage {} of kind {}",
                previous.id, self.record.lineage, self.record.kind
            )));
        }
        if previous.version.next() != self.record.version {
            return Err(LedgerError::InvariantViolation(format!(
                "version {} does not follow {} in lineage {}",
                self.record.version, previous.version, self.record.lineage
            )));
        }
        Ok(())
    }
}

// =============================================================================
// RECORDSTORE TRAIT
// =============================================================================

/// Storage operations shared by the in-memory and redb backends.
///
/// All fallible operations return `Result<T, LedgerError>` so both backends
/// are used uniformly.
pub trait RecordStore {
    /// Increment the named counter and return its new value (first value is 1).
    fn allocate(&mut self, counter: &str) -> Result<u64, LedgerError>;

    /// Current value of the named counter, 0 if never allocated.
    fn counter(&self, counter: &str) -> Result<u64, LedgerError>;

    /// Atomically insert `commit.record` as the new head of its lineage.
    ///
    /// Fails with `ConcurrentUpdate` and writes nothing when the current head
    /// differs from `commit.expected_head`. On success the previous head,
    /// if any, has `is_latest` set to `false`.
    fn commit_head(&mut self, commit: HeadCommit) -> Result<(), LedgerError>;

    /// Any version by id.
    fn get(&self, id: RecordId) -> Result<Option<VersionedRecord>, LedgerError>;

    /// Id of the current head of a lineage.
    fn head(&self, lineage: LineageId) -> Result<Option<RecordId>, LedgerError>;

    /// Every version of a lineage, ordered by version ascending.
    fn history(&self, lineage: LineageId) -> Result<Vec<VersionedRecord>, LedgerError>;

    /// Head records of one kind, ordered by lineage id.
    fn heads_of_kind(&self, kind: &RecordKind) -> Result<Vec<VersionedRecord>, LedgerError>;

    /// All head pointers, ordered by lineage id.
    fn heads(&self) -> Result<Vec<(LineageId, RecordId)>, LedgerError>;

    /// Every stored version, ordered by record id.
    fn records(&self) -> Result<Vec<VersionedRecord>, LedgerError>;

    fn record_count(&self) -> Result<usize, LedgerError>;

    fn lineage_count(&self) -> Result<usize, LedgerError>;

    /// Insert a new equipment item. Fails with `DuplicateEquipment` if the code exists.
    fn insert_equipment(&mut self, equipment: Equipment) -> Result<(), LedgerError>;

    /// Overwrite an existing equipment item. Fails with `EquipmentNotFound` otherwise.
    fn replace_equipment(&mut self, equipment: Equipment) -> Result<(), LedgerError>;

    fn equipment(&self, code: &str) -> Result<Option<Equipment>, LedgerError>;

    /// All equipment ordered by code.
    fn equipment_list(&self) -> Result<Vec<Equipment>, LedgerError>;
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

/// Volatile store backed by `BTreeMap`s.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: BTreeMap<RecordId, VersionedRecord>,
    heads: BTreeMap<LineageId, RecordId>,
    /// Lineage -> version -> record, for ordered history.
    versions: BTreeMap<LineageId, BTreeMap<Version, RecordId>>,
    counters: BTreeMap<String, u64>,
    equipment: BTreeMap<String, Equipment>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn allocate(&mut self, counter: &str) -> Result<u64, LedgerError> {
        let slot = self.counters.entry(counter.to_string()).or_insert(0);
        *slot = slot
            .checked_add(1)
            .ok_or_else(|| LedgerError::Storage(format!("counter '{}' exhausted", counter)))?;
        Ok(*slot)
    }

    fn counter(&self, counter: &str) -> Result<u64, LedgerError> {
        Ok(self.counters.get(counter).copied().unwrap_or(0))
    }

    fn commit_head(&mut self, commit: HeadCommit) -> Result<(), LedgerError> {
        commit.check_shape()?;
        let lineage = commit.record.lineage;
        let actual = self.heads.get(&lineage).copied();
        if actual != commit.expected_head {
            return Err(LedgerError::ConcurrentUpdate {
                lineage,
                expected: commit.expected_head,
                actual,
            });
        }
        if self.records.contains_key(&commit.record.id) {
            return Err(LedgerError::InvariantViolation(format!(
                "record id {} already used",
                commit.record.id
            )));
        }
        if let Some(previous_id) = commit.expected_head {
            let previous = self.records.get(&previous_id).ok_or_else(|| {
                LedgerError::InvariantViolation(format!(
                    "head {} of lineage {} is missing",
                    previous_id, lineage
                ))
            })?;
            commit.check_successor(previous)?;
        }

        // All checks passed; apply.
        if let Some(previous_id) = commit.expected_head
            && let Some(previous) = self.records.get_mut(&previous_id)
        {
            previous.is_latest = false;
        }
        let record = commit.record;
        self.heads.insert(lineage, record.id);
        self.versions
            .entry(lineage)
            .or_default()
            .insert(record.version, record.id);
        self.records.insert(record.id, record);
        Ok(())
    }

    fn get(&self, id: RecordId) -> Result<Option<VersionedRecord>, LedgerError> {
        Ok(self.records.get(&id).cloned())
    }

    fn head(&self, lineage: LineageId) -> Result<Option<RecordId>, LedgerError> {
        Ok(self.heads.get(&lineage).copied())
    }

    fn history(&self, lineage: LineageId) -> Result<Vec<VersionedRecord>, LedgerError> {
        Ok(self
            .versions
            .get(&lineage)
            .map(|by_version| {
                by_version
                    .values()
                    .filter_map(|id| self.records.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn heads_of_kind(&self, kind: &RecordKind) -> Result<Vec<VersionedRecord>, LedgerError> {
        Ok(self
            .heads
            .values()
            .filter_map(|id| self.records.get(id))
            .filter(|r| &r.kind == kind)
            .cloned()
            .collect())
    }

    fn heads(&self) -> Result<Vec<(LineageId, RecordId)>, LedgerError> {
        Ok(self.heads.iter().map(|(l, r)| (*l, *r)).collect())
    }

    fn records(&self) -> Result<Vec<VersionedRecord>, LedgerError> {
        Ok(self.records.values().cloned().collect())
    }

    fn record_count(&self) -> Result<usize, LedgerError> {
        Ok(self.records.len())
    }

    fn lineage_count(&self) -> Result<usize, LedgerError> {
        Ok(self.heads.len())
    }

    fn insert_equipment(&mut self, equipment: Equipment) -> Result<(), LedgerError> {
        if self.equipment.contains_key(&equipment.code) {
            return Err(LedgerError::DuplicateEquipment(equipment.code));
        }
        self.equipment.insert(equipment.code.clone(), equipment);
        Ok(())
    }

    fn replace_equipment(&mut self, equipment: Equipment) -> Result<(), LedgerError> {
        match self.equipment.get_mut(&equipment.code) {
            Some(slot) => {
                *slot = equipment;
                Ok(())
            }
            None => Err(LedgerError::EquipmentNotFound(equipment.code)),
        }
    }

    fn equipment(&self, code: &str) -> Result<Option<Equipment>, LedgerError> {
        Ok(self.equipment.get(code).cloned())
    }

    fn equipment_list(&self) -> Result<Vec<Equipment>, LedgerError> {
        Ok(self.equipment.values().cloned().collect())
    }
}

// =============================================================================
// TESTS
// =============================================================================
