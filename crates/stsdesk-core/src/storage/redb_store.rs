//! # redb-backed Record Storage
//!
//! A disk-backed record store using the redb embedded database, providing:
//! - ACID transactions (one write transaction per operation)
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! The single-writer model is what makes the head compare-and-swap safe:
//! the head is read, compared and replaced inside one write transaction, so
//! two amendments of the same lineage cannot both succeed.

use crate::store::{HeadCommit, RecordStore};
use crate::{Equipment, LedgerError, LineageId, RecordId, RecordKind, VersionedRecord};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use serde::{Serialize, de::DeserializeOwned};
use std::path::Path;

/// Table for records: RecordId(u64) -> postcard-encoded VersionedRecord
const RECORDS: TableDefinition<u64, &[u8]> = TableDefinition::new("records");

/// Table for lineage heads: LineageId(u64) -> RecordId(u64)
const HEADS: TableDefinition<u64, u64> = TableDefinition::new("heads");

/// Table for ordered history: (LineageId, version tenths) -> RecordId
const LINEAGE_VERSIONS: TableDefinition<(u64, u32), u64> =
    TableDefinition::new("lineage_versions");

/// Table for per-kind listing: (kind slug, LineageId) -> head RecordId
const KIND_HEADS: TableDefinition<(&str, u64), u64> = TableDefinition::new("kind_heads");

/// Table for named counters: name -> last issued value
const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

/// Table for equipment: code -> postcard-encoded Equipment
const EQUIPMENT: TableDefinition<&str, &[u8]> = TableDefinition::new("equipment");

fn db_err(e: impl std::fmt::Display) -> LedgerError {
    LedgerError::Storage(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, LedgerError> {
    postcard::to_allocvec(value).map_err(|e| LedgerError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, LedgerError> {
    postcard::from_bytes(bytes).map_err(|e| LedgerError::Serialization(e.to_string()))
}

/// A disk-backed record store using redb.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a ledger database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let db = Database::create(path.as_ref()).map_err(|e| LedgerError::Io(e.to_string()))?;

        // Create every table up front so read transactions never miss one.
        let write_txn = db.begin_write().map_err(db_err)?;
        write_txn.open_table(RECORDS).map_err(db_err)?;
        write_txn.open_table(HEADS).map_err(db_err)?;
        write_txn.open_table(LINEAGE_VERSIONS).map_err(db_err)?;
        write_txn.open_table(KIND_HEADS).map_err(db_err)?;
        write_txn.open_table(COUNTERS).map_err(db_err)?;
        write_txn.open_table(EQUIPMENT).map_err(db_err)?;
        write_txn.commit().map_err(db_err)?;

        Ok(Self { db })
    }

    /// Run `apply` inside a write transaction; commit on `Ok`, abort on `Err`.
    fn write<T>(
        &self,
        apply: impl FnOnce(&WriteTransaction) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let write_txn = self.db.begin_write().map_err(db_err)?;
        match apply(&write_txn) {
            Ok(value) => {
                write_txn.commit().map_err(db_err)?;
                Ok(value)
            }
            Err(e) => {
                write_txn.abort().map_err(db_err)?;
                Err(e)
            }
        }
    }
}

// =============================================================================
// RECORDSTORE TRAIT IMPLEMENTATION
// =============================================================================

impl RecordStore for RedbStore {
    fn allocate(&mut self, counter: &str) -> Result<u64, LedgerError> {
        self.write(|txn| {
            let mut counters = txn.open_table(COUNTERS).map_err(db_err)?;
            let current = counters
                .get(counter)
                .map_err(db_err)?
                .map(|v| v.value())
                .unwrap_or(0);
            let next = current
                .checked_add(1)
                .ok_or_else(|| LedgerError::Storage(format!("counter '{}' exhausted", counter)))?;
            counters.insert(counter, next).map_err(db_err)?;
            Ok(next)
        })
    }

    fn counter(&self, counter: &str) -> Result<u64, LedgerError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let counters = read_txn.open_table(COUNTERS).map_err(db_err)?;
        Ok(counters
            .get(counter)
            .map_err(db_err)?
            .map(|v| v.value())
            .unwrap_or(0))
    }

    fn commit_head(&mut self, commit: HeadCommit) -> Result<(), LedgerError> {
        commit.check_shape()?;
        self.write(|txn| {
            let mut records = txn.open_table(RECORDS).map_err(db_err)?;
            let mut heads = txn.open_table(HEADS).map_err(db_err)?;
            let mut versions = txn.open_table(LINEAGE_VERSIONS).map_err(db_err)?;
            let mut kind_heads = txn.open_table(KIND_HEADS).map_err(db_err)?;

            let record = &commit.record;
            let lineage = record.lineage;

            // Compare.
            let actual = heads
                .get(lineage.0)
                .map_err(db_err)?
                .map(|v| RecordId(v.value()));
            if actual != commit.expected_head {
                return Err(LedgerError::ConcurrentUpdate {
                    lineage,
                    expected: commit.expected_head,
                    actual,
                });
            }
            if records.get(record.id.0).map_err(db_err)?.is_some() {
                return Err(LedgerError::InvariantViolation(format!(
                    "record id {} already used",
                    record.id
                )));
            }

            // Swap: retire the previous head, then insert the new one.
            if let Some(previous_id) = commit.expected_head {
                let mut previous: VersionedRecord = records
                    .get(previous_id.0)
                    .map_err(db_err)?
                    .map(|v| decode(v.value()))
                    .transpose()?
                    .ok_or_else(|| {
                        LedgerError::InvariantViolation(format!(
                            "head {} of lineage {} is missing",
                            previous_id, lineage
                        ))
                    })?;
                commit.check_successor(&previous)?;
                previous.is_latest = false;
                records
                    .insert(previous_id.0, encode(&previous)?.as_slice())
                    .map_err(db_err)?;
            }

            records
                .insert(record.id.0, encode(record)?.as_slice())
                .map_err(db_err)?;
            heads.insert(lineage.0, record.id.0).map_err(db_err)?;
            versions
                .insert((lineage.0, record.version.tenths()), record.id.0)
                .map_err(db_err)?;
            kind_heads
                .insert((record.kind.as_str(), lineage.0), record.id.0)
                .map_err(db_err)?;
            Ok(())
        })
    }

    fn get(&self, id: RecordId) -> Result<Option<VersionedRecord>, LedgerError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let records = read_txn.open_table(RECORDS).map_err(db_err)?;
        records
            .get(id.0)
            .map_err(db_err)?
            .map(|v| decode(v.value()))
            .transpose()
    }

    fn head(&self, lineage: LineageId) -> Result<Option<RecordId>, LedgerError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let heads = read_txn.open_table(HEADS).map_err(db_err)?;
        Ok(heads
            .get(lineage.0)
            .map_err(db_err)?
            .map(|v| RecordId(v.value())))
    }

    fn history(&self, lineage: LineageId) -> Result<Vec<VersionedRecord>, LedgerError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let versions = read_txn.open_table(LINEAGE_VERSIONS).map_err(db_err)?;
        let records = read_txn.open_table(RECORDS).map_err(db_err)?;

        let mut history = Vec::new();
        for entry in versions
            .range((lineage.0, 0u32)..=(lineage.0, u32::MAX))
            .map_err(db_err)?
        {
            let (_, id) = entry.map_err(db_err)?;
            let id = id.value();
            let record = records
                .get(id)
                .map_err(db_err)?
                .map(|v| decode::<VersionedRecord>(v.value()))
                .transpose()?
                .ok_or_else(|| {
                    LedgerError::InvariantViolation(format!(
                        "history of lineage {} points at missing record {}",
                        lineage, id
                    ))
                })?;
            history.push(record);
        }
        Ok(history)
    }

    fn heads_of_kind(&self, kind: &RecordKind) -> Result<Vec<VersionedRecord>, LedgerError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let kind_heads = read_txn.open_table(KIND_HEADS).map_err(db_err)?;
        let records = read_txn.open_table(RECORDS).map_err(db_err)?;

        let mut heads = Vec::new();
        for entry in kind_heads
            .range((kind.as_str(), 0u64)..=(kind.as_str(), u64::MAX))
            .map_err(db_err)?
        {
            let (_, id) = entry.map_err(db_err)?;
            let id = id.value();
            if let Some(record) = records
                .get(id)
                .map_err(db_err)?
                .map(|v| decode::<VersionedRecord>(v.value()))
                .transpose()?
            {
                heads.push(record);
            }
        }
        Ok(heads)
    }

    fn heads(&self) -> Result<Vec<(LineageId, RecordId)>, LedgerError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let heads = read_txn.open_table(HEADS).map_err(db_err)?;
        let mut out = Vec::new();
        for entry in heads.iter().map_err(db_err)? {
            let (lineage, id) = entry.map_err(db_err)?;
            out.push((LineageId(lineage.value()), RecordId(id.value())));
        }
        Ok(out)
    }

    fn records(&self) -> Result<Vec<VersionedRecord>, LedgerError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let records = read_txn.open_table(RECORDS).map_err(db_err)?;
        let mut out = Vec::new();
        for entry in records.iter().map_err(db_err)? {
            let (_, value) = entry.map_err(db_err)?;
            out.push(decode(value.value())?);
        }
        Ok(out)
    }

    fn record_count(&self) -> Result<usize, LedgerError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let records = read_txn.open_table(RECORDS).map_err(db_err)?;
        Ok(records.len().map_err(db_err)? as usize)
    }

    fn lineage_count(&self) -> Result<usize, LedgerError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let heads = read_txn.open_table(HEADS).map_err(db_err)?;
        Ok(heads.len().map_err(db_err)? as usize)
    }

    fn insert_equipment(&mut self, equipment: Equipment) -> Result<(), LedgerError> {
        let bytes = encode(&equipment)?;
        self.write(|txn| {
            let mut table = txn.open_table(EQUIPMENT).map_err(db_err)?;
            if table.get(equipment.code.as_str()).map_err(db_err)?.is_some() {
                return Err(LedgerError::DuplicateEquipment(equipment.code.clone()));
            }
            table
                .insert(equipment.code.as_str(), bytes.as_slice())
                .map_err(db_err)?;
            Ok(())
        })
    }

    fn replace_equipment(&mut self, equipment: Equipment) -> Result<(), LedgerError> {
        let bytes = encode(&equipment)?;
        self.write(|txn| {
            let mut table = txn.open_table(EQUIPMENT).map_err(db_err)?;
            if table.get(equipment.code.as_str()).map_err(db_err)?.is_none() {
                return Err(LedgerError::EquipmentNotFound(equipment.code.clone()));
            }
            table
                .insert(equipment.code.as_str(), bytes.as_slice())
                .map_err(db_err)?;
            Ok(())
        })
    }

    fn equipment(&self, code: &str) -> Result<Option<Equipment>, LedgerError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(EQUIPMENT).map_err(db_err)?;
        table
            .get(code)
            .map_err(db_err)?
            .map(|v| decode(v.value()))
            .transpose()
    }

    fn equipment_list(&self) -> Result<Vec<Equipment>, LedgerError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(EQUIPMENT).map_err(db_err)?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (_, value) = entry.map_err(db_err)?;
            out.push(decode(value.value())?);
        }
        Ok(out)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Timestamp;
    use crate::store::tests::record;
    use tempfile::tempdir;

    #[test]
    fn counters_persist_after_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("ledger.redb");
        {
            let mut store = RedbStore::open(&db_path).expect("open db");
            assert_eq!(store.allocate("form:QAF-OFD").expect("alloc"), 1);
            assert_eq!(store.allocate("form:QAF-OFD").expect("alloc"), 2);
        }
        {
            let mut store = RedbStore::open(&db_path).expect("reopen db");
            assert_eq!(store.counter("form:QAF-OFD").expect("counter"), 2);
            assert_eq!(store.allocate("form:QAF-OFD").expect("alloc"), 3);
        }
    }

    #[test]
    fn commit_and_history_in_version_order() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("ledger.redb")).expect("open db");

        store
            .commit_head(HeadCommit::create(record(1, 5, 10)))
            .expect("create");
        store
            .commit_head(HeadCommit::amend(record(2, 5, 11), RecordId(1)))
            .expect("amend");
        store
            .commit_head(HeadCommit::amend(record(3, 5, 12), RecordId(2)))
            .expect("amend");

        let history = store.history(LineageId(5)).expect("history");
        let ids: Vec<_> = history.iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        let latest: Vec<_> = history.iter().map(|r| r.is_latest).collect();
        assert_eq!(latest, vec![false, false, true]);
        assert_eq!(store.head(LineageId(5)).expect("head"), Some(RecordId(3)));
        assert_eq!(store.record_count().expect("count"), 3);
        assert_eq!(store.lineage_count().expect("count"), 1);
    }

    #[test]
    fn stale_commit_aborts_transaction() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("ledger.redb")).expect("open db");

        store
            .commit_head(HeadCommit::create(record(1, 1, 10)))
            .expect("create");
        store
            .commit_head(HeadCommit::amend(record(2, 1, 11), RecordId(1)))
            .expect("amend");

        let err = store
            .commit_head(HeadCommit::amend(record(3, 1, 11), RecordId(1)))
            .expect_err("stale head");
        assert!(matches!(
            err,
            LedgerError::ConcurrentUpdate {
                expected: Some(RecordId(1)),
                actual: Some(RecordId(2)),
                ..
            }
        ));
        assert!(store.get(RecordId(3)).expect("get").is_none());
        assert!(store.get(RecordId(2)).expect("get").expect("some").is_latest);
    }

    #[test]
    fn heads_of_kind_lists_only_that_kind() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("ledger.redb")).expect("open db");

        store
            .commit_head(HeadCommit::create(record(1, 1, 10)))
            .expect("create");
        let mut drill = record(2, 2, 10);
        drill.kind = RecordKind::new("drill-report").expect("kind");
        store.commit_head(HeadCommit::create(drill)).expect("create");
        store
            .commit_head(HeadCommit::amend(record(3, 1, 11), RecordId(1)))
            .expect("amend");

        let sts = store
            .heads_of_kind(&RecordKind::new("sts-operation").expect("kind"))
            .expect("heads");
        assert_eq!(sts.len(), 1);
        assert_eq!(sts[0].id, RecordId(3));

        let drills = store
            .heads_of_kind(&RecordKind::new("drill-report").expect("kind"))
            .expect("heads");
        assert_eq!(drills.len(), 1);
        assert_eq!(drills[0].lineage, LineageId(2));
    }

    #[test]
    fn records_persist_after_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("ledger.redb");
        {
            let mut store = RedbStore::open(&db_path).expect("open db");
            store
                .commit_head(HeadCommit::create(record(1, 1, 10)))
                .expect("create");
        }
        {
            let store = RedbStore::open(&db_path).expect("reopen db");
            let rec = store.get(RecordId(1)).expect("get").expect("persisted");
            assert_eq!(rec.version.to_string(), "1.0");
            assert_eq!(store.heads().expect("heads"), vec![(LineageId(1), RecordId(1))]);
        }
    }

    #[test]
    fn equipment_roundtrip_and_conflict() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("ledger.redb")).expect("open db");
        let hose = Equipment {
            code: "HOS-010".into(),
            name: "10in cargo hose".into(),
            category: "hose".into(),
            location: Some("Fujairah".into()),
            quantity: 4,
            condition: Some("good".into()),
            updated_at: Timestamp(1_700_000_000),
        };
        store.insert_equipment(hose.clone()).expect("insert");
        assert!(matches!(
            store.insert_equipment(hose.clone()),
            Err(LedgerError::DuplicateEquipment(code)) if code == "HOS-010"
        ));

        let mut worn = hose.clone();
        worn.condition = Some("worn".into());
        store.replace_equipment(worn.clone()).expect("replace");
        assert_eq!(store.equipment("HOS-010").expect("get"), Some(worn));
        assert_eq!(store.equipment_list().expect("list").len(), 1);
    }
}
