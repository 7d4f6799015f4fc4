//! # Ledger Audit
//!
//! Full scan of stored records checking the lineage invariants:
//!
//! - exactly one record per lineage has `is_latest == true`
//! - the head pointer names that record
//! - versions run 1.0, 1.1, 1.2, ... with no gap or repeat, in id order
//! - kind and form code never change within a lineage

use crate::store::RecordStore;
use crate::{LedgerError, LineageId, RecordId, Version, VersionedRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One broken invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Violation {
    /// Not exactly one record flagged latest.
    LatestCount { lineage: LineageId, count: usize },
    /// Head pointer disagrees with the flagged record.
    HeadMismatch {
        lineage: LineageId,
        pointer: Option<RecordId>,
        flagged: Option<RecordId>,
    },
    /// Version sequence is not 1.0 + 0.1 steps.
    VersionSequence {
        lineage: LineageId,
        record: RecordId,
        expected: Version,
        found: Version,
    },
    /// Kind or form code differs from the lineage's first record.
    IdentityDrift { lineage: LineageId, record: RecordId },
    /// A head pointer for a lineage with no records.
    DanglingHead { lineage: LineageId, pointer: RecordId },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LatestCount { lineage, count } => {
                write!(f, "lineage {}: {} records flagged latest", lineage, count)
            }
            Self::HeadMismatch {
                lineage,
                pointer,
                flagged,
            } => write!(
                f,
                "lineage {}: head pointer {:?} but latest flag on {:?}",
                lineage, pointer, flagged
            ),
            Self::VersionSequence {
                lineage,
                record,
                expected,
                found,
            } => write!(
                f,
                "lineage {}: record {} has version {}, expected {}",
                lineage, record, found, expected
            ),
            Self::IdentityDrift { lineage, record } => write!(
                f,
                "lineage {}: record {} changed kind or form code",
                lineage, record
            ),
            Self::DanglingHead { lineage, pointer } => write!(
                f,
                "lineage {}: head pointer {} but no records",
                lineage, pointer
            ),
        }
    }
}

/// Outcome of an audit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub lineages_checked: usize,
    pub records_checked: usize,
    pub violations: Vec<Violation>,
}

impl AuditReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Audit every lineage in `store`.
pub fn audit<S: RecordStore + ?Sized>(store: &S) -> Result<AuditReport, LedgerError> {
    let records = store.records()?;
    let pointers: BTreeMap<LineageId, RecordId> = store.heads()?.into_iter().collect();

    let mut lineages: BTreeMap<LineageId, Vec<VersionedRecord>> = BTreeMap::new();
    for record in records {
        lineages.entry(record.lineage).or_default().push(record);
    }

    let mut report = AuditReport {
        lineages_checked: lineages.len(),
        records_checked: lineages.values().map(Vec::len).sum(),
        violations: Vec::new(),
    };

    for (lineage, chain) in &lineages {
        check_lineage(*lineage, chain, pointers.get(lineage).copied(), &mut report.violations);
    }
    for (lineage, pointer) in &pointers {
        if !lineages.contains_key(lineage) {
            report.violations.push(Violation::DanglingHead {
                lineage: *lineage,
                pointer: *pointer,
            });
        }
    }
    Ok(report)
}

/// `chain` is in record id order, which is insertion order.
fn check_lineage(
    lineage: LineageId,
    chain: &[VersionedRecord],
    pointer: Option<RecordId>,
    out: &mut Vec<Violation>,
) {
    let flagged: Vec<RecordId> = chain.iter().filter(|r| r.is_latest).map(|r| r.id).collect();
    if flagged.len() != 1 {
        out.push(Violation::LatestCount {
            lineage,
            count: flagged.len(),
        });
    }
    let flagged_one = flagged.first().copied();
    if flagged.len() <= 1 && pointer != flagged_one {
        out.push(Violation::HeadMismatch {
            lineage,
            pointer,
            flagged: flagged_one,
        });
    }

    let Some(first) = chain.first() else {
        return;
    };
    let mut expected = Version::INITIAL;
    for record in chain {
        if record.version != expected {
            out.push(Violation::VersionSequence {
                lineage,
                record: record.id,
                expected,
                found: record.version,
            });
        }
        if record.kind != first.kind || record.form_code != first.form_code {
            out.push(Violation::IdentityDrift {
                lineage,
                record: record.id,
            });
        }
        expected = record.version.next();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FormCode;
    use crate::store::tests::record;
    use crate::store::{HeadCommit, MemoryStore};

    #[test]
    fn clean_store_passes() {
        let mut store = MemoryStore::new();
        store
            .commit_head(HeadCommit::create(record(1, 1, 10)))
            .expect("create");
        store
            .commit_head(HeadCommit::amend(record(2, 1, 11), RecordId(1)))
            .expect("amend");
        store
            .commit_head(HeadCommit::create(record(3, 2, 10)))
            .expect("create");

        let report = audit(&store).expect("audit");
        assert!(report.is_clean(), "{:?}", report.violations);
        assert_eq!(report.lineages_checked, 2);
        assert_eq!(report.records_checked, 3);
    }

    #[test]
    fn detects_sibling_heads_and_duplicate_versions() {
        // The unguarded read-flip-insert race: two 1.1 records, both latest.
        let mut a = record(1, 1, 10);
        a.is_latest = false;
        let b = record(2, 1, 11);
        let c = record(3, 1, 11);
        let mut out = Vec::new();
        check_lineage(LineageId(1), &[a, b, c], Some(RecordId(3)), &mut out);

        assert!(out.contains(&Violation::LatestCount {
            lineage: LineageId(1),
            count: 2
        }));
        assert!(out.iter().any(|v| matches!(
            v,
            Violation::VersionSequence { record: RecordId(3), .. }
        )));
    }

    #[test]
    fn detects_form_code_drift_and_head_mismatch() {
        let mut a = record(1, 1, 10);
        a.is_latest = false;
        a.form_code = Some(FormCode("QAF-STS-001".into()));
        let mut b = record(2, 1, 11);
        b.form_code = Some(FormCode("QAF-STS-002".into()));
        let mut out = Vec::new();
        check_lineage(LineageId(1), &[a, b], Some(RecordId(1)), &mut out);

        assert!(out.contains(&Violation::IdentityDrift {
            lineage: LineageId(1),
            record: RecordId(2)
        }));
        assert!(out.contains(&Violation::HeadMismatch {
            lineage: LineageId(1),
            pointer: Some(RecordId(1)),
            flagged: Some(RecordId(2)),
        }));
    }
}
