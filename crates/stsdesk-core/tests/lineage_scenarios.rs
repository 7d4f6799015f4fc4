//! # Lineage Scenarios
//!
//! End-to-end scenarios over both backends: the amend/stale-head walk,
//! racing writers on one lineage, and form codes under concurrent creates.

use std::collections::BTreeSet;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use stsdesk_core::{
    FieldValue, HeadCommit, KindRegistry, Ledger, LedgerError, MemoryStore, Payload, RecordId,
    RecordStore, RedbStore,
};
use tempfile::tempdir;

fn poac_payload(name: &str) -> Payload {
    let mut p = Payload::new();
    p.insert("poac_name".into(), FieldValue::text(name));
    p.insert("evaluation_date".into(), FieldValue::text("2025-01-20"));
    p.insert("location".into(), FieldValue::text("Ras Tanura"));
    p
}

fn score(n: i64) -> Payload {
    let mut p = Payload::new();
    p.insert("score".into(), FieldValue::Integer(n));
    p
}

// =============================================================================
// SAMPLE WALK
// =============================================================================

mod stale_head_walk {
    use super::*;

    fn walk(mut ledger: Ledger) {
        let a10 = ledger
            .create("poac-cross-competency", poac_payload("J. Mendes"), vec![])
            .expect("create");
        assert_eq!(a10.version.to_string(), "1.0");
        assert!(a10.is_latest);

        let a11 = ledger
            .amend("poac-cross-competency", a10.id, score(7), vec![])
            .expect("amend");
        assert_eq!(a11.version.to_string(), "1.1");
        assert!(!ledger.get(a10.id).expect("1.0").is_latest);

        let stale = ledger.amend("poac-cross-competency", a10.id, score(9), vec![]);
        assert!(matches!(stale, Err(LedgerError::NotLatest { .. })));

        let a12 = ledger
            .amend("poac-cross-competency", a11.id, score(9), vec![])
            .expect("amend head");
        assert_eq!(a12.version.to_string(), "1.2");
        assert_eq!(a12.lineage, a10.lineage);

        let versions: Vec<String> = ledger
            .history(a10.lineage)
            .expect("history")
            .iter()
            .map(|r| r.version.to_string())
            .collect();
        assert_eq!(versions, vec!["1.0", "1.1", "1.2"]);
        assert!(ledger.verify().expect("verify").is_clean());
    }

    #[test]
    fn in_memory() {
        walk(Ledger::new());
    }

    #[test]
    fn redb() {
        let temp = tempdir().expect("temp dir");
        walk(Ledger::with_redb(temp.path().join("walk.redb"), KindRegistry::default()).expect("open"));
    }
}

// =============================================================================
// HEAD COMPARE-AND-SWAP
// =============================================================================

mod head_cas {
    use super::*;
    use stsdesk_core::{FormStatus, LineageId, RecordKind, Timestamp, Version, VersionedRecord};

    fn version(id: u64, tenths: u32) -> VersionedRecord {
        VersionedRecord {
            id: RecordId(id),
            lineage: LineageId(1),
            kind: RecordKind::new("sts-operation").expect("kind"),
            version: Version::from_tenths(tenths),
            is_latest: true,
            form_code: None,
            status: FormStatus::Pending,
            review: None,
            created_at: Timestamp(1_700_000_000),
            recorded_on: None,
            payload: Payload::new(),
            attachments: Default::default(),
        }
    }

    /// Two writers both read head 1 and both try to append 1.1.
    fn race(store: &mut dyn RecordStore) {
        store
            .commit_head(HeadCommit::create(version(1, 10)))
            .expect("create");
        store
            .commit_head(HeadCommit::amend(version(2, 11), RecordId(1)))
            .expect("first writer");

        let loser = store.commit_head(HeadCommit::amend(version(3, 11), RecordId(1)));
        assert!(matches!(
            loser,
            Err(LedgerError::ConcurrentUpdate {
                expected: Some(RecordId(1)),
                actual: Some(RecordId(2)),
                ..
            })
        ));
        assert!(store.get(RecordId(3)).expect("get").is_none());
        assert_eq!(store.history(LineageId(1)).expect("history").len(), 2);
        assert!(stsdesk_core::audit(&*store).expect("audit").is_clean());
    }

    #[test]
    fn memory_store_rejects_second_writer() {
        race(&mut MemoryStore::new());
    }

    #[test]
    fn redb_store_rejects_second_writer() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("cas.redb")).expect("open");
        race(&mut store);
    }

    #[test]
    fn second_create_of_same_lineage_is_rejected() {
        let mut store = MemoryStore::new();
        store
            .commit_head(HeadCommit::create(version(1, 10)))
            .expect("create");
        let dup = store.commit_head(HeadCommit::create(version(2, 10)));
        assert!(matches!(dup, Err(LedgerError::ConcurrentUpdate { .. })));
    }
}

// =============================================================================
// CONCURRENT WRITERS
// =============================================================================

mod concurrent {
    use super::*;

    const WRITERS: usize = 8;

    #[test]
    fn concurrent_creates_issue_distinct_form_codes() {
        let temp = tempdir().expect("temp dir");
        let ledger = Ledger::with_redb(temp.path().join("codes.redb"), KindRegistry::default())
            .expect("open");
        let ledger = Arc::new(Mutex::new(ledger));
        let barrier = Arc::new(Barrier::new(WRITERS));

        let handles: Vec<_> = (0..WRITERS)
            .map(|n| {
                let ledger = Arc::clone(&ledger);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let mut guard = ledger.lock().expect("lock");
                    guard
                        .create("poac-cross-competency", poac_payload(&format!("crew {n}")), vec![])
                        .expect("create")
                })
            })
            .collect();

        let codes: BTreeSet<String> = handles
            .into_iter()
            .map(|h| h.join().expect("join").form_code.expect("code").0)
            .collect();
        let expected: BTreeSet<String> = (1..=WRITERS).map(|n| format!("QAF-POAC-{:03}", n)).collect();
        assert_eq!(codes, expected);
    }

    #[test]
    fn racing_amends_on_one_head_produce_one_successor() {
        let mut ledger = Ledger::new();
        let head = ledger
            .create("poac-cross-competency", poac_payload("A. Okafor"), vec![])
            .expect("create");
        let ledger = Arc::new(Mutex::new(ledger));
        let barrier = Arc::new(Barrier::new(WRITERS));

        // Every writer read the same head before any of them wrote.
        let handles: Vec<_> = (0..WRITERS)
            .map(|n| {
                let ledger = Arc::clone(&ledger);
                let barrier = Arc::clone(&barrier);
                let id = head.id;
                thread::spawn(move || {
                    barrier.wait();
                    let mut guard = ledger.lock().expect("lock");
                    guard.amend("poac-cross-competency", id, score(n as i64), vec![])
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().expect("join")).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| matches!(e, LedgerError::NotLatest { .. }))
        );

        let ledger = ledger.lock().expect("lock");
        let history = ledger.history(head.lineage).expect("history");
        assert_eq!(history.len(), 2);
        assert!(ledger.verify().expect("verify").is_clean());
    }
}
