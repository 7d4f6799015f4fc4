//! # Property-Based Tests
//!
//! Lineage invariants checked over random operation sequences with proptest.

use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::BTreeSet;
use stsdesk_core::{
    Decision, FieldValue, FormStatus, Ledger, LedgerError, LineageId, Payload, RecordId, Version,
};

// =============================================================================
// HELPERS
// =============================================================================

/// One step applied to a ledger under test.
#[derive(Debug, Clone)]
enum Op {
    Create,
    /// Amend the head of the n-th lineage (modulo lineage count).
    Amend(usize, String),
    /// Amend an older version of the n-th lineage, if it has one.
    AmendStale(usize),
    Review(usize, bool),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        2 => Just(Op::Create),
        4 => (any::<usize>(), "[a-z]{1,12}").prop_map(|(i, s)| Op::Amend(i, s)),
        1 => any::<usize>().prop_map(Op::AmendStale),
        1 => (any::<usize>(), any::<bool>()).prop_map(|(i, a)| Op::Review(i, a)),
    ]
}

fn ofd_payload() -> Payload {
    let mut p = Payload::new();
    p.insert("inspection_date".into(), FieldValue::text("2024-09-30"));
    p.insert("location".into(), FieldValue::text("Sohar"));
    p
}

fn remark(text: &str) -> Payload {
    let mut p = Payload::new();
    p.insert("remarks".into(), FieldValue::text(text));
    p
}

/// Apply `ops`, returning every lineage created.
fn run(ledger: &mut Ledger, ops: &[Op]) -> Vec<LineageId> {
    let mut lineages: Vec<LineageId> = Vec::new();
    for op in ops {
        match op {
            Op::Create => {
                let r = ledger
                    .create("ofd-inspection", ofd_payload(), vec![])
                    .expect("create");
                lineages.push(r.lineage);
            }
            Op::Amend(i, text) if !lineages.is_empty() => {
                let head = ledger.head(lineages[i % lineages.len()]).expect("head");
                ledger
                    .amend("ofd-inspection", head.id, remark(text), vec![])
                    .expect("amend head");
            }
            Op::AmendStale(i) if !lineages.is_empty() => {
                let history = ledger.history(lineages[i % lineages.len()]).expect("history");
                if let Some(old) = history.iter().rev().nth(1) {
                    let err = ledger
                        .amend("ofd-inspection", old.id, remark("stale"), vec![])
                        .expect_err("stale amend must fail");
                    assert!(matches!(err, LedgerError::NotLatest { .. }));
                }
            }
            Op::Review(i, approve) if !lineages.is_empty() => {
                let head = ledger.head(lineages[i % lineages.len()]).expect("head");
                let decision = if *approve {
                    Decision::Approve
                } else {
                    Decision::Reject
                };
                let result = ledger.review("ofd-inspection", head.id, "QHSE", decision, None);
                if head.status == FormStatus::Pending {
                    result.expect("review pending head");
                } else {
                    assert!(matches!(result, Err(LedgerError::InvalidTransition { .. })));
                }
            }
            _ => {}
        }
    }
    lineages
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Every lineage has exactly one head, and it is the highest version.
    #[test]
    fn exactly_one_latest_per_lineage(ops in vec(op(), 1..40)) {
        let mut ledger = Ledger::new();
        let lineages = run(&mut ledger, &ops);

        for lineage in lineages {
            let history = ledger.history(lineage).expect("history");
            let latest: Vec<_> = history.iter().filter(|r| r.is_latest).collect();
            prop_assert_eq!(latest.len(), 1);
            prop_assert_eq!(latest[0].id, history.last().expect("non-empty").id);
            prop_assert_eq!(ledger.head(lineage).expect("head").id, latest[0].id);
        }
        prop_assert!(ledger.verify().expect("verify").is_clean());
    }

    /// Versions run 1.0, 1.1, 1.2, ... with ids increasing alongside.
    #[test]
    fn versions_step_by_one_tenth(ops in vec(op(), 1..40)) {
        let mut ledger = Ledger::new();
        let lineages = run(&mut ledger, &ops);

        for lineage in lineages {
            let history = ledger.history(lineage).expect("history");
            let mut expected = Version::INITIAL;
            let mut last_id = RecordId(0);
            for record in &history {
                prop_assert_eq!(record.version, expected);
                prop_assert!(record.id > last_id);
                prop_assert_eq!(record.lineage, lineage);
                expected = expected.next();
                last_id = record.id;
            }
        }
    }

    /// Form codes are unique across lineages and constant within one.
    #[test]
    fn form_codes_unique_and_stable(ops in vec(op(), 1..40)) {
        let mut ledger = Ledger::new();
        let lineages = run(&mut ledger, &ops);

        let mut codes = BTreeSet::new();
        for lineage in &lineages {
            let history = ledger.history(*lineage).expect("history");
            let first = history[0].form_code.clone().expect("ofd has a prefix");
            prop_assert!(history.iter().all(|r| r.form_code.as_ref() == Some(&first)));
            prop_assert!(codes.insert(first));
        }
        let expected: BTreeSet<_> = (1..=lineages.len())
            .map(|n| format!("QAF-OFD-{:03}", n))
            .collect();
        let issued: BTreeSet<_> = codes.into_iter().map(|c| c.0).collect();
        prop_assert_eq!(issued, expected);
    }

    /// Amending a non-head never writes anything.
    #[test]
    fn stale_amend_leaves_ledger_unchanged(amends in 1usize..6, pick in any::<usize>()) {
        let mut ledger = Ledger::new();
        let mut current = ledger
            .create("ofd-inspection", ofd_payload(), vec![])
            .expect("create");
        let lineage = current.lineage;
        for n in 0..amends {
            current = ledger
                .amend("ofd-inspection", current.id, remark(&n.to_string()), vec![])
                .expect("amend");
        }

        let before = ledger.history(lineage).expect("history");
        let stale = &before[pick % (before.len() - 1)];
        let result = ledger.amend("ofd-inspection", stale.id, remark("late"), vec![]);
        let is_not_latest = matches!(result, Err(LedgerError::NotLatest { .. }));
        prop_assert!(is_not_latest);
        prop_assert_eq!(ledger.history(lineage).expect("history"), before);
    }
}
