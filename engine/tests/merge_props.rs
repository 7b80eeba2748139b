//! Merge property and scenario tests for tether-engine.
//!
//! The sync protocol gives no ordering guarantee between push events and
//! concurrent delta fetches, so correctness leans entirely on these merge
//! properties.

use proptest::prelude::*;
use serde_json::json;
use tether_engine::{ChangeSet, Checkpoint, Collection, DeletedRecord, Record};

/// Deterministic by (id, version), so equal-version replays are byte-equal.
fn record(id: &str, version: u64) -> Record {
    Record::new(id, json!({"n": version}), "gen", 1000).with_version(version)
}

static IDS: [&str; 5] = ["a", "b", "c", "d", "e"];

fn changeset_strategy() -> impl Strategy<Value = ChangeSet> {
    let upsert = (0..IDS.len(), 1u64..20).prop_map(|(i, version)| record(IDS[i], version));
    let deletion = (0..IDS.len()).prop_map(|i| DeletedRecord { id: IDS[i].into() });

    (
        prop::collection::vec(upsert, 0..8),
        prop::collection::vec(deletion, 0..4),
        1_000u64..1_000_000,
    )
        .prop_map(|(updated_records, deleted_records, current_timestamp)| ChangeSet {
            updated_records,
            deleted_records,
            current_timestamp,
        })
}

proptest! {
    #[test]
    fn replaying_a_response_is_a_noop(response in changeset_strategy()) {
        let mut collection = Collection::new();
        response.merge_into(&mut collection);
        let after_first = collection.clone();

        response.merge_into(&mut collection);
        prop_assert_eq!(collection, after_first);
    }

    #[test]
    fn deleted_ids_never_survive_their_own_response(response in changeset_strategy()) {
        let mut collection = Collection::new();
        response.merge_into(&mut collection);

        for deleted in &response.deleted_records {
            prop_assert!(!collection.contains(&deleted.id));
        }
    }

    #[test]
    fn resident_versions_never_decrease(
        first in changeset_strategy(),
        second in changeset_strategy(),
    ) {
        let mut collection = Collection::new();
        first.merge_into(&mut collection);
        let before: Vec<(String, u64)> = collection
            .records()
            .map(|r| (r.id.clone(), r.version))
            .collect();

        second.merge_into(&mut collection);
        for (id, version) in before {
            if let Some(record) = collection.get(&id) {
                prop_assert!(record.version >= version);
            }
        }
    }
}

#[test]
fn reconcile_scenario() {
    // Checkpoint at T0; the delta response upserts "a"@v2, deletes "b",
    // and reports T1 as the new server timestamp.
    let mut collection = Collection::new();
    collection.upsert(record("b", 1));
    let mut checkpoint = Checkpoint::new(1_000);

    let response = ChangeSet {
        updated_records: vec![record("a", 2)],
        deleted_records: vec![DeletedRecord { id: "b".into() }],
        current_timestamp: 2_000,
    };

    response.merge_into(&mut collection);
    checkpoint.advance(response.current_timestamp);

    assert_eq!(collection.get("a").unwrap().version, 2);
    assert!(!collection.contains("b"));
    assert_eq!(checkpoint.millis(), 2_000);
}

#[test]
fn out_of_order_event_then_delta() {
    // A push event for v3 lands before a delta fetch that still carries v2.
    let mut collection = Collection::new();
    collection.upsert(record("a", 3));

    let stale_delta = ChangeSet {
        updated_records: vec![record("a", 2)],
        deleted_records: vec![],
        current_timestamp: 9_000,
    };
    stale_delta.merge_into(&mut collection);

    assert_eq!(collection.get("a").unwrap().version, 3);
}
