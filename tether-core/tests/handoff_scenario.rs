//! End-to-end generation rotation over a small table.

use std::sync::Arc;

use tether_core::{
    Backend, Generation, GenerationUpdater, RouteState, TableBuilder, VersionedRouter,
};

const TABLE_SIZE: usize = 7;

fn keys() -> impl Iterator<Item = String> {
    (0..200).map(|i| format!("room-{i}"))
}

#[test]
fn adding_a_backend_signals_handoff_only_for_moved_keys() {
    let router = Arc::new(VersionedRouter::new(5));
    let mut updater = GenerationUpdater::new(Arc::clone(&router), TableBuilder::new(TABLE_SIZE));

    let gen1 = updater
        .apply(vec![Backend::new("A"), Backend::new("B")])
        .unwrap();
    assert_eq!(gen1, Generation(1));

    let first = router.table(gen1).unwrap();
    for key in keys() {
        let both = first.lookup_n(&key, 2);
        let ids: Vec<_> = both.iter().map(|b| b.id.as_str()).collect();
        assert!(ids.contains(&"A") && ids.contains(&"B"), "{key}: {ids:?}");
    }

    let gen2 = updater
        .apply(vec![Backend::new("A"), Backend::new("B"), Backend::new("C")])
        .unwrap();
    assert_eq!(gen2, Generation(2));
    let second = router.table(gen2).unwrap();

    let mut moved = 0;
    let mut kept = 0;
    for key in keys() {
        let before = first.lookup(&key).clone();
        let after = second.lookup(&key).clone();
        let result = router.route(&key, Some("1"), 2, TABLE_SIZE).unwrap();

        assert_eq!(result.primary, after);
        assert_eq!(result.generation, gen2);
        assert_eq!(result.client_generation, Some(gen1));

        if before.id != after.id {
            moved += 1;
            assert_eq!(result.state(), RouteState::Migrating);
            assert!(result.requires_recovery);
            let previous = result.previous_primary.expect("hand-off carries previous primary");
            assert!(previous.id == "A" || previous.id == "B");
            assert_ne!(previous.id, result.primary.id);
        } else {
            kept += 1;
            assert_eq!(result.state(), RouteState::Stable);
            assert!(result.previous_primary.is_none());
            assert!(result.previous_peers.is_empty());
        }
    }

    assert!(moved > 0, "adding a backend should move some keys");
    assert!(kept > 0, "adding a backend should keep some keys");
}

#[test]
fn handoff_headers_follow_route_state() {
    let router = VersionedRouter::new(5);
    router.add_generation(
        Generation(1),
        TableBuilder::new(TABLE_SIZE).build(vec![Backend::new("A")]).unwrap(),
    );
    router.add_generation(
        Generation(2),
        TableBuilder::new(TABLE_SIZE).build(vec![Backend::new("B")]).unwrap(),
    );

    let fresh = router.route("room-1", None, 2, TABLE_SIZE).unwrap();
    let names: Vec<_> = fresh.handoff_headers().into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["x-maglev-generation", "x-maglev-replication-peers"]);

    let migrating = router.route("room-1", Some("1"), 2, TABLE_SIZE).unwrap();
    let headers = migrating.handoff_headers();
    assert!(headers.contains(&("x-maglev-previous-primary", "A".to_string())));
    assert!(headers.contains(&("x-maglev-generation", "2".to_string())));
}

#[test]
fn removing_one_backend_moves_a_small_fraction_of_slots() {
    let ids: Vec<String> = (0..10).map(|i| format!("10.0.0.{i}")).collect();
    let all: Vec<Backend> = ids.iter().map(Backend::new).collect();
    let without_one: Vec<Backend> = all.iter().filter(|b| b.id != "10.0.0.4").cloned().collect();

    let builder = TableBuilder::default();
    let before = builder.build(all).unwrap();
    let after = builder.build(without_one).unwrap();

    let changed = before.slot_diff(&after);
    let size = before.table_size();
    let removed_share = before.slot_shares()["10.0.0.4"];

    assert!(changed >= removed_share);
    assert!(
        changed < size * 2 / 10,
        "{changed} of {size} slots changed owner"
    );
}
