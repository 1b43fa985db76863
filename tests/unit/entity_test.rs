//! Unit tests for entity change tracking and hydration.

use cyphermap::{Entity, EntityKind, PropertyMap, PropertyValue};

#[test]
fn test_change_set_records_from_and_to() {
    let node = Entity::node(&["User"])
        .with_properties(PropertyMap::new().with("email", "old@x.y"))
        .into_ref();

    node.borrow_mut().set("email", "new@x.y");

    let node = node.borrow();
    let change = node.changes().get("email").unwrap();
    assert_eq!(change.from, PropertyValue::String("old@x.y".into()));
    assert_eq!(change.to, PropertyValue::String("new@x.y".into()));
}

#[test]
fn test_reverting_to_baseline_erases_change() {
    let mut node =
        Entity::node(&["User"]).with_properties(PropertyMap::new().with("email", "old@x.y"));

    node.set("email", "new@x.y");
    node.set("email", "old@x.y");

    assert!(node.changes().is_empty());
    assert_eq!(node.get("email"), Some(&PropertyValue::String("old@x.y".into())));
}

#[test]
fn test_repeated_sets_keep_original_baseline() {
    let mut node =
        Entity::node(&["User"]).with_properties(PropertyMap::new().with("count", 1i64));

    node.set("count", 2i64);
    node.set("count", 3i64);

    let change = node.changes().get("count").unwrap();
    assert_eq!(change.from, PropertyValue::Int(1));
    assert_eq!(change.to, PropertyValue::Int(3));
    assert_eq!(node.changes().len(), 1);
}

#[test]
fn test_hydrate_reset_clears_diff_state() {
    let mut node =
        Entity::node(&["User"]).with_properties(PropertyMap::new().with("email", "old@x.y"));
    node.set("email", "changed@x.y");
    node.delete("email");

    node.hydrate(PropertyMap::new().with("email", "fresh@x.y"), true);

    assert!(node.changes().is_empty());
    assert!(node.deleted().is_empty());
    assert_eq!(node.initial().get_string("email"), Some("fresh@x.y"));
}

#[test]
fn test_hydrate_merge_applies_individual_sets() {
    let mut node = Entity::node(&["User"])
        .with_properties(PropertyMap::new().with("a", 1i64).with("b", 2i64));

    node.hydrate(PropertyMap::new().with("a", 10i64), false);

    assert_eq!(node.changes().len(), 1);
    assert_eq!(node.get("b"), Some(&PropertyValue::Int(2)));
}

#[test]
fn test_delete_tracks_removed_value() {
    let mut node =
        Entity::node(&["User"]).with_properties(PropertyMap::new().with("email", "x@y.z"));

    node.delete("email");
    node.delete("missing");

    assert_eq!(node.deleted().len(), 1);
    assert_eq!(node.deleted().get_string("email"), Some("x@y.z"));
}

#[test]
fn test_relationship_carries_single_type_label() {
    let rel = Entity::relationship("Wrote", None, None);

    assert_eq!(rel.kind(), EntityKind::Relationship);
    assert_eq!(rel.rel_type(), "Wrote");
    assert_eq!(rel.labels(), ["Wrote"]);
}

#[test]
fn test_endpoints_are_shared_handles() {
    let start = Entity::node(&["User"]).into_ref();
    let end = Entity::node(&["User"]).into_ref();
    let rel = Entity::relationship("Knows", Some((&start).into()), Some((&end).into()));

    start.borrow_mut().set("name", "mark");

    let through_rel = rel.start().unwrap();
    assert_eq!(
        through_rel.borrow().get("name"),
        Some(&PropertyValue::String("mark".into()))
    );
}

#[test]
fn test_identity_implies_persisted() {
    let fresh = Entity::node(&["User"]);
    let stored = Entity::node(&["User"]).with_id(12);

    assert_eq!(fresh.id(), None);
    assert_eq!(stored.id(), Some(12));
}
