//! Integration tests for the lifecycle hook pipeline: ordering, the
//! property-change dispatch, and the relationship-added cascade.

use cyphermap::{
    EntityMapper, GraphMapper, MapperError, PropertyDef, PropertyMap, RawResult, RawValue,
    RecordingConnection, Registry, RelEnd,
};
use std::cell::RefCell;
use std::rc::Rc;

type Log = Rc<RefCell<Vec<String>>>;

fn log_entry(log: &Log, entry: impl Into<String>) {
    log.borrow_mut().push(entry.into());
}

fn name_of(entity: &cyphermap::EntityRef) -> String {
    entity
        .borrow()
        .data()
        .get_string("name")
        .unwrap_or("?")
        .to_string()
}

fn mapper_with_hooks(log: &Log) -> GraphMapper {
    let mut registry = Registry::new();

    let person = {
        let (l1, l2, l3, l4, l5) =
            (log.clone(), log.clone(), log.clone(), log.clone(), log.clone());
        EntityMapper::node(&["Person"])
            .property("name", PropertyDef::string())
            .property("email", PropertyDef::string())
            .on_before_create(move |e| {
                log_entry(&l1, format!("before_create:{}", name_of(e)));
                Ok(())
            })
            .on_after_create(move |e, _res| {
                log_entry(&l2, format!("after_create:{}:id={:?}", name_of(e), e.borrow().id()));
                Ok(())
            })
            .on_before_update(move |e| {
                log_entry(&l3, format!("before_update:{}", name_of(e)));
                Ok(())
            })
            .on_after_update(move |e, _res| {
                log_entry(&l4, format!("after_update:{}", name_of(e)));
                Ok(())
            })
            .on_relationship_added("Knows", move |event| {
                let end = match event.end {
                    Some(RelEnd::Start) => "start",
                    Some(RelEnd::End) => "end",
                    None => "none",
                };
                log_entry(&l5, format!("added:{}:{}", end, name_of(&event.entity)));
                Ok(())
            })
            .build()
    };
    registry.register(person);

    let knows = {
        let (l1, l2, l3) = (log.clone(), log.clone(), log.clone());
        EntityMapper::relationship("Knows")
            .on_before_create(move |_e| {
                log_entry(&l1, "before_create:rel");
                Ok(())
            })
            .on_after_create(move |_e, _res| {
                log_entry(&l2, "after_create:rel");
                Ok(())
            })
            .on_relationship_added("Knows", move |event| {
                assert!(event.end.is_none());
                log_entry(&l3, "added:rel-own");
                Ok(())
            })
            .build()
    };
    registry.register(knows);

    GraphMapper::new(registry)
}

#[test]
fn test_create_pipeline_refreshes_before_after_hook() {
    let log: Log = Default::default();
    let mapper = mapper_with_hooks(&log);

    let person = mapper
        .node(&["Person"], PropertyMap::new().with("name", "mark"))
        .unwrap();

    let mut conn = RecordingConnection::new();
    conn.enqueue(RawResult::single(
        "n_0",
        RawValue::Node {
            id: 7,
            labels: vec!["Person".into()],
            properties: PropertyMap::new().with("name", "mark"),
        },
    ));

    let mut work = mapper.work();
    work.save(&person).unwrap();
    work.send(&mut conn).unwrap();

    // The refresh ran before the after-hook: the id is visible inside it.
    assert_eq!(
        *log.borrow(),
        vec!["before_create:mark", "after_create:mark:id=Some(7)"]
    );
}

#[test]
fn test_property_change_dispatch_fires_registered_handler() {
    let log: Log = Default::default();
    let mut registry = Registry::new();

    let l = log.clone();
    registry.register(
        EntityMapper::node(&["Person"])
            .property("email", PropertyDef::string())
            .on_property_changed("email", move |_e, field, from, to| {
                log_entry(&l, format!("changed:{field}:{from:?}->{to:?}"));
                Ok(())
            })
            .build(),
    );
    let mapper = GraphMapper::new(registry);

    let person = mapper
        .node(
            &["Person"],
            PropertyMap::new().with("id", 5i64).with("email", "old@x.y"),
        )
        .unwrap();
    person.borrow_mut().set("email", "new@x.y");

    let mut conn = RecordingConnection::new();
    let mut work = mapper.work();
    work.save(&person).unwrap();
    work.send(&mut conn).unwrap();

    assert_eq!(
        *log.borrow(),
        vec!["changed:email:String(\"old@x.y\")->String(\"new@x.y\")"]
    );
}

#[test]
fn test_net_zero_edit_fires_no_handler() {
    let log: Log = Default::default();
    let mut registry = Registry::new();

    let l = log.clone();
    registry.register(
        EntityMapper::node(&["Person"])
            .property("email", PropertyDef::string())
            .on_property_changed("email", move |_e, _f, _from, _to| {
                log_entry(&l, "changed");
                Ok(())
            })
            .build(),
    );
    let mapper = GraphMapper::new(registry);

    let person = mapper
        .node(
            &["Person"],
            PropertyMap::new().with("id", 5i64).with("email", "same@x.y"),
        )
        .unwrap();
    person.borrow_mut().set("email", "other@x.y");
    person.borrow_mut().set("email", "same@x.y");

    let mut conn = RecordingConnection::new();
    let mut work = mapper.work();
    work.save(&person).unwrap();
    work.send(&mut conn).unwrap();

    assert!(log.borrow().is_empty());
}

#[test]
fn test_relationship_add_cascade_order() {
    let log: Log = Default::default();
    let mapper = mapper_with_hooks(&log);

    let start = mapper
        .node(
            &["Person"],
            PropertyMap::new().with("id", 99i64).with("name", "mark"),
        )
        .unwrap();
    let end = mapper
        .node(
            &["Person"],
            PropertyMap::new().with("id", 88i64).with("name", "kram"),
        )
        .unwrap();
    let rel = mapper
        .relationship("Knows", PropertyMap::new(), &start, &end)
        .unwrap();

    let mut conn = RecordingConnection::new();
    let mut work = mapper.work();
    work.save(&rel).unwrap();
    work.send(&mut conn).unwrap();

    // Endpoint befores, the relationship's own before, execution, the
    // endpoint after-pipelines (start before end), then the cascade in
    // start/end/relationship-own order, then the relationship's
    // after-create.
    assert_eq!(
        *log.borrow(),
        vec![
            "before_update:mark",
            "before_update:kram",
            "before_create:rel",
            "after_update:mark",
            "after_update:kram",
            "added:start:mark",
            "added:end:kram",
            "added:rel-own",
            "after_create:rel",
        ]
    );
}

#[test]
fn test_final_hooks_run_once_after_all_units() {
    let log: Log = Default::default();
    let mut registry = Registry::new();

    let (l1, l2, l3) = (log.clone(), log.clone(), log.clone());
    registry.register(
        EntityMapper::node(&["Person"])
            .property("name", PropertyDef::string())
            .on_before_create(move |e| {
                log_entry(&l1, format!("before:{}", name_of(e)));
                Ok(())
            })
            .on_after_create(move |e, _res| {
                log_entry(&l2, format!("after:{}", name_of(e)));
                Ok(())
            })
            .on_final(move |e| {
                log_entry(&l3, format!("final:{}", name_of(e)));
                Ok(())
            })
            .build(),
    );
    let mapper = GraphMapper::new(registry);

    let a = mapper
        .node(&["Person"], PropertyMap::new().with("name", "a"))
        .unwrap();
    let b = mapper
        .node(&["Person"], PropertyMap::new().with("name", "b"))
        .unwrap();

    let mut conn = RecordingConnection::new();
    let mut work = mapper.work();
    work.save(&a).unwrap();
    work.save(&b).unwrap();
    work.send(&mut conn).unwrap();

    assert_eq!(
        *log.borrow(),
        vec!["before:a", "after:a", "before:b", "after:b", "final:a", "final:b"]
    );
}

#[test]
fn test_hook_error_aborts_batch_with_rollback() {
    let mut registry = Registry::new();
    registry.register(
        EntityMapper::node(&["Person"])
            .on_after_create(|_e, _res| Err(MapperError::compile("hook failed")))
            .build(),
    );
    let mapper = GraphMapper::new(registry);

    let person = mapper
        .node(&["Person"], PropertyMap::new().with("name", "mark"))
        .unwrap();

    let mut conn = RecordingConnection::new();
    let mut work = mapper.work();
    work.save(&person).unwrap();
    let err = work.send(&mut conn).unwrap_err();

    assert!(matches!(err, MapperError::Compile { .. }));
    assert_eq!(conn.rollbacks(), 1);
    assert_eq!(conn.commits(), 0);
}

#[test]
fn test_relationship_delete_pipeline() {
    let log: Log = Default::default();
    let mut registry = Registry::new();
    registry.register(EntityMapper::node(&["Person"]).build());

    let (l1, l2, l3) = (log.clone(), log.clone(), log.clone());
    registry.register(
        EntityMapper::relationship("Knows")
            .on_before_delete(move |_e| {
                log_entry(&l1, "before_delete");
                Ok(())
            })
            .on_relationship_removed(move |event| {
                assert!(event.end.is_none());
                log_entry(&l2, "removed");
                Ok(())
            })
            .on_after_delete(move |_e, _res| {
                log_entry(&l3, "after_delete");
                Ok(())
            })
            .build(),
    );
    let mapper = GraphMapper::new(registry);

    let start = mapper
        .node(&["Person"], PropertyMap::new().with("id", 1i64))
        .unwrap();
    let end = mapper
        .node(&["Person"], PropertyMap::new().with("id", 2i64))
        .unwrap();
    let rel = mapper
        .relationship("Knows", PropertyMap::new().with("id", 9i64), &start, &end)
        .unwrap();

    let mut conn = RecordingConnection::new();
    let mut work = mapper.work();
    work.delete_with(&rel, true).unwrap();
    work.send(&mut conn).unwrap();

    assert_eq!(*log.borrow(), vec!["before_delete", "removed", "after_delete"]);
}
