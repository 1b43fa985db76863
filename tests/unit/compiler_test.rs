//! Unit tests for the query compiler: the four operation shapes, the
//! endpoint resolution matrix, and the clause-grouping contract.

use cyphermap::{
    EntityMapper, GraphMapper, PropertyDef, PropertyMap, PropertyValue, QueryCompiler, Registry,
    VarAllocator,
};

fn mapper() -> GraphMapper {
    let mut registry = Registry::new();
    registry.register(EntityMapper::node(&["Person"]).build());
    registry.register(
        EntityMapper::node(&["Venue"])
            .property("name", PropertyDef::string().unique())
            .property("location", PropertyDef::string())
            .build(),
    );
    registry.register(EntityMapper::relationship("Knows").build());
    GraphMapper::new(registry)
}

#[test]
fn test_create_node_without_unique_fields() {
    let mapper = mapper();
    let node = mapper
        .node(&["Person"], PropertyMap::new().with("name", "mark"))
        .unwrap();

    let mut vars = VarAllocator::new();
    let compiled = QueryCompiler::new(mapper.registry(), &mut vars)
        .compile_save(&[node], false)
        .unwrap();

    assert_eq!(
        compiled.query,
        "CREATE (n_0:`Person` {`name`: $n_0_name_0}) RETURN n_0"
    );
    assert_eq!(
        compiled.params.get("n_0_name_0"),
        Some(&PropertyValue::String("mark".into()))
    );
    assert_eq!(compiled.params.len(), 1);
}

#[test]
fn test_create_node_with_unique_fields_compiles_to_upsert() {
    let mapper = mapper();
    let node = mapper
        .node(
            &["Venue"],
            PropertyMap::new().with("name", "mark").with("location", "nyc"),
        )
        .unwrap();

    let mut vars = VarAllocator::new();
    let compiled = QueryCompiler::new(mapper.registry(), &mut vars)
        .compile_save(&[node], false)
        .unwrap();

    // MERGE keys on the unique subset only; both set blocks cover all
    // fields in identical sorted order.
    assert_eq!(
        compiled.query,
        "MERGE (n_0:`Venue` {`name`: $n_0_name_0}) \
         ON CREATE SET n_0.`location` = $n_0_location_0, n_0.`name` = $n_0_name_0 \
         ON MATCH SET n_0.`location` = $n_0_location_0, n_0.`name` = $n_0_name_0 \
         RETURN n_0"
    );
    assert_eq!(compiled.params.len(), 2);
}

#[test]
fn test_upsert_set_blocks_are_byte_identical() {
    let mapper = mapper();
    let node = mapper
        .node(&["Venue"], PropertyMap::new().with("name", "x"))
        .unwrap();

    let mut vars = VarAllocator::new();
    let compiled = QueryCompiler::new(mapper.registry(), &mut vars)
        .compile_save(&[node], false)
        .unwrap();

    let on_create = compiled
        .query
        .split("ON CREATE SET ")
        .nth(1)
        .and_then(|rest| rest.split(" ON MATCH SET").next())
        .unwrap();
    let on_match = compiled
        .query
        .split("ON MATCH SET ")
        .nth(1)
        .and_then(|rest| rest.split(" RETURN").next())
        .unwrap();

    assert_eq!(on_create, on_match);
}

#[test]
fn test_multiple_creates_combine_into_one_clause() {
    let mapper = mapper();
    let a = mapper
        .node(&["Person"], PropertyMap::new().with("name", "mark"))
        .unwrap();
    let b = mapper
        .node(&["Person"], PropertyMap::new().with("name", "kram"))
        .unwrap();

    let mut vars = VarAllocator::new();
    let compiled = QueryCompiler::new(mapper.registry(), &mut vars)
        .compile_save(&[a, b], false)
        .unwrap();

    assert_eq!(
        compiled.query,
        "CREATE (n_0:`Person` {`name`: $n_0_name_0}), (n_1:`Person` {`name`: $n_1_name_0}) \
         RETURN n_0, n_1"
    );
    assert_eq!(compiled.params.len(), 2);
}

#[test]
fn test_identified_node_always_compiles_to_update() {
    let mapper = mapper();
    let node = mapper
        .node(
            &["Person"],
            PropertyMap::new().with("id", 999i64).with("name", "mark"),
        )
        .unwrap();

    let mut vars = VarAllocator::new();
    let compiled = QueryCompiler::new(mapper.registry(), &mut vars)
        .compile_save(&[node], false)
        .unwrap();

    assert_eq!(
        compiled.query,
        "MATCH (n_0) WHERE id(n_0) = $n_0_id_0 SET n_0.`name` = $n_0_name_0 RETURN n_0"
    );
    assert!(!compiled.query.contains("CREATE"));
    assert!(!compiled.query.contains("MERGE"));
    assert_eq!(compiled.params.get("n_0_id_0"), Some(&PropertyValue::Int(999)));
}

#[test]
fn test_delete_node_by_id() {
    let mapper = mapper();
    let node = mapper
        .node(&["Person"], PropertyMap::new().with("id", 999i64))
        .unwrap();

    let mut vars = VarAllocator::new();
    let compiled = QueryCompiler::new(mapper.registry(), &mut vars)
        .compile_delete(&[node], false)
        .unwrap()
        .unwrap();

    assert_eq!(
        compiled.query,
        "MATCH (n_0) WHERE id(n_0) = $n_0_id_0 DELETE n_0"
    );
}

#[test]
fn test_detach_delete_node() {
    let mapper = mapper();
    let node = mapper
        .node(&["Person"], PropertyMap::new().with("id", 999i64))
        .unwrap();

    let mut vars = VarAllocator::new();
    let compiled = QueryCompiler::new(mapper.registry(), &mut vars)
        .compile_delete(&[node], true)
        .unwrap()
        .unwrap();

    assert_eq!(
        compiled.query,
        "MATCH (n_0) WHERE id(n_0) = $n_0_id_0 DETACH DELETE n_0"
    );
}

#[test]
fn test_delete_of_unidentified_entity_produces_no_query() {
    let mapper = mapper();
    let node = mapper.node(&["Person"], PropertyMap::new()).unwrap();

    let mut vars = VarAllocator::new();
    let compiled = QueryCompiler::new(mapper.registry(), &mut vars)
        .compile_delete(&[node], false)
        .unwrap();

    assert!(compiled.is_none());
}

#[test]
fn test_relationship_between_existing_nodes() {
    let mapper = mapper();
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
        .relationship(
            "Knows",
            PropertyMap::new().with("since", "yesterday"),
            &start,
            &end,
        )
        .unwrap();

    let mut vars = VarAllocator::new();
    let compiled = QueryCompiler::new(mapper.registry(), &mut vars)
        .compile_save(&[rel], false)
        .unwrap();

    assert_eq!(
        compiled.query,
        "MATCH (n_0) WHERE id(n_0) = $n_0_id_0 \
         MATCH (n_1) WHERE id(n_1) = $n_1_id_0 \
         CREATE (n_0)-[r_0:`Knows` {`since`: $r_0_since_0}]->(n_1) \
         SET n_0.`name` = $n_0_name_0, n_1.`name` = $n_1_name_0 \
         RETURN n_0, n_1, r_0"
    );
    assert_eq!(compiled.params.len(), 5);
}

#[test]
fn test_relationship_merge_when_uniqueness_requested() {
    let mapper = mapper();
    let start = mapper
        .node(&["Person"], PropertyMap::new().with("id", 99i64))
        .unwrap();
    let end = mapper
        .node(&["Person"], PropertyMap::new().with("id", 88i64))
        .unwrap();
    let rel = mapper
        .relationship("Knows", PropertyMap::new(), &start, &end)
        .unwrap();

    let mut vars = VarAllocator::new();
    let compiled = QueryCompiler::new(mapper.registry(), &mut vars)
        .compile_save(&[rel], true)
        .unwrap();

    assert!(compiled.query.contains("MERGE (n_0)-[r_0:`Knows`]->(n_1)"));
}

#[test]
fn test_relationship_with_two_new_endpoints_inlines_them() {
    let mapper = mapper();
    let start = mapper
        .node(&["Person"], PropertyMap::new().with("name", "mark"))
        .unwrap();
    let end = mapper
        .node(&["Person"], PropertyMap::new().with("name", "kram"))
        .unwrap();
    let rel = mapper
        .relationship(
            "Knows",
            PropertyMap::new().with("since", "yesterday"),
            &start,
            &end,
        )
        .unwrap();

    let mut vars = VarAllocator::new();
    let compiled = QueryCompiler::new(mapper.registry(), &mut vars)
        .compile_save(&[rel], false)
        .unwrap();

    assert_eq!(
        compiled.query,
        "CREATE (n_0:`Person` {`name`: $n_0_name_0})\
         -[r_0:`Knows` {`since`: $r_0_since_0}]->\
         (n_1:`Person` {`name`: $n_1_name_0}) \
         RETURN n_0, n_1, r_0"
    );
    assert!(!compiled.query.contains("MATCH"));
    assert_eq!(compiled.params.len(), 3);
}

#[test]
fn test_relationship_endpoint_matrix_one_existing_one_new() {
    let mapper = mapper();
    let start = mapper
        .node(
            &["Person"],
            PropertyMap::new().with("id", 99i64).with("name", "mark"),
        )
        .unwrap();
    let end = mapper
        .node(&["Person"], PropertyMap::new().with("name", "kram"))
        .unwrap();
    let rel = mapper
        .relationship(
            "Knows",
            PropertyMap::new().with("since", "yesterday"),
            &start,
            &end,
        )
        .unwrap();

    let mut vars = VarAllocator::new();
    let compiled = QueryCompiler::new(mapper.registry(), &mut vars)
        .compile_save(&[rel], false)
        .unwrap();

    // Exactly one MATCH for the existing endpoint; the new endpoint
    // appears inline in the relationship clause.
    assert_eq!(compiled.query.matches("MATCH").count(), 1);
    assert_eq!(
        compiled.query,
        "MATCH (n_0) WHERE id(n_0) = $n_0_id_0 \
         CREATE (n_0)-[r_0:`Knows` {`since`: $r_0_since_0}]->(n_1:`Person` {`name`: $n_1_name_0}) \
         SET n_0.`name` = $n_0_name_0 \
         RETURN n_0, n_1, r_0"
    );
}

#[test]
fn test_new_unique_endpoints_hoist_into_merge_blocks() {
    let mapper = mapper();
    let start = mapper
        .node(&["Venue"], PropertyMap::new().with("name", "mark"))
        .unwrap();
    let end = mapper
        .node(&["Venue"], PropertyMap::new().with("name", "kram"))
        .unwrap();
    let rel = mapper
        .relationship(
            "Knows",
            PropertyMap::new().with("since", "yesterday"),
            &start,
            &end,
        )
        .unwrap();

    let mut vars = VarAllocator::new();
    let compiled = QueryCompiler::new(mapper.registry(), &mut vars)
        .compile_save(&[rel], false)
        .unwrap();

    assert_eq!(
        compiled.query,
        "MERGE (n_0:`Venue` {`name`: $n_0_name_0}) \
         ON CREATE SET n_0.`location` = $n_0_location_0, n_0.`name` = $n_0_name_0 \
         ON MATCH SET n_0.`location` = $n_0_location_0, n_0.`name` = $n_0_name_0 \
         MERGE (n_1:`Venue` {`name`: $n_1_name_0}) \
         ON CREATE SET n_1.`location` = $n_1_location_0, n_1.`name` = $n_1_name_0 \
         ON MATCH SET n_1.`location` = $n_1_location_0, n_1.`name` = $n_1_name_0 \
         CREATE (n_0)-[r_0:`Knows` {`since`: $r_0_since_0}]->(n_1) \
         RETURN n_0, n_1, r_0"
    );
    assert_eq!(compiled.params.len(), 5);
}

#[test]
fn test_two_relationships_share_matched_endpoints() {
    let mapper = mapper();
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
        .relationship(
            "Knows",
            PropertyMap::new().with("since", "yesterday"),
            &start,
            &end,
        )
        .unwrap();
    let rel2 = mapper
        .relationship(
            "Knows2",
            PropertyMap::new().with("since", "yesterday"),
            &start,
            &end,
        )
        .unwrap();

    let mut vars = VarAllocator::new();
    let compiled = QueryCompiler::new(mapper.registry(), &mut vars)
        .compile_save(&[rel, rel2], false)
        .unwrap();

    // One MATCH per endpoint even though two relationships reference
    // them; both relationship patterns share the endpoint variables.
    assert_eq!(compiled.query.matches("MATCH").count(), 2);
    assert_eq!(
        compiled.query,
        "MATCH (n_0) WHERE id(n_0) = $n_0_id_0 \
         MATCH (n_1) WHERE id(n_1) = $n_1_id_0 \
         CREATE (n_0)-[r_0:`Knows` {`since`: $r_0_since_0}]->(n_1), \
         (n_0)-[r_1:`Knows2` {`since`: $r_1_since_0}]->(n_1) \
         SET n_0.`name` = $n_0_name_0, n_1.`name` = $n_1_name_0 \
         RETURN n_0, n_1, r_0, r_1"
    );
}

#[test]
fn test_existing_relationship_compiles_to_anchored_update() {
    let mapper = mapper();
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
        .relationship(
            "Knows",
            PropertyMap::new().with("id", 447788i64).with("since", "today"),
            &start,
            &end,
        )
        .unwrap();

    let mut vars = VarAllocator::new();
    let compiled = QueryCompiler::new(mapper.registry(), &mut vars)
        .compile_save(&[rel], false)
        .unwrap();

    assert_eq!(
        compiled.query,
        "MATCH (n_0) WHERE id(n_0) = $n_0_id_0 \
         MATCH (n_1) WHERE id(n_1) = $n_1_id_0 \
         MATCH (n_0)-[r_0:`Knows`]->(n_1) WHERE id(r_0) = $r_0_id_0 \
         SET n_0.`name` = $n_0_name_0, n_1.`name` = $n_1_name_0, r_0.`since` = $r_0_since_0 \
         RETURN n_0, n_1, r_0"
    );
    assert_eq!(compiled.params.len(), 6);
}

#[test]
fn test_relationship_delete_uses_anonymous_pattern() {
    let mapper = mapper();
    let start = mapper
        .node(&["Person"], PropertyMap::new().with("id", 1i64))
        .unwrap();
    let end = mapper
        .node(&["Person"], PropertyMap::new().with("id", 2i64))
        .unwrap();
    let rel = mapper
        .relationship("Knows", PropertyMap::new().with("id", 8989i64), &start, &end)
        .unwrap();

    let mut vars = VarAllocator::new();
    let compiled = QueryCompiler::new(mapper.registry(), &mut vars)
        .compile_delete(&[rel], true)
        .unwrap()
        .unwrap();

    // Detach is forced off for relationship deletes.
    assert_eq!(
        compiled.query,
        "MATCH ()-[r_0]-() WHERE id(r_0) = $r_0_id_0 DELETE r_0"
    );
}

#[test]
fn test_missing_endpoint_is_fatal() {
    let mapper = mapper();
    let rel = cyphermap::Entity::relationship("Knows", None, None).into_ref();

    let mut vars = VarAllocator::new();
    let err = QueryCompiler::new(mapper.registry(), &mut vars)
        .compile_save(&[rel], false)
        .unwrap_err();

    assert!(matches!(
        err,
        cyphermap::MapperError::MissingEndpoint { end: "start", .. }
    ));
}

#[test]
fn test_param_names_scoped_by_variable() {
    let mapper = mapper();
    let a = mapper
        .node(&["Person"], PropertyMap::new().with("name", "mark"))
        .unwrap();
    let b = mapper
        .node(&["Person"], PropertyMap::new().with("name", "mark"))
        .unwrap();

    let mut vars = VarAllocator::new();
    let compiled = QueryCompiler::new(mapper.registry(), &mut vars)
        .compile_save(&[a, b], false)
        .unwrap();

    // Same field name on two entities stays unambiguous through the
    // variable prefix.
    assert!(compiled.params.contains_key("n_0_name_0"));
    assert!(compiled.params.contains_key("n_1_name_0"));
}
