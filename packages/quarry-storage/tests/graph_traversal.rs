use serde_json::json;

use quarry_storage::{
	GraphStore,
	db::Db,
	graph::{self, GraphImport, PgGraphStore},
	models::{GraphTraversal, TraversalDirection},
};
use quarry_testkit::TestDatabase;

fn sample_import() -> GraphImport {
	serde_json::from_value(json!({
		"nodes": [
			{ "label": "Person", "name": "Alan Turing", "document_id": "doc-turing" },
			{ "label": "Place", "name": "Bletchley Park", "document_id": "doc-bletchley" },
			{ "label": "Project", "name": "Enigma", "content": "Cipher machine broken at Bletchley." },
			{ "label": "Person", "name": "Joan Clarke" }
		],
		"edges": [
			{ "source": "Alan Turing", "target": "Bletchley Park", "relation": "worked_at" },
			{ "source": "Bletchley Park", "target": "Enigma", "relation": "decrypted" },
			{ "source": "Joan Clarke", "target": "Bletchley Park", "relation": "worked_at" },
			{ "source": "Enigma", "target": "Alan Turing", "relation": "studied_by" }
		]
	}))
	.expect("Failed to parse graph import.")
}

fn traversal(start: &str, max_depth: u32, direction: TraversalDirection) -> GraphTraversal {
	GraphTraversal {
		start: start.to_string(),
		max_depth,
		relationship_types: Vec::new(),
		direction,
		limit: 50,
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set QUARRY_PG_DSN to run."]
async fn traversal_honors_depth_direction_and_relation_filters() {
	let Some(base_dsn) = quarry_testkit::env_dsn() else {
		eprintln!("Skipping traversal_honors_depth_direction_and_relation_filters; set QUARRY_PG_DSN to run.");

		return;
	};
	let test_db = TestDatabase::create(&base_dsn).await.expect("Failed to create test database.");
	let cfg = test_db.postgres_config();
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	let report =
		graph::import_graph(&db.pool, &sample_import()).await.expect("Failed to import graph.");

	assert_eq!((report.nodes, report.edges), (4, 4));

	let store = PgGraphStore::new(db.pool.clone());
	let one_hop = store
		.traverse(&traversal("alan  turing", 1, TraversalDirection::Outgoing))
		.await
		.expect("Failed to traverse.");

	assert_eq!(one_hop.len(), 1);
	assert_eq!(one_hop[0].length, 1);
	assert_eq!(one_hop[0].nodes[1].name, "Bletchley Park");

	let two_hops = store
		.traverse(&traversal("Alan Turing", 3, TraversalDirection::Outgoing))
		.await
		.expect("Failed to traverse.");
	let lengths: Vec<u32> = two_hops.iter().map(|path| path.length).collect();

	// The Enigma -> Alan Turing edge closes a cycle and must not be followed.
	assert_eq!(lengths, vec![1, 2]);

	let incoming = store
		.traverse(&traversal("Bletchley Park", 1, TraversalDirection::Incoming))
		.await
		.expect("Failed to traverse.");

	assert_eq!(incoming.len(), 2);

	let mut filtered = traversal("Bletchley Park", 1, TraversalDirection::Both);

	filtered.relationship_types = vec!["decrypted".to_string()];

	let filtered = store.traverse(&filtered).await.expect("Failed to traverse.");

	assert_eq!(filtered.len(), 1);
	assert_eq!(filtered[0].relationships[0].relation, "decrypted");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set QUARRY_PG_DSN to run."]
async fn import_rejects_edges_to_unknown_nodes() {
	let Some(base_dsn) = quarry_testkit::env_dsn() else {
		eprintln!("Skipping import_rejects_edges_to_unknown_nodes; set QUARRY_PG_DSN to run.");

		return;
	};
	let test_db = TestDatabase::create(&base_dsn).await.expect("Failed to create test database.");
	let cfg = test_db.postgres_config();
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	let import: GraphImport = serde_json::from_value(json!({
		"nodes": [{ "label": "Person", "name": "Grace Hopper" }],
		"edges": [{ "source": "Grace Hopper", "target": "COBOL", "relation": "designed" }]
	}))
	.expect("Failed to parse graph import.");
	let err = graph::import_graph(&db.pool, &import).await.expect_err("Expected a missing node.");

	assert!(matches!(err, quarry_storage::Error::NotFound(_)));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set QUARRY_PG_DSN to run."]
async fn import_requires_labels_for_shared_names() {
	let Some(base_dsn) = quarry_testkit::env_dsn() else {
		eprintln!("Skipping import_requires_labels_for_shared_names; set QUARRY_PG_DSN to run.");

		return;
	};
	let test_db = TestDatabase::create(&base_dsn).await.expect("Failed to create test database.");
	let cfg = test_db.postgres_config();
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	let nodes = json!([
		{ "label": "Person", "name": "Mercury" },
		{ "label": "Planet", "name": "Mercury" },
		{ "label": "Mission", "name": "Messenger" }
	]);
	let ambiguous: GraphImport = serde_json::from_value(json!({
		"nodes": nodes,
		"edges": [{ "source": "Messenger", "target": "Mercury", "relation": "orbited" }]
	}))
	.expect("Failed to parse graph import.");
	let err = graph::import_graph(&db.pool, &ambiguous)
		.await
		.expect_err("Expected an ambiguous edge endpoint.");

	assert!(matches!(err, quarry_storage::Error::InvalidArgument(_)));

	let labeled: GraphImport = serde_json::from_value(json!({
		"nodes": nodes,
		"edges": [{
			"source": "Messenger",
			"target": "Mercury",
			"target_label": "Planet",
			"relation": "orbited"
		}]
	}))
	.expect("Failed to parse graph import.");
	let report = graph::import_graph(&db.pool, &labeled).await.expect("Failed to import graph.");

	assert_eq!((report.nodes, report.edges), (3, 1));

	let paths = PgGraphStore::new(db.pool.clone())
		.traverse(&traversal("messenger", 1, TraversalDirection::Outgoing))
		.await
		.expect("Failed to traverse graph.");

	assert_eq!(paths.len(), 1);
	assert_eq!(paths[0].terminal().map(|node| node.label.as_str()), Some("Planet"));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
