use node_lens::graph::model::{JsonGraph, NodeRow, PathSegment, RowKind};
use node_lens::modal::node_modal::{
    json_path_to_string, normalize_node_rows, ModalEvent, NodeModal,
};
use node_lens::persistence::persist::SessionFile;
use serde_json::{json, Value};
use uuid::Uuid;

fn scalar_row(key: Option<&str>, value: Value) -> NodeRow {
    let kind = RowKind::of(&value);
    NodeRow { key: key.map(|k| k.to_string()), value, kind }
}

fn composite_row(key: &str, kind: RowKind, preview: &str) -> NodeRow {
    NodeRow {
        key: Some(key.to_string()),
        value: Value::String(preview.to_string()),
        kind,
    }
}

fn key(k: &str) -> PathSegment {
    PathSegment::Key(k.to_string())
}

fn idx(i: usize) -> PathSegment {
    PathSegment::Index(i)
}

#[test]
fn normalizer_empty_rows_yield_empty_object() {
    assert_eq!(normalize_node_rows(&[]), "{}");
}

#[test]
fn normalizer_single_keyless_row_renders_bare_scalar() {
    assert_eq!(normalize_node_rows(&[scalar_row(None, json!(42))]), "42");
    assert_eq!(normalize_node_rows(&[scalar_row(None, json!("Alice"))]), "Alice");
    assert_eq!(normalize_node_rows(&[scalar_row(None, json!(true))]), "true");
    assert_eq!(normalize_node_rows(&[scalar_row(None, Value::Null)]), "null");
}

#[test]
fn normalizer_multi_row_excludes_composites_and_keyless_rows() {
    let rows = vec![
        composite_row("address", RowKind::Object, "{2 keys}"),
        scalar_row(Some("name"), json!("Alice")),
        scalar_row(None, json!("stray")),
        composite_row("tags", RowKind::Array, "[3 items]"),
        scalar_row(Some("qty"), json!(3)),
    ];
    let out = normalize_node_rows(&rows);
    let parsed: Value = serde_json::from_str(&out).expect("normalizer output must be valid JSON");
    assert_eq!(parsed, json!({"name": "Alice", "qty": 3}));
}

#[test]
fn normalizer_output_is_two_space_indented() {
    let rows = vec![
        scalar_row(Some("name"), json!("Alice")),
        composite_row("tags", RowKind::Array, "[0 items]"),
    ];
    assert_eq!(normalize_node_rows(&rows), "{\n  \"name\": \"Alice\"\n}");
}

#[test]
fn path_formatter_renders_bracket_paths() {
    assert_eq!(json_path_to_string(&[]), "$");
    assert_eq!(
        json_path_to_string(&[key("a"), idx(1), key("b")]),
        "$[\"a\"][1][\"b\"]"
    );
    assert_eq!(json_path_to_string(&[idx(0), key("customer")]), "$[0][\"customer\"]");
    assert_eq!(json_path_to_string(&[key("customer"), idx(0)]), "$[\"customer\"][0]");
}

#[test]
fn ingest_object_document_builds_rows_and_children() {
    let graph = JsonGraph::from_value(json!({
        "customer": {"name": "Alice", "orders": [{"sku": "X"}, 2]},
        "open": true
    }));
    // root, customer, orders[0], orders[1]
    assert_eq!(graph.node_count(), 4);
    assert_eq!(graph.edge_count(), 3);

    let root_id = graph.find_node_by_path(&[]).expect("root node");
    let root = graph.get_node(root_id).unwrap();
    assert_eq!(root.kind, RowKind::Object);
    let customer_row = root
        .text
        .iter()
        .find(|r| r.key.as_deref() == Some("customer"))
        .expect("customer row");
    assert_eq!(customer_row.kind, RowKind::Object);
    assert_eq!(customer_row.value, json!("{2 keys}"));

    let customer_id = graph.find_node_by_path(&[key("customer")]).expect("customer node");
    let customer = graph.get_node(customer_id).unwrap();
    let orders_row = customer
        .text
        .iter()
        .find(|r| r.key.as_deref() == Some("orders"))
        .expect("orders row");
    assert_eq!(orders_row.kind, RowKind::Array);
    assert_eq!(orders_row.value, json!("[2 items]"));

    // Array elements hang off the object node directly
    let first = graph
        .find_node_by_path(&[key("customer"), key("orders"), idx(0)])
        .expect("first order");
    assert_eq!(graph.get_node(first).unwrap().kind, RowKind::Object);
    let second = graph
        .find_node_by_path(&[key("customer"), key("orders"), idx(1)])
        .expect("second order");
    let leaf = graph.get_node(second).unwrap();
    assert_eq!(leaf.text.len(), 1);
    assert!(leaf.text[0].key.is_none());
    assert_eq!(leaf.text[0].value, json!(2));
}

#[test]
fn ingest_root_scalar_and_root_array() {
    let graph = JsonGraph::from_value(json!(42));
    assert_eq!(graph.node_count(), 1);
    let root = graph.get_node(graph.find_node_by_path(&[]).unwrap()).unwrap();
    assert_eq!(normalize_node_rows(&root.text), "42");
    assert_eq!(root.summary(), "$");

    let graph = JsonGraph::from_value(json!([1, {"a": 1}]));
    let root = graph.get_node(graph.find_node_by_path(&[]).unwrap()).unwrap();
    assert_eq!(root.kind, RowKind::Array);
    assert_eq!(root.text[0].value, json!("[2 items]"));
    assert_eq!(graph.edge_count(), 2);
    assert!(graph.find_node_by_path(&[idx(0)]).is_some());
    let second = graph.find_node_by_path(&[idx(1)]).expect("object element");
    assert_eq!(graph.get_node(second).unwrap().summary(), "[1]");
}

#[test]
fn update_node_fields_merges_scalar_fields_and_keeps_children() {
    let mut graph = JsonGraph::from_value(json!({"name": "Alice", "tags": [], "age": 30}));
    let root_id = graph.find_node_by_path(&[]).unwrap();

    assert!(graph.update_node_fields(root_id, json!({"name": "Bob", "city": "Rome"})));
    assert_eq!(graph.document, json!({"name": "Bob", "city": "Rome", "tags": []}));
    // Path unchanged, so the id survives the rebuild
    assert_eq!(graph.find_node_by_path(&[]), Some(root_id));
    let root = graph.get_node(root_id).unwrap();
    let name_row = root.text.iter().find(|r| r.key.as_deref() == Some("name")).unwrap();
    assert_eq!(name_row.value, json!("Bob"));
}

#[test]
fn update_node_fields_replaces_scalar_leaf_wholesale() {
    let mut graph = JsonGraph::from_value(json!({"orders": [1, 2]}));
    let leaf_id = graph.find_node_by_path(&[key("orders"), idx(1)]).unwrap();

    assert!(graph.update_node_fields(leaf_id, json!(99)));
    assert_eq!(graph.document, json!({"orders": [1, 99]}));
    assert_eq!(graph.find_node_by_path(&[key("orders"), idx(1)]), Some(leaf_id));
}

#[test]
fn update_node_fields_unknown_id_is_a_noop() {
    let mut graph = JsonGraph::from_value(json!({"name": "Alice"}));
    let before = graph.document.clone();
    assert!(!graph.update_node_fields(Uuid::now_v7(), json!({"name": "Bob"})));
    assert_eq!(graph.document, before);
}

#[test]
fn select_ignores_unknown_ids() {
    let mut graph = JsonGraph::from_value(json!({"name": "Alice"}));
    graph.select(Some(Uuid::now_v7()));
    assert!(graph.selected_node().is_none());
    let root_id = graph.find_node_by_path(&[]).unwrap();
    graph.select(Some(root_id));
    assert_eq!(graph.selected_node().map(|n| n.id), Some(root_id));
}

#[test]
fn modal_edit_and_save_updates_the_selected_node() {
    let mut graph = JsonGraph::from_value(json!({"name": "Alice", "tags": []}));
    let root_id = graph.find_node_by_path(&[]).unwrap();
    graph.select(Some(root_id));

    let mut modal = NodeModal::new();
    let rows = graph.selected_node().unwrap().text.clone();
    modal.start_edit(&rows);
    assert_eq!(modal.draft(), Some("{\n  \"name\": \"Alice\"\n}"));

    modal.set_draft("{\"name\":\"Bob\"}".to_string());
    let event = modal.save(&mut graph);
    assert_eq!(event, Some(ModalEvent::Saved));
    assert!(!modal.is_editing());
    assert_eq!(graph.document, json!({"name": "Bob", "tags": []}));
    // Selection survives the rebuild
    assert_eq!(graph.selected_node().map(|n| n.id), Some(root_id));
}

#[test]
fn modal_invalid_draft_keeps_editing_and_store_untouched() {
    let mut graph = JsonGraph::from_value(json!({"name": "Alice"}));
    let root_id = graph.find_node_by_path(&[]).unwrap();
    graph.select(Some(root_id));

    let mut modal = NodeModal::new();
    let rows = graph.selected_node().unwrap().text.clone();
    modal.start_edit(&rows);
    modal.set_draft("{name: Bob}".to_string());

    let event = modal.save(&mut graph);
    assert_eq!(event, Some(ModalEvent::InvalidDraft("Invalid JSON".to_string())));
    assert!(modal.is_editing());
    assert_eq!(modal.draft(), Some("{name: Bob}"));
    assert_eq!(graph.document, json!({"name": "Alice"}));
}

#[test]
fn modal_cancel_discards_draft_and_reseeds_on_reentry() {
    let mut graph = JsonGraph::from_value(json!({"name": "Alice"}));
    let root_id = graph.find_node_by_path(&[]).unwrap();
    graph.select(Some(root_id));

    let mut modal = NodeModal::new();
    let rows = graph.selected_node().unwrap().text.clone();
    modal.start_edit(&rows);
    modal.set_draft("garbage".to_string());
    modal.cancel();
    assert!(!modal.is_editing());
    assert_eq!(graph.document, json!({"name": "Alice"}));

    // The store moves on; re-entering edit mode reads the current state
    graph.update_node_fields(root_id, json!({"name": "Carol"}));
    let rows = graph.selected_node().unwrap().text.clone();
    modal.start_edit(&rows);
    assert_eq!(modal.draft(), Some("{\n  \"name\": \"Carol\"\n}"));
}

#[test]
fn modal_save_with_cleared_selection_drops_the_draft() {
    let mut graph = JsonGraph::from_value(json!({"name": "Alice"}));
    let root_id = graph.find_node_by_path(&[]).unwrap();
    graph.select(Some(root_id));

    let mut modal = NodeModal::new();
    let rows = graph.selected_node().unwrap().text.clone();
    modal.start_edit(&rows);
    graph.select(None);

    let event = modal.save(&mut graph);
    assert_eq!(event, None);
    assert!(!modal.is_editing());
    assert_eq!(graph.document, json!({"name": "Alice"}));
}

#[test]
fn session_positions_survive_id_regeneration() {
    let graph = JsonGraph::from_value(json!({"customer": {"name": "Alice"}}));
    let root_id = graph.find_node_by_path(&[]).unwrap();
    let customer_id = graph.find_node_by_path(&[key("customer")]).unwrap();

    let mut positions = std::collections::HashMap::new();
    positions.insert(root_id, egui::pos2(10.0, 20.0));
    positions.insert(customer_id, egui::pos2(190.0, 20.0));

    let session = SessionFile::from_runtime(&graph, &positions, egui::vec2(3.0, 4.0), 1.5);
    let (restored, restored_positions, pan, zoom) = session.to_runtime().expect("session restores");

    // Fresh ingest means fresh ids, but positions follow the paths
    let new_root = restored.find_node_by_path(&[]).unwrap();
    let new_customer = restored.find_node_by_path(&[key("customer")]).unwrap();
    assert_eq!(restored_positions.get(&new_root), Some(&egui::pos2(10.0, 20.0)));
    assert_eq!(restored_positions.get(&new_customer), Some(&egui::pos2(190.0, 20.0)));
    assert_eq!(pan, egui::vec2(3.0, 4.0));
    assert_eq!(zoom, 1.5);
    assert_eq!(restored.document, graph.document);
}
