//! Flattens a JSON document into the node/edge set the canvas and the node
//! content modal work on. Objects become row-list nodes; composite entries
//! fan out into child nodes; scalars become keyless leaves.

use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

use super::model::{Edge, JsonGraph, NodeData, NodeId, NodeRow, PathSegment, RowKind};

pub fn build_graph(document: Value) -> JsonGraph {
    let mut builder = Builder::default();
    builder.walk(&document, Vec::new(), None);
    JsonGraph {
        document,
        nodes: builder.nodes,
        edges: builder.edges,
        selected: None,
    }
}

/// Preview text shown in place of a composite value, e.g. `{3 keys}`.
pub fn preview(value: &Value) -> String {
    match value {
        Value::Object(map) => format!("{{{} keys}}", map.len()),
        Value::Array(items) => format!("[{} items]", items.len()),
        other => other.to_string(),
    }
}

#[derive(Default)]
struct Builder {
    nodes: HashMap<NodeId, NodeData>,
    edges: Vec<Edge>,
}

impl Builder {
    fn add_node(
        &mut self,
        kind: RowKind,
        text: Vec<NodeRow>,
        path: Vec<PathSegment>,
        parent: Option<NodeId>,
    ) -> NodeId {
        let id = Uuid::now_v7();
        self.nodes.insert(id, NodeData { id, kind, text, path });
        if let Some(from_node) = parent {
            self.edges.push(Edge { from_node, to_node: id });
        }
        id
    }

    fn walk(&mut self, value: &Value, path: Vec<PathSegment>, parent: Option<NodeId>) {
        match value {
            Value::Object(map) => {
                let mut rows = Vec::with_capacity(map.len());
                for (key, field) in map {
                    let kind = RowKind::of(field);
                    let row_value = if kind.is_composite() {
                        Value::String(preview(field))
                    } else {
                        field.clone()
                    };
                    rows.push(NodeRow { key: Some(key.clone()), value: row_value, kind });
                }
                let id = self.add_node(RowKind::Object, rows, path.clone(), parent);
                for (key, field) in map {
                    if RowKind::of(field).is_composite() {
                        let mut child_path = path.clone();
                        child_path.push(PathSegment::Key(key.clone()));
                        self.walk_composite_entry(field, child_path, id);
                    }
                }
            }
            Value::Array(items) => {
                // A bare array (document root, or an array element that is
                // itself an array): one preview row, one child per element.
                let rows = vec![NodeRow {
                    key: None,
                    value: Value::String(preview(value)),
                    kind: RowKind::Array,
                }];
                let id = self.add_node(RowKind::Array, rows, path.clone(), parent);
                for (index, item) in items.iter().enumerate() {
                    let mut child_path = path.clone();
                    child_path.push(PathSegment::Index(index));
                    self.walk(item, child_path, Some(id));
                }
            }
            scalar => {
                let kind = RowKind::of(scalar);
                let rows = vec![NodeRow { key: None, value: scalar.clone(), kind }];
                self.add_node(kind, rows, path, parent);
            }
        }
    }

    // A composite entry of an object: arrays fan out one child per element
    // linked straight to the object's node, objects become one child node.
    fn walk_composite_entry(&mut self, value: &Value, path: Vec<PathSegment>, parent: NodeId) {
        match value {
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    let mut child_path = path.clone();
                    child_path.push(PathSegment::Index(index));
                    self.walk(item, child_path, Some(parent));
                }
            }
            other => self.walk(other, path, Some(parent)),
        }
    }
}
