use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::ingest;

// Basic type alias for clarity
pub type NodeId = Uuid;

/// Kind tag for a row's value. `Object` and `Array` are the composite kinds;
/// their content lives in child nodes, not in the row itself.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowKind {
    Object,
    Array,
    String,
    Number,
    Boolean,
    Null,
}

impl RowKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Object(_) => RowKind::Object,
            Value::Array(_) => RowKind::Array,
            Value::String(_) => RowKind::String,
            Value::Number(_) => RowKind::Number,
            Value::Bool(_) => RowKind::Boolean,
            Value::Null => RowKind::Null,
        }
    }

    pub fn is_composite(self) -> bool {
        matches!(self, RowKind::Object | RowKind::Array)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RowKind::Object => "object",
            RowKind::Array => "array",
            RowKind::String => "string",
            RowKind::Number => "number",
            RowKind::Boolean => "boolean",
            RowKind::Null => "null",
        }
    }
}

/// One displayed field of a node's content. `key` is absent for a scalar or
/// root value; for composite rows `value` carries a preview text.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeRow {
    pub key: Option<String>,
    pub value: Value,
    pub kind: RowKind,
}

/// One step of a node's location in the source document: an object key or an
/// array index. An empty path means the document root.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeData {
    pub id: NodeId,
    pub kind: RowKind,
    pub text: Vec<NodeRow>,
    pub path: Vec<PathSegment>,
}

impl NodeData {
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Short canvas label: the node's place in the document, not its content.
    pub fn summary(&self) -> String {
        match self.path.last() {
            None => "$".to_string(),
            Some(PathSegment::Key(k)) => k.clone(),
            Some(PathSegment::Index(i)) => format!("[{}]", i),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Edge {
    pub from_node: NodeId,
    pub to_node: NodeId,
}

/// The graph store: the source document plus the node/edge set derived from
/// it, and the current selection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JsonGraph {
    pub document: Value,
    pub nodes: HashMap<NodeId, NodeData>,
    pub edges: Vec<Edge>,
    pub selected: Option<NodeId>,
}

impl JsonGraph {
    // Instantiate an empty graph (null document, single root node)
    pub fn new() -> Self {
        Self::from_value(Value::Null)
    }

    pub fn from_value(document: Value) -> Self {
        ingest::build_graph(document)
    }

    pub fn from_text(text: &str) -> anyhow::Result<Self> {
        let document: Value = serde_json::from_str(text)?;
        Ok(Self::from_value(document))
    }

    pub fn get_node(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(&id)
    }

    pub fn selected_node(&self) -> Option<&NodeData> {
        self.selected.and_then(|id| self.nodes.get(&id))
    }

    /// Set the selection; unknown ids clear it.
    pub fn select(&mut self, id: Option<NodeId>) {
        self.selected = id.filter(|id| self.nodes.contains_key(id));
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn find_node_by_path(&self, path: &[PathSegment]) -> Option<NodeId> {
        self.nodes
            .values()
            .find(|node| node.path.as_slice() == path)
            .map(|node| node.id)
    }

    /// Apply `parsed` as the new field content of the node identified by
    /// `id`, then re-derive the node/edge set from the document. Returns
    /// false when the id is unknown or its path no longer resolves.
    pub fn update_node_fields(&mut self, id: NodeId, parsed: Value) -> bool {
        let path = match self.nodes.get(&id) {
            Some(node) => node.path.clone(),
            None => return false,
        };
        let Some(slot) = value_at_path_mut(&mut self.document, &path) else {
            return false;
        };
        apply_fields(slot, parsed);
        self.rebuild_preserving_ids();
        true
    }

    // Rebuild nodes/edges from the document. Ids are preserved for nodes
    // whose path is unchanged so selection and canvas positions survive.
    fn rebuild_preserving_ids(&mut self) {
        let old_by_path: HashMap<Vec<PathSegment>, NodeId> = self
            .nodes
            .values()
            .map(|node| (node.path.clone(), node.id))
            .collect();
        let selected_path = self
            .selected
            .and_then(|id| self.nodes.get(&id))
            .map(|node| node.path.clone());

        let mut fresh = ingest::build_graph(self.document.clone());

        let mut remap: HashMap<NodeId, NodeId> = HashMap::new();
        for node in fresh.nodes.values() {
            if let Some(&old_id) = old_by_path.get(&node.path) {
                remap.insert(node.id, old_id);
            }
        }

        let mut nodes: HashMap<NodeId, NodeData> = HashMap::with_capacity(fresh.nodes.len());
        for (id, mut node) in fresh.nodes.drain() {
            let new_id = remap.get(&id).copied().unwrap_or(id);
            node.id = new_id;
            nodes.insert(new_id, node);
        }
        for edge in fresh.edges.iter_mut() {
            if let Some(&m) = remap.get(&edge.from_node) {
                edge.from_node = m;
            }
            if let Some(&m) = remap.get(&edge.to_node) {
                edge.to_node = m;
            }
        }

        self.nodes = nodes;
        self.edges = fresh.edges;
        self.selected = selected_path.and_then(|path| self.find_node_by_path(&path));
    }
}

impl Default for JsonGraph {
    fn default() -> Self {
        Self::new()
    }
}

fn value_at_path_mut<'a>(document: &'a mut Value, path: &[PathSegment]) -> Option<&'a mut Value> {
    let mut current = document;
    for segment in path {
        current = match segment {
            PathSegment::Key(key) => current.get_mut(key.as_str())?,
            PathSegment::Index(index) => current.get_mut(*index)?,
        };
    }
    Some(current)
}

// Object draft onto an object slot: replace the scalar field set, keep
// composite children the draft does not name. Anything else replaces the
// slot wholesale.
fn apply_fields(slot: &mut Value, parsed: Value) {
    match (slot, parsed) {
        (Value::Object(fields), Value::Object(new_fields)) => {
            let removed: Vec<String> = fields
                .iter()
                .filter(|(key, value)| {
                    !value.is_object() && !value.is_array() && !new_fields.contains_key(*key)
                })
                .map(|(key, _)| key.clone())
                .collect();
            for key in removed {
                fields.remove(&key);
            }
            for (key, value) in new_fields {
                fields.insert(key, value);
            }
        }
        (slot, parsed) => *slot = parsed,
    }
}
