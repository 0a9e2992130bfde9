//! The Node Content modal: shows the selected node's content as formatted
//! JSON, lets the user edit it inline, and shows the node's path within the
//! document. The controller only reads the store, except for the single
//! `update_node_fields` call on a successful save.

use eframe::egui;
use serde_json::Value;

use crate::graph::model::{JsonGraph, NodeRow, PathSegment};

/// Canonical JSON text for a node's rows.
///
/// A single keyless row is a scalar leaf and renders bare; otherwise the
/// scalar rows form an object serialized with 2-space indentation. Composite
/// rows are omitted because their content lives in child nodes.
pub fn normalize_node_rows(rows: &[NodeRow]) -> String {
    if rows.is_empty() {
        return "{}".to_string();
    }
    if rows.len() == 1 && rows[0].key.is_none() {
        return scalar_text(&rows[0].value);
    }
    let mut fields = serde_json::Map::new();
    for row in rows {
        if row.kind.is_composite() {
            continue;
        }
        if let Some(key) = &row.key {
            fields.insert(key.clone(), row.value.clone());
        }
    }
    serde_json::to_string_pretty(&Value::Object(fields)).unwrap_or_else(|_| "{}".to_string())
}

// Strings render bare; other scalars in their JSON text form.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Bracket path of a node within the document, e.g. `$["customer"][0]`.
/// An empty path is the document root, `$`.
pub fn json_path_to_string(path: &[PathSegment]) -> String {
    if path.is_empty() {
        return "$".to_string();
    }
    let segments: Vec<String> = path
        .iter()
        .map(|segment| match segment {
            PathSegment::Index(index) => index.to_string(),
            PathSegment::Key(key) => format!("\"{}\"", key),
        })
        .collect();
    format!("$[{}]", segments.join("]["))
}

/// The draft buffer exists only while editing; there is no mode flag to fall
/// out of sync with it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModalState {
    Viewing,
    Editing { draft: String },
}

/// Outcome of a save attempt, surfaced to the host's notification layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModalEvent {
    Saved,
    InvalidDraft(String),
}

pub struct NodeModal {
    state: ModalState,
}

impl NodeModal {
    pub fn new() -> Self {
        Self { state: ModalState::Viewing }
    }

    pub fn is_editing(&self) -> bool {
        matches!(self.state, ModalState::Editing { .. })
    }

    pub fn draft(&self) -> Option<&str> {
        match &self.state {
            ModalState::Editing { draft } => Some(draft.as_str()),
            ModalState::Viewing => None,
        }
    }

    /// Replace the draft; a no-op while viewing.
    pub fn set_draft(&mut self, text: String) {
        if let ModalState::Editing { draft } = &mut self.state {
            *draft = text;
        }
    }

    /// Enter edit mode, seeding the draft from the given rows.
    pub fn start_edit(&mut self, rows: &[NodeRow]) {
        self.state = ModalState::Editing { draft: normalize_node_rows(rows) };
    }

    /// Leave edit mode, discarding the draft. No store call is made.
    pub fn cancel(&mut self) {
        self.state = ModalState::Viewing;
    }

    /// Parse the draft and apply it to the selected node. On a parse failure
    /// the draft is kept and edit mode persists so the user can correct and
    /// retry. If the selection vanished while editing, the draft is dropped.
    pub fn save(&mut self, graph: &mut JsonGraph) -> Option<ModalEvent> {
        let ModalState::Editing { draft } = &self.state else {
            return None;
        };
        let Some(node) = graph.selected_node() else {
            self.state = ModalState::Viewing;
            return None;
        };
        match serde_json::from_str::<Value>(draft) {
            Ok(parsed) => {
                let id = node.id;
                graph.update_node_fields(id, parsed);
                self.state = ModalState::Viewing;
                Some(ModalEvent::Saved)
            }
            Err(_) => Some(ModalEvent::InvalidDraft("Invalid JSON".to_string())),
        }
    }

    /// Render the modal. Visibility is owned by the caller via `open`;
    /// closing while editing discards the draft.
    pub fn show(
        &mut self,
        ctx: &egui::Context,
        open: &mut bool,
        graph: &mut JsonGraph,
    ) -> Option<ModalEvent> {
        if !*open {
            if self.is_editing() {
                self.cancel();
            }
            return None;
        }
        // Selection cleared externally while editing: force-exit edit mode
        if self.is_editing() && graph.selected_node().is_none() {
            self.cancel();
        }

        let node_snapshot = graph.selected_node().cloned();
        // Actions to apply post-UI
        let mut do_start_edit = false;
        let mut do_save = false;
        let mut do_cancel = false;

        egui::Window::new("Node Content")
            .id(egui::Id::new("node_content_modal"))
            .open(open)
            .resizable(true)
            .collapsible(false)
            .show(ctx, |ui| {
                let Some(node) = &node_snapshot else {
                    ui.label("<no node selected>");
                    return;
                };
                ui.label(egui::RichText::new("Content").small().strong());
                match &mut self.state {
                    ModalState::Viewing => {
                        // Re-derived every frame so an external selection
                        // change shows up live
                        let code = normalize_node_rows(&node.text);
                        egui::ScrollArea::vertical()
                            .id_salt("node_content_view")
                            .max_height(250.0)
                            .show(ui, |ui| {
                                ui.monospace(code);
                            });
                        if ui.button("Edit").clicked() {
                            do_start_edit = true;
                        }
                    }
                    ModalState::Editing { draft } => {
                        egui::ScrollArea::vertical()
                            .id_salt("node_content_edit")
                            .max_height(250.0)
                            .show(ui, |ui| {
                                ui.add(
                                    egui::TextEdit::multiline(draft)
                                        .code_editor()
                                        .desired_rows(8)
                                        .desired_width(350.0),
                                );
                            });
                        ui.horizontal(|ui| {
                            if ui.button("Save").clicked() {
                                do_save = true;
                            }
                            if ui.button("Cancel").clicked() {
                                do_cancel = true;
                            }
                        });
                    }
                }
                ui.separator();
                ui.label(egui::RichText::new("JSON Path").small().strong());
                ui.monospace(json_path_to_string(&node.path));
            });

        // Apply actions
        if do_start_edit {
            if let Some(node) = &node_snapshot {
                self.start_edit(&node.text);
            }
        }
        if do_cancel {
            self.cancel();
        }
        let event = if do_save { self.save(graph) } else { None };
        // Closed via the title-bar button this frame: drop any draft
        if !*open && self.is_editing() {
            self.cancel();
        }
        event
    }
}

impl Default for NodeModal {
    fn default() -> Self {
        Self::new()
    }
}
