#![allow(clippy::collapsible_if)]
#![allow(clippy::needless_return)]
use std::collections::HashMap;
use std::time::{Duration, Instant};

use eframe::egui::{self, Color32, Pos2, Rect, Sense, Stroke, Vec2};
use serde_json::Value;

use crate::graph::model::{JsonGraph, NodeId, NodeRow, RowKind};
use crate::modal::node_modal::{json_path_to_string, ModalEvent, NodeModal};
use crate::persistence::persist::{self, SessionFile};
use crate::persistence::settings::AppSettings;

const SAMPLE_DOCUMENT: &str = include_str!("../../assets/sample.json");

// Export the current document as pretty JSON
fn export_document_json(graph: &JsonGraph, path: &std::path::Path) -> std::io::Result<()> {
    use std::fs::File;
    use std::io::Write;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let f = File::create(path)?;
    serde_json::to_writer_pretty(f, &graph.document)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    // ensure newline at end
    let mut f2 = std::fs::OpenOptions::new().append(true).open(path)?;
    let _ = f2.write_all(b"\n");
    Ok(())
}

// Export the flattened row table, one record per row per node
fn export_rows_csv(graph: &JsonGraph, path: &std::path::Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(path)?;
    // headers: path,key,kind,value_json
    wtr.write_record(["path", "key", "kind", "value_json"])?;
    let mut ids: Vec<NodeId> = graph.nodes.keys().copied().collect();
    ids.sort();
    for id in ids {
        if let Some(node) = graph.get_node(id) {
            let path_str = json_path_to_string(&node.path);
            for row in &node.text {
                let value_json =
                    serde_json::to_string(&row.value).unwrap_or_else(|_| "null".into());
                wtr.write_record(&[
                    path_str.clone(),
                    row.key.clone().unwrap_or_default(),
                    row.kind.as_str().to_string(),
                    value_json,
                ])?;
            }
        }
    }
    wtr.flush()?;
    Ok(())
}

// Style for toast notifications
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum NoticeStyle {
    Subtle,
    Prominent,
    Error,
}

pub struct LensApp {
    graph: JsonGraph,
    node_positions: HashMap<NodeId, Pos2>,
    dragging: Option<NodeId>,
    pan: Vec2,
    zoom: f32,
    // persistence
    dirty: bool,
    last_change: Instant,
    last_save: Instant,
    save_error: Option<String>,
    last_save_info: Option<String>,
    // Timestamp for transient info banner (e.g., "Saved" toast)
    last_info_time: Option<Instant>,
    // Visual style for the transient info toast
    last_info_style: NoticeStyle,
    show_load_versions: bool,
    // Sidebar: raw document editor
    sidebar_open: bool,
    document_draft: String,
    document_error: Option<String>,
    // Node content modal
    node_modal: NodeModal,
    node_modal_open: bool,
    // Export modal
    show_export_window: bool,
    export_is_json: bool,
    export_path: String,
    export_status: Option<String>,
    // Layout control
    re_layout_pending: bool,
    // Remember last canvas rect for resize-stable panning
    last_canvas_rect: Option<Rect>,
    // Focus/hover state for dimming/highlighting
    hover_node: Option<NodeId>,
    // Transient zoom HUD (show current zoom briefly when scrolling)
    zoom_hud_until: Option<Instant>,
    // Level-of-detail (LOD) label controls
    lod_enabled: bool,
    lod_label_min_zoom: f32,
    lod_hide_labels_node_threshold: usize,
    // App settings and Preferences UI state
    app_settings: AppSettings,
    show_prefs_window: bool,
    prefs_edit: AppSettings,
    prefs_status: Option<String>,
    prefs_autosave_override_str: String,
    prefs_export_override_str: String,
}

impl LensApp {
    pub fn new(graph: JsonGraph) -> Self {
        let settings = AppSettings::load().unwrap_or_default();
        let mut s = Self {
            graph,
            node_positions: HashMap::new(),
            dragging: None,
            pan: Vec2::ZERO,
            zoom: 1.0,
            dirty: false,
            last_change: Instant::now(),
            last_save: Instant::now(),
            save_error: None,
            last_save_info: None,
            last_info_time: None,
            last_info_style: NoticeStyle::Prominent,
            show_load_versions: false,
            sidebar_open: true,
            document_draft: String::new(),
            document_error: None,
            node_modal: NodeModal::new(),
            node_modal_open: false,
            show_export_window: false,
            export_is_json: true,
            export_path: String::new(),
            export_status: None,
            re_layout_pending: true,
            last_canvas_rect: None,
            hover_node: None,
            zoom_hud_until: None,
            lod_enabled: true,
            lod_label_min_zoom: 0.7,
            lod_hide_labels_node_threshold: 200,
            app_settings: settings.clone(),
            show_prefs_window: false,
            prefs_edit: AppSettings::default(),
            prefs_status: None,
            prefs_autosave_override_str: String::new(),
            prefs_export_override_str: String::new(),
        };
        // Apply settings to runtime toggles
        s.lod_enabled = s.app_settings.lod_enabled;
        s.lod_label_min_zoom = s.app_settings.lod_label_min_zoom;
        s.lod_hide_labels_node_threshold = s.app_settings.lod_hide_labels_node_threshold;
        s.refresh_document_draft();
        s
    }

    /// Start from the built-in sample document.
    pub fn with_sample() -> Self {
        let graph = JsonGraph::from_text(SAMPLE_DOCUMENT).unwrap_or_else(|_| JsonGraph::new());
        Self::new(graph)
    }

    /// Restore a saved session; falls back to the sample document when the
    /// session no longer parses.
    pub fn from_session(session: SessionFile) -> Self {
        match session.to_runtime() {
            Ok((graph, positions, pan, zoom)) => {
                let mut s = Self::new(graph);
                s.node_positions = positions;
                s.pan = pan;
                s.zoom = zoom;
                s.re_layout_pending = false;
                s
            }
            Err(e) => {
                let mut s = Self::with_sample();
                s.save_error = Some(format!("Session restore failed: {}", e));
                s
            }
        }
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
        self.last_change = Instant::now();
    }

    fn set_notice(&mut self, msg: impl Into<String>, style: NoticeStyle) {
        self.last_save_info = Some(msg.into());
        self.last_info_time = Some(Instant::now());
        self.last_info_style = style;
    }

    fn save_now_with(&mut self, style: NoticeStyle) {
        let session = SessionFile::from_runtime(&self.graph, &self.node_positions, self.pan, self.zoom);
        match persist::save_active(&session) {
            Ok(path) => {
                self.dirty = false;
                self.last_save = Instant::now();
                self.save_error = None;
                self.set_notice(format!("Saved to {}", path.display()), style);
            }
            Err(e) => {
                self.save_error = Some(format!("Save failed: {}", e));
            }
        }
    }

    fn save_now(&mut self) {
        self.save_now_with(NoticeStyle::Prominent);
    }

    fn save_versioned_now(&mut self) {
        let session = SessionFile::from_runtime(&self.graph, &self.node_positions, self.pan, self.zoom);
        match persist::save_versioned(&session) {
            Ok(path) => {
                self.last_save = Instant::now();
                self.save_error = None;
                self.set_notice(format!("Saved version {}", path.display()), NoticeStyle::Prominent);
            }
            Err(e) => self.save_error = Some(format!("Save version failed: {}", e)),
        }
    }

    fn load_session(&mut self, session: SessionFile, label: &str) {
        match session.to_runtime() {
            Ok((graph, positions, pan, zoom)) => {
                self.graph = graph;
                self.node_positions = positions;
                self.pan = pan;
                self.zoom = zoom;
                self.node_modal_open = false;
                self.re_layout_pending = false;
                self.dirty = false;
                self.last_change = Instant::now();
                self.save_error = None;
                self.refresh_document_draft();
                self.set_notice(format!("Loaded {}", label), NoticeStyle::Prominent);
            }
            Err(e) => {
                self.save_error = Some(format!("Load failed: {}", e));
            }
        }
    }

    pub fn menu_load_latest(&mut self) {
        match persist::load_active() {
            Ok(Some(session)) => self.load_session(session, "latest session"),
            Ok(None) => {
                self.save_error = Some("No active session file found".into());
            }
            Err(e) => {
                self.save_error = Some(format!("Load failed: {}", e));
            }
        }
    }

    pub fn menu_new_document(&mut self) {
        // Back up the current session if it holds more than an empty document
        if !self.graph.document.is_null() {
            self.save_versioned_now();
        }
        self.graph = JsonGraph::new();
        self.node_positions.clear();
        self.node_modal_open = false;
        self.re_layout_pending = true;
        self.refresh_document_draft();
        self.document_error = None;
        self.mark_dirty();
    }

    pub fn menu_reset_view(&mut self) {
        self.pan = Vec2::ZERO;
        self.zoom = 1.0;
        self.mark_dirty();
    }

    pub fn menu_open_prefs(&mut self) {
        // Prepare editable copy and open the window
        self.prefs_edit = self.app_settings.clone();
        self.prefs_autosave_override_str = match &self.prefs_edit.autosave_override {
            Some(p) => p.display().to_string(),
            None => String::new(),
        };
        self.prefs_export_override_str = match &self.prefs_edit.export_override {
            Some(p) => p.display().to_string(),
            None => String::new(),
        };
        self.prefs_status = None;
        self.show_prefs_window = true;
    }

    fn refresh_document_draft(&mut self) {
        self.document_draft = serde_json::to_string_pretty(&self.graph.document)
            .unwrap_or_else(|_| "null".to_string());
    }

    fn apply_document_draft(&mut self) {
        match JsonGraph::from_text(&self.document_draft) {
            Ok(graph) => {
                self.graph = graph;
                self.node_positions.clear();
                self.node_modal_open = false;
                self.re_layout_pending = true;
                self.document_error = None;
                self.mark_dirty();
            }
            Err(e) => {
                self.document_error = Some(format!("Parse failed: {}", e));
            }
        }
    }

    fn load_sample(&mut self) {
        self.document_draft = SAMPLE_DOCUMENT.to_string();
        self.apply_document_draft();
    }

    // Stable drawing/layout order: by path, ties broken by id
    fn layout_order(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.graph.nodes.keys().copied().collect();
        ids.sort_by(|a, b| {
            let pa = &self.graph.nodes[a].path;
            let pb = &self.graph.nodes[b].path;
            pa.cmp(pb).then(a.cmp(b))
        });
        ids
    }

    // Hierarchical layout: one column per path depth, siblings stacked in
    // path order. Document trees have a known depth structure, so this is
    // deterministic and needs no physics settling.
    fn compute_tree_layout(&self, rect: Rect) -> HashMap<NodeId, Pos2> {
        let mut columns: Vec<Vec<NodeId>> = Vec::new();
        for id in self.layout_order() {
            let depth = self.graph.nodes[&id].depth();
            if columns.len() <= depth {
                columns.resize(depth + 1, Vec::new());
            }
            columns[depth].push(id);
        }

        let column_width = 180.0_f32;
        let left = rect.left() + 90.0;
        let mut out: HashMap<NodeId, Pos2> = HashMap::new();
        for (depth, ids) in columns.iter().enumerate() {
            let step = rect.height() / (ids.len() as f32 + 1.0);
            for (i, id) in ids.iter().enumerate() {
                let x = left + depth as f32 * column_width;
                let y = rect.top() + step * (i as f32 + 1.0);
                out.insert(*id, Pos2::new(x, y));
            }
        }
        out
    }

    fn ensure_layout(&mut self, rect: Rect) {
        if self.node_positions.len() >= self.graph.nodes.len() {
            return;
        }
        // Fill in only nodes that are currently missing a position; existing
        // positions (manual drags, previous sessions) are preserved.
        let layout = self.compute_tree_layout(rect);
        for (id, pos) in layout {
            self.node_positions.entry(id).or_insert(pos);
        }
    }

    fn apply_tree_layout_all(&mut self, rect: Rect) {
        self.node_positions = self.compute_tree_layout(rect);
        self.re_layout_pending = false;
        self.mark_dirty();
    }

    fn get_or_init_position(&mut self, id: NodeId, rect: Rect) -> Pos2 {
        if let Some(p) = self.node_positions.get(&id) {
            return *p;
        }
        // Newly created nodes not yet laid out: drop them near the center
        let pos = rect.center();
        self.node_positions.insert(id, pos);
        pos
    }

    fn color_for_kind(kind: RowKind) -> Color32 {
        match kind {
            RowKind::Object => Color32::from_rgb(0x7b, 0xa3, 0xff),  // blue
            RowKind::Array => Color32::from_rgb(0xff, 0xa3, 0x7b),   // orange
            RowKind::String => Color32::from_rgb(0x7b, 0xff, 0xa3),  // green
            RowKind::Number => Color32::from_rgb(0xff, 0xe0, 0x7b),  // yellow
            RowKind::Boolean => Color32::from_rgb(0xe0, 0x7b, 0xff), // purple
            RowKind::Null => Color32::from_rgb(0x9a, 0x9a, 0x9a),    // gray
        }
    }
}

fn row_text(row: &NodeRow) -> String {
    let value = match &row.value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    match &row.key {
        Some(key) => format!("{}: {}", key, value),
        None => value,
    }
}

impl eframe::App for LensApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Preferences window
        if self.show_prefs_window {
            let mut open = true;
            egui::Window::new("Preferences")
                .open(&mut open)
                .resizable(true)
                .collapsible(false)
                .show(ctx, |ui| {
                    ui.heading("General");
                    ui.separator();

                    // Autosave directory override
                    ui.label("Autosave directory (leave empty for OS default):");
                    ui.text_edit_singleline(&mut self.prefs_autosave_override_str);
                    if ui.button("Clear to default (OS temp)").clicked() {
                        self.prefs_autosave_override_str.clear();
                    }

                    ui.add_space(8.0);
                    // Export directory override
                    ui.label("Export directory (leave empty for OS temp):");
                    ui.text_edit_singleline(&mut self.prefs_export_override_str);
                    if ui.button("Clear to default (OS temp)").clicked() {
                        self.prefs_export_override_str.clear();
                    }

                    ui.add_space(8.0);
                    ui.heading("Labels");
                    ui.checkbox(&mut self.prefs_edit.lod_enabled, "Hide labels when zoomed out");
                    ui.add(
                        egui::Slider::new(&mut self.prefs_edit.lod_label_min_zoom, 0.25..=1.5)
                            .text("min zoom for labels"),
                    );
                    ui.add(
                        egui::Slider::new(
                            &mut self.prefs_edit.lod_hide_labels_node_threshold,
                            10..=2000,
                        )
                        .text("node count threshold"),
                    );

                    ui.add_space(8.0);
                    // Show where the settings file is stored on this system (read-only info)
                    ui.label("Settings save directory:");
                    ui.monospace(AppSettings::settings_dir().display().to_string());

                    ui.separator();
                    ui.horizontal(|ui| {
                        if ui.button("Save").clicked() {
                            let autosave = self.prefs_autosave_override_str.trim();
                            self.prefs_edit.autosave_override = if autosave.is_empty() {
                                None
                            } else {
                                Some(std::path::PathBuf::from(autosave))
                            };
                            let export = self.prefs_export_override_str.trim();
                            self.prefs_edit.export_override = if export.is_empty() {
                                None
                            } else {
                                Some(std::path::PathBuf::from(export))
                            };
                            match self.prefs_edit.save() {
                                Ok(()) => {
                                    self.app_settings = self.prefs_edit.clone();
                                    self.lod_enabled = self.app_settings.lod_enabled;
                                    self.lod_label_min_zoom = self.app_settings.lod_label_min_zoom;
                                    self.lod_hide_labels_node_threshold =
                                        self.app_settings.lod_hide_labels_node_threshold;
                                    self.prefs_status = None;
                                    self.show_prefs_window = false;
                                    self.set_notice("Preferences saved", NoticeStyle::Prominent);
                                }
                                Err(e) => {
                                    self.prefs_status = Some(format!("Save failed: {}", e));
                                }
                            }
                        }
                        if ui.button("Cancel").clicked() {
                            self.show_prefs_window = false;
                        }
                    });
                    if let Some(status) = &self.prefs_status {
                        ui.colored_label(Color32::RED, status);
                    }
                });
            if !open {
                self.show_prefs_window = false;
            }
        }

        // Export document modal
        if self.show_export_window {
            let mut open = true;
            egui::Window::new("Export Document")
                .open(&mut open)
                .resizable(true)
                .collapsible(false)
                .show(ctx, |ui| {
                    ui.horizontal(|ui| {
                        if ui.selectable_label(self.export_is_json, "JSON").clicked() {
                            self.export_is_json = true;
                        }
                        if ui.selectable_label(!self.export_is_json, "CSV rows").clicked() {
                            self.export_is_json = false;
                        }
                    });
                    ui.label("Target file:");
                    ui.text_edit_singleline(&mut self.export_path);
                    ui.horizontal(|ui| {
                        if ui.button("Export").clicked() {
                            let path = std::path::PathBuf::from(self.export_path.trim());
                            let res = if self.export_is_json {
                                export_document_json(&self.graph, &path)
                            } else {
                                export_rows_csv(&self.graph, &path)
                            };
                            self.export_status = Some(match res {
                                Ok(()) => format!("Exported to {}", path.display()),
                                Err(e) => format!("Export failed: {}", e),
                            });
                        }
                        if ui.button("Cancel").clicked() {
                            self.show_export_window = false;
                        }
                    });
                    if let Some(status) = &self.export_status {
                        ui.small(status);
                    }
                });
            if !open {
                self.show_export_window = false;
            }
        }

        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            // Check for keyboard shortcuts
            if ctx.input_mut(|i| {
                i.consume_shortcut(&egui::KeyboardShortcut::new(egui::Modifiers::COMMAND, egui::Key::S))
            }) {
                self.save_now();
            }
            if ctx.input_mut(|i| {
                i.consume_shortcut(&egui::KeyboardShortcut::new(
                    egui::Modifiers::COMMAND | egui::Modifiers::SHIFT,
                    egui::Key::S,
                ))
            }) {
                self.save_versioned_now();
            }
            if ctx.input_mut(|i| {
                i.consume_shortcut(&egui::KeyboardShortcut::new(egui::Modifiers::COMMAND, egui::Key::N))
            }) {
                self.menu_new_document();
            }
            if ctx.input_mut(|i| {
                i.consume_shortcut(&egui::KeyboardShortcut::new(egui::Modifiers::COMMAND, egui::Key::O))
            }) {
                self.menu_load_latest();
            }

            // Use compact menus so options remain accessible regardless of width
            ui.horizontal(|ui| {
                ui.label("Node-Lens");

                // File menu:
                ui.menu_button("File", |ui| {
                    if ui
                        .add(egui::Button::new("Save Session").shortcut_text(ctx.format_shortcut(
                            &egui::KeyboardShortcut::new(egui::Modifiers::COMMAND, egui::Key::S),
                        )))
                        .clicked()
                    {
                        self.save_now();
                        ui.close();
                    }
                    if ui
                        .add(egui::Button::new("Save Session As").shortcut_text(
                            ctx.format_shortcut(&egui::KeyboardShortcut::new(
                                egui::Modifiers::COMMAND | egui::Modifiers::SHIFT,
                                egui::Key::S,
                            )),
                        ))
                        .clicked()
                    {
                        self.save_versioned_now();
                        ui.close();
                    }
                    if ui.button("Export Document…").clicked() {
                        self.show_export_window = true;
                        // Initialize default path if empty
                        if self.export_path.is_empty() {
                            let now = time::OffsetDateTime::now_utc();
                            let fmt = time::macros::format_description!(
                                "[year][month][day]_[hour][minute][second]"
                            );
                            let stamp = now.format(&fmt).unwrap_or_else(|_| "now".into());
                            let ext = if self.export_is_json { "json" } else { "csv" };
                            let mut base = self.app_settings.export_dir();
                            base.push(format!("document_export_{}.{}", stamp, ext));
                            self.export_path = base.display().to_string();
                        }
                        ui.close();
                    }
                    if ui
                        .add(egui::Button::new("Load Latest").shortcut_text(ctx.format_shortcut(
                            &egui::KeyboardShortcut::new(egui::Modifiers::COMMAND, egui::Key::O),
                        )))
                        .clicked()
                    {
                        self.menu_load_latest();
                        ui.close();
                    }
                    if ui.button("Load Version…").clicked() {
                        self.show_load_versions = true;
                        ui.close();
                    }
                    ui.separator();
                    if ui
                        .add(egui::Button::new("New Document").shortcut_text(ctx.format_shortcut(
                            &egui::KeyboardShortcut::new(egui::Modifiers::COMMAND, egui::Key::N),
                        )))
                        .clicked()
                    {
                        self.menu_new_document();
                        ui.close();
                    }
                    ui.separator();
                    if ui
                        .add(egui::Button::new("Quit").shortcut_text(ctx.format_shortcut(
                            &egui::KeyboardShortcut::new(egui::Modifiers::COMMAND, egui::Key::Q),
                        )))
                        .clicked()
                    {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                        ui.close();
                    }
                });

                ui.menu_button("View", |ui| {
                    if ui.button("Reset View").clicked() {
                        self.menu_reset_view();
                        ui.close();
                    }
                    if ui.button("Re-layout").clicked() {
                        self.re_layout_pending = true;
                        ui.close();
                    }
                    ui.separator();
                    ui.label("Zoom");
                    ui.add(
                        egui::Slider::new(&mut self.zoom, 0.25..=2.0)
                            .clamping(egui::SliderClamping::Always),
                    );
                });

                ui.menu_button("Window", |ui| {
                    let toggle_sidebar = if self.sidebar_open { "Hide Sidebar" } else { "Show Sidebar" };
                    if ui.button(toggle_sidebar).clicked() {
                        self.sidebar_open = !self.sidebar_open;
                        ui.close();
                    }
                    if ui.button("Close Node Window").clicked() {
                        self.node_modal_open = false;
                        ui.close();
                    }
                });

                // Settings/Preferences
                ui.menu_button("Settings", |ui| {
                    if ui.button("Preferences…").clicked() {
                        self.menu_open_prefs();
                        ui.close();
                    }
                });

                // Keep a tiny status label; avoid long texts to prevent hiding on small widths
                ui.small(format!("N:{} E:{}", self.graph.node_count(), self.graph.edge_count()));
                if let Some(err) = &self.save_error {
                    ui.separator();
                    ui.colored_label(Color32::RED, err);
                }
            });
        });

        // Sidebar: raw document editor
        if self.sidebar_open {
            egui::SidePanel::left("document_sidebar")
                .resizable(true)
                .default_width(320.0)
                .show(ctx, |ui| {
                    ui.heading("Document");
                    ui.separator();
                    egui::ScrollArea::vertical()
                        .id_salt("document_editor")
                        .max_height((ui.available_height() - 70.0).max(60.0))
                        .show(ui, |ui| {
                            ui.add(
                                egui::TextEdit::multiline(&mut self.document_draft)
                                    .code_editor()
                                    .desired_rows(24)
                                    .desired_width(f32::INFINITY),
                            );
                        });
                    ui.horizontal(|ui| {
                        if ui.button("Apply").on_hover_text("Parse the text and rebuild the graph").clicked() {
                            self.apply_document_draft();
                        }
                        if ui.button("Reload").on_hover_text("Re-derive the text from the current document").clicked() {
                            self.refresh_document_draft();
                            self.document_error = None;
                        }
                        if ui.button("Sample").clicked() {
                            self.load_sample();
                        }
                    });
                    if let Some(err) = &self.document_error {
                        ui.colored_label(Color32::RED, err);
                    }
                });
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            // Detect canvas size/position changes and adjust pan to keep view stable
            let prev_rect = self.last_canvas_rect;
            let available = ui.available_rect_before_wrap();
            if let Some(prev) = prev_rect {
                if prev != available {
                    let dc = available.center() - prev.center();
                    // Keep screen positions stable across resize: adjust pan by dc * (zoom - 1)
                    self.pan += dc * (self.zoom - 1.0);
                }
            }
            self.last_canvas_rect = Some(available);
            // If a re-layout was requested, apply before drawing
            if self.re_layout_pending {
                self.apply_tree_layout_all(available);
            }
            self.ensure_layout(available);

            // Background allocation for panning/clicking; nodes get first
            // priority for drag, bg_resp gets what's left.
            let bg_resp = ui.allocate_rect(available, Sense::click_and_drag());

            // Helpers to transform between world and screen space
            let center = available.center();
            let zoom = self.zoom;
            let pan = self.pan;
            let to_screen = move |p: Pos2| -> Pos2 {
                Pos2::new(
                    (p.x - center.x) * zoom + center.x + pan.x,
                    (p.y - center.y) * zoom + center.y + pan.y,
                )
            };

            // Zoom with scroll only when pointer is over the canvas area
            if bg_resp.hovered() {
                let scroll = ui.input(|i| i.raw_scroll_delta.y);
                if scroll != 0.0 {
                    let factor = (1.0 + scroll * 0.001).clamp(0.9, 1.1);
                    self.zoom = (self.zoom * factor).clamp(0.25, 2.0);
                    // Show transient zoom HUD
                    self.zoom_hud_until = Some(Instant::now() + Duration::from_millis(1000));
                    ui.ctx().request_repaint_after(Duration::from_millis(16));
                }
            }

            let painter = ui.painter_at(available);

            // Draw transient zoom HUD if active
            if let Some(until) = self.zoom_hud_until {
                let now = Instant::now();
                if now < until {
                    let text = format!("{:.2}x", self.zoom);
                    let font = egui::FontId::proportional(14.0);
                    let galley = ui.painter().layout_no_wrap(text, font, Color32::WHITE);
                    let pad = Vec2::new(8.0, 4.0);
                    let size = galley.size() + pad * 2.0;
                    let pos = Pos2::new(available.center().x - size.x * 0.5, available.top() + 12.0);
                    let rect = Rect::from_min_size(pos, size);
                    let bg = Color32::from_rgba_premultiplied(20, 20, 20, 200);
                    painter.rect_filled(rect, 8.0, bg);
                    painter.galley(pos + pad, galley, Color32::WHITE);
                    ui.ctx().request_repaint_after(Duration::from_millis(16));
                } else {
                    self.zoom_hud_until = None;
                }
            }

            // Compute hover over nearest node within radius in screen space;
            // suppressed while a node is being dragged
            let mut hover_node: Option<NodeId> = None;
            if self.dragging.is_none() {
                if let Some(mouse_pos) = ui.ctx().pointer_hover_pos() {
                    let node_radius = 10.0 * self.zoom;
                    let mut best_d2 = f32::INFINITY;
                    for id in self.graph.nodes.keys() {
                        if let Some(pw) = self.node_positions.get(id) {
                            let ps = to_screen(*pw);
                            let dx = ps.x - mouse_pos.x;
                            let dy = ps.y - mouse_pos.y;
                            let d2 = dx * dx + dy * dy;
                            if d2 <= (node_radius * node_radius) && d2 < best_d2 {
                                best_d2 = d2;
                                hover_node = Some(*id);
                            }
                        }
                    }
                }
            }
            self.hover_node = hover_node;

            // Draw edges with adaptive opacity
            let edge_count = self.graph.edge_count();
            let base_alpha: u8 = if self.zoom < 0.7 || edge_count > 600 {
                120
            } else if self.zoom < 0.9 || edge_count > 300 {
                160
            } else {
                200
            };
            let base_color = Color32::from_rgba_premultiplied(200, 200, 200, base_alpha);
            let edge_stroke = Stroke { width: 1.5, color: base_color };
            for edge in &self.graph.edges {
                if let (Some(pa), Some(pb)) = (
                    self.node_positions.get(&edge.from_node),
                    self.node_positions.get(&edge.to_node),
                ) {
                    let a = to_screen(*pa);
                    let b = to_screen(*pb);
                    let incident_hover = self
                        .hover_node
                        .map(|h| h == edge.from_node || h == edge.to_node)
                        .unwrap_or(false);
                    // Highlight edges touching the selected node while its window is open
                    let is_sel = self.node_modal_open
                        && self
                            .graph
                            .selected
                            .map(|s| s == edge.from_node || s == edge.to_node)
                            .unwrap_or(false);
                    let mut stroke = if is_sel {
                        Stroke { width: 3.0, color: Color32::from_rgb(255, 200, 80) }
                    } else if incident_hover {
                        Stroke { width: 2.5, color: Color32::from_rgb(120, 220, 255) }
                    } else {
                        edge_stroke
                    };
                    // Dim edges when hovering another node
                    if self.hover_node.is_some() && !incident_hover && !is_sel {
                        let c = stroke.color;
                        stroke.color = Color32::from_rgba_premultiplied(
                            c.r(),
                            c.g(),
                            c.b(),
                            (c.a() as f32 * 0.4) as u8,
                        );
                    }
                    painter.line_segment([a, b], stroke);
                }
            }

            // Draw and interact with nodes
            let node_radius_draw = 10.0 * self.zoom; // scale with zoom for easier hit testing
            let mut clicked_node: Option<NodeId> = None;
            let mut any_node_dragged = false;

            // Iterate over a snapshot of ids to avoid borrowing conflicts when we
            // lazily initialize positions.
            let node_ids: Vec<NodeId> = self.graph.nodes.keys().copied().collect();
            for id in node_ids {
                // Be resilient if a node is missing a precomputed position
                let pos_world = self.get_or_init_position(id, available);
                let node = match self.graph.nodes.get(&id) {
                    Some(n) => n,
                    None => continue,
                };
                let pos_screen = to_screen(pos_world);
                let rect = Rect::from_center_size(pos_screen, Vec2::splat(node_radius_draw * 2.0));
                let resp = ui.allocate_rect(rect, Sense::click_and_drag());

                if resp.dragged() {
                    self.dragging = Some(id);
                    any_node_dragged = true;
                    let delta = resp.drag_delta() / self.zoom;
                    if let Some(p) = self.node_positions.get_mut(&id) {
                        *p += delta;
                    }
                }

                if resp.clicked() {
                    clicked_node = Some(id);
                }

                // Hover tooltip: show readable details without cluttering the canvas
                let summary = node.summary();
                let kind = node.kind;
                let path_str = json_path_to_string(&node.path);
                let rows: Vec<String> = node.text.iter().take(5).map(row_text).collect();
                let more = node.text.len().saturating_sub(5);
                resp.on_hover_ui(|ui| {
                    ui.label(egui::RichText::new(format!("{} ({})", summary, kind.as_str())).strong());
                    ui.monospace(path_str);
                    for line in &rows {
                        ui.small(line);
                    }
                    if more > 0 {
                        ui.small(format!("(+{} more)", more));
                    }
                });

                // Visuals
                // A node is visually selected only if the content modal is open for it
                let is_selected = self.graph.selected == Some(id) && self.node_modal_open;
                let fill = if is_selected {
                    Color32::from_rgb(80, 120, 255)
                } else {
                    Color32::from_rgb(60, 60, 60)
                };
                let stroke = if is_selected {
                    Stroke::new(2.0, Color32::WHITE)
                } else {
                    Stroke::new(1.5, Self::color_for_kind(kind))
                };
                painter.circle_filled(pos_screen, node_radius_draw, fill);
                painter.circle_stroke(pos_screen, node_radius_draw, stroke);

                // Label with kind-based color coding and LOD rules
                let show_label = if !self.lod_enabled {
                    true
                } else {
                    let many = self.graph.node_count() >= self.lod_hide_labels_node_threshold;
                    let zoom_ok = self.zoom >= self.lod_label_min_zoom;
                    let is_hover = self.hover_node == Some(id);
                    let is_sel = self.graph.selected == Some(id);
                    (!many && zoom_ok) || is_hover || is_sel
                };
                if show_label {
                    let label_color = Self::color_for_kind(kind);
                    let pos_text = pos_screen + Vec2::new(0.0, -node_radius_draw - 4.0);
                    // shadow pass for readability
                    painter.text(
                        pos_text + Vec2::new(1.0, 1.0),
                        egui::Align2::CENTER_BOTTOM,
                        &summary,
                        egui::FontId::proportional((14.0 * self.zoom).clamp(10.0, 22.0)),
                        Color32::BLACK,
                    );
                    painter.text(
                        pos_text,
                        egui::Align2::CENTER_BOTTOM,
                        &summary,
                        egui::FontId::proportional((14.0 * self.zoom).clamp(10.0, 22.0)),
                        label_color,
                    );
                }
            }

            if let Some(id) = clicked_node {
                // Toggle behavior: re-clicking the selected node closes its window
                if self.graph.selected == Some(id) && self.node_modal_open {
                    self.node_modal_open = false;
                    self.graph.select(None);
                } else {
                    self.graph.select(Some(id));
                    self.node_modal_open = true;
                }
            }

            if !any_node_dragged {
                self.dragging = None;
                // Background panning when no node is being dragged
                let delta = bg_resp.drag_delta();
                if delta != Vec2::ZERO {
                    self.pan += delta;
                    self.mark_dirty();
                }
            }
            if any_node_dragged {
                self.mark_dirty();
            }
        });

        // Node content modal; its events feed the notification layer
        let modal_event = self.node_modal.show(ctx, &mut self.node_modal_open, &mut self.graph);
        match modal_event {
            Some(ModalEvent::Saved) => {
                // The save may have reshaped the graph; drop positions of
                // nodes that no longer exist
                self.node_positions.retain(|id, _| self.graph.nodes.contains_key(id));
                self.refresh_document_draft();
                self.mark_dirty();
                self.set_notice("Node updated", NoticeStyle::Subtle);
            }
            Some(ModalEvent::InvalidDraft(msg)) => {
                self.set_notice(msg, NoticeStyle::Error);
            }
            None => {}
        }
        // If the modal was closed this frame, drop the selection with it
        if !self.node_modal_open && self.graph.selected.is_some() {
            self.graph.select(None);
        }

        // Autosave logic: only after edits (5 seconds after the last change, prominent)
        let now = Instant::now();
        if self.dirty && now.duration_since(self.last_change) >= Duration::from_secs(5) {
            self.save_now_with(NoticeStyle::Prominent);
        }

        // Load Versions modal
        if self.show_load_versions {
            let mut open = true;
            let mut to_load: Option<std::path::PathBuf> = None;
            egui::Window::new("Load Version")
                .collapsible(false)
                .resizable(true)
                .open(&mut open)
                .show(ctx, |ui| {
                    match persist::list_versions() {
                        Ok(versions) if !versions.is_empty() => {
                            egui::ScrollArea::vertical().max_height(250.0).show(ui, |ui| {
                                for path in versions {
                                    let label = path
                                        .file_name()
                                        .and_then(|s| s.to_str())
                                        .unwrap_or("version")
                                        .to_string();
                                    if ui.button(&label).clicked() {
                                        to_load = Some(path.clone());
                                    }
                                }
                            });
                        }
                        Ok(_) => {
                            ui.label("No saved versions found.");
                        }
                        Err(e) => {
                            ui.colored_label(Color32::RED, format!("List failed: {}", e));
                        }
                    }
                });
            if let Some(path) = to_load {
                match persist::load_from_path(&path) {
                    Ok(session) => {
                        let label = path
                            .file_name()
                            .and_then(|s| s.to_str())
                            .unwrap_or("version")
                            .to_string();
                        self.load_session(session, &label);
                        open = false;
                    }
                    Err(e) => {
                        self.save_error = Some(format!("Load failed: {}", e));
                    }
                }
            }
            self.show_load_versions = open;
        }

        // Bottom-right transient "saved"/info toast (visible for 3 seconds)
        if let (Some(msg), Some(when)) = (&self.last_save_info, self.last_info_time) {
            if Instant::now().duration_since(when) <= Duration::from_secs(3) {
                let margin = egui::vec2(12.0, 12.0);
                egui::Area::new("bottom_right_toast".into())
                    .anchor(egui::Align2::RIGHT_BOTTOM, egui::vec2(-margin.x, -margin.y))
                    .interactable(false)
                    .show(ctx, |ui| {
                        let (fill, stroke_col, stroke_w, text_col, inner_margin) =
                            match self.last_info_style {
                                NoticeStyle::Subtle => (
                                    Color32::from_rgba_premultiplied(20, 20, 20, 170),
                                    Color32::from_gray(60),
                                    0.5,
                                    Color32::from_gray(200),
                                    egui::Margin::symmetric(8, 6),
                                ),
                                NoticeStyle::Prominent => (
                                    Color32::from_rgba_premultiplied(30, 30, 30, 230),
                                    Color32::from_gray(100),
                                    1.5,
                                    Color32::LIGHT_GREEN,
                                    egui::Margin::symmetric(12, 8),
                                ),
                                NoticeStyle::Error => (
                                    Color32::from_rgba_premultiplied(45, 20, 20, 230),
                                    Color32::from_rgb(120, 60, 60),
                                    1.5,
                                    Color32::from_rgb(255, 130, 130),
                                    egui::Margin::symmetric(12, 8),
                                ),
                            };
                        egui::Frame::popup(ui.style())
                            .corner_radius(egui::CornerRadius::same(8))
                            .stroke(Stroke { width: stroke_w, color: stroke_col })
                            .fill(fill)
                            .inner_margin(inner_margin)
                            .show(ui, |ui| match self.last_info_style {
                                NoticeStyle::Subtle => {
                                    ui.small(egui::RichText::new(msg).color(text_col));
                                }
                                _ => {
                                    ui.colored_label(text_col, msg);
                                }
                            });
                    });
            }
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        // Last chance to flush an unsaved session before the process exits
        if self.dirty {
            self.save_now_with(NoticeStyle::Subtle);
        }
    }
}
