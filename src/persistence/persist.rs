use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::macros::format_description;

use super::settings::AppSettings;
use crate::graph::model::{JsonGraph, NodeId};
use crate::modal::node_modal::json_path_to_string;

/// One saved session. Positions are keyed by the canonical path string so a
/// session survives node-id regeneration across ingests.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionFile {
    pub document_text: String,
    pub node_positions: Vec<(String, f32, f32)>,
    pub pan: (f32, f32),
    pub zoom: f32,
}

impl SessionFile {
    pub fn from_runtime(
        graph: &JsonGraph,
        node_positions: &HashMap<NodeId, egui::Pos2>,
        pan: egui::Vec2,
        zoom: f32,
    ) -> Self {
        let document_text = serde_json::to_string_pretty(&graph.document)
            .unwrap_or_else(|_| "null".to_string());
        let node_positions = node_positions
            .iter()
            .filter_map(|(id, pos)| {
                let node = graph.get_node(*id)?;
                Some((json_path_to_string(&node.path), pos.x, pos.y))
            })
            .collect();
        Self {
            document_text,
            node_positions,
            pan: (pan.x, pan.y),
            zoom,
        }
    }

    /// Convert a persisted SessionFile back into runtime structures. Fails
    /// when the stored document text no longer parses.
    pub fn to_runtime(
        self,
    ) -> anyhow::Result<(JsonGraph, HashMap<NodeId, egui::Pos2>, egui::Vec2, f32)> {
        let graph = JsonGraph::from_text(&self.document_text)?;
        let stored: HashMap<String, (f32, f32)> = self
            .node_positions
            .into_iter()
            .map(|(path, x, y)| (path, (x, y)))
            .collect();
        let positions: HashMap<NodeId, egui::Pos2> = graph
            .nodes
            .values()
            .filter_map(|node| {
                let (x, y) = stored.get(&json_path_to_string(&node.path))?;
                Some((node.id, egui::pos2(*x, *y)))
            })
            .collect();
        let pan = egui::vec2(self.pan.0, self.pan.1);
        Ok((graph, positions, pan, self.zoom))
    }
}

use std::sync::OnceLock;

static SETTINGS_OVERRIDE: OnceLock<AppSettings> = OnceLock::new();

pub fn set_settings_override(settings: AppSettings) {
    let _ = SETTINGS_OVERRIDE.set(settings);
}

fn autosave_dir() -> PathBuf {
    // If an override is set (e.g. from main.rs), use it.
    if let Some(settings) = SETTINGS_OVERRIDE.get() {
        return settings.autosave_dir();
    }
    // Load settings if present; else use defaults
    let settings = AppSettings::load().unwrap_or_default();
    settings.autosave_dir()
}

pub fn active_session_path() -> PathBuf {
    autosave_dir().join("session.ron")
}

pub fn versioned_session_path_now() -> PathBuf {
    let now = OffsetDateTime::now_utc();
    let fmt = format_description!("[year][month][day]_[hour][minute][second]");
    let stamp = now.format(fmt).unwrap_or_else(|_| "unknown".to_string());
    autosave_dir().join(format!("session_{}.ron", stamp))
}

fn ensure_autosave_dir() -> std::io::Result<()> {
    fs::create_dir_all(autosave_dir())
}

fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp_path = path.with_extension("ron.tmp");
    {
        let mut f = File::create(&tmp_path)?;
        f.write_all(data)?;
        f.flush()?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}

pub fn save_active(session: &SessionFile) -> anyhow::Result<PathBuf> {
    ensure_autosave_dir()?;
    let pretty = PrettyConfig::new()
        .separate_tuple_members(true)
        .enumerate_arrays(true);
    let s = ron::ser::to_string_pretty(session, pretty)?;
    let path = active_session_path();
    atomic_write(&path, s.as_bytes())?;
    Ok(path)
}

pub fn save_versioned(session: &SessionFile) -> anyhow::Result<PathBuf> {
    ensure_autosave_dir()?;
    let pretty = PrettyConfig::new()
        .separate_tuple_members(true)
        .enumerate_arrays(true);
    let s = ron::ser::to_string_pretty(session, pretty)?;
    let path = versioned_session_path_now();
    atomic_write(&path, s.as_bytes())?;
    Ok(path)
}

pub fn load_active() -> anyhow::Result<Option<SessionFile>> {
    let path = active_session_path();
    if !path.exists() {
        return Ok(None);
    }
    load_from_path(&path).map(Some)
}

pub fn load_from_path(path: &Path) -> anyhow::Result<SessionFile> {
    let mut f = File::open(path)?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let session: SessionFile = ron::from_str(&buf)?;
    Ok(session)
}

pub fn list_versions() -> anyhow::Result<Vec<PathBuf>> {
    let dir = autosave_dir();
    let mut entries: Vec<PathBuf> = Vec::new();
    if dir.exists() {
        for e in fs::read_dir(dir)? {
            let p = e?.path();
            if let Some(name) = p.file_name().and_then(|s| s.to_str())
                && name.starts_with("session_")
                && name.ends_with(".ron")
            {
                entries.push(p);
            }
        }
    }
    // sort descending by filename (timestamp)
    entries.sort();
    entries.reverse();
    Ok(entries)
}
