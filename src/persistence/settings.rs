use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    // If None, use OS default autosave directory
    pub autosave_override: Option<PathBuf>,
    // If None, use OS temporary directory for exports
    #[serde(default)]
    pub export_override: Option<PathBuf>,
    // Persist label LOD settings between runs
    pub lod_enabled: bool,
    pub lod_label_min_zoom: f32,
    pub lod_hide_labels_node_threshold: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            autosave_override: None,
            export_override: None,
            lod_enabled: true,
            lod_label_min_zoom: 0.7,
            lod_hide_labels_node_threshold: 200,
        }
    }
}

impl AppSettings {
    fn config_dir() -> PathBuf {
        // Cross-platform user config dir
        #[cfg(target_os = "macos")]
        {
            // ~/Library/Application Support/Node-Lens
            let home = std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("~"));
            return home.join("Library").join("Application Support").join("Node-Lens");
        }
        #[cfg(target_os = "windows")]
        {
            // %APPDATA%\Node-Lens
            if let Ok(appdata) = std::env::var("APPDATA") {
                return PathBuf::from(appdata).join("Node-Lens");
            }
            return PathBuf::from("Node-Lens");
        }
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            // $XDG_CONFIG_HOME/Node-Lens or ~/.config/Node-Lens
            if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
                return PathBuf::from(xdg).join("Node-Lens");
            }
            let home = std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("~"));
            return home.join(".config").join("Node-Lens");
        }
    }

    fn autosave_default_dir() -> PathBuf {
        // Cross-platform user-writable autosave dir
        #[cfg(target_os = "macos")]
        {
            let tmp = std::env::var_os("TMPDIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/tmp"));
            return tmp.join("Node-Lens");
        }
        #[cfg(target_os = "windows")]
        {
            // %LOCALAPPDATA%\Node-Lens\Autosave else TEMP
            if let Ok(local) = std::env::var("LOCALAPPDATA") {
                return PathBuf::from(local).join("Node-Lens").join("Autosave");
            }
            if let Ok(temp) = std::env::var("TEMP") {
                return PathBuf::from(temp).join("Node-Lens");
            }
            return PathBuf::from("Node-Lens");
        }
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            // $XDG_STATE_HOME/node-lens or ~/.local/state/node-lens, else /tmp/Node-Lens
            if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
                return PathBuf::from(xdg).join("node-lens");
            }
            if let Ok(home) = std::env::var("HOME") {
                return PathBuf::from(home).join(".local").join("state").join("node-lens");
            }
            return PathBuf::from("/tmp").join("Node-Lens");
        }
    }

    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_dir().join("settings.json");
        if path.exists() {
            let mut f = std::fs::File::open(path)?;
            let mut s = String::new();
            f.read_to_string(&mut s)?;
            let v: Self = serde_json::from_str(&s)?;
            return Ok(v);
        }
        Ok(Self::default())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let dir = Self::config_dir();
        fs::create_dir_all(&dir)?;
        let path = dir.join("settings.json");
        let s = serde_json::to_string_pretty(self)?;
        let mut f = std::fs::File::create(path)?;
        f.write_all(s.as_bytes())?;
        Ok(())
    }

    pub fn autosave_dir(&self) -> PathBuf {
        if let Some(p) = &self.autosave_override {
            return p.clone();
        }
        Self::autosave_default_dir()
    }

    /// Return the directory where the settings file (settings.json) is stored.
    /// This is OS-specific and resolves to a per-user configuration directory.
    pub fn settings_dir() -> PathBuf {
        Self::config_dir()
    }

    /// Default export directory when no override is set: OS temporary directory.
    /// Example: {temp_dir}/Node-Lens/exports
    pub fn export_default_dir() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push("Node-Lens");
        p.push("exports");
        p
    }

    /// Effective export directory honoring user override or falling back to OS temp.
    pub fn export_dir(&self) -> PathBuf {
        if let Some(p) = &self.export_override {
            return p.clone();
        }
        Self::export_default_dir()
    }
}
