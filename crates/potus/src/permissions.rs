//! Persisted permission decisions.
//!
//! Always-allow choices made at the confirmation prompt land in a single
//! JSON document at `<workdir>/.potus/settings.json`:
//!
//! ```json
//! {"permissions": {"file_edit": "allow"}}
//! ```
//!
//! Keys are lower-cased tool names; the only recognized value is
//! `"allow"`. Anything else is ignored on read, which keeps the document
//! forward-compatible.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Project-local permission settings.
#[derive(Debug)]
pub struct Settings {
    path: PathBuf,
    permissions: Mutex<HashMap<String, String>>,
}

#[derive(Serialize, Deserialize, Default)]
struct SettingsDoc {
    #[serde(default)]
    permissions: HashMap<String, String>,
}

impl Settings {
    /// Load settings for a working directory; a missing or unreadable
    /// document yields empty settings.
    pub fn load(workdir: &Path) -> Self {
        let path = workdir.join(".potus").join("settings.json");
        let doc = fs::read_to_string(&path)
            .ok()
            .and_then(|data| serde_json::from_str::<SettingsDoc>(&data).ok())
            .unwrap_or_default();

        Self {
            path,
            permissions: Mutex::new(doc.permissions),
        }
    }

    /// Whether the tool has a persisted always-allow.
    pub fn is_allowed(&self, tool: &str) -> bool {
        self.permissions
            .lock()
            .expect("settings lock poisoned")
            .get(&tool.to_lowercase())
            .map(|v| v == "allow")
            .unwrap_or(false)
    }

    /// Record an always-allow for the tool (in memory; call
    /// [`save`](Self::save) to persist).
    pub fn set_allow(&self, tool: &str) {
        self.permissions
            .lock()
            .expect("settings lock poisoned")
            .insert(tool.to_lowercase(), "allow".to_string());
    }

    /// Persist the document, creating `.potus/` as needed.
    pub fn save(&self) -> Result<(), String> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| format!("failed to create {}: {e}", dir.display()))?;
        }

        let doc = SettingsDoc {
            permissions: self
                .permissions
                .lock()
                .expect("settings lock poisoned")
                .clone(),
        };
        let data = serde_json::to_string_pretty(&doc)
            .map_err(|e| format!("failed to serialize settings: {e}"))?;

        fs::write(&self.path, data).map_err(|e| format!("failed to write settings: {e}"))
    }

    /// Persist, logging instead of failing — a broken settings file must
    /// never abort a tool call the user just approved.
    pub fn save_or_warn(&self) {
        if let Err(e) = self.save() {
            warn!("failed to save permission settings: {e}");
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
