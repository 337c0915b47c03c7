//! Host-supplied context that presence text is expanded against.
//!
//! The daemon treats these as opaque, read-only snapshots of whatever the
//! editor last reported.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Identity of the most recently opened document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContext {
    /// File name without its extension.
    pub name: String,
    /// Extension without the leading dot; empty when the file has none.
    pub extension: String,
    /// Path as reported by the host (usually vault-relative).
    pub path: String,
    /// Name of the parent folder; empty at the vault root.
    pub folder: String,
    /// Creation time in epoch millis, when the host knows it.
    #[serde(default)]
    pub created: Option<i64>,
}

impl FileContext {
    /// Derives a file context from a path. Returns `None` for paths without a
    /// file name component (`/`, `..`, empty).
    pub fn from_path(path: &str, created: Option<i64>) -> Option<Self> {
        let trimmed = path.trim();
        let as_path = Path::new(trimmed);
        as_path.file_name()?;

        let name = as_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = as_path
            .extension()
            .map(|ext| ext.to_string_lossy().to_string())
            .unwrap_or_default();
        let folder = as_path
            .parent()
            .and_then(|parent| parent.file_name())
            .map(|dir| dir.to_string_lossy().to_string())
            .unwrap_or_default();

        Some(Self {
            name,
            extension,
            path: trimmed.to_string(),
            folder,
            created,
        })
    }

    /// File name including the extension.
    pub fn full_name(&self) -> String {
        if self.extension.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.name, self.extension)
        }
    }
}

/// Everything the templates may reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceContext {
    pub vault: Option<String>,
    pub file: Option<FileContext>,
}

impl PresenceContext {
    pub fn has_file(&self) -> bool {
        self.file.is_some()
    }
}
