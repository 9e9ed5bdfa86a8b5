//! Core data models for backup sets and their components.
//!
//! A backup set is identified only by its directory name,
//! `<label>_<YYYYMMDD_HHMMSS>`. Everything else about it is recomputed from
//! what is on disk.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Timestamp suffix format embedded in backup set names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Label used when the operator does not supply one.
pub const DEFAULT_LABEL: &str = "auto_backup";

/// Summary artifact written last into every completed backup set.
pub const SUMMARY_FILE: &str = "BACKUP_INFO.txt";

/// Directory inside a backup set holding copied configuration files.
pub const CONFIG_DIR: &str = "config";

/// One of the independently captured sources of a backup set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    VectorStore,
    Documents,
    Config,
}

impl Component {
    /// Capture and restore order.
    pub const ALL: [Component; 3] = [
        Component::VectorStore,
        Component::Documents,
        Component::Config,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::VectorStore => "vector_store",
            Component::Documents => "documents",
            Component::Config => "config",
        }
    }

    pub fn from_name(name: &str) -> Option<Component> {
        Component::ALL.into_iter().find(|c| c.as_str() == name)
    }

    /// File name of the compressed archive, for directory components.
    pub fn archive_file_name(&self) -> Option<String> {
        match self {
            Component::Config => None,
            other => Some(format!("{}.tar.gz", other.as_str())),
        }
    }

    /// File name of the companion descriptor, for directory components.
    pub fn info_file_name(&self) -> Option<String> {
        match self {
            Component::Config => None,
            other => Some(format!("{}.info", other.as_str())),
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to a component during `create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ComponentStatus {
    /// Directory source written as a compressed archive.
    Archived { bytes: u64 },
    /// Configuration files copied into the set's `config/` directory.
    Copied { files: usize, bytes: u64 },
    /// Source absent (or empty) at capture time.
    NotFound,
    /// Capture failed; the set is incomplete for this component.
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentOutcome {
    pub component: Component,
    #[serde(flatten)]
    pub status: ComponentStatus,
}

/// Collection name and item count read from the persisted vector store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    pub name: String,
    pub count: i64,
}

/// A backup set produced by a single `create`.
#[derive(Debug, Clone)]
pub struct BackupSet {
    pub name: String,
    pub label: String,
    pub created_at: NaiveDateTime,
    pub location: PathBuf,
    pub components: Vec<ComponentOutcome>,
}

impl BackupSet {
    /// Build the directory name for a label and capture time.
    pub fn make_name(label: &str, at: NaiveDateTime) -> String {
        format!("{}_{}", label, at.format(TIMESTAMP_FORMAT))
    }

    /// Split a set name into its label and embedded timestamp.
    ///
    /// Returns `None` when the name does not end in `_YYYYMMDD_HHMMSS`.
    pub fn parse_name(name: &str) -> Option<(&str, NaiveDateTime)> {
        // "_" + "YYYYMMDD_HHMMSS"
        const SUFFIX_LEN: usize = 16;
        if name.len() <= SUFFIX_LEN || !name.is_char_boundary(name.len() - SUFFIX_LEN) {
            return None;
        }
        let (label, suffix) = name.split_at(name.len() - SUFFIX_LEN);
        let ts = suffix.strip_prefix('_')?;
        let at = NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).ok()?;
        Some((label, at))
    }

    pub fn outcome(&self, component: Component) -> Option<&ComponentStatus> {
        self.components
            .iter()
            .find(|o| o.component == component)
            .map(|o| &o.status)
    }

    pub fn failed_components(&self) -> Vec<Component> {
        self.components
            .iter()
            .filter(|o| matches!(o.status, ComponentStatus::Failed { .. }))
            .map(|o| o.component)
            .collect()
    }
}

/// Check that a label is safe to embed in a directory name.
pub fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label != "."
        && label != ".."
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
