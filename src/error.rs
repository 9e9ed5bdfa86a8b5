//! Error types for backup and restore operations.
//!
//! Component-level problems that the subsystem tolerates (a missing source,
//! an unreadable vector store, a process that refuses to stop) never surface
//! here; they are recorded in the summary or logged. These variants are the
//! outcomes that stop an operation or mark it incomplete.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::Component;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Source directory does not exist: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("Failed to read {}: {source}", path.display())]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    ArchiveWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Backup not found: {0}")]
    NotFound(String),

    #[error("Backup aborted: the application appears to be running and the operator did not confirm")]
    BackupAborted,

    #[error("Restore aborted: operator did not confirm")]
    RestoreAborted,

    #[error("Backup {name} is incomplete; failed components: {}", format_components(failed))]
    BackupIncomplete {
        name: String,
        failed: Vec<Component>,
    },

    #[error("Restore of {name} stopped at component {component}: {reason}")]
    RestoreIncomplete {
        name: String,
        component: Component,
        restored: Vec<Component>,
        reason: String,
    },

    #[error("Invalid backup label '{0}': use letters, digits, '-', '_' or '.'")]
    InvalidLabel(String),

    #[error("Backup {0} already exists; wait a second and retry or choose another label")]
    NameCollision(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BackupError>;

fn format_components(components: &[Component]) -> String {
    components
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
