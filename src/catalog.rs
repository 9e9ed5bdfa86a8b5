//! Enumeration and lookup of backup sets.
//!
//! There is no index file: the catalog is the list of child directories of
//! the base directory, recomputed on every call. Directory names sort
//! chronologically per label because of their timestamp suffix.

use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Component as PathComponent, Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{BackupError, Result};
use crate::metadata::summary_date;
use crate::models::SUMMARY_FILE;

/// One backup set as seen on disk.
#[derive(Debug, Clone, Serialize)]
pub struct BackupSetEntry {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// `true` when the summary artifact exists.
    pub complete: bool,
    /// Creation date recorded in the summary, if any.
    pub created: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BackupCatalog {
    base_dir: PathBuf,
}

impl BackupCatalog {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// All backup sets sorted by name ascending. A missing base directory
    /// yields an empty list.
    pub fn list(&self) -> io::Result<Vec<BackupSetEntry>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();

            let summary_path = path.join(SUMMARY_FILE);
            let (complete, created) = match fs::read_to_string(&summary_path) {
                Ok(text) => (true, summary_date(&text)),
                Err(_) => (summary_path.exists(), None),
            };

            entries.push(BackupSetEntry {
                name,
                size_bytes: dir_size(&path),
                path,
                complete,
                created,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Location of the set called `name`, or [`BackupError::NotFound`].
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let mut parts = Path::new(name).components();
        let single_normal = matches!(
            (parts.next(), parts.next()),
            (Some(PathComponent::Normal(_)), None)
        );
        if !single_normal {
            return Err(BackupError::NotFound(name.to_string()));
        }

        let path = self.base_dir.join(name);
        if path.is_dir() {
            Ok(path)
        } else {
            Err(BackupError::NotFound(name.to_string()))
        }
    }
}

/// Sum of file sizes under `root`. Unreadable entries count as zero.
pub fn dir_size(root: &Path) -> u64 {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_set(base: &Path, name: &str, with_summary: bool) {
        let dir = base.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("documents.tar.gz"), vec![0u8; 100]).unwrap();
        if with_summary {
            fs::write(
                dir.join(SUMMARY_FILE),
                format!("Backup: {}\nDate: 2024-03-09 07:05:01\n", name),
            )
            .unwrap();
        }
    }

    #[test]
    fn test_missing_base_dir_lists_empty() {
        let tmp = TempDir::new().unwrap();
        let catalog = BackupCatalog::new(tmp.path().join("backups"));
        assert!(catalog.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_sorted_with_sizes() {
        let tmp = TempDir::new().unwrap();
        make_set(tmp.path(), "auto_backup_20240310_000000", true);
        make_set(tmp.path(), "auto_backup_20240309_070501", false);
        fs::write(tmp.path().join("stray.txt"), "x").unwrap();

        let entries = BackupCatalog::new(tmp.path()).list().unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["auto_backup_20240309_070501", "auto_backup_20240310_000000"]
        );
        assert!(!entries[0].complete);
        assert_eq!(entries[0].size_bytes, 100);
        assert!(entries[0].created.is_none());
        assert!(entries[1].complete);
        assert_eq!(entries[1].created.as_deref(), Some("2024-03-09 07:05:01"));
        assert!(entries[1].size_bytes > 100);
    }

    #[test]
    fn test_resolve() {
        let tmp = TempDir::new().unwrap();
        make_set(tmp.path(), "t1_20240309_070501", true);
        let catalog = BackupCatalog::new(tmp.path());

        assert_eq!(
            catalog.resolve("t1_20240309_070501").unwrap(),
            tmp.path().join("t1_20240309_070501")
        );
        assert!(matches!(
            catalog.resolve("t2_20240309_070501"),
            Err(BackupError::NotFound(_))
        ));
        assert!(matches!(catalog.resolve(".."), Err(BackupError::NotFound(_))));
        assert!(matches!(
            catalog.resolve("t1_20240309_070501/../t1_20240309_070501"),
            Err(BackupError::NotFound(_))
        ));
        assert!(matches!(catalog.resolve(""), Err(BackupError::NotFound(_))));
    }
}
