//! Component descriptors and the backup summary.
//!
//! Descriptors (`<component>.info`) are plain `Key: value` text with
//! indented list lines, readable by an operator and parseable by
//! [`Descriptor::parse`]. The summary (`BACKUP_INFO.txt`) aggregates every
//! component outcome and ends with the literal restore command.

use chrono::NaiveDateTime;
use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::models::{BackupSet, CollectionStats, Component, ComponentStatus};

/// Human-readable date format used inside descriptors and the summary.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Vector store introspection result recorded in its descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collections {
    Listed(Vec<CollectionStats>),
    Unavailable(String),
}

/// Descriptor of one archived directory component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub component: Component,
    pub captured_at: NaiveDateTime,
    pub archive_bytes: u64,
    pub source: PathBuf,
    pub sha256: String,
    /// Sorted relative paths; recorded for the documents component.
    pub files: Vec<String>,
    /// Recorded for the vector store component.
    pub collections: Option<Collections>,
}

impl Descriptor {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Component: {}", self.component);
        let _ = writeln!(out, "Date: {}", self.captured_at.format(DATE_FORMAT));
        let _ = writeln!(
            out,
            "Size: {} bytes ({})",
            self.archive_bytes,
            format_bytes(self.archive_bytes)
        );
        let _ = writeln!(out, "Source: {}", self.source.display());
        let _ = writeln!(out, "SHA256: {}", self.sha256);

        if self.component == Component::Documents {
            let _ = writeln!(out, "Files: {}", self.files.len());
            for f in &self.files {
                let _ = writeln!(out, "  {}", f);
            }
        }

        match &self.collections {
            Some(Collections::Listed(stats)) => {
                let _ = writeln!(out, "Collections: {}", stats.len());
                for s in stats {
                    let _ = writeln!(out, "  {}: {}", s.name, s.count);
                }
            }
            Some(Collections::Unavailable(reason)) => {
                let _ = writeln!(out, "Collections: unable to read collections ({})", reason);
            }
            None => {}
        }

        out
    }

    /// Parse a rendered descriptor. Returns `None` if required keys are
    /// missing or malformed.
    pub fn parse(text: &str) -> Option<Descriptor> {
        let mut component = None;
        let mut captured_at = None;
        let mut archive_bytes = None;
        let mut source = None;
        let mut sha256 = None;
        let mut files = Vec::new();
        let mut collections = None;
        let mut section = "";

        for line in text.lines() {
            if let Some(item) = line.strip_prefix("  ") {
                match section {
                    "Files" => files.push(item.to_string()),
                    "Collections" => {
                        let (name, count) = item.rsplit_once(": ")?;
                        if let Some(Collections::Listed(stats)) = collections.as_mut() {
                            stats.push(CollectionStats {
                                name: name.to_string(),
                                count: count.trim().parse().ok()?,
                            });
                        }
                    }
                    _ => {}
                }
                continue;
            }

            let (key, value) = match line.split_once(": ") {
                Some(kv) => kv,
                None => continue,
            };
            section = "";
            match key {
                "Component" => component = Component::from_name(value.trim()),
                "Date" => {
                    captured_at = NaiveDateTime::parse_from_str(value.trim(), DATE_FORMAT).ok()
                }
                "Size" => {
                    archive_bytes = value.split_whitespace().next()?.parse::<u64>().ok();
                }
                "Source" => source = Some(PathBuf::from(value)),
                "SHA256" => sha256 = Some(value.trim().to_string()),
                "Files" => section = "Files",
                "Collections" => {
                    if let Some(reason) = value
                        .strip_prefix("unable to read collections (")
                        .and_then(|r| r.strip_suffix(')'))
                    {
                        collections = Some(Collections::Unavailable(reason.to_string()));
                    } else {
                        collections = Some(Collections::Listed(Vec::new()));
                        section = "Collections";
                    }
                }
                _ => {}
            }
        }

        Some(Descriptor {
            component: component?,
            captured_at: captured_at?,
            archive_bytes: archive_bytes?,
            source: source?,
            sha256: sha256?,
            files,
            collections,
        })
    }
}

/// Sorted relative paths (with `/` separators) of all files and symlinks
/// under `root`, the entries that end up in the archive. Links are listed
/// but not followed.
pub fn list_files(root: &Path) -> io::Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let err = io::Error::from(e);
                if err.kind() == io::ErrorKind::NotFound {
                    continue;
                }
                return Err(err);
            }
        };
        let file_type = entry.file_type();
        if !(file_type.is_file() || file_type.is_symlink()) {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push(rel_str);
    }
    files.sort();
    Ok(files)
}

/// Render the summary artifact for a finished (or partially failed) set.
pub fn render_summary(set: &BackupSet, total_bytes: u64, binary_name: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Backup: {}", set.name);
    let _ = writeln!(out, "Label: {}", set.label);
    let _ = writeln!(out, "Date: {}", set.created_at.format(DATE_FORMAT));
    let _ = writeln!(out, "Location: {}", set.location.display());
    let _ = writeln!(out);
    let _ = writeln!(out, "Components:");
    for outcome in &set.components {
        let status = match &outcome.status {
            ComponentStatus::Archived { bytes } => format!("included ({})", format_bytes(*bytes)),
            ComponentStatus::Copied { files, bytes } => format!(
                "included ({} file{}, {})",
                files,
                if *files == 1 { "" } else { "s" },
                format_bytes(*bytes)
            ),
            ComponentStatus::NotFound => "not found".to_string(),
            ComponentStatus::Failed { reason } => format!("FAILED ({})", reason),
        };
        let _ = writeln!(out, "  {}: {}", outcome.component, status);
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Total size: {}", format_bytes(total_bytes));
    if !set.failed_components().is_empty() {
        let _ = writeln!(out, "Status: INCOMPLETE");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "To restore this backup:");
    let _ = writeln!(out, "  {} restore {}", binary_name, set.name);
    out
}

/// Extract the `Date:` line from a summary artifact.
pub fn summary_date(summary: &str) -> Option<String> {
    summary
        .lines()
        .find_map(|l| l.strip_prefix("Date: "))
        .map(|d| d.trim().to_string())
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
