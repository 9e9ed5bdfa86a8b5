//! Backup, restore, list, cleanup, and verification of backup sets.
//!
//! [`BackupOrchestrator`] is the single entry point. It owns the liveness
//! pre-flight, drives the archiver and metadata writer for each component,
//! and writes the summary last so its presence marks a finished set.
//!
//! ```text
//!   create ──▶ liveness ──▶ vector_store ──▶ documents ──▶ config ──▶ BACKUP_INFO.txt
//!   restore ──▶ resolve ──▶ confirm ──▶ stop app ──▶ rename-aside + extract (per component)
//! ```

use chrono::{Local, NaiveDateTime, Utc};
use std::fs;
use std::io;
use std::path::{Component as PathComponent, Path, PathBuf};
use std::time::Duration;

use crate::archive::{archive_dir, extract_archive, sha256_file};
use crate::catalog::{dir_size, BackupCatalog, BackupSetEntry};
use crate::config::Config;
use crate::confirm::ConfirmationPolicy;
use crate::error::{BackupError, Result};
use crate::inspect::StoreInspector;
use crate::metadata::{
    format_bytes, list_files, render_summary, Collections, Descriptor, DATE_FORMAT,
};
use crate::models::{
    is_valid_label, BackupSet, Component, ComponentOutcome, ComponentStatus, CONFIG_DIR,
    SUMMARY_FILE,
};
use crate::retention;
use crate::supervisor::ProcessSupervisor;

/// Name printed in restore instructions.
const BINARY_NAME: &str = env!("CARGO_PKG_NAME");

/// Outcome of a successful restore.
#[derive(Debug, Clone, Default)]
pub struct RestoreReport {
    pub name: String,
    pub restored: Vec<Component>,
    /// `(original, renamed_to)` for every live path moved out of the way.
    pub renamed_aside: Vec<(PathBuf, PathBuf)>,
    /// Process patterns that could not be stopped.
    pub stop_failures: Vec<String>,
}

/// Result of checking one archive against its descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyStatus {
    Ok,
    Missing(String),
    Mismatch { expected: String, actual: String },
    Unreadable(String),
}

#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    pub checks: Vec<(Component, VerifyStatus)>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.checks.iter().all(|(_, s)| *s == VerifyStatus::Ok)
    }
}

pub struct BackupOrchestrator {
    config: Config,
    catalog: BackupCatalog,
    supervisor: Box<dyn ProcessSupervisor>,
    confirm: Box<dyn ConfirmationPolicy>,
    inspector: Option<Box<dyn StoreInspector>>,
}

impl BackupOrchestrator {
    pub fn new(
        config: Config,
        supervisor: Box<dyn ProcessSupervisor>,
        confirm: Box<dyn ConfirmationPolicy>,
    ) -> Self {
        let catalog = BackupCatalog::new(config.backup.dir.clone());
        Self {
            config,
            catalog,
            supervisor,
            confirm,
            inspector: None,
        }
    }

    /// Attach a vector store inspector used to enrich `vector_store.info`.
    pub fn with_inspector(mut self, inspector: Box<dyn StoreInspector>) -> Self {
        self.inspector = Some(inspector);
        self
    }

    pub fn catalog(&self) -> &BackupCatalog {
        &self.catalog
    }

    // ═══════════════════════════════════════════════════════════════════
    // create
    // ═══════════════════════════════════════════════════════════════════

    /// Create a backup set labelled `label` (or the configured default).
    pub async fn create(&self, label: Option<&str>) -> Result<BackupSet> {
        self.create_at(label, Local::now().naive_local()).await
    }

    /// [`create`](Self::create) with an explicit capture time.
    pub async fn create_at(&self, label: Option<&str>, at: NaiveDateTime) -> Result<BackupSet> {
        let label = label.unwrap_or(&self.config.backup.default_label);
        if !is_valid_label(label) {
            return Err(BackupError::InvalidLabel(label.to_string()));
        }

        fs::create_dir_all(self.catalog.base_dir())?;

        let running = self.running_patterns();
        if !running.is_empty() {
            tracing::warn!(
                processes = %running.join(", "),
                "application appears to be running; the vector store may be captured mid-write"
            );
            let prompt = format!(
                "Application appears to be running ({}). The backup may be inconsistent. Continue?",
                running.join(", ")
            );
            if !self.confirm.confirm(&prompt) {
                return Err(BackupError::BackupAborted);
            }
        }

        let name = BackupSet::make_name(label, at);
        let location = self.catalog.base_dir().join(&name);
        if location.exists() {
            return Err(BackupError::NameCollision(name));
        }
        fs::create_dir(&location)?;
        tracing::info!(name = %name, location = %location.display(), "creating backup");

        let mut set = BackupSet {
            name,
            label: label.to_string(),
            created_at: at,
            location,
            components: Vec::with_capacity(Component::ALL.len()),
        };

        for component in Component::ALL {
            let status = match self.directory_source(component) {
                Some(source) => {
                    self.capture_directory(component, source, &set.location, at)
                        .await
                }
                None => self.capture_config(&set.location),
            };
            match &status {
                ComponentStatus::NotFound => {
                    tracing::info!(component = %component, "source not found, skipping")
                }
                ComponentStatus::Failed { reason } => {
                    tracing::error!(component = %component, reason = %reason, "capture failed")
                }
                _ => tracing::info!(component = %component, "captured"),
            }
            set.components.push(ComponentOutcome { component, status });
        }

        // Written last: its presence marks the set as finished.
        let total = dir_size(&set.location);
        let summary = render_summary(&set, total, BINARY_NAME);
        fs::write(set.location.join(SUMMARY_FILE), summary)?;

        let failed = set.failed_components();
        if !failed.is_empty() {
            return Err(BackupError::BackupIncomplete {
                name: set.name,
                failed,
            });
        }

        tracing::info!(name = %set.name, size = %format_bytes(total), "backup complete");
        Ok(set)
    }

    fn running_patterns(&self) -> Vec<String> {
        self.config
            .supervisor
            .process_patterns
            .iter()
            .filter(|p| self.supervisor.is_running(p))
            .cloned()
            .collect()
    }

    /// Live directory behind a directory component; `None` for config.
    fn directory_source(&self, component: Component) -> Option<&Path> {
        match component {
            Component::VectorStore => Some(self.config.sources.vector_store.as_path()),
            Component::Documents => Some(self.config.sources.documents.as_path()),
            Component::Config => None,
        }
    }

    async fn capture_directory(
        &self,
        component: Component,
        source: &Path,
        location: &Path,
        at: NaiveDateTime,
    ) -> ComponentStatus {
        if !source.is_dir() {
            return ComponentStatus::NotFound;
        }

        let files = if component == Component::Documents {
            match list_files(source) {
                Ok(files) if files.is_empty() => return ComponentStatus::NotFound,
                Ok(files) => files,
                Err(e) => {
                    return ComponentStatus::Failed {
                        reason: format!("failed to list {}: {}", source.display(), e),
                    }
                }
            }
        } else {
            Vec::new()
        };

        // Both names exist for directory components.
        let (archive_name, info_name) = match (
            component.archive_file_name(),
            component.info_file_name(),
        ) {
            (Some(a), Some(i)) => (a, i),
            _ => return ComponentStatus::NotFound,
        };
        let archive_path = location.join(archive_name);

        let bytes = match archive_dir(source, &archive_path) {
            Ok(bytes) => bytes,
            Err(BackupError::SourceMissing(_)) => return ComponentStatus::NotFound,
            Err(e) => {
                return ComponentStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };

        let sha256 = match sha256_file(&archive_path) {
            Ok(sha) => sha,
            Err(e) => {
                return ComponentStatus::Failed {
                    reason: format!("failed to checksum {}: {}", archive_path.display(), e),
                }
            }
        };

        let collections = if component == Component::VectorStore {
            Some(self.inspect_store(source).await)
        } else {
            None
        };

        let descriptor = Descriptor {
            component,
            captured_at: at,
            archive_bytes: bytes,
            source: source.to_path_buf(),
            sha256,
            files,
            collections,
        };
        let info_path = location.join(info_name);
        if let Err(e) = fs::write(&info_path, descriptor.render()) {
            return ComponentStatus::Failed {
                reason: BackupError::ArchiveWrite {
                    path: info_path,
                    source: e,
                }
                .to_string(),
            };
        }

        ComponentStatus::Archived { bytes }
    }

    async fn inspect_store(&self, source: &Path) -> Collections {
        let Some(inspector) = &self.inspector else {
            return Collections::Unavailable("no store inspector configured".to_string());
        };
        match inspector.list_collections(source).await {
            Ok(stats) => Collections::Listed(stats),
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "unable to read collections");
                Collections::Unavailable(format!("{:#}", e))
            }
        }
    }

    fn capture_config(&self, location: &Path) -> ComponentStatus {
        let present: Vec<&PathBuf> = self
            .config
            .sources
            .config_files
            .iter()
            .filter(|p| p.is_file())
            .collect();
        if present.is_empty() {
            return ComponentStatus::NotFound;
        }

        let config_dir = location.join(CONFIG_DIR);
        let mut bytes = 0;
        for file in &present {
            let dest = config_dir.join(stored_config_path(file));
            let copied = dest
                .parent()
                .map_or(Ok(()), fs::create_dir_all)
                .and_then(|_| fs::copy(file, &dest));
            match copied {
                Ok(n) => bytes += n,
                Err(e) => {
                    return ComponentStatus::Failed {
                        reason: BackupError::ArchiveWrite {
                            path: dest,
                            source: e,
                        }
                        .to_string(),
                    }
                }
            }
        }

        ComponentStatus::Copied {
            files: present.len(),
            bytes,
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // restore
    // ═══════════════════════════════════════════════════════════════════

    /// Restore the set called `name` over live state.
    ///
    /// Always asks the confirmation policy. Live directories and files are
    /// renamed to `<path>.backup.<unix-seconds>` before being replaced.
    /// Components are restored independently: on failure, the ones already
    /// restored stay restored.
    pub async fn restore(&self, name: &str) -> Result<RestoreReport> {
        let location = self.catalog.resolve(name)?;

        let complete = location.join(SUMMARY_FILE).exists();
        if !complete {
            tracing::warn!(name, "backup has no summary and may be incomplete");
        }
        let prompt = format!(
            "Restore {}{} over live data? Existing data will be renamed aside.",
            name,
            if complete { "" } else { " (INCOMPLETE backup)" }
        );
        if !self.confirm.confirm(&prompt) {
            return Err(BackupError::RestoreAborted);
        }

        let mut report = RestoreReport {
            name: name.to_string(),
            ..Default::default()
        };

        self.stop_application(&mut report).await;

        for component in Component::ALL {
            let result = match self.directory_source(component) {
                Some(dest) => self.restore_directory(component, dest, &location, &mut report),
                None => self.restore_config(&location, &mut report),
            };
            match result {
                Ok(true) => {
                    tracing::info!(component = %component, "restored");
                    report.restored.push(component);
                }
                Ok(false) => {
                    tracing::info!(component = %component, "not in backup, skipping");
                }
                Err(e) => {
                    tracing::error!(component = %component, error = %e, "restore failed");
                    return Err(BackupError::RestoreIncomplete {
                        name: name.to_string(),
                        component,
                        restored: report.restored,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    async fn stop_application(&self, report: &mut RestoreReport) {
        let mut stopped_any = false;
        for pattern in &self.config.supervisor.process_patterns {
            if !self.supervisor.is_running(pattern) {
                continue;
            }
            if self.supervisor.stop(pattern) {
                tracing::info!(pattern = %pattern, "stopped application process");
                stopped_any = true;
            } else {
                tracing::warn!(pattern = %pattern, "could not stop application process");
                report.stop_failures.push(pattern.clone());
            }
        }

        if stopped_any && self.config.supervisor.stop_grace_secs > 0 {
            tokio::time::sleep(Duration::from_secs(self.config.supervisor.stop_grace_secs)).await;
        }
    }

    /// Returns `Ok(false)` when the set holds no archive for `component`.
    fn restore_directory(
        &self,
        component: Component,
        dest: &Path,
        location: &Path,
        report: &mut RestoreReport,
    ) -> Result<bool> {
        let archive = match component.archive_file_name() {
            Some(file) => location.join(file),
            None => return Ok(false),
        };
        if !archive.is_file() {
            return Ok(false);
        }

        if dest.exists() {
            let aside = rename_aside(dest)?;
            tracing::info!(from = %dest.display(), to = %aside.display(), "renamed live data aside");
            report.renamed_aside.push((dest.to_path_buf(), aside));
        }

        extract_archive(&archive, dest)?;
        Ok(true)
    }

    fn restore_config(&self, location: &Path, report: &mut RestoreReport) -> Result<bool> {
        let config_dir = location.join(CONFIG_DIR);
        if !config_dir.is_dir() {
            return Ok(false);
        }

        let mut restored_any = false;
        for file in &self.config.sources.config_files {
            let stored = config_dir.join(stored_config_path(file));
            if !stored.is_file() {
                continue;
            }
            if file.exists() {
                let aside = rename_aside(file)?;
                report.renamed_aside.push((file.clone(), aside));
            }
            if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&stored, file).map_err(|e| BackupError::ArchiveWrite {
                path: file.clone(),
                source: e,
            })?;
            restored_any = true;
        }
        Ok(restored_any)
    }

    // ═══════════════════════════════════════════════════════════════════
    // list / info / verify / cleanup
    // ═══════════════════════════════════════════════════════════════════

    pub fn list(&self) -> io::Result<Vec<BackupSetEntry>> {
        self.catalog.list()
    }

    /// Human-oriented listing of all backup sets.
    pub fn list_report(&self) -> io::Result<String> {
        Ok(render_list(self.catalog.base_dir(), &self.list()?))
    }

    /// Summary text of a set, or `None` if the set never reached its
    /// summary (incomplete or aborted).
    pub fn info(&self, name: &str) -> Result<Option<String>> {
        let location = self.catalog.resolve(name)?;
        match fs::read_to_string(location.join(SUMMARY_FILE)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Recompute archive checksums and compare with the descriptors.
    pub fn verify(&self, name: &str) -> Result<VerifyReport> {
        let location = self.catalog.resolve(name)?;
        let mut report = VerifyReport::default();

        for component in Component::ALL {
            let (Some(archive_name), Some(info_name)) =
                (component.archive_file_name(), component.info_file_name())
            else {
                continue;
            };
            let archive = location.join(&archive_name);
            let info = location.join(&info_name);

            let status = match (archive.is_file(), info.is_file()) {
                (false, false) => continue,
                (true, false) => VerifyStatus::Missing(info_name),
                (false, true) => VerifyStatus::Missing(archive_name),
                (true, true) => check_archive(&archive, &info),
            };
            report.checks.push((component, status));
        }

        Ok(report)
    }

    /// Remove sets older than `max_age_days` (default from config).
    pub fn cleanup(&self, max_age_days: Option<u64>) -> io::Result<usize> {
        let days = max_age_days.unwrap_or(self.config.backup.retention_days);
        tracing::info!(days, dir = %self.catalog.base_dir().display(), "sweeping old backups");
        retention::sweep(self.catalog.base_dir(), days)
    }
}

fn check_archive(archive: &Path, info: &Path) -> VerifyStatus {
    let descriptor = match fs::read_to_string(info)
        .ok()
        .and_then(|text| Descriptor::parse(&text))
    {
        Some(d) => d,
        None => return VerifyStatus::Unreadable(format!("cannot parse {}", info.display())),
    };
    match sha256_file(archive) {
        Ok(actual) if actual == descriptor.sha256 => VerifyStatus::Ok,
        Ok(actual) => VerifyStatus::Mismatch {
            expected: descriptor.sha256,
            actual,
        },
        Err(e) => VerifyStatus::Unreadable(e.to_string()),
    }
}

/// Where a configured file is stored under the set's `config/` directory.
///
/// Relative paths keep their structure; absolute paths or paths leaving
/// the working directory collapse to their file name.
fn stored_config_path(file: &Path) -> PathBuf {
    let escapes = file.is_absolute()
        || file
            .components()
            .any(|c| matches!(c, PathComponent::ParentDir | PathComponent::Prefix(_)));
    if escapes {
        return file
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("unnamed"));
    }
    file.components()
        .filter(|c| matches!(c, PathComponent::Normal(_)))
        .collect()
}

/// Rename `path` to `<path>.backup.<unix-seconds>`, adding a counter if
/// that name is already taken. Returns the new path.
pub fn rename_aside(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| {
            BackupError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot rename {} aside", path.display()),
            ))
        })?;
    let base = format!("{}.backup.{}", file_name, Utc::now().timestamp());

    let mut candidate = path.with_file_name(&base);
    let mut n = 1;
    while candidate.exists() {
        candidate = path.with_file_name(format!("{}.{}", base, n));
        n += 1;
    }

    fs::rename(path, &candidate)?;
    Ok(candidate)
}

fn render_list(base_dir: &Path, entries: &[BackupSetEntry]) -> String {
    if entries.is_empty() {
        return format!("No backups found in {}\n", base_dir.display());
    }

    let mut out = String::new();
    out.push_str(&format!(
        "{:<40} {:>10}   {}\n",
        "NAME", "SIZE", "CREATED"
    ));
    out.push_str(&format!("{}\n", "-".repeat(72)));
    for e in entries {
        let created = match (&e.created, e.complete) {
            (Some(date), _) => date.clone(),
            (None, false) => "incomplete".to_string(),
            (None, true) => BackupSet::parse_name(&e.name)
                .map(|(_, at)| at.format(DATE_FORMAT).to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        };
        out.push_str(&format!(
            "{:<40} {:>10}   {}\n",
            e.name,
            format_bytes(e.size_bytes),
            created
        ));
    }
    out.push_str(&format!(
        "\n{} backup{} in {}\n",
        entries.len(),
        if entries.len() == 1 { "" } else { "s" },
        base_dir.display()
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stored_config_path() {
        assert_eq!(stored_config_path(Path::new(".env")), PathBuf::from(".env"));
        assert_eq!(
            stored_config_path(Path::new("./config/app.toml")),
            PathBuf::from("config/app.toml")
        );
        assert_eq!(
            stored_config_path(Path::new("/etc/app/app.toml")),
            PathBuf::from("app.toml")
        );
        assert_eq!(
            stored_config_path(Path::new("../shared/.env")),
            PathBuf::from(".env")
        );
    }

    #[test]
    fn test_rename_aside_never_overwrites() {
        let tmp = TempDir::new().unwrap();
        let live = tmp.path().join("documents");

        fs::create_dir(&live).unwrap();
        fs::write(live.join("a.txt"), "first").unwrap();
        let first = rename_aside(&live).unwrap();

        fs::create_dir(&live).unwrap();
        fs::write(live.join("a.txt"), "second").unwrap();
        let second = rename_aside(&live).unwrap();

        assert_ne!(first, second);
        assert!(!live.exists());
        assert_eq!(fs::read_to_string(first.join("a.txt")).unwrap(), "first");
        assert_eq!(fs::read_to_string(second.join("a.txt")).unwrap(), "second");
        let first_name = first.file_name().unwrap().to_string_lossy().to_string();
        assert!(first_name.starts_with("documents.backup."));
    }

    #[test]
    fn test_render_list_empty() {
        let text = render_list(Path::new("/b"), &[]);
        assert_eq!(text, "No backups found in /b\n");
    }

    #[test]
    fn test_render_list_marks_incomplete() {
        let entries = vec![BackupSetEntry {
            name: "t1_20240309_070501".into(),
            path: PathBuf::from("/b/t1_20240309_070501"),
            size_bytes: 2048,
            complete: false,
            created: None,
        }];
        let text = render_list(Path::new("/b"), &entries);
        assert!(text.contains("t1_20240309_070501"));
        assert!(text.contains("2.0 KB"));
        assert!(text.contains("incomplete"));
        assert!(text.contains("1 backup in /b"));
    }
}
