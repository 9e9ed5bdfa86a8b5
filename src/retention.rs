//! Age-based removal of backup sets.
//!
//! Only immediate child directories of the base directory are considered,
//! and only their own modification time counts. Removal is irreversible and
//! unprompted; a failure on one entry is logged and the sweep moves on.

use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

const SECS_PER_DAY: u64 = 86_400;

/// Remove every child directory of `base_dir` at least `max_age_days` old.
///
/// Returns the number of directories removed. A missing base directory
/// removes nothing.
pub fn sweep(base_dir: &Path, max_age_days: u64) -> io::Result<usize> {
    sweep_at(base_dir, max_age_days, SystemTime::now())
}

/// [`sweep`] with an explicit notion of "now".
pub fn sweep_at(base_dir: &Path, max_age_days: u64, now: SystemTime) -> io::Result<usize> {
    if !base_dir.exists() {
        return Ok(0);
    }

    let max_age = Duration::from_secs(max_age_days.saturating_mul(SECS_PER_DAY));
    let mut removed = 0;

    for entry in fs::read_dir(base_dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read backup directory entry");
                continue;
            }
        };
        let path = entry.path();

        let metadata = match entry.metadata() {
            Ok(m) if m.is_dir() => m,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to stat backup");
                continue;
            }
        };

        // A modification time in the future counts as age zero.
        let age = metadata
            .modified()
            .ok()
            .and_then(|mtime| now.duration_since(mtime).ok())
            .unwrap_or_default();

        if age < max_age {
            continue;
        }

        match fs::remove_dir_all(&path) {
            Ok(()) => {
                tracing::info!(
                    path = %path.display(),
                    age_days = age.as_secs() / SECS_PER_DAY,
                    "removed expired backup"
                );
                removed += 1;
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to remove expired backup"
                );
            }
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_sets(base: &Path, names: &[&str]) {
        for name in names {
            let dir = base.join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("BACKUP_INFO.txt"), "Date: x\n").unwrap();
        }
    }

    fn age_dir(path: &Path, days: u64) {
        let then = SystemTime::now() - Duration::from_secs(days * SECS_PER_DAY);
        fs::File::open(path).unwrap().set_modified(then).unwrap();
    }

    #[test]
    fn test_zero_days_removes_all() {
        let tmp = TempDir::new().unwrap();
        make_sets(tmp.path(), &["a_20240101_000000", "b_20240102_000000"]);
        fs::write(tmp.path().join("notes.txt"), "kept").unwrap();

        assert_eq!(sweep(tmp.path(), 0).unwrap(), 2);
        assert!(!tmp.path().join("a_20240101_000000").exists());
        assert!(tmp.path().join("notes.txt").exists());
    }

    #[test]
    fn test_century_removes_none() {
        let tmp = TempDir::new().unwrap();
        make_sets(tmp.path(), &["a_20240101_000000", "b_20240102_000000"]);
        assert_eq!(sweep(tmp.path(), 36500).unwrap(), 0);
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_only_old_sets_removed() {
        let tmp = TempDir::new().unwrap();
        make_sets(tmp.path(), &["old_20240101_000000", "new_20240301_000000"]);
        age_dir(&tmp.path().join("old_20240101_000000"), 10);

        assert_eq!(sweep(tmp.path(), 7).unwrap(), 1);
        assert!(!tmp.path().join("old_20240101_000000").exists());
        assert!(tmp.path().join("new_20240301_000000").exists());
    }

    #[test]
    fn test_future_mtime_is_kept_for_positive_threshold() {
        let tmp = TempDir::new().unwrap();
        make_sets(tmp.path(), &["a_20240101_000000"]);
        let past_now = SystemTime::now() - Duration::from_secs(3600);
        assert_eq!(sweep_at(tmp.path(), 1, past_now).unwrap(), 0);
    }

    #[test]
    fn test_missing_base_dir() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(sweep(&tmp.path().join("nope"), 0).unwrap(), 0);
    }
}
