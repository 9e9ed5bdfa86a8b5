//! Compressed directory snapshots.
//!
//! Each directory component of a backup set is stored as a gzip-compressed
//! tar whose single root entry carries the source directory's name, the
//! same layout `tar -czf x.tar.gz -C <parent> <name>` produces. Extraction
//! goes through a staging directory next to the destination so a failed
//! unpack never leaves a half-written destination behind.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::cell::Cell;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder, Header};
use walkdir::{DirEntry, WalkDir};

use crate::error::{BackupError, Result};

/// Archive `source` into `dest`, returning the archive's size in bytes.
///
/// Fails with [`BackupError::SourceMissing`] when `source` is not a
/// directory, [`BackupError::SourceRead`] when a source file cannot be read
/// and [`BackupError::ArchiveWrite`] when the archive cannot be written.
/// Sockets, FIFOs and device nodes are skipped, as are entries that
/// disappear while the tree is walked; both are logged. Symlinks are stored
/// as links. The source is only read.
pub fn archive_dir(source: &Path, dest: &Path) -> Result<u64> {
    if !source.is_dir() {
        return Err(BackupError::SourceMissing(source.to_path_buf()));
    }

    let root = root_name(source);
    tracing::debug!(
        source = %source.display(),
        dest = %dest.display(),
        root = %root,
        "archiving directory"
    );

    write_tar_gz(source, &root, dest)?;
    let size = fs::metadata(dest).map_err(|e| write_err(dest, e))?.len();
    Ok(size)
}

fn write_err(dest: &Path, source: io::Error) -> BackupError {
    BackupError::ArchiveWrite {
        path: dest.to_path_buf(),
        source,
    }
}

fn write_tar_gz(source: &Path, root: &str, dest: &Path) -> Result<()> {
    let file = File::create(dest).map_err(|e| write_err(dest, e))?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = Builder::new(encoder);

    for entry in WalkDir::new(source).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(source).to_path_buf();
                let err = io::Error::from(e);
                if err.kind() == io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), "entry disappeared while archiving, skipped");
                    continue;
                }
                return Err(BackupError::SourceRead { path, source: err });
            }
        };

        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let name = if relative.as_os_str().is_empty() {
            PathBuf::from(root)
        } else {
            Path::new(root).join(relative)
        };
        append_entry(&mut builder, &entry, &name, dest)?;
    }

    let finish = || -> io::Result<()> {
        let encoder = builder.into_inner()?;
        let mut writer = encoder.finish()?;
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()
    };
    finish().map_err(|e| write_err(dest, e))
}

fn append_entry<W: Write>(
    builder: &mut Builder<W>,
    entry: &DirEntry,
    name: &Path,
    dest: &Path,
) -> Result<()> {
    let path = entry.path();
    let file_type = entry.file_type();

    if file_type.is_file() {
        let Some(file) = read_source(path, || File::open(path))? else {
            return Ok(());
        };
        let Some(meta) = read_source(path, || file.metadata())? else {
            return Ok(());
        };
        let mut header = Header::new_gnu();
        header.set_metadata(&meta);

        // Exactly `size` bytes go into the entry even if the file changes
        // underneath us; a shrunken file is zero-padded.
        let size = meta.len();
        let failed = Cell::new(false);
        let data = TrackedRead {
            inner: &file,
            failed: &failed,
        }
        .take(size)
        .chain(io::repeat(0))
        .take(size);

        builder.append_data(&mut header, name, data).map_err(|e| {
            if failed.get() {
                BackupError::SourceRead {
                    path: path.to_path_buf(),
                    source: e,
                }
            } else {
                write_err(dest, e)
            }
        })
    } else if file_type.is_symlink() {
        let Some(meta) = read_source(path, || fs::symlink_metadata(path))? else {
            return Ok(());
        };
        let Some(target) = read_source(path, || fs::read_link(path))? else {
            return Ok(());
        };
        let mut header = Header::new_gnu();
        header.set_metadata(&meta);
        header.set_size(0);
        builder
            .append_link(&mut header, name, &target)
            .map_err(|e| write_err(dest, e))
    } else if file_type.is_dir() {
        // The root may be reached through a symlink; record the directory.
        let Some(meta) = read_source(path, || fs::metadata(path))? else {
            return Ok(());
        };
        let mut header = Header::new_gnu();
        header.set_metadata(&meta);
        builder
            .append_data(&mut header, name, io::empty())
            .map_err(|e| write_err(dest, e))
    } else {
        tracing::warn!(path = %path.display(), "skipping socket, FIFO or device node");
        Ok(())
    }
}

/// Run a read against the live source. `Ok(None)` means the entry vanished.
fn read_source<T>(path: &Path, read: impl FnOnce() -> io::Result<T>) -> Result<Option<T>> {
    match read() {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "entry disappeared while archiving, skipped");
            Ok(None)
        }
        Err(e) => Err(BackupError::SourceRead {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Reader that flags its own failures so they are not blamed on the archive.
struct TrackedRead<'a, R> {
    inner: R,
    failed: &'a Cell<bool>,
}

impl<R: Read> Read for TrackedRead<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let result = self.inner.read(buf);
        if result.is_err() {
            self.failed.set(true);
        }
        result
    }
}

/// Name of the archive's root entry: the source directory's own name.
fn root_name(source: &Path) -> String {
    fs::canonicalize(source)
        .ok()
        .as_deref()
        .unwrap_or(source)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "data".to_string())
}

/// Extract `archive` so that its root directory becomes `dest`.
///
/// `dest` must not exist; callers rename live state aside first. The
/// archived root name does not have to match `dest`'s name.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let extract_err = |source: io::Error| BackupError::ArchiveWrite {
        path: dest.to_path_buf(),
        source,
    };

    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let dest_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| {
            extract_err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "restore destination has no directory name",
            ))
        })?;

    if dest.exists() {
        return Err(extract_err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "restore destination already exists",
        )));
    }

    fs::create_dir_all(&parent).map_err(extract_err)?;

    let staging = parent.join(format!(
        ".{}.restore-{}",
        dest_name,
        chrono::Utc::now().timestamp()
    ));
    if staging.exists() {
        fs::remove_dir_all(&staging).map_err(extract_err)?;
    }
    fs::create_dir(&staging).map_err(extract_err)?;

    let result = unpack(archive, &staging)
        .and_then(|_| single_root(&staging))
        .and_then(|root| fs::rename(root, dest));

    if let Err(e) = fs::remove_dir_all(&staging) {
        tracing::warn!(
            path = %staging.display(),
            error = %e,
            "failed to remove restore staging directory"
        );
    }

    result.map_err(extract_err)
}

fn unpack(archive: &Path, into: &Path) -> io::Result<()> {
    let file = File::open(archive)?;
    let mut tar = Archive::new(GzDecoder::new(BufReader::new(file)));
    tar.set_preserve_permissions(true);
    tar.unpack(into)
}

fn single_root(staging: &Path) -> io::Result<PathBuf> {
    let mut roots = Vec::new();
    for entry in fs::read_dir(staging)? {
        roots.push(entry?.path());
    }
    match roots.as_slice() {
        [root] if root.is_dir() => Ok(root.clone()),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "archive must contain exactly one root directory, found {} entries",
                roots.len()
            ),
        )),
    }
}

/// Hex-encoded SHA-256 of a file's contents.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
