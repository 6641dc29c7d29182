//! Course archive extraction
//!
//! The upload is untrusted. Every member path is validated before anything is
//! written: a single traversal, absolute, or drive-prefixed name rejects the
//! whole archive. Size and entry-count limits are enforced both against the
//! central directory and against the bytes actually decompressed.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zip::ZipArchive;

use crate::error::IngestError;

/// Names skipped during extraction (archiver metadata, not course content)
const IGNORED_NAMES: &[&str] = &["__MACOSX", ".DS_Store", "Thumbs.db"];

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Limits applied to one uploaded archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveLimits {
    /// Compressed upload size
    pub max_archive_bytes: u64,
    /// Total decompressed size of all members
    pub max_extracted_bytes: u64,
    /// Number of members, directories included
    pub max_entries: usize,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_archive_bytes: 512 * 1024 * 1024,
            max_extracted_bytes: 2 * 1024 * 1024 * 1024,
            max_entries: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub files: usize,
    pub directories: usize,
    /// Symlinks and archiver metadata that were not materialized
    pub skipped: usize,
    pub bytes_written: u64,
}

enum MemberKind {
    Directory,
    File,
    Skipped,
}

struct PlannedMember {
    index: usize,
    path: Option<PathBuf>,
    kind: MemberKind,
}

/// Validate and unpack `archive_path` into `dest`
///
/// Blocking; run it on a blocking thread. `cancel` is polled between members
/// so a caller that gave up waiting can stop the work early.
pub fn extract_archive(
    archive_path: &Path,
    dest: &Path,
    limits: &ArchiveLimits,
    cancel: &AtomicBool,
) -> Result<ExtractionSummary, IngestError> {
    let archive_size = fs::metadata(archive_path)
        .map_err(|e| IngestError::ArchiveInvalid(format!("Cannot read upload: {}", e)))?
        .len();
    if archive_size > limits.max_archive_bytes {
        return Err(IngestError::ArchiveInvalid(format!(
            "Archive is {} bytes, limit is {}",
            archive_size, limits.max_archive_bytes
        )));
    }

    let file = File::open(archive_path)
        .map_err(|e| IngestError::ArchiveInvalid(format!("Cannot open upload: {}", e)))?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|e| IngestError::ArchiveInvalid(format!("Not a valid ZIP archive: {}", e)))?;

    if archive.len() > limits.max_entries {
        return Err(IngestError::ArchiveInvalid(format!(
            "Archive has {} entries, limit is {}",
            archive.len(),
            limits.max_entries
        )));
    }

    let plan = plan_members(&mut archive, limits)?;

    fs::create_dir_all(dest)?;
    let mut summary = ExtractionSummary::default();

    for member in plan {
        if cancel.load(Ordering::Relaxed) {
            return Err(IngestError::Workspace(io::Error::new(
                io::ErrorKind::Interrupted,
                "extraction cancelled",
            )));
        }

        let rel = match (member.kind, member.path) {
            (MemberKind::Skipped, _) | (_, None) => {
                summary.skipped += 1;
                continue;
            }
            (MemberKind::Directory, Some(rel)) => {
                fs::create_dir_all(dest.join(&rel))?;
                summary.directories += 1;
                continue;
            }
            (MemberKind::File, Some(rel)) => rel,
        };

        let target = dest.join(&rel);
        if !target.starts_with(dest) {
            return Err(IngestError::ArchiveInvalid(format!(
                "Member escapes extraction root: {}",
                rel.display()
            )));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let remaining = limits.max_extracted_bytes.saturating_sub(summary.bytes_written);
        let mut entry = archive
            .by_index(member.index)
            .map_err(|e| IngestError::ArchiveInvalid(format!("{}: {}", rel.display(), e)))?;
        let mut out = File::create(&target)?;
        let written = io::copy(&mut (&mut entry).take(remaining.saturating_add(1)), &mut out).map_err(|e| {
            IngestError::ArchiveInvalid(format!("{}: {}", rel.display(), e))
        })?;
        if written > remaining {
            return Err(IngestError::ArchiveInvalid(format!(
                "Extracted content exceeds {} bytes",
                limits.max_extracted_bytes
            )));
        }

        debug!(path = %rel.display(), bytes = written, "Extracted member");
        summary.bytes_written += written;
        summary.files += 1;
    }

    info!(
        files = summary.files,
        directories = summary.directories,
        skipped = summary.skipped,
        bytes = summary.bytes_written,
        "Archive extracted"
    );
    Ok(summary)
}

/// Validate every member name and the declared total size before writing
fn plan_members<R: io::Read + io::Seek>(
    archive: &mut ZipArchive<R>,
    limits: &ArchiveLimits,
) -> Result<Vec<PlannedMember>, IngestError> {
    let mut plan = Vec::with_capacity(archive.len());
    let mut declared_total: u64 = 0;

    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .map_err(|e| IngestError::ArchiveInvalid(format!("Entry {}: {}", index, e)))?;
        let name = entry.name().to_string();
        let path = sanitize_member_path(&name).map_err(IngestError::ArchiveInvalid)?;

        let is_symlink = entry
            .unix_mode()
            .map(|mode| mode & S_IFMT == S_IFLNK)
            .unwrap_or(false);
        let ignored = path.as_deref().map(is_ignored).unwrap_or(false);

        let kind = if is_symlink || ignored {
            debug!(member = %name, symlink = is_symlink, "Skipping archive member");
            MemberKind::Skipped
        } else if entry.is_dir() {
            MemberKind::Directory
        } else {
            declared_total = declared_total.saturating_add(entry.size());
            MemberKind::File
        };

        plan.push(PlannedMember { index, path, kind });
    }

    if declared_total > limits.max_extracted_bytes {
        return Err(IngestError::ArchiveInvalid(format!(
            "Archive declares {} uncompressed bytes, limit is {}",
            declared_total, limits.max_extracted_bytes
        )));
    }

    Ok(plan)
}

/// Turn an archive member name into a safe relative path
///
/// Backslashes count as separators. `.` segments are dropped. Returns
/// `Ok(None)` for names that reduce to nothing (the archive root itself).
pub fn sanitize_member_path(name: &str) -> Result<Option<PathBuf>, String> {
    let normalized = name.replace('\\', "/");

    if normalized.starts_with('/') {
        return Err(format!("Absolute path in archive: {}", name));
    }
    let bytes = normalized.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return Err(format!("Drive-prefixed path in archive: {}", name));
    }

    let mut path = PathBuf::new();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => {}
            ".." => return Err(format!("Path traversal in archive: {}", name)),
            s => path.push(s),
        }
    }

    Ok((!path.as_os_str().is_empty()).then_some(path))
}

fn is_ignored(path: &Path) -> bool {
    path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .map(|s| IGNORED_NAMES.contains(&s))
            .unwrap_or(false)
    })
}

/// Directory that holds `manifest_name`
///
/// Archives made by zipping a folder wrap everything in one top-level
/// directory; that directory is used when the root has no manifest.
pub fn locate_course_root(extract_dir: &Path, manifest_name: &str) -> PathBuf {
    if extract_dir.join(manifest_name).is_file() {
        return extract_dir.to_path_buf();
    }

    let Ok(entries) = fs::read_dir(extract_dir) else {
        return extract_dir.to_path_buf();
    };
    let dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| !is_ignored(p.strip_prefix(extract_dir).unwrap_or(p.as_path())))
        .collect();

    match dirs.as_slice() {
        [only] if only.is_dir() && only.join(manifest_name).is_file() => {
            debug!(root = %only.display(), "Using wrapper directory as course root");
            only.clone()
        }
        _ => extract_dir.to_path_buf(),
    }
}
