use crate::error::IndexError;
use crate::fingerprint::metadata_fingerprint;
use crate::models::{FileDescriptor, FileKind};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Lazily yields every regular file under a root whose extension is in the
/// allow-list (lowercase, no leading dot).
///
/// Subdirectories are always descended into. An unreadable directory is
/// logged, only its subtree is lost, and the failure is counted so callers
/// can tell a complete walk from a partial one. Visiting order depends on
/// the filesystem.
pub struct FileWalker<'a> {
    entries: walkdir::IntoIter,
    extensions: &'a [String],
    errors: usize,
}

impl<'a> FileWalker<'a> {
    pub fn new(root: &Path, extensions: &'a [String], follow_symlinks: bool) -> Self {
        Self {
            entries: WalkDir::new(root).follow_links(follow_symlinks).into_iter(),
            extensions,
            errors: 0,
        }
    }

    /// Entries that could not be read so far in this walk.
    pub fn errors(&self) -> usize {
        self.errors
    }
}

impl Iterator for FileWalker<'_> {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            let entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(error) => {
                    self.errors += 1;
                    let at = error
                        .path()
                        .map(|path| path.display().to_string())
                        .unwrap_or_default();
                    warn!(path = %at, %error, "skipping unreadable entry");
                    continue;
                }
            };

            if entry.file_type().is_file() && has_allowed_extension(entry.path(), self.extensions) {
                return Some(entry.into_path());
            }
        }
    }
}

pub fn walk_files<'a>(root: &Path, extensions: &'a [String]) -> FileWalker<'a> {
    FileWalker::new(root, extensions, false)
}

pub fn has_allowed_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
}

/// Stats `path` and derives its descriptor and fingerprint.
///
/// Creation time falls back to modification time on platforms that do not
/// report it.
pub fn describe_file(path: &Path) -> Result<FileDescriptor, IndexError> {
    let metadata = fs::metadata(path)?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IndexError::MissingFileName(path.display().to_string()))?
        .to_string();
    let file_type = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let modified_at: DateTime<Utc> = metadata.modified()?.into();
    let created_at: DateTime<Utc> = metadata
        .created()
        .map(DateTime::<Utc>::from)
        .unwrap_or(modified_at);
    let size = metadata.len();

    Ok(FileDescriptor {
        path: path.to_path_buf(),
        kind: FileKind::from_extension(&file_type),
        fingerprint: metadata_fingerprint(&name, created_at, modified_at, size),
        name,
        file_type,
        created_at,
        modified_at,
        size,
    })
}

/// Remembers which path claimed each file name during one run, so that
/// cross-directory key collisions are at least visible in the log.
#[derive(Debug, Default)]
pub struct SeenFiles {
    by_name: HashMap<String, PathBuf>,
}

impl SeenFiles {
    /// Returns the previously seen path when `name` was already claimed by a
    /// different one.
    pub fn register(&mut self, name: &str, path: &Path) -> Option<PathBuf> {
        match self.by_name.insert(name.to_string(), path.to_path_buf()) {
            Some(previous) if previous != path => Some(previous),
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }
}
