//! Application source tree scanning, hashing and copying

use crate::error::{BerthError, BerthResult};
use crate::layer::digest::{DigestBuilder, LayerDigest};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Names never copied into the image
pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".git",
    ".berth",
    "target",
    "__pycache__",
    ".venv",
    ".pytest_cache",
    ".mypy_cache",
];

/// Kind of a tree entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File { executable: bool },
    Symlink { target: PathBuf },
}

/// One entry of a scanned tree, relative to its root
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub rel: PathBuf,
    pub kind: EntryKind,
}

/// Sorted snapshot of an application source directory
#[derive(Debug, Clone)]
pub struct SourceTree {
    root: PathBuf,
    entries: Vec<TreeEntry>,
}

impl SourceTree {
    /// Scan `root`, skipping any entry whose name is in the default or
    /// extra exclude lists
    pub fn scan(root: &Path, extra_excludes: &[String]) -> BerthResult<Self> {
        if !root.is_dir() {
            return Err(BerthError::PathNotFound(root.to_path_buf()));
        }

        let excluded = |name: &str| {
            DEFAULT_EXCLUDES.contains(&name) || extra_excludes.iter().any(|e| e == name)
        };

        let mut entries = Vec::new();
        let walker = WalkDir::new(root)
            .min_depth(1)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
            .into_iter()
            .filter_entry(|e| !excluded(&e.file_name().to_string_lossy()));

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                BerthError::io(
                    format!("scanning {}", path.display()),
                    e.into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("filesystem loop")),
                )
            })?;

            let rel = entry
                .path()
                .strip_prefix(root)
                .map_err(|_| BerthError::Internal(format!("{} escaped root", entry.path().display())))?
                .to_path_buf();

            let file_type = entry.file_type();
            let kind = if file_type.is_symlink() {
                let target = fs::read_link(entry.path()).map_err(|e| {
                    BerthError::io(format!("reading link {}", entry.path().display()), e)
                })?;
                EntryKind::Symlink { target }
            } else if file_type.is_dir() {
                EntryKind::Dir
            } else {
                let meta = entry.metadata().map_err(|e| {
                    BerthError::io(
                        format!("reading metadata of {}", entry.path().display()),
                        e.into_io_error()
                            .unwrap_or_else(|| std::io::Error::other("metadata")),
                    )
                })?;
                EntryKind::File {
                    executable: is_executable(&meta),
                }
            };

            entries.push(TreeEntry { rel, kind });
        }

        debug!("Scanned {} entries under {}", entries.len(), root.display());
        Ok(Self {
            root: root.to_path_buf(),
            entries,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    /// Number of regular files
    pub fn file_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.kind, EntryKind::File { .. }))
            .count()
    }

    /// Content digest over (relative path, kind, mode, content)
    pub fn digest(&self) -> BerthResult<LayerDigest> {
        let mut builder = DigestBuilder::new();

        for entry in &self.entries {
            builder.update(entry.rel.to_string_lossy().as_bytes());
            match &entry.kind {
                EntryKind::Dir => builder.update(b"dir"),
                EntryKind::Symlink { target } => {
                    builder.update(b"link");
                    builder.update(target.to_string_lossy().as_bytes());
                }
                EntryKind::File { executable } => {
                    builder.update(if *executable { b"exec" } else { b"file" });
                    let path = self.root.join(&entry.rel);
                    let content = fs::read(&path)
                        .map_err(|e| BerthError::io(format!("reading {}", path.display()), e))?;
                    builder.update(&content);
                }
            }
        }

        Ok(builder.finish())
    }

    /// Copy the tree into `dest`, preserving relative paths and modes
    pub fn copy_to(&self, dest: &Path) -> BerthResult<()> {
        let copy_err = |path: &Path, source: std::io::Error| BerthError::AssembleCopy {
            path: path.to_path_buf(),
            source,
        };

        fs::create_dir_all(dest).map_err(|e| copy_err(dest, e))?;

        for entry in &self.entries {
            let from = self.root.join(&entry.rel);
            let to = dest.join(&entry.rel);
            match &entry.kind {
                EntryKind::Dir => fs::create_dir_all(&to).map_err(|e| copy_err(&from, e))?,
                EntryKind::File { .. } => {
                    fs::copy(&from, &to).map_err(|e| copy_err(&from, e))?;
                }
                EntryKind::Symlink { target } => {
                    if to.symlink_metadata().is_ok() {
                        fs::remove_file(&to).map_err(|e| copy_err(&from, e))?;
                    }
                    make_symlink(target, &to).map_err(|e| copy_err(&from, e))?;
                }
            }
        }

        debug!("Copied {} entries into {}", self.entries.len(), dest.display());
        Ok(())
    }
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
    false
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    fs::copy(target, link).map(|_| ())
}
