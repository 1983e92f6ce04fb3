//! Recursive ownership transfer and verification
//!
//! Symlinks are neither followed nor re-owned; everything else under the
//! directory (the directory itself included) is.

use crate::error::{BerthError, BerthResult};
use nix::unistd::{chown, Gid, Uid};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Chown every non-symlink entry under `dir` to `uid:gid`.
///
/// Returns the number of entries changed.
pub fn transfer(dir: &Path, uid: u32, gid: u32) -> BerthResult<usize> {
    let fail = |path: &Path, reason: String| BerthError::OwnershipTransfer {
        path: path.to_path_buf(),
        uid,
        gid,
        reason,
    };

    let mut changed = 0;
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| fail(dir, e.to_string()))?;
        if entry.path_is_symlink() {
            continue;
        }

        chown(entry.path(), Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid)))
            .map_err(|e| fail(entry.path(), e.to_string()))?;
        changed += 1;
    }

    info!(
        "Transferred ownership of {} entries under {} to {}:{}",
        changed,
        dir.display(),
        uid,
        gid
    );
    Ok(changed)
}

/// Paths under `dir` not owned by `uid:gid` (symlinks ignored)
pub fn verify(dir: &Path, uid: u32, gid: u32) -> BerthResult<Vec<PathBuf>> {
    let mut offenders = Vec::new();

    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| {
            BerthError::io(
                format!("walking {}", dir.display()),
                std::io::Error::other(e.to_string()),
            )
        })?;
        if entry.path_is_symlink() {
            continue;
        }

        let meta = entry
            .path()
            .symlink_metadata()
            .map_err(|e| BerthError::io(format!("stat {}", entry.path().display()), e))?;
        if meta.uid() != uid || meta.gid() != gid {
            offenders.push(entry.path().to_path_buf());
        }
    }

    debug!(
        "{} entries under {} not owned by {}:{}",
        offenders.len(),
        dir.display(),
        uid,
        gid
    );
    Ok(offenders)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::{getegid, geteuid};
    use std::fs;
    use tempfile::TempDir;

    /// A non-root id pair this process is allowed to chown to
    fn target_ids() -> (u32, u32) {
        if geteuid().is_root() {
            (10001, 10001)
        } else {
            (geteuid().as_raw(), getegid().as_raw())
        }
    }

    fn workdir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app.py"), "print('hi')\n").unwrap();
        fs::create_dir_all(dir.path().join("pages/data")).unwrap();
        fs::write(dir.path().join("pages/data/table.csv"), "a,b\n").unwrap();
        std::os::unix::fs::symlink("/etc/hostname", dir.path().join("host-link")).unwrap();
        dir
    }

    #[test]
    fn transfer_then_verify_has_no_offenders() {
        let dir = workdir();
        let (uid, gid) = target_ids();

        let changed = transfer(dir.path(), uid, gid).unwrap();
        assert_eq!(changed, 5); // root, app.py, pages, pages/data, table.csv

        assert!(verify(dir.path(), uid, gid).unwrap().is_empty());
    }

    #[test]
    fn verify_reports_foreign_owner() {
        let dir = workdir();
        let (uid, gid) = target_ids();

        let offenders = verify(dir.path(), uid.wrapping_add(1), gid).unwrap();
        assert!(offenders.contains(&dir.path().join("app.py")));
        assert!(!offenders.contains(&dir.path().join("host-link")));
    }

    #[test]
    fn transfer_of_missing_dir_fails() {
        let dir = TempDir::new().unwrap();
        let (uid, gid) = target_ids();
        let err = transfer(&dir.path().join("missing"), uid, gid).unwrap_err();
        assert!(matches!(err, BerthError::OwnershipTransfer { .. }));
    }
}
