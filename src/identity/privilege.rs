//! Dropping process privileges to the runtime identity
//!
//! The group id is always set before the user id: once the uid is no
//! longer 0 the process could not change its gid any more.

use crate::error::{BerthError, BerthResult};
use crate::identity::RuntimeIdentity;
use nix::unistd::{getegid, geteuid, getgid, getuid, Gid, Group, Uid, User};
use tracing::{debug, info};

/// Whether the current process runs with effective uid 0
pub fn is_root() -> bool {
    geteuid().is_root()
}

/// Look up a runtime identity by user name in the running system's
/// user database
pub fn lookup(user: &str) -> BerthResult<RuntimeIdentity> {
    let entry = User::from_name(user)
        .map_err(|e| BerthError::PrivilegeDrop(format!("looking up user {}: {}", user, e)))?
        .ok_or_else(|| BerthError::PrivilegeDrop(format!("user {} does not exist", user)))?;

    let group = Group::from_gid(entry.gid)
        .map_err(|e| BerthError::PrivilegeDrop(format!("looking up gid {}: {}", entry.gid, e)))?
        .map(|g| g.name)
        .unwrap_or_else(|| entry.gid.to_string());

    Ok(RuntimeIdentity {
        user: entry.name,
        group,
        uid: entry.uid.as_raw(),
        gid: entry.gid.as_raw(),
        shell: entry.shell.to_string_lossy().into_owned(),
    })
}

/// Irrevocably switch the process to `uid:gid`.
///
/// Steps: validate, clear supplementary groups, set gid, set uid,
/// verify that neither the real nor the effective ids are still root.
pub fn drop_to(uid: u32, gid: u32) -> BerthResult<()> {
    if uid == 0 || gid == 0 {
        return Err(BerthError::PrivilegeDrop(format!(
            "refusing to switch to root ids {}:{}",
            uid, gid
        )));
    }

    clear_supplementary_groups()?;
    set_gid(gid)?;
    set_uid(uid)?;
    verify(uid, gid)?;

    info!("Dropped privileges to {}:{}", uid, gid);
    Ok(())
}

fn clear_supplementary_groups() -> BerthResult<()> {
    #[cfg(target_os = "linux")]
    {
        nix::unistd::setgroups(&[]).map_err(|e| {
            BerthError::PrivilegeDrop(format!("clearing supplementary groups: {}", e))
        })?;
        debug!("Cleared supplementary groups");
    }
    Ok(())
}

fn set_gid(gid: u32) -> BerthResult<()> {
    #[cfg(target_os = "linux")]
    {
        // SAFETY: setresgid has no memory-safety preconditions.
        let result = unsafe { libc::setresgid(gid, gid, gid) };
        if result != 0 {
            let err = std::io::Error::last_os_error();
            return Err(BerthError::PrivilegeDrop(format!("setresgid({}): {}", gid, err)));
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        nix::unistd::setgid(Gid::from_raw(gid))
            .map_err(|e| BerthError::PrivilegeDrop(format!("setgid({}): {}", gid, e)))?;
    }

    debug!("Set GID to {}", gid);
    Ok(())
}

fn set_uid(uid: u32) -> BerthResult<()> {
    #[cfg(target_os = "linux")]
    {
        // SAFETY: setresuid has no memory-safety preconditions.
        let result = unsafe { libc::setresuid(uid, uid, uid) };
        if result != 0 {
            let err = std::io::Error::last_os_error();
            return Err(BerthError::PrivilegeDrop(format!("setresuid({}): {}", uid, err)));
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        nix::unistd::setuid(Uid::from_raw(uid))
            .map_err(|e| BerthError::PrivilegeDrop(format!("setuid({}): {}", uid, e)))?;
    }

    debug!("Set UID to {}", uid);
    Ok(())
}

fn verify(uid: u32, gid: u32) -> BerthResult<()> {
    let (ruid, euid) = (getuid(), geteuid());
    let (rgid, egid) = (getgid(), getegid());

    if ruid != Uid::from_raw(uid) || euid != Uid::from_raw(uid) {
        return Err(BerthError::PrivilegeDrop(format!(
            "uid verification failed: expected {}, got real={} effective={}",
            uid, ruid, euid
        )));
    }
    if rgid != Gid::from_raw(gid) || egid != Gid::from_raw(gid) {
        return Err(BerthError::PrivilegeDrop(format!(
            "gid verification failed: expected {}, got real={} effective={}",
            gid, rgid, egid
        )));
    }
    Ok(())
}
