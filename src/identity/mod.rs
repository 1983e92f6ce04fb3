//! Runtime identity: the non-root user/group the application runs as
//!
//! The identity is created once, inside the image, by the privilege
//! stage. Everything after that stage runs as this identity.

pub mod ownership;
pub mod passwd;
pub mod privilege;

pub use passwd::IdentityDb;

use crate::config::schema::IdentityConfig;
use crate::error::{BerthError, BerthResult};
use crate::layer::digest::{DigestBuilder, LayerDigest};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shells that do not permit interactive login
const NON_LOGIN_SHELLS: &[&str] = &[
    "/usr/sbin/nologin",
    "/sbin/nologin",
    "/bin/false",
    "/usr/bin/false",
];

/// Longest user/group name accepted by shadow-utils
const MAX_NAME_LEN: usize = 32;

/// Non-root user/group pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeIdentity {
    pub user: String,
    pub group: String,
    pub uid: u32,
    pub gid: u32,
    pub shell: String,
}

impl RuntimeIdentity {
    /// Build and validate an identity from configuration
    pub fn from_config(config: &IdentityConfig) -> BerthResult<Self> {
        let identity = Self {
            user: config.user.clone(),
            group: config.group.clone(),
            uid: config.uid,
            gid: config.gid,
            shell: config.shell.clone(),
        };
        identity.validate()?;
        Ok(identity)
    }

    /// Reject root ids, root names, malformed names and login shells
    pub fn validate(&self) -> BerthResult<()> {
        if self.uid == 0 || self.gid == 0 {
            return Err(BerthError::IdentityInvalid(format!(
                "uid/gid must not be 0 (got {}:{})",
                self.uid, self.gid
            )));
        }
        if self.user == "root" || self.group == "root" {
            return Err(BerthError::IdentityInvalid(
                "the runtime identity cannot be named root".to_string(),
            ));
        }
        validate_name(&self.user)?;
        validate_name(&self.group)?;

        if !NON_LOGIN_SHELLS.contains(&self.shell.as_str()) {
            return Err(BerthError::IdentityInvalid(format!(
                "shell {} allows interactive login; use one of {}",
                self.shell,
                NON_LOGIN_SHELLS.join(", ")
            )));
        }
        Ok(())
    }

    /// Digest of every identity field
    pub fn digest(&self) -> LayerDigest {
        DigestBuilder::new()
            .field(&self.user)
            .field(&self.group)
            .field(self.uid.to_string())
            .field(self.gid.to_string())
            .field(&self.shell)
            .finish()
    }
}

impl fmt::Display for RuntimeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}):{}({})", self.user, self.uid, self.group, self.gid)
    }
}

fn validate_name(name: &str) -> BerthResult<()> {
    let mut chars = name.chars();
    let valid_first = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    let valid_rest =
        chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');

    if !valid_first || !valid_rest || name.len() > MAX_NAME_LEN {
        return Err(BerthError::IdentityInvalid(format!(
            "invalid name '{}': use lowercase letters, digits, '_' or '-', at most {} chars",
            name, MAX_NAME_LEN
        )));
    }
    Ok(())
}
