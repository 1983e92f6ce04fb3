//! Minimal `/etc/passwd` and `/etc/group` handling for an image root

use crate::error::{BerthError, BerthResult};
use crate::identity::RuntimeIdentity;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// One `/etc/passwd` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswdEntry {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: String,
    pub shell: String,
}

impl PasswdEntry {
    fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() < 7 {
            return None;
        }
        Some(Self {
            name: fields[0].to_string(),
            uid: fields[2].parse().ok()?,
            gid: fields[3].parse().ok()?,
            home: fields[5].to_string(),
            shell: fields[6].to_string(),
        })
    }

    fn to_line(&self) -> String {
        format!(
            "{}:x:{}:{}::{}:{}",
            self.name, self.uid, self.gid, self.home, self.shell
        )
    }
}

/// One `/etc/group` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub name: String,
    pub gid: u32,
}

impl GroupEntry {
    fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() < 3 {
            return None;
        }
        Some(Self {
            name: fields[0].to_string(),
            gid: fields[2].parse().ok()?,
        })
    }

    fn to_line(&self) -> String {
        format!("{}:x:{}:", self.name, self.gid)
    }
}

/// User and group databases of an image root
#[derive(Debug)]
pub struct IdentityDb {
    root: PathBuf,
    passwd: Vec<PasswdEntry>,
    groups: Vec<GroupEntry>,
    passwd_text: String,
    group_text: String,
}

impl IdentityDb {
    /// Load `etc/passwd` and `etc/group` under `root`; missing files are empty
    pub async fn load(root: &Path) -> BerthResult<Self> {
        let passwd_text = read_optional(&root.join("etc/passwd")).await?;
        let group_text = read_optional(&root.join("etc/group")).await?;

        let passwd = parse_records(&passwd_text, PasswdEntry::parse);
        let groups = parse_records(&group_text, GroupEntry::parse);
        debug!(
            "Loaded {} users and {} groups from {}",
            passwd.len(),
            groups.len(),
            root.display()
        );

        Ok(Self {
            root: root.to_path_buf(),
            passwd,
            groups,
            passwd_text,
            group_text,
        })
    }

    pub fn users(&self) -> &[PasswdEntry] {
        &self.passwd
    }

    pub fn groups(&self) -> &[GroupEntry] {
        &self.groups
    }

    /// Fail if any of the identity's names or ids is already taken
    pub fn ensure_absent(&self, identity: &RuntimeIdentity) -> BerthResult<()> {
        let collision = |kind: &str, entry: String| {
            Err(BerthError::IdentityCollision {
                kind: kind.to_string(),
                entry,
            })
        };

        if let Some(u) = self.passwd.iter().find(|u| u.name == identity.user) {
            return collision("user name", format!("{} (uid {})", u.name, u.uid));
        }
        if let Some(u) = self.passwd.iter().find(|u| u.uid == identity.uid) {
            return collision("uid", format!("{} (uid {})", u.name, u.uid));
        }
        if let Some(g) = self.groups.iter().find(|g| g.name == identity.group) {
            return collision("group name", format!("{} (gid {})", g.name, g.gid));
        }
        if let Some(g) = self.groups.iter().find(|g| g.gid == identity.gid) {
            return collision("gid", format!("{} (gid {})", g.name, g.gid));
        }
        Ok(())
    }

    /// Append the identity to both databases and write them back.
    ///
    /// `home` is the identity's home directory, normally the working
    /// directory; no home is created.
    pub async fn create(&mut self, identity: &RuntimeIdentity, home: &str) -> BerthResult<()> {
        self.ensure_absent(identity)?;

        let user = PasswdEntry {
            name: identity.user.clone(),
            uid: identity.uid,
            gid: identity.gid,
            home: home.to_string(),
            shell: identity.shell.clone(),
        };
        let group = GroupEntry {
            name: identity.group.clone(),
            gid: identity.gid,
        };

        append_line(&mut self.passwd_text, &user.to_line());
        append_line(&mut self.group_text, &group.to_line());

        let etc = self.root.join("etc");
        fs::create_dir_all(&etc)
            .await
            .map_err(|e| BerthError::io(format!("creating {}", etc.display()), e))?;
        write_file(&etc.join("group"), &self.group_text).await?;
        write_file(&etc.join("passwd"), &self.passwd_text).await?;

        self.passwd.push(user);
        self.groups.push(group);

        info!("Created runtime identity {}", identity);
        Ok(())
    }
}

fn parse_records<T>(text: &str, parse: impl Fn(&str) -> Option<T>) -> Vec<T> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(parse)
        .collect()
}

fn append_line(text: &mut String, line: &str) {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(line);
    text.push('\n');
}

async fn read_optional(path: &Path) -> BerthResult<String> {
    match fs::read_to_string(path).await {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(BerthError::io(format!("reading {}", path.display()), e)),
    }
}

async fn write_file(path: &Path, content: &str) -> BerthResult<()> {
    fs::write(path, content)
        .await
        .map_err(|e| BerthError::io(format!("writing {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::IdentityConfig;
    use tempfile::TempDir;

    const PASSWD: &str = "\
root:x:0:0:root:/root:/bin/bash
daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin
nobody:x:65534:65534:nobody:/nonexistent:/usr/sbin/nologin
";

    const GROUP: &str = "\
root:x:0:
daemon:x:1:
nogroup:x:65534:
";

    async fn image_root() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("etc")).unwrap();
        std::fs::write(dir.path().join("etc/passwd"), PASSWD).unwrap();
        std::fs::write(dir.path().join("etc/group"), GROUP).unwrap();
        dir
    }

    fn identity() -> RuntimeIdentity {
        RuntimeIdentity::from_config(&IdentityConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn loads_existing_entries() {
        let root = image_root().await;
        let db = IdentityDb::load(root.path()).await.unwrap();
        assert_eq!(db.users().len(), 3);
        assert_eq!(db.groups()[2].gid, 65534);
    }

    #[tokio::test]
    async fn creates_identity_once() {
        let root = image_root().await;
        let mut db = IdentityDb::load(root.path()).await.unwrap();
        db.create(&identity(), "/app").await.unwrap();

        let passwd = std::fs::read_to_string(root.path().join("etc/passwd")).unwrap();
        assert!(passwd.starts_with("root:x:0:0"));
        assert!(passwd.contains("appuser:x:10001:10001::/app:/usr/sbin/nologin"));

        let group = std::fs::read_to_string(root.path().join("etc/group")).unwrap();
        assert!(group.contains("appuser:x:10001:"));

        // A second creation collides with the first
        let mut reloaded = IdentityDb::load(root.path()).await.unwrap();
        let err = reloaded.create(&identity(), "/app").await.unwrap_err();
        assert!(matches!(err, BerthError::IdentityCollision { .. }));
    }

    #[tokio::test]
    async fn uid_collision_is_fatal() {
        let root = image_root().await;
        let db = IdentityDb::load(root.path()).await.unwrap();

        let mut id = identity();
        id.uid = 65534;
        let err = db.ensure_absent(&id).unwrap_err();
        assert!(err.to_string().contains("nobody"));
    }

    #[tokio::test]
    async fn group_name_collision_is_fatal() {
        let root = image_root().await;
        let db = IdentityDb::load(root.path()).await.unwrap();

        let mut id = identity();
        id.group = "daemon".to_string();
        match db.ensure_absent(&id).unwrap_err() {
            BerthError::IdentityCollision { kind, .. } => assert_eq!(kind, "group name"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_databases_are_created() {
        let root = TempDir::new().unwrap();
        let mut db = IdentityDb::load(root.path()).await.unwrap();
        assert!(db.users().is_empty());

        db.create(&identity(), "/app").await.unwrap();
        assert!(root.path().join("etc/passwd").exists());
        assert_eq!(db.users().len(), 1);
    }
}
