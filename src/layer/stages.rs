//! The three build stages: resolve, assemble, privilege
//!
//! Each stage knows its own input digest (which feeds the layer cache
//! key) and how to apply itself to an image root on the local
//! filesystem. The image build path renders the same stages as
//! Dockerfile instructions instead (see `dockerfile`).

use crate::error::{BerthError, BerthResult};
use crate::identity::{ownership, IdentityDb, RuntimeIdentity};
use crate::layer::digest::{DigestBuilder, LayerDigest};
use crate::layer::install::PackageInstaller;
use crate::layer::manifest::Manifest;
use crate::layer::snapshot::StageKind;
use crate::layer::tree::SourceTree;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

/// Where the canonical manifest is staged inside the image root
pub const STAGED_MANIFEST: &str = ".berth/requirements.txt";

/// An image root on the host plus the working directory inside it
#[derive(Debug, Clone)]
pub struct StageContext {
    root: PathBuf,
    workdir: String,
}

impl StageContext {
    pub fn new(root: impl Into<PathBuf>, workdir: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            workdir: workdir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Working directory as seen from inside the image (`/app`)
    pub fn workdir(&self) -> &str {
        &self.workdir
    }

    /// Host path of an absolute path inside the image
    pub fn host_path(&self, image_path: &str) -> PathBuf {
        self.root.join(image_path.trim_start_matches('/'))
    }

    /// Host path of the working directory
    pub fn workdir_host(&self) -> PathBuf {
        self.host_path(&self.workdir)
    }
}

/// One build stage
#[async_trait]
pub trait BuildStage: Send + Sync {
    fn kind(&self) -> StageKind;

    /// One-line summary recorded on the layer
    fn describe(&self) -> String;

    /// Digest of everything this stage depends on, excluding its parent
    fn input_digest(&self) -> BerthResult<LayerDigest>;

    /// Whether the stage must run with elevated privilege
    fn requires_root(&self) -> bool {
        true
    }

    /// Whether an unchanged layer may be reused from a previous build
    fn cacheable(&self) -> bool {
        false
    }

    /// Apply the stage to the image root
    async fn apply(&self, ctx: &StageContext) -> BerthResult<()>;
}

/// Installs the manifest's packages before any source is copied
pub struct ResolveStage {
    manifest: Manifest,
    installer: Arc<dyn PackageInstaller>,
    site_dir: String,
}

impl ResolveStage {
    pub fn new(
        manifest: Manifest,
        installer: Arc<dyn PackageInstaller>,
        site_dir: impl Into<String>,
    ) -> Self {
        Self {
            manifest,
            installer,
            site_dir: site_dir.into(),
        }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn installer(&self) -> &dyn PackageInstaller {
        self.installer.as_ref()
    }

    /// Install location inside the image for local staging
    pub fn site_dir(&self) -> &str {
        &self.site_dir
    }
}

#[async_trait]
impl BuildStage for ResolveStage {
    fn kind(&self) -> StageKind {
        StageKind::Resolve
    }

    fn describe(&self) -> String {
        if self.manifest.is_blank() {
            return "no dependencies".to_string();
        }
        match self.manifest.requirement_count() {
            0 => "run installer with directives only".to_string(),
            1 => "install 1 requirement".to_string(),
            n => format!("install {} requirements", n),
        }
    }

    /// Manifest content, installer command and install location
    fn input_digest(&self) -> BerthResult<LayerDigest> {
        let mut builder = DigestBuilder::new()
            .field(self.manifest.cache_key().as_str())
            .field(&self.site_dir);
        for arg in self.installer.program() {
            builder.update(arg.as_bytes());
        }
        Ok(builder.finish())
    }

    fn cacheable(&self) -> bool {
        true
    }

    async fn apply(&self, ctx: &StageContext) -> BerthResult<()> {
        if self.manifest.is_blank() {
            info!("Manifest is empty, nothing to install");
            return Ok(());
        }

        let staged = ctx.root().join(STAGED_MANIFEST);
        if let Some(parent) = staged.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BerthError::io(format!("creating {}", parent.display()), e))?;
        }
        fs::write(&staged, self.manifest.canonical())
            .await
            .map_err(|e| BerthError::io(format!("writing {}", staged.display()), e))?;

        let target = ctx.host_path(&self.site_dir);
        info!(
            "Installing {} requirements into {}",
            self.manifest.requirement_count(),
            self.site_dir
        );
        self.installer.install(&staged, &target).await
    }
}

/// Copies the application source into the working directory
pub struct AssembleStage {
    tree: SourceTree,
    workdir: String,
}

impl AssembleStage {
    pub fn new(tree: SourceTree, workdir: impl Into<String>) -> Self {
        Self {
            tree,
            workdir: workdir.into(),
        }
    }

    pub fn tree(&self) -> &SourceTree {
        &self.tree
    }
}

#[async_trait]
impl BuildStage for AssembleStage {
    fn kind(&self) -> StageKind {
        StageKind::Assemble
    }

    fn describe(&self) -> String {
        format!(
            "copy {} files from {}",
            self.tree.file_count(),
            self.tree.root().display()
        )
    }

    fn input_digest(&self) -> BerthResult<LayerDigest> {
        Ok(with_workdir(self.tree.digest()?, &self.workdir))
    }

    async fn apply(&self, ctx: &StageContext) -> BerthResult<()> {
        let dest = ctx.workdir_host();
        if fs::symlink_metadata(&dest).await.is_ok() {
            debug!("Removing previous working directory {}", dest.display());
            fs::remove_dir_all(&dest)
                .await
                .map_err(|e| BerthError::io(format!("removing {}", dest.display()), e))?;
        }

        let tree = self.tree.clone();
        tokio::task::spawn_blocking(move || tree.copy_to(&dest))
            .await
            .map_err(|e| BerthError::Internal(format!("copy task failed: {}", e)))??;

        info!("Assembled source into {}", ctx.workdir());
        Ok(())
    }
}

/// Creates the runtime identity and hands it the working directory
pub struct PrivilegeStage {
    identity: RuntimeIdentity,
    workdir: String,
}

impl PrivilegeStage {
    pub fn new(identity: RuntimeIdentity, workdir: impl Into<String>) -> Self {
        Self {
            identity,
            workdir: workdir.into(),
        }
    }

    pub fn identity(&self) -> &RuntimeIdentity {
        &self.identity
    }
}

#[async_trait]
impl BuildStage for PrivilegeStage {
    fn kind(&self) -> StageKind {
        StageKind::Privilege
    }

    fn describe(&self) -> String {
        format!("switch to {}", self.identity)
    }

    fn input_digest(&self) -> BerthResult<LayerDigest> {
        self.identity.validate()?;
        Ok(with_workdir(self.identity.digest(), &self.workdir))
    }

    async fn apply(&self, ctx: &StageContext) -> BerthResult<()> {
        self.identity.validate()?;
        let (uid, gid) = (self.identity.uid, self.identity.gid);

        let mut db = IdentityDb::load(ctx.root()).await?;
        db.create(&self.identity, ctx.workdir()).await?;

        let dir = ctx.workdir_host();
        let offenders = tokio::task::spawn_blocking(move || {
            ownership::transfer(&dir, uid, gid)?;
            ownership::verify(&dir, uid, gid)
        })
        .await
        .map_err(|e| BerthError::Internal(format!("ownership task failed: {}", e)))??;

        if let Some(first) = offenders.first() {
            return Err(BerthError::OwnershipTransfer {
                path: first.clone(),
                uid,
                gid,
                reason: format!("{} entries still have a foreign owner", offenders.len()),
            });
        }

        info!("Working directory {} owned by {}", ctx.workdir(), self.identity);
        Ok(())
    }
}

/// Digest of a stage input plus the working directory it targets
fn with_workdir(input: LayerDigest, workdir: &str) -> LayerDigest {
    DigestBuilder::new()
        .field(workdir)
        .field(input.as_str())
        .finish()
}
