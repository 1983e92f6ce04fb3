//! Ordered build pipeline: resolve -> assemble -> privilege
//!
//! `plan` computes the final snapshot without touching the filesystem.
//! `execute` applies the stages to a local image root, stopping at the
//! first failure so no later stage ever runs on a broken layer.

use crate::config::Project;
use crate::error::{BerthError, BerthResult};
use crate::identity::RuntimeIdentity;
use crate::layer::install::{CommandInstaller, PackageInstaller};
use crate::layer::manifest::Manifest;
use crate::layer::record::BuildRecord;
use crate::layer::snapshot::{Snapshot, StageKind};
use crate::layer::stages::{AssembleStage, BuildStage, PrivilegeStage, ResolveStage, StageContext};
use crate::layer::tree::SourceTree;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The three stages of an image, bound to their inputs
pub struct Pipeline {
    base_image: String,
    workdir: String,
    resolve: ResolveStage,
    assemble: AssembleStage,
    privilege: PrivilegeStage,
}

impl Pipeline {
    pub fn new(
        base_image: impl Into<String>,
        workdir: impl Into<String>,
        resolve: ResolveStage,
        assemble: AssembleStage,
        privilege: PrivilegeStage,
    ) -> Self {
        Self {
            base_image: base_image.into(),
            workdir: workdir.into(),
            resolve,
            assemble,
            privilege,
        }
    }

    /// Build the pipeline for a project using the configured installer
    pub async fn for_project(project: &Project) -> BerthResult<Self> {
        let installer = CommandInstaller::new(project.config.resolver.installer.clone())?;
        Self::with_installer(project, Arc::new(installer)).await
    }

    /// Build the pipeline for a project with an explicit installer
    pub async fn with_installer(
        project: &Project,
        installer: Arc<dyn PackageInstaller>,
    ) -> BerthResult<Self> {
        let config = &project.config;
        let manifest = Manifest::from_file(&project.manifest_path()).await?;
        let tree = SourceTree::scan(&project.source_dir(), &config.image.exclude)?;
        let identity = RuntimeIdentity::from_config(&config.identity)?;

        debug!(
            "Pipeline for {}: {} requirements, {} files, identity {}",
            project.root.display(),
            manifest.requirement_count(),
            tree.file_count(),
            identity
        );

        Ok(Self::new(
            &config.image.base,
            &config.image.workdir,
            ResolveStage::new(manifest, installer, &config.resolver.site_dir),
            AssembleStage::new(tree, &config.image.workdir),
            PrivilegeStage::new(identity, &config.image.workdir),
        ))
    }

    pub fn base_image(&self) -> &str {
        &self.base_image
    }

    pub fn workdir(&self) -> &str {
        &self.workdir
    }

    pub fn resolve(&self) -> &ResolveStage {
        &self.resolve
    }

    pub fn assemble(&self) -> &AssembleStage {
        &self.assemble
    }

    pub fn privilege(&self) -> &PrivilegeStage {
        &self.privilege
    }

    /// Stages in execution order
    pub fn stages(&self) -> [&dyn BuildStage; 3] {
        [&self.resolve, &self.assemble, &self.privilege]
    }

    /// Final snapshot of a successful build, computed without side effects
    pub fn plan(&self) -> BerthResult<Snapshot> {
        let mut snapshot = Snapshot::base(&self.base_image);
        for stage in self.stages() {
            snapshot = snapshot.push(
                stage.kind(),
                stage.input_digest()?,
                stage.describe(),
                stage.requires_root(),
            )?;
        }
        snapshot.finish()
    }

    /// Clear a previously staged image root for a new run.
    ///
    /// The installed dependencies survive when the dependency layer key
    /// is unchanged; the returned record is the one to reuse from. A
    /// non-empty directory without a build record is never cleared.
    pub async fn prepare_root(&self, ctx: &StageContext) -> BerthResult<Option<BuildRecord>> {
        let root = ctx.root();
        if !root.exists() {
            fs::create_dir_all(root)
                .await
                .map_err(|e| BerthError::io(format!("creating {}", root.display()), e))?;
            return Ok(None);
        }

        let previous = match BuildRecord::load(root).await? {
            Some(record) => record,
            None if is_empty_dir(root).await? => return Ok(None),
            None => {
                return Err(BerthError::User(format!(
                    "{} is not empty and was not staged by berth",
                    root.display()
                )))
            }
        };

        let plan = self.plan()?;
        let wanted = plan.layer(StageKind::Resolve).map(|l| &l.key);
        let reuse = wanted.is_some() && previous.layer_key(StageKind::Resolve) == wanted;

        let site = ctx.host_path(self.resolve.site_dir());
        let parked = root.with_file_name(format!(".berth-site-{}", Uuid::new_v4()));
        let park = reuse && site.exists();
        if park {
            rename(&site, &parked).await?;
        }

        fs::remove_dir_all(root)
            .await
            .map_err(|e| BerthError::io(format!("clearing {}", root.display()), e))?;
        fs::create_dir_all(root)
            .await
            .map_err(|e| BerthError::io(format!("creating {}", root.display()), e))?;

        if park {
            if let Some(parent) = site.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| BerthError::io(format!("creating {}", parent.display()), e))?;
            }
            rename(&parked, &site).await?;
            debug!("Kept installed dependencies at {}", site.display());
        }

        Ok(reuse.then_some(previous))
    }

    /// Apply every stage to the image root in `ctx`.
    ///
    /// A cacheable stage whose key matches the layer in `previous` is
    /// skipped. The build record is written on success and on failure.
    pub async fn execute(
        &self,
        ctx: &StageContext,
        previous: Option<&BuildRecord>,
    ) -> BerthResult<Snapshot> {
        let mut snapshot = Snapshot::base(&self.base_image);

        for stage in self.stages() {
            let kind = stage.kind();
            let next = match stage.input_digest().and_then(|input| {
                snapshot.push(kind, input, stage.describe(), stage.requires_root())
            }) {
                Ok(next) => next,
                Err(e) => return Err(record_failure(ctx, snapshot, kind, e).await),
            };

            let key = next.layer(kind).map(|l| l.key.clone());
            let reusable = stage.cacheable()
                && key.is_some()
                && previous.and_then(|r| r.layer_key(kind)) == key.as_ref();

            if reusable {
                info!("Stage {} unchanged, reusing cached layer", kind);
                snapshot = next.mark_cached();
                continue;
            }

            info!("Running stage {}: {}", kind, stage.describe());
            if let Err(e) = stage.apply(ctx).await {
                return Err(record_failure(ctx, snapshot, kind, e).await);
            }
            snapshot = next;
        }

        let ready = snapshot.finish()?;
        BuildRecord::completed(ready.clone()).save(ctx.root()).await?;
        info!("Image root {} is {}", ctx.root().display(), ready.state());
        Ok(ready)
    }
}

async fn record_failure(
    ctx: &StageContext,
    snapshot: Snapshot,
    stage: StageKind,
    error: BerthError,
) -> BerthError {
    warn!("Stage {} failed: {}", stage, error);
    let record = BuildRecord::failed(snapshot, stage, error.to_string());
    if let Err(e) = record.save(ctx.root()).await {
        warn!("Failed to write build record: {}", e);
    }
    error
}

async fn is_empty_dir(dir: &std::path::Path) -> BerthResult<bool> {
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| BerthError::io(format!("reading {}", dir.display()), e))?;
    let first = entries
        .next_entry()
        .await
        .map_err(|e| BerthError::io(format!("reading {}", dir.display()), e))?;
    Ok(first.is_none())
}

async fn rename(from: &std::path::Path, to: &std::path::Path) -> BerthResult<()> {
    fs::rename(from, to).await.map_err(|e| {
        BerthError::io(format!("moving {} to {}", from.display(), to.display()), e)
    })
}
