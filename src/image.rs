//! Image build: build context preparation and content-addressed tags
//!
//! The image tag is derived from the final layer key and the embedded
//! launch defaults, so an unchanged project maps to an existing tag and
//! the build is skipped.

use crate::config::schema::LaunchSettings;
use crate::dockerfile::{self, CONTEXT_MANIFEST, CONTEXT_SOURCE};
use crate::error::{BerthError, BerthResult};
use crate::layer::digest::DigestBuilder;
use crate::layer::{Pipeline, Snapshot};
use crate::orchestration::ContainerRuntime;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

/// Patterns excluded from the build context
const DOCKERIGNORE: &str = "**/__pycache__\n**/*.pyc\n**/.DS_Store\n";

/// Result of an image build
#[derive(Debug)]
pub struct BuiltImage {
    /// Full image tag (e.g. "berth-app:a1b2c3d4e5f6")
    pub tag: String,

    /// Whether the image already existed (no build needed)
    pub was_cached: bool,
}

/// Content-addressed tag for a planned image.
///
/// Covers everything the Dockerfile embeds beyond the layers:
/// `EXPOSE`, `ENTRYPOINT` and the default `CMD`.
pub fn image_tag(name: &str, plan: &Snapshot, launch: &LaunchSettings) -> String {
    let mut builder = DigestBuilder::new()
        .field(plan.head_key().as_str())
        .field(&launch.entry)
        .field(launch.port.to_string())
        .field(&launch.address);
    for arg in &launch.executable {
        builder.update(arg.as_bytes());
    }
    format!("{}:{}", name, builder.finish().short())
}

/// Write a complete build context under `builds_dir` and return its path.
///
/// The context holds the Dockerfile, the canonical manifest, the
/// application source under `app/` and a `.dockerignore`.
pub async fn prepare_context(
    pipeline: &Pipeline,
    plan: &Snapshot,
    launch: &LaunchSettings,
    builds_dir: &Path,
) -> BerthResult<PathBuf> {
    let dir = builds_dir.join(Uuid::new_v4().to_string());
    fs::create_dir_all(&dir)
        .await
        .map_err(|e| BerthError::io("creating build directory", e))?;

    let manifest = pipeline.resolve().manifest();
    if !manifest.is_blank() {
        write(&dir.join(CONTEXT_MANIFEST), &manifest.canonical()).await?;
    }

    let tree = pipeline.assemble().tree().clone();
    let source = dir.join(CONTEXT_SOURCE);
    tokio::task::spawn_blocking(move || tree.copy_to(&source))
        .await
        .map_err(|e| BerthError::Internal(format!("copy task failed: {}", e)))??;

    write(&dir.join(".dockerignore"), DOCKERIGNORE).await?;
    write(
        &dir.join("Dockerfile"),
        &dockerfile::render(pipeline, plan, launch)?,
    )
    .await?;

    debug!("Prepared build context {}", dir.display());
    Ok(dir)
}

/// Build the image for `pipeline` unless its tag already exists.
///
/// The build context is removed afterwards, whether the build succeeded
/// or not.
pub async fn build(
    runtime: &dyn ContainerRuntime,
    pipeline: &Pipeline,
    name: &str,
    launch: &LaunchSettings,
    builds_dir: &Path,
    on_output: &(dyn Fn(String) + Send + Sync),
) -> BerthResult<BuiltImage> {
    let plan = pipeline.plan()?;
    let tag = image_tag(name, &plan, launch);
    debug!("Image tag: {}", tag);

    if runtime.image_exists(&tag).await.unwrap_or(false) {
        debug!("Image already built: {}", tag);
        return Ok(BuiltImage {
            tag,
            was_cached: true,
        });
    }

    let context = prepare_context(pipeline, &plan, launch, builds_dir).await?;
    let result = runtime.build_image(&context, &tag, on_output).await;

    // Clean up build directory (best-effort)
    let _ = fs::remove_dir_all(&context).await;

    result?;

    Ok(BuiltImage {
        tag,
        was_cached: false,
    })
}

async fn write(path: &Path, content: &str) -> BerthResult<()> {
    fs::write(path, content)
        .await
        .map_err(|e| BerthError::io(format!("writing {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Project};
    use crate::layer::install::fake::FakeInstaller;
    use crate::orchestration::RunOptions;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Records the context it was asked to build
    #[derive(Default)]
    struct FakeRuntime {
        existing: Mutex<Vec<String>>,
        built: Mutex<Vec<String>>,
        context_had_dockerfile: AtomicBool,
        fail: bool,
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn is_available(&self) -> BerthResult<bool> {
            Ok(true)
        }

        async fn image_exists(&self, image: &str) -> BerthResult<bool> {
            Ok(self.existing.lock().unwrap().iter().any(|t| t == image))
        }

        async fn build_image(
            &self,
            context_dir: &Path,
            tag: &str,
            on_output: &(dyn Fn(String) + Send + Sync),
        ) -> BerthResult<()> {
            on_output("STEP 1/9: FROM python:3.11-slim".to_string());
            self.context_had_dockerfile
                .store(context_dir.join("Dockerfile").is_file(), Ordering::SeqCst);
            if self.fail {
                return Err(BerthError::ImageBuild {
                    tag: tag.to_string(),
                    output: "boom".to_string(),
                });
            }
            self.built.lock().unwrap().push(tag.to_string());
            self.existing.lock().unwrap().push(tag.to_string());
            Ok(())
        }

        async fn run_foreground(&self, _image: &str, _options: &RunOptions) -> BerthResult<i32> {
            Ok(0)
        }

        fn runtime_name(&self) -> &str {
            "fake"
        }
    }

    async fn pipeline(dir: &TempDir) -> (Pipeline, Project) {
        std::fs::write(dir.path().join("requirements.txt"), "Streamlit\n").unwrap();
        std::fs::write(dir.path().join("app.py"), "import streamlit\n").unwrap();
        std::fs::create_dir_all(dir.path().join("__pycache__")).unwrap();
        std::fs::write(dir.path().join("__pycache__/app.pyc"), "x").unwrap();
        let project = Project {
            config: Config::default(),
            root: dir.path().to_path_buf(),
        };
        let pipeline = Pipeline::with_installer(&project, Arc::new(FakeInstaller::new(false)))
            .await
            .unwrap();
        (pipeline, project)
    }

    #[tokio::test]
    async fn context_holds_manifest_source_and_dockerfile() {
        let src = TempDir::new().unwrap();
        let builds = TempDir::new().unwrap();
        let (pipeline, project) = pipeline(&src).await;
        let plan = pipeline.plan().unwrap();

        let ctx = prepare_context(&pipeline, &plan, &project.config.launch, builds.path())
            .await
            .unwrap();

        assert!(ctx.starts_with(builds.path()));
        assert_eq!(
            std::fs::read_to_string(ctx.join(CONTEXT_MANIFEST)).unwrap(),
            "streamlit\n"
        );
        assert!(ctx.join("app/app.py").is_file());
        assert!(ctx.join("app/requirements.txt").is_file());
        assert!(!ctx.join("app/__pycache__").exists());
        assert!(ctx.join(".dockerignore").is_file());
        assert!(std::fs::read_to_string(ctx.join("Dockerfile"))
            .unwrap()
            .starts_with("FROM python:3.11-slim"));
    }

    #[tokio::test]
    async fn tag_is_content_addressed() {
        let src = TempDir::new().unwrap();
        let (pipeline, project) = pipeline(&src).await;
        let plan = pipeline.plan().unwrap();
        let launch = &project.config.launch;

        let tag = image_tag("berth-app", &plan, launch);
        assert_eq!(tag, image_tag("berth-app", &plan, launch));
        let (name, digest) = tag.split_once(':').unwrap();
        assert_eq!(name, "berth-app");
        assert_eq!(digest.len(), 12);
    }

    #[tokio::test]
    async fn tag_follows_launch_and_installer_settings() {
        let src = TempDir::new().unwrap();
        let (_, project) = pipeline(&src).await;
        let tag_for = |project: Project| async move {
            let pipeline = Pipeline::for_project(&project).await.unwrap();
            let plan = pipeline.plan().unwrap();
            image_tag("berth-app", &plan, &project.config.launch)
        };

        let base = tag_for(project.clone()).await;

        let mut port = project.clone();
        port.config.launch.port = 9000;
        assert_ne!(base, tag_for(port).await);

        let mut entry = project.clone();
        entry.config.launch.entry = "dash.py".to_string();
        assert_ne!(base, tag_for(entry).await);

        let mut installer = project.clone();
        installer.config.resolver.installer =
            vec!["uv".to_string(), "pip".to_string(), "install".to_string()];
        assert_ne!(base, tag_for(installer).await);
    }

    #[tokio::test]
    async fn second_build_is_cached() {
        let src = TempDir::new().unwrap();
        let builds = TempDir::new().unwrap();
        let (pipeline, project) = pipeline(&src).await;
        let runtime = FakeRuntime::default();
        let lines = Mutex::new(0usize);
        let on_output = |_line: String| *lines.lock().unwrap() += 1;

        let launch = &project.config.launch;

        let first = build(&runtime, &pipeline, "berth-app", launch, builds.path(), &on_output)
            .await
            .unwrap();
        let second = build(&runtime, &pipeline, "berth-app", launch, builds.path(), &on_output)
            .await
            .unwrap();

        assert!(!first.was_cached);
        assert!(second.was_cached);
        assert_eq!(first.tag, second.tag);
        assert_eq!(runtime.built.lock().unwrap().len(), 1);
        assert!(runtime.context_had_dockerfile.load(Ordering::SeqCst));
        assert_eq!(*lines.lock().unwrap(), 1);

        // Context directories are cleaned up
        assert_eq!(std::fs::read_dir(builds.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn failed_build_cleans_context() {
        let src = TempDir::new().unwrap();
        let builds = TempDir::new().unwrap();
        let (pipeline, project) = pipeline(&src).await;
        let runtime = FakeRuntime {
            fail: true,
            ..Default::default()
        };

        let launch = &project.config.launch;
        let quiet = |_: String| {};

        let err = build(&runtime, &pipeline, "berth-app", launch, builds.path(), &quiet)
            .await
            .unwrap_err();
        assert!(matches!(err, BerthError::ImageBuild { .. }));
        assert_eq!(std::fs::read_dir(builds.path()).unwrap().count(), 0);
    }
}
