//! Package installers used by the resolve stage

use crate::error::{BerthError, BerthResult};
use crate::orchestration::build_error_output;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Installs the packages listed in a manifest file
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    /// Install every package in `manifest` into `target`
    async fn install(&self, manifest: &Path, target: &Path) -> BerthResult<()>;

    /// Command line used inside an image build (installs into the
    /// image's default site)
    fn image_command(&self, manifest: &str) -> Vec<String>;

    /// Program and leading arguments; part of the dependency layer key
    fn program(&self) -> &[String];
}

/// Runs an external installer such as `pip install --no-cache-dir`
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    program: Vec<String>,
}

impl CommandInstaller {
    /// Create an installer from a program and its leading arguments
    pub fn new(program: Vec<String>) -> BerthResult<Self> {
        if program.is_empty() {
            return Err(BerthError::User(
                "resolver.installer must name a program".to_string(),
            ));
        }
        Ok(Self { program })
    }

    fn display(&self) -> String {
        self.program.join(" ")
    }
}

#[async_trait]
impl PackageInstaller for CommandInstaller {
    async fn install(&self, manifest: &Path, target: &Path) -> BerthResult<()> {
        tokio::fs::create_dir_all(target)
            .await
            .map_err(|e| BerthError::io(format!("creating {}", target.display()), e))?;

        let (program, leading) = self
            .program
            .split_first()
            .ok_or_else(|| BerthError::Internal("empty installer command".to_string()))?;

        debug!(
            "Executing: {} --target {} -r {}",
            self.display(),
            target.display(),
            manifest.display()
        );

        let output = Command::new(program)
            .args(leading)
            .arg("--target")
            .arg(target)
            .arg("-r")
            .arg(manifest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| BerthError::DependencyResolution {
                reason: format!("could not start installer '{}': {}", program, e),
            })?;

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BerthError::DependencyResolution {
                reason: format!(
                    "'{}' exited with {}:\n{}",
                    self.display(),
                    output.status,
                    build_error_output(&stdout, &stderr)
                ),
            });
        }

        info!("Installed dependencies into {}", target.display());
        Ok(())
    }

    fn image_command(&self, manifest: &str) -> Vec<String> {
        let mut cmd = self.program.clone();
        cmd.push("-r".to_string());
        cmd.push(manifest.to_string());
        cmd
    }
    fn program(&self) -> &[String] {
        &self.program
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls and copies the manifest to `<target>/INSTALLED`
    pub(crate) struct FakeInstaller {
        pub calls: AtomicUsize,
        fail: bool,
        program: Vec<String>,
    }

    impl FakeInstaller {
        pub fn new(fail: bool) -> Self {
            Self::with_program(fail, "fake-install")
        }

        pub fn with_program(fail: bool, program: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
                program: vec![program.to_string()],
            }
        }
    }

    #[async_trait]
    impl PackageInstaller for FakeInstaller {
        async fn install(&self, manifest: &Path, target: &Path) -> BerthResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(BerthError::DependencyResolution {
                    reason: "no matching distribution".to_string(),
                });
            }
            std::fs::create_dir_all(target).unwrap();
            std::fs::copy(manifest, target.join("INSTALLED")).unwrap();
            Ok(())
        }

        fn image_command(&self, manifest: &str) -> Vec<String> {
            let mut cmd = self.program.clone();
            cmd.push(manifest.to_string());
            cmd
        }

        fn program(&self) -> &[String] {
            &self.program
        }
    }
}
