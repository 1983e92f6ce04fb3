//! Container runtime driven through the podman or docker CLI
//!
//! Both CLIs accept the same `build`, `image inspect` and `run` flags
//! used here, so one implementation covers either binary.

use crate::error::{BerthError, BerthResult};
use crate::launch::exit_code;
use crate::orchestration::runtime::{ContainerRuntime, RunOptions};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Container runtime using a podman-compatible CLI
pub struct CliRuntime {
    binary: String,
}

impl CliRuntime {
    /// Create a runtime for `binary` ("podman", "docker" or a path)
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Execute a CLI command and return the output
    async fn exec(&self, args: &[&str]) -> BerthResult<std::process::Output> {
        debug!("Executing: {} {:?}", self.binary, args);

        Command::new(&self.binary)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| BerthError::command_failed(format!("{} {:?}", self.binary, args), e))
    }

    /// Arguments for `build`
    pub fn build_args(context_dir: &Path, tag: &str) -> Vec<String> {
        vec![
            "build".to_string(),
            "-t".to_string(),
            tag.to_string(),
            context_dir.display().to_string(),
        ]
    }

    /// Arguments for a foreground `run`
    pub fn run_args(image: &str, options: &RunOptions) -> Vec<String> {
        let mut args = vec!["run".to_string()];

        if options.remove {
            args.push("--rm".to_string());
        }

        // Interactive so signals and Ctrl-C reach the application
        args.push("-i".to_string());

        if let Some(name) = &options.name {
            args.push("--name".to_string());
            args.push(name.clone());
        }

        for (host, container) in &options.publish {
            args.push("-p".to_string());
            args.push(format!("{}:{}", host, container));
        }

        for (k, v) in &options.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", k, v));
        }

        args.push(image.to_string());
        args.extend(options.args.iter().cloned());
        args
    }
}

#[async_trait]
impl ContainerRuntime for CliRuntime {
    async fn is_available(&self) -> BerthResult<bool> {
        let available = Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false);
        Ok(available)
    }

    async fn image_exists(&self, image: &str) -> BerthResult<bool> {
        let output = self.exec(&["image", "inspect", image]).await?;
        Ok(output.status.success())
    }

    async fn build_image(
        &self,
        context_dir: &Path,
        tag: &str,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> BerthResult<()> {
        let args = Self::build_args(context_dir, tag);
        debug!("Executing: {} {:?}", self.binary, args);

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BerthError::command_failed(format!("{} build", self.binary), e))?;

        let all_output = super::stream_child_output(&mut child, on_output).await;

        let status = child
            .wait()
            .await
            .map_err(|e| BerthError::command_failed(format!("{} build", self.binary), e))?;

        if !status.success() {
            let combined = all_output.join("\n");
            return Err(BerthError::ImageBuild {
                tag: tag.to_string(),
                output: super::build_error_output(&combined, ""),
            });
        }

        info!("Built image {}", tag);
        Ok(())
    }

    async fn run_foreground(&self, image: &str, options: &RunOptions) -> BerthResult<i32> {
        let args = Self::run_args(image, options);
        debug!("Executing interactively: {} {:?}", self.binary, args);

        let status = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| BerthError::command_failed(format!("{} run", self.binary), e))?;

        Ok(exit_code(status))
    }

    fn runtime_name(&self) -> &str {
        &self.binary
    }
}
