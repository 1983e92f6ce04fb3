//! Container runtime abstraction
//!
//! Provides a trait for the container operations berth needs: build an
//! image from a context directory and run it in the foreground.

use crate::error::BerthResult;
use async_trait::async_trait;
use std::path::Path;

/// Options for a foreground container run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// `(host, container)` port pairs to publish
    pub publish: Vec<(u16, u16)>,

    /// Replacement for the image's CMD; empty keeps the default
    pub args: Vec<String>,

    /// Extra environment for the container
    pub env: Vec<(String, String)>,

    /// Container name
    pub name: Option<String>,

    /// Remove the container after it exits
    pub remove: bool,
}

/// Abstract container runtime interface
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Check if the runtime is available on this system
    async fn is_available(&self) -> BerthResult<bool>;

    /// Check if an image exists locally
    async fn image_exists(&self, image: &str) -> BerthResult<bool>;

    /// Build an image from a context directory, streaming each output
    /// line to `on_output`
    async fn build_image(
        &self,
        context_dir: &Path,
        tag: &str,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> BerthResult<()>;

    /// Run an image attached to the terminal and return its exit code
    async fn run_foreground(&self, image: &str, options: &RunOptions) -> BerthResult<i32>;

    /// Get the human-readable runtime name for display
    fn runtime_name(&self) -> &str;
}
