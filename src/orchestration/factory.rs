//! Runtime factory for the configured container runtime

use crate::config::Config;
use crate::error::{BerthError, BerthResult};
use crate::orchestration::cli_runtime::CliRuntime;
use crate::orchestration::runtime::ContainerRuntime;

/// Create the container runtime named by `runtime.binary`
pub fn create_runtime(config: &Config) -> BerthResult<Box<dyn ContainerRuntime>> {
    let binary = config.runtime.binary.trim();
    if binary.is_empty() {
        return Err(BerthError::RuntimeNotFound(
            "runtime.binary is empty".to_string(),
        ));
    }
    Ok(Box::new(CliRuntime::new(binary)))
}

/// Create the runtime and fail unless its CLI responds
pub async fn require_runtime(config: &Config) -> BerthResult<Box<dyn ContainerRuntime>> {
    let runtime = create_runtime(config)?;
    if !runtime.is_available().await? {
        return Err(BerthError::RuntimeNotFound(
            runtime.runtime_name().to_string(),
        ));
    }
    Ok(runtime)
}
