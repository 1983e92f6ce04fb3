//! Init command - create project-local berth.toml

use crate::cli::args::InitArgs;
use crate::config::LOCAL_CONFIG_FILE;
use crate::error::{BerthError, BerthResult};
use crate::ui::{self, UiContext};
use std::path::Path;
use tokio::fs;

/// Template for project-local config
const INIT_TEMPLATE: &str = r#"# berth project configuration
# Settings here override your global config (~/.config/berth/config.toml)

[image]
# base = "python:3.11-slim"
# name = "berth-app"
# workdir = "/app"
# manifest = "requirements.txt"
# source = "."
# exclude = ["data", "notebooks"]

[launch]
# executable = ["streamlit", "run"]
# entry = "app.py"
# port = 8501
# address = "0.0.0.0"
# port_policy = "advisory"           # advisory, enforced

# [identity]
# user = "appuser"
# group = "appuser"
# uid = 10001
# gid = 10001
# shell = "/usr/sbin/nologin"

# [resolver]
# installer = ["pip", "install", "--no-cache-dir"]

# [runtime]
# binary = "podman"                  # podman, docker
"#;

/// Execute the init command
pub async fn execute(args: InitArgs) -> BerthResult<()> {
    let ctx = UiContext::detect();

    let target_dir = match args.path {
        Some(ref p) => p.clone(),
        None => {
            std::env::current_dir().map_err(|e| BerthError::io("getting current directory", e))?
        }
    };

    let config_path = target_dir.join(LOCAL_CONFIG_FILE);

    if config_path.exists() && !args.force {
        return Err(BerthError::User(format!(
            "{} already exists. Use --force to overwrite.",
            config_path.display()
        )));
    }

    ensure_dir(&target_dir).await?;

    fs::write(&config_path, INIT_TEMPLATE)
        .await
        .map_err(|e| BerthError::io(format!("writing {}", config_path.display()), e))?;

    ui::step_ok_detail(
        &ctx,
        "Created project config",
        &config_path.display().to_string(),
    );

    if !target_dir.join("requirements.txt").exists() {
        ui::remark(&ctx, "No requirements.txt yet; the dependency layer needs one");
    }

    Ok(())
}

async fn ensure_dir(dir: &Path) -> BerthResult<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| BerthError::io(format!("creating directory {}", dir.display()), e))?;
    }
    Ok(())
}
