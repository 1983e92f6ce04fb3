//! Dockerfile command - print or write the generated build instructions

use crate::cli::args::DockerfileArgs;
use crate::config::Project;
use crate::dockerfile;
use crate::error::{BerthError, BerthResult};
use crate::layer::Pipeline;
use crate::ui::{self, UiContext};
use tokio::fs;

/// Execute the dockerfile command
pub async fn execute(args: DockerfileArgs, project: &Project) -> BerthResult<()> {
    let pipeline = Pipeline::for_project(project).await?;
    let plan = pipeline.plan()?;
    let rendered = dockerfile::render(&pipeline, &plan, &project.config.launch)?;

    match args.output {
        None => print!("{}", rendered),
        Some(path) => {
            fs::write(&path, rendered)
                .await
                .map_err(|e| BerthError::io(format!("writing {}", path.display()), e))?;
            ui::step_ok_detail(
                &UiContext::detect(),
                "Wrote Dockerfile",
                &path.display().to_string(),
            );
        }
    }

    Ok(())
}
