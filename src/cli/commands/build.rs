//! Build command - build the application image

use crate::audit::AuditLog;
use crate::cli::args::BuildArgs;
use crate::config::{ConfigManager, Project};
use crate::error::BerthResult;
use crate::image::{self, BuiltImage};
use crate::layer::Pipeline;
use crate::orchestration::{require_runtime, ContainerRuntime};
use crate::ui::{self, BuildProgress, UiContext};
use tracing::debug;

/// Execute the build command
pub async fn execute(args: BuildArgs, project: &Project) -> BerthResult<()> {
    let ctx = UiContext::detect();
    let audit = AuditLog::new(&project.config);

    ui::intro(&ctx, "berth build");
    let (_, built) = build_image(&ctx, &audit, project, args.name.as_deref()).await?;
    ui::outro_success(&ctx, &built.tag);

    Ok(())
}

/// Build (or reuse) the project image and hand back the runtime that owns it
pub(crate) async fn build_image(
    ctx: &UiContext,
    audit: &AuditLog,
    project: &Project,
    name: Option<&str>,
) -> BerthResult<(Box<dyn ContainerRuntime>, BuiltImage)> {
    let runtime = require_runtime(&project.config).await?;
    debug!("Using runtime: {}", runtime.runtime_name());

    let pipeline = Pipeline::for_project(project).await?;
    let name = name.unwrap_or(&project.config.image.name);
    let plan = pipeline.plan()?;

    for layer in plan.layers() {
        debug!("{} layer {}", layer.stage, layer.key);
    }

    let tag = image::image_tag(name, &plan, &project.config.launch);
    let progress = BuildProgress::new(ctx, &tag);
    let on_output = |line: String| progress.on_line(line);
    let result = image::build(
        runtime.as_ref(),
        &pipeline,
        name,
        &project.config.launch,
        &ConfigManager::builds_dir(),
        &on_output,
    )
    .await;
    progress.finish();

    match result {
        Ok(built) => {
            audit.image_built(&built.tag, built.was_cached).await;
            if built.was_cached {
                ui::step_ok_detail(ctx, "Image up to date", &built.tag);
            } else {
                ui::step_ok_detail(ctx, "Image built", &built.tag);
            }
            Ok((runtime, built))
        }
        Err(e) => {
            audit.build_failed(None, &e.to_string()).await;
            Err(e)
        }
    }
}
