//! Plan command - show the layers an image build would produce

use crate::cli::args::PlanArgs;
use crate::config::Project;
use crate::error::BerthResult;
use crate::image;
use crate::launch::LaunchConfig;
use crate::layer::{Layer, Pipeline};
use crate::ui::{self, UiContext};

/// Execute the plan command
pub async fn execute(args: PlanArgs, project: &Project) -> BerthResult<()> {
    let pipeline = Pipeline::for_project(project).await?;
    let plan = pipeline.plan()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    let ctx = UiContext::detect();
    let settings = &project.config.launch;
    let launch = LaunchConfig::from_settings(settings)?;
    let mut command = settings.executable.clone();
    command.extend(launch.to_args());

    ui::intro(&ctx, "berth plan");
    ui::key_value(&ctx, "base", plan.base_image());
    ui::key_value(&ctx, "workdir", pipeline.workdir());
    ui::key_value(&ctx, "identity", &pipeline.privilege().identity().to_string());

    ui::section(&ctx, "Layers");
    for layer in plan.layers() {
        ui::key_value(&ctx, &layer.stage.to_string(), &layer_summary(layer));
    }

    ui::section(&ctx, "Launch");
    ui::key_value(&ctx, "command", &command.join(" "));
    ui::key_value(
        &ctx,
        "port",
        &format!("{} ({})", settings.port, settings.port_policy),
    );
    ui::key_value(
        &ctx,
        "image",
        &image::image_tag(&project.config.image.name, &plan, settings),
    );

    Ok(())
}

/// One-line description of a layer: short key, description, cache status
pub(crate) fn layer_summary(layer: &Layer) -> String {
    let mut line = format!("{}  {}", layer.key.short(), layer.description);
    if layer.cached {
        line.push_str(" (cached)");
    }
    line
}
