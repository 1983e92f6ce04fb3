//! Stage command - apply the build stages to a local image root

use crate::audit::AuditLog;
use crate::cli::args::StageArgs;
use crate::cli::commands::plan::layer_summary;
use crate::config::Project;
use crate::error::BerthResult;
use crate::identity::privilege;
use crate::layer::{BuildRecord, Pipeline, StageContext};
use crate::ui::{self, TaskSpinner, UiContext};
use std::path::PathBuf;

/// Image root used when `--root` is not given, relative to the project
pub const DEFAULT_STAGE_ROOT: &str = ".berth/rootfs";

/// Execute the stage command
pub async fn execute(args: StageArgs, project: &Project) -> BerthResult<()> {
    let ctx = UiContext::detect();
    let audit = AuditLog::new(&project.config);

    let root = args.root.unwrap_or_else(|| default_root(project));
    let pipeline = Pipeline::for_project(project).await?;
    let stage_ctx = StageContext::new(&root, pipeline.workdir());

    ui::intro(&ctx, "berth stage");
    ui::key_value(&ctx, "root", &root.display().to_string());
    if !privilege::is_root() {
        ui::step_warn_hint(
            &ctx,
            "Not running as root",
            "handing the workdir to the runtime identity will likely fail",
        );
    }

    let previous = pipeline.prepare_root(&stage_ctx).await?;

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start("Applying build stages...");

    match pipeline.execute(&stage_ctx, previous.as_ref()).await {
        Ok(snapshot) => {
            spinner.stop(&format!("Image root is {}", snapshot.state()));
            for layer in snapshot.layers() {
                audit.stage_completed(layer).await;
                ui::key_value(&ctx, &layer.stage.to_string(), &layer_summary(layer));
            }
            ui::outro_success(&ctx, &format!("Staged into {}", root.display()));
            Ok(())
        }
        Err(e) => {
            spinner.stop_error("Build stage failed");
            // The pipeline recorded how far it got before failing
            let record = BuildRecord::load(&root).await.ok().flatten();
            if let Some(record) = &record {
                for layer in record.snapshot.layers() {
                    audit.stage_completed(layer).await;
                }
            }
            audit
                .build_failed(record.and_then(|r| r.failed_stage), &e.to_string())
                .await;
            Err(e)
        }
    }
}

fn default_root(project: &Project) -> PathBuf {
    project.root.join(DEFAULT_STAGE_ROOT)
}
