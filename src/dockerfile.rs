//! Dockerfile generation
//!
//! Renders the build pipeline as container build instructions, one
//! block per stage in pipeline order, followed by the launch surface
//! (`EXPOSE`, `ENTRYPOINT`, `CMD`).

use crate::config::schema::LaunchSettings;
use crate::error::BerthResult;
use crate::identity::RuntimeIdentity;
use crate::launch::LaunchConfig;
use crate::layer::{Pipeline, Snapshot, StageKind};

/// Canonical manifest file name inside the build context
pub const CONTEXT_MANIFEST: &str = "berth-requirements.txt";

/// Source directory name inside the build context
pub const CONTEXT_SOURCE: &str = "app";

/// Render the Dockerfile for `pipeline`; `plan` supplies the layer keys
pub fn render(
    pipeline: &Pipeline,
    plan: &Snapshot,
    launch: &LaunchSettings,
) -> BerthResult<String> {
    let workdir = pipeline.workdir();
    let mut lines = Vec::new();

    lines.push(format!("FROM {}", pipeline.base_image()));
    lines.push(format!("WORKDIR {}", workdir));
    lines.push(String::new());

    // Dependencies
    lines.push(layer_comment(plan, StageKind::Resolve));
    let manifest = pipeline.resolve().manifest();
    if manifest.is_blank() {
        lines.push("# no dependencies declared".to_string());
    } else {
        let staged = format!("/tmp/{}", CONTEXT_MANIFEST);
        lines.push(format!("COPY {} {}", CONTEXT_MANIFEST, staged));
        let install = pipeline.resolve().installer().image_command(&staged);
        lines.push(format!("RUN {}", exec_form(&install)?));
    }
    lines.push(String::new());

    // Application source
    lines.push(layer_comment(plan, StageKind::Assemble));
    lines.push(format!("COPY {}/ ./", CONTEXT_SOURCE));
    lines.push(String::new());

    // Runtime identity
    let identity = pipeline.privilege().identity();
    lines.push(layer_comment(plan, StageKind::Privilege));
    lines.push(format!("RUN {}", identity_script(identity, workdir)));
    lines.push(format!("USER {}:{}", identity.uid, identity.gid));
    lines.push(String::new());

    // Launch surface
    let defaults = LaunchConfig::from_settings(launch)?;
    lines.push(format!(
        "LABEL org.berth.key={}",
        dockerfile_quote(&plan.head_key().to_string())
    ));
    lines.push(format!("EXPOSE {}", launch.port));
    lines.push(format!("ENTRYPOINT {}", exec_form(&launch.executable)?));
    lines.push(format!("CMD {}", exec_form(&defaults.to_args())?));

    let mut out = lines.join("\n");
    out.push('\n');
    Ok(out)
}

fn layer_comment(plan: &Snapshot, stage: StageKind) -> String {
    match plan.layer(stage) {
        Some(layer) => format!("# {}: {} [{}]", stage, layer.description, layer.key.short()),
        None => format!("# {}", stage),
    }
}

/// Shell commands that create the identity and hand it the working directory
fn identity_script(identity: &RuntimeIdentity, workdir: &str) -> String {
    format!(
        "groupadd --system --gid {gid} {group} \\\n    && useradd --system --uid {uid} --gid {gid} \
         --no-create-home --home-dir {workdir} --shell {shell} {user} \\\n    && chown -R {uid}:{gid} {workdir}",
        gid = identity.gid,
        uid = identity.uid,
        group = identity.group,
        user = identity.user,
        shell = identity.shell,
        workdir = workdir,
    )
}

/// JSON array form for RUN/ENTRYPOINT/CMD
fn exec_form(args: &[String]) -> BerthResult<String> {
    Ok(serde_json::to_string(args)?)
}

/// Quote a value for a Dockerfile LABEL/ENV instruction.
/// Embedded double quotes and backslashes are escaped to prevent injection.
fn dockerfile_quote(value: &str) -> String {
    if value.contains('$') || value.contains(' ') || value.contains('"') || value.contains('\\') {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{}\"", escaped)
    } else {
        value.to_string()
    }
}
