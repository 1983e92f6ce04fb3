//! Launch command - start the application as the single foreground process

use crate::audit::AuditLog;
use crate::cli::args::LaunchArgs;
use crate::config::Project;
use crate::error::BerthResult;
use crate::identity::{privilege, RuntimeIdentity};
use crate::launch::{LaunchConfig, LaunchOverrides, Launcher};

/// Execute the launch command.
///
/// On unix berth replaces itself with the application unless `--wait`
/// is given; the returned code is the application's exit status.
pub async fn execute(args: LaunchArgs, project: &Project) -> BerthResult<i32> {
    let launcher = launcher(&args, project)?;
    let policy = args
        .port_policy
        .unwrap_or(project.config.launch.port_policy);
    launcher.prepare(policy)?;

    AuditLog::new(&project.config)
        .launch_started(&launcher.command_line())
        .await;

    #[cfg(unix)]
    if !args.wait {
        return Err(launcher.exec());
    }

    let mut launcher = launcher;
    launcher.run().await
}

/// Resolve the launch configuration: argument vector, then flags and
/// `BERTH_*` variables, then configured defaults
fn launcher(args: &LaunchArgs, project: &Project) -> BerthResult<Launcher> {
    let settings = &project.config.launch;
    let defaults = LaunchConfig::from_settings(settings)?;

    let flags = LaunchOverrides {
        entry: args.entry.clone(),
        port: args.port,
        address: args.address,
        ..Default::default()
    };
    let overrides = LaunchOverrides::from_argv(&args.args)?.or(flags);
    let config = LaunchConfig::resolve(&defaults, &overrides);

    let workdir = args.workdir.clone().unwrap_or_else(|| project.source_dir());
    // Inside a staged image the identity exists in the system database
    let configured = RuntimeIdentity::from_config(&project.config.identity)?;
    let identity = privilege::lookup(&configured.user).unwrap_or(configured);

    Ok(Launcher::new(settings.executable.clone(), config, settings.port, workdir)?
        .with_identity(identity))
}
