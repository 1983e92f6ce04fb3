//! Run command - build the image and run it in the foreground

use crate::audit::AuditLog;
use crate::cli::args::RunArgs;
use crate::cli::commands::build::build_image;
use crate::config::Project;
use crate::error::BerthResult;
use crate::launch::{LaunchConfig, LaunchOverrides, Launcher};
use crate::orchestration::RunOptions;
use crate::ui::{self, UiContext};
use tracing::debug;

/// Execute the run command and return the container's exit code
pub async fn execute(args: RunArgs, project: &Project) -> BerthResult<i32> {
    let ctx = UiContext::detect();
    let audit = AuditLog::new(&project.config);

    // Launch overrides are checked against the source tree before building
    let launcher = launcher(&args.args, project)?;
    launcher.prepare(project.config.launch.port_policy)?;

    ui::intro(&ctx, "berth run");
    let (runtime, built) = build_image(&ctx, &audit, project, args.name.as_deref()).await?;

    let port = launcher.config().port;
    let options = run_options(&args, launcher.config());
    debug!("Run options: {:?}", options);

    ui::step_info(
        &ctx,
        &format!("Serving on http://localhost:{}", args.publish.unwrap_or(port)),
    );
    audit.launch_started(&launcher.command_line()).await;

    runtime.run_foreground(&built.tag, &options).await
}

fn launcher(argv: &[String], project: &Project) -> BerthResult<Launcher> {
    let settings = &project.config.launch;
    let defaults = LaunchConfig::from_settings(settings)?;
    let config = LaunchConfig::resolve(&defaults, &LaunchOverrides::from_argv(argv)?);
    Launcher::new(
        settings.executable.clone(),
        config,
        settings.port,
        project.source_dir(),
    )
}

/// Publish the serving port; any override replaces the CMD with the
/// fully resolved argument vector, otherwise the image CMD applies
fn run_options(args: &RunArgs, config: &LaunchConfig) -> RunOptions {
    let port = config.port;
    RunOptions {
        publish: vec![(args.publish.unwrap_or(port), port)],
        args: if args.args.is_empty() {
            Vec::new()
        } else {
            config.to_args()
        },
        env: args.env.clone(),
        name: args.container_name.clone(),
        remove: !args.keep,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::BerthError;
    use tempfile::TempDir;

    fn run_args(argv: &[&str]) -> RunArgs {
        RunArgs {
            name: None,
            publish: None,
            container_name: None,
            env: Vec::new(),
            keep: false,
            args: argv.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn publishes_declared_port_by_default() {
        let options = run_options(&run_args(&[]), &LaunchConfig::default());
        assert_eq!(options.publish, vec![(8501, 8501)]);
        assert!(options.args.is_empty());
        assert!(options.remove);
    }

    #[test]
    fn publishes_overridden_port() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("app.py"), "").unwrap();
        let project = Project {
            config: Config::default(),
            root: dir.path().to_path_buf(),
        };
        let mut args = run_args(&["app.py", "--server.port=9000"]);
        args.publish = Some(80);

        let launcher = launcher(&args.args, &project).unwrap();
        let options = run_options(&args, launcher.config());
        assert_eq!(options.publish, vec![(80, 9000)]);
        assert_eq!(
            options.args,
            vec!["app.py", "--server.port=9000", "--server.address=0.0.0.0"]
        );
    }

    #[test]
    fn partial_override_runs_resolved_command() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("app.py"), "").unwrap();
        let project = Project {
            config: Config::default(),
            root: dir.path().to_path_buf(),
        };
        let args = run_args(&["--server.port", "9000"]);

        let launcher = launcher(&args.args, &project).unwrap();
        let options = run_options(&args, launcher.config());
        assert_eq!(options.publish, vec![(9000, 9000)]);
        assert_eq!(
            options.args,
            vec!["app.py", "--server.port=9000", "--server.address=0.0.0.0"]
        );
    }

    #[tokio::test]
    async fn missing_entry_fails_before_build() {
        let dir = TempDir::new().unwrap();
        let mut project = Project {
            config: Config::default(),
            root: dir.path().to_path_buf(),
        };
        // No runtime is ever contacted
        project.config.runtime.binary = "berth-no-such-runtime".to_string();

        let err = execute(run_args(&[]), &project).await.unwrap_err();
        assert!(matches!(err, BerthError::EntryNotFound(_)));
    }
}
