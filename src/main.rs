//! berth - container bootstrap for single-process data apps
//!
//! CLI entry point that dispatches to subcommands.

use berth::cli::{commands, Cli, Commands};
use berth::config::{ConfigManager, Project};
use berth::error::{BerthError, BerthResult, ErrorPhase};
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => exit_code(code),
        Err(e) => {
            let label = match e.phase() {
                ErrorPhase::Build => "Build failed:",
                ErrorPhase::Run => "Launch failed:",
                ErrorPhase::Tool => "Error:",
            };
            eprintln!("{} {}", style(label).red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

/// Exit status of the launched process, or 0 for other commands
async fn run() -> BerthResult<i32> {
    let cli = Cli::parse();

    // Init and completions don't need config loading
    match cli.command {
        Commands::Init(args) => {
            init_logging(cli.verbose, "text");
            return commands::init(args).await.map(|()| 0);
        }
        Commands::Completions(args) => return commands::completions(args).map(|()| 0),
        _ => {}
    }

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };

    let cwd = std::env::current_dir().map_err(|e| BerthError::io("getting current directory", e))?;

    // Find local config unless --no-local is set
    let local_config_path = if cli.no_local {
        None
    } else {
        ConfigManager::find_local_config(&cwd)
    };

    let config = config_manager
        .load_merged(local_config_path.as_deref())
        .await?;
    init_logging(cli.verbose, &config.general.log_format);

    match &local_config_path {
        Some(path) => debug!("Found local config: {}", path.display()),
        None if cli.no_local => debug!("Local config discovery disabled (--no-local)"),
        None => debug!("No local config found"),
    }

    // The project root is the directory holding berth.toml
    let root = local_config_path
        .as_deref()
        .and_then(|path| path.parent())
        .map(|dir| dir.to_path_buf())
        .unwrap_or(cwd);
    let project = Project { config, root };

    ConfigManager::ensure_state_dirs().await?;

    match cli.command {
        Commands::Init(_) | Commands::Completions(_) => unreachable!("handled above"),
        Commands::Plan(args) => commands::plan(args, &project).await.map(|()| 0),
        Commands::Dockerfile(args) => commands::dockerfile(args, &project).await.map(|()| 0),
        Commands::Build(args) => commands::build(args, &project).await.map(|()| 0),
        Commands::Stage(args) => commands::stage(args, &project).await.map(|()| 0),
        Commands::Launch(args) => commands::launch(args, &project).await,
        Commands::Run(args) => commands::run(args, &project).await,
        Commands::Config(args) => commands::config(args, &project, &config_manager)
            .await
            .map(|()| 0),
    }
}

/// 0 = warn (spinners only), 1 = info, 2+ = debug; `RUST_LOG` wins when set
fn init_logging(verbose: u8, format: &str) {
    let default = match verbose {
        0 => "berth=warn",
        1 => "berth=info",
        _ => "berth=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}

/// Map a child exit status onto the process exit code
fn exit_code(code: i32) -> ExitCode {
    match u8::try_from(code) {
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    }
}
