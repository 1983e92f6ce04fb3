//! CLI argument definitions using clap derive

use crate::launch::PortPolicy;
use clap::{ArgAction, Parser, Subcommand};
use clap_complete::Shell;
use std::net::IpAddr;
use std::path::PathBuf;

/// berth - container bootstrap for single-process data apps
///
/// Installs dependencies, copies the application, hands it to a
/// non-root identity and starts exactly one foreground server process.
#[derive(Parser, Debug)]
#[command(name = "berth")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "BERTH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip local berth.toml discovery
    #[arg(long, global = true)]
    pub no_local: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a project-local berth.toml
    Init(InitArgs),

    /// Show the build layers and their cache keys
    Plan(PlanArgs),

    /// Print the generated Dockerfile
    Dockerfile(DockerfileArgs),

    /// Build the application image
    Build(BuildArgs),

    /// Apply the build stages to a local image root
    Stage(StageArgs),

    /// Start the application process in the foreground
    Launch(LaunchArgs),

    /// Build the image and run it in the foreground
    Run(RunArgs),

    /// Show or edit configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Overwrite existing berth.toml
    #[arg(short, long)]
    pub force: bool,

    /// Target directory (defaults to current directory)
    #[arg(short, long)]
    pub path: Option<PathBuf>,
}

/// Arguments for the plan command
#[derive(Parser, Debug)]
pub struct PlanArgs {
    /// Print the planned snapshot as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the dockerfile command
#[derive(Parser, Debug)]
pub struct DockerfileArgs {
    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Image repository name (defaults to image.name)
    #[arg(short, long)]
    pub name: Option<String>,
}

/// Arguments for the stage command
#[derive(Parser, Debug)]
pub struct StageArgs {
    /// Image root to stage into (defaults to <project>/.berth/rootfs)
    #[arg(short, long)]
    pub root: Option<PathBuf>,
}

/// Arguments for the launch command
#[derive(Parser, Debug)]
pub struct LaunchArgs {
    /// Entry file, relative to the working directory
    #[arg(long, env = "BERTH_ENTRY")]
    pub entry: Option<String>,

    /// Server port
    #[arg(long, env = "BERTH_PORT", value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,

    /// Bind address
    #[arg(long, env = "BERTH_ADDRESS")]
    pub address: Option<IpAddr>,

    /// Treat a port differing from the declared one as a warning or an error
    #[arg(long, value_enum)]
    pub port_policy: Option<PortPolicy>,

    /// Working directory holding the entry file (defaults to the source directory)
    #[arg(short, long)]
    pub workdir: Option<PathBuf>,

    /// Wait for the process and report its exit code instead of replacing berth
    #[arg(long)]
    pub wait: bool,

    /// Replacement argument list, e.g. `-- app.py --server.port=9000`
    #[arg(last = true)]
    pub args: Vec<String>,
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Image repository name (defaults to image.name)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Host port to publish (defaults to the serving port)
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    pub publish: Option<u16>,

    /// Container name
    #[arg(long)]
    pub container_name: Option<String>,

    /// Additional environment variables (KEY=VALUE)
    #[arg(short, long, value_parser = parse_env_var)]
    pub env: Vec<(String, String)>,

    /// Keep the container after it exits
    #[arg(long)]
    pub keep: bool,

    /// Replacement argument list, e.g. `-- app.py --server.port=9000`
    #[arg(last = true)]
    pub args: Vec<String>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Show configuration file path
    Path,

    /// Set a value in the project berth.toml
    Set {
        /// Configuration key (e.g., launch.port)
        key: String,
        /// Value to set
        value: String,
        /// Write to the global config instead of berth.toml
        #[arg(long)]
        global: bool,
    },
}

/// Arguments for the completions command
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Parse environment variable in KEY=VALUE format
fn parse_env_var(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE format: no '=' found in '{s}'"))?;
    if key.is_empty() {
        return Err(format!("invalid KEY=VALUE format: empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
