//! Process launcher: the container's single foreground process
//!
//! The launcher resolves the launch configuration (entry file, port,
//! bind address) and starts exactly one process: the fixed executable
//! applied to the resolved arguments. Its exit status becomes ours.
//!
//! Resolution precedence, field by field:
//! explicit argument vector > environment (`BERTH_*`) > embedded default.

pub mod args;

pub use args::{parse_address, parse_port, LaunchOverrides};

use crate::config::schema::LaunchSettings;
use crate::error::{BerthError, BerthResult};
use crate::identity::{privilege, RuntimeIdentity};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// How a resolved port that differs from the declared one is treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PortPolicy {
    /// The declared port is documentation only; a mismatch is logged
    #[default]
    Advisory,
    /// A mismatch is refused before anything starts
    Enforced,
}

impl fmt::Display for PortPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Advisory => write!(f, "advisory"),
            Self::Enforced => write!(f, "enforced"),
        }
    }
}

/// Resolved launch configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Entry file, relative to the working directory
    pub entry: String,
    pub port: u16,
    pub address: IpAddr,

    /// Extra server flags, appended after the port and address
    pub extra: Vec<String>,

    /// Script arguments, emitted after a `--` separator
    pub passthrough: Vec<String>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            entry: "app.py".to_string(),
            port: 8501,
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            extra: Vec::new(),
            passthrough: Vec::new(),
        }
    }
}

impl LaunchConfig {
    /// Embedded defaults from configuration
    pub fn from_settings(settings: &LaunchSettings) -> BerthResult<Self> {
        if settings.entry.trim().is_empty() {
            return Err(BerthError::LaunchInvalid(
                "launch.entry must not be empty".to_string(),
            ));
        }
        if settings.port == 0 {
            return Err(BerthError::LaunchInvalid(
                "launch.port must be between 1 and 65535".to_string(),
            ));
        }
        Ok(Self {
            entry: settings.entry.clone(),
            port: settings.port,
            address: parse_address(&settings.address)?,
            extra: Vec::new(),
            passthrough: Vec::new(),
        })
    }

    /// Apply overrides on top of `defaults`
    pub fn resolve(defaults: &Self, overrides: &LaunchOverrides) -> Self {
        Self {
            entry: overrides
                .entry
                .clone()
                .unwrap_or_else(|| defaults.entry.clone()),
            port: overrides.port.unwrap_or(defaults.port),
            address: overrides.address.unwrap_or(defaults.address),
            extra: args::non_empty_or(overrides.extra.clone(), defaults.extra.clone()),
            passthrough: args::non_empty_or(
                overrides.passthrough.clone(),
                defaults.passthrough.clone(),
            ),
        }
    }

    /// Argument vector for the executable
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            self.entry.clone(),
            format!("--server.port={}", self.port),
            format!("--server.address={}", self.address),
        ];
        args.extend(self.extra.iter().cloned());
        if !self.passthrough.is_empty() {
            args.push("--".to_string());
            args.extend(self.passthrough.iter().cloned());
        }
        args
    }
}

impl fmt::Display for LaunchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}:{}", self.entry, self.address, self.port)
    }
}

/// Lifecycle of the launched process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Exited(i32),
}

impl RunState {
    /// `not-started -> running`
    pub fn start(self) -> BerthResult<Self> {
        match self {
            Self::NotStarted => Ok(Self::Running),
            from => Err(BerthError::InvalidTransition {
                from: from.to_string(),
                to: Self::Running.to_string(),
            }),
        }
    }

    /// `running -> exited`
    pub fn exit(self, code: i32) -> BerthResult<Self> {
        match self {
            Self::Running => Ok(Self::Exited(code)),
            from => Err(BerthError::InvalidTransition {
                from: from.to_string(),
                to: "exited".to_string(),
            }),
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not-started"),
            Self::Running => write!(f, "running"),
            Self::Exited(code) => write!(f, "exited({})", code),
        }
    }
}

/// Starts the application process
#[derive(Debug)]
pub struct Launcher {
    executable: Vec<String>,
    config: LaunchConfig,
    declared_port: u16,
    workdir: PathBuf,
    identity: Option<RuntimeIdentity>,
    state: RunState,
}

impl Launcher {
    pub fn new(
        executable: Vec<String>,
        config: LaunchConfig,
        declared_port: u16,
        workdir: impl Into<PathBuf>,
    ) -> BerthResult<Self> {
        if executable.is_empty() {
            return Err(BerthError::LaunchInvalid(
                "launch.executable must name a program".to_string(),
            ));
        }
        Ok(Self {
            executable,
            config,
            declared_port,
            workdir: workdir.into(),
            identity: None,
            state: RunState::NotStarted,
        })
    }

    /// Drop to `identity` before starting when running as root
    pub fn with_identity(mut self, identity: RuntimeIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn config(&self) -> &LaunchConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Full command line: executable followed by the resolved arguments
    pub fn command_line(&self) -> Vec<String> {
        let mut line = self.executable.clone();
        line.extend(self.config.to_args());
        line
    }

    /// Compare the resolved port with the declared one
    pub fn check_port(&self, policy: PortPolicy) -> BerthResult<()> {
        if self.config.port == self.declared_port {
            return Ok(());
        }
        match policy {
            PortPolicy::Advisory => {
                warn!(
                    "Serving on port {} but the image declares {}; publish it explicitly",
                    self.config.port, self.declared_port
                );
                Ok(())
            }
            PortPolicy::Enforced => Err(BerthError::PortMismatch {
                requested: self.config.port,
                declared: self.declared_port,
            }),
        }
    }

    /// Fail unless the entry file exists under the working directory
    pub fn check_entry(&self) -> BerthResult<()> {
        let path = self.entry_path();
        if path.is_file() {
            Ok(())
        } else {
            Err(BerthError::EntryNotFound(path))
        }
    }

    /// Every pre-start check, in order
    pub fn prepare(&self, policy: PortPolicy) -> BerthResult<()> {
        self.check_entry()?;
        self.check_port(policy)
    }

    fn entry_path(&self) -> PathBuf {
        let entry = Path::new(&self.config.entry);
        if entry.is_absolute() {
            entry.to_path_buf()
        } else {
            self.workdir.join(entry)
        }
    }

    fn drop_privileges(&self) -> BerthResult<()> {
        match &self.identity {
            Some(identity) if privilege::is_root() => privilege::drop_to(identity.uid, identity.gid),
            Some(_) => {
                debug!("Not running as root, keeping current identity");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Spawn the process, wait for it and return its exit code.
    ///
    /// A process killed by a signal reports `128 + signal`.
    pub async fn run(&mut self) -> BerthResult<i32> {
        self.drop_privileges()?;
        self.state = self.state.start()?;
        let (program, args) = self.split_command();

        info!("Launching {}: {}", self.config, self.command_line().join(" "));
        let status = Command::new(&program)
            .args(&args)
            .current_dir(&self.workdir)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|source| BerthError::Exec { program, source })?;

        let code = exit_code(status);
        self.state = self.state.exit(code)?;
        debug!("Process exited with code {}", code);
        Ok(code)
    }

    /// Replace the current process with the application.
    ///
    /// Only returns on failure.
    #[cfg(unix)]
    pub fn exec(mut self) -> BerthError {
        use std::os::unix::process::CommandExt;

        if let Err(e) = self.drop_privileges() {
            return e;
        }
        match self.state.start() {
            Ok(state) => self.state = state,
            Err(e) => return e,
        }

        let (program, args) = self.split_command();
        info!("Executing {}: {}", self.config, self.command_line().join(" "));
        let source = std::process::Command::new(&program)
            .args(&args)
            .current_dir(&self.workdir)
            .exec();
        BerthError::Exec { program, source }
    }

    fn split_command(&self) -> (String, Vec<String>) {
        let line = self.command_line();
        let mut parts = line.into_iter();
        let program = parts.next().unwrap_or_default();
        (program, parts.collect())
    }
}

/// Exit code of a finished process; death by signal maps to `128 + signal`
#[cfg(unix)]
pub fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(1)
}

#[cfg(not(unix))]
pub fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn argv(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    fn launcher(dir: &Path, config: LaunchConfig) -> Launcher {
        Launcher::new(argv("streamlit run"), config, 8501, dir).unwrap()
    }

    #[test]
    fn default_args() {
        assert_eq!(
            LaunchConfig::default().to_args(),
            argv("app.py --server.port=8501 --server.address=0.0.0.0")
        );
    }

    #[test]
    fn settings_match_builtin_defaults() {
        let config = LaunchConfig::from_settings(&LaunchSettings::default()).unwrap();
        assert_eq!(config, LaunchConfig::default());
    }

    #[test]
    fn override_replaces_every_field() {
        let overrides = LaunchOverrides::from_argv(&argv(
            "app.py --server.port=9000 --server.address=127.0.0.1",
        ))
        .unwrap();
        let config = LaunchConfig::resolve(&LaunchConfig::default(), &overrides);
        assert_eq!(
            config.to_args(),
            argv("app.py --server.port=9000 --server.address=127.0.0.1")
        );
    }

    #[test]
    fn partial_override_keeps_defaults() {
        let overrides = LaunchOverrides::from_argv(&argv("--server.port 9000")).unwrap();
        let config = LaunchConfig::resolve(&LaunchConfig::default(), &overrides);
        assert_eq!(config.entry, "app.py");
        assert_eq!(config.port, 9000);
        assert_eq!(config.address.to_string(), "0.0.0.0");
    }

    #[test]
    fn script_arguments_follow_separator() {
        let overrides = LaunchOverrides::from_argv(&argv("app.py -- --server.port=1 x")).unwrap();
        let config = LaunchConfig::resolve(&LaunchConfig::default(), &overrides);
        assert_eq!(config.port, 8501);
        assert_eq!(
            config.to_args(),
            argv("app.py --server.port=8501 --server.address=0.0.0.0 -- --server.port=1 x")
        );
    }

    #[test]
    fn command_line_prefixes_executable() {
        let dir = TempDir::new().unwrap();
        let l = launcher(dir.path(), LaunchConfig::default());
        assert_eq!(
            l.command_line(),
            argv("streamlit run app.py --server.port=8501 --server.address=0.0.0.0")
        );
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let mut settings = LaunchSettings::default();
        settings.address = "everywhere".to_string();
        assert!(LaunchConfig::from_settings(&settings).is_err());

        let mut settings = LaunchSettings::default();
        settings.port = 0;
        assert!(LaunchConfig::from_settings(&settings).is_err());
    }

    #[test]
    fn port_policy() {
        let dir = TempDir::new().unwrap();
        let config = LaunchConfig {
            port: 9000,
            ..LaunchConfig::default()
        };
        let l = launcher(dir.path(), config);

        assert!(l.check_port(PortPolicy::Advisory).is_ok());
        let err = l.check_port(PortPolicy::Enforced).unwrap_err();
        assert!(matches!(
            err,
            BerthError::PortMismatch {
                requested: 9000,
                declared: 8501
            }
        ));

        let matching = launcher(dir.path(), LaunchConfig::default());
        assert!(matching.check_port(PortPolicy::Enforced).is_ok());
    }

    #[test]
    fn missing_entry_fails_before_start() {
        let dir = TempDir::new().unwrap();
        let l = launcher(dir.path(), LaunchConfig::default());
        let err = l.prepare(PortPolicy::Advisory).unwrap_err();
        assert!(matches!(err, BerthError::EntryNotFound(_)));
        assert_eq!(l.state(), RunState::NotStarted);
    }

    #[test]
    fn run_state_is_linear() {
        let running = RunState::NotStarted.start().unwrap();
        let exited = running.exit(0).unwrap();
        assert_eq!(exited, RunState::Exited(0));
        assert!(exited.start().is_err());
        assert!(RunState::NotStarted.exit(0).is_err());
    }

    #[tokio::test]
    async fn run_returns_child_exit_code() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("app.py"), "").unwrap();

        // Stand-in executable: records its arguments, exits with 3
        let script = dir.path().join("fake-streamlit.sh");
        std::fs::write(&script, "echo \"$@\" > args.txt\nexit 3\n").unwrap();

        let executable = vec![
            "sh".to_string(),
            script.to_string_lossy().into_owned(),
            "run".to_string(),
        ];
        let mut l = Launcher::new(executable, LaunchConfig::default(), 8501, dir.path()).unwrap();
        l.prepare(PortPolicy::Enforced).unwrap();

        let code = l.run().await.unwrap();
        assert_eq!(code, 3);
        assert_eq!(l.state(), RunState::Exited(3));

        let recorded = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
        assert_eq!(
            recorded.trim(),
            "run app.py --server.port=8501 --server.address=0.0.0.0"
        );
    }

    #[cfg(unix)]
    #[test]
    fn signalled_process_maps_to_128_plus_signal() {
        let status = std::process::Command::new("sh")
            .args(["-c", "kill -TERM $$"])
            .status()
            .unwrap();
        assert_eq!(exit_code(status), 128 + 15);

        let status = std::process::Command::new("sh")
            .args(["-c", "exit 4"])
            .status()
            .unwrap();
        assert_eq!(exit_code(status), 4);
    }

    #[tokio::test]
    async fn missing_executable_is_exec_error() {
        let dir = TempDir::new().unwrap();
        let mut l = Launcher::new(
            vec!["berth-no-such-runtime".to_string()],
            LaunchConfig::default(),
            8501,
            dir.path(),
        )
        .unwrap();
        let err = l.run().await.unwrap_err();
        assert!(matches!(err, BerthError::Exec { .. }));
    }
}
