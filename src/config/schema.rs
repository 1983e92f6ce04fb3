//! Configuration schema for berth
//!
//! Global configuration lives at `~/.config/berth/config.toml`; a
//! project-local `berth.toml` overrides it key by key.

use crate::launch::PortPolicy;
use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Image layout settings
    pub image: ImageConfig,

    /// Dependency installer settings
    pub resolver: ResolverConfig,

    /// Runtime identity settings
    pub identity: IdentityConfig,

    /// Launch defaults baked into the image
    pub launch: LaunchSettings,

    /// Container runtime settings
    pub runtime: RuntimeConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Enable the build/launch event log
    pub audit_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            audit_log: true,
        }
    }
}

/// Image layout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Base image
    pub base: String,

    /// Image repository name; the tag is content-addressed
    pub name: String,

    /// Working directory inside the image
    pub workdir: String,

    /// Manifest path, relative to the source directory
    pub manifest: String,

    /// Application source directory (relative to the config file)
    pub source: String,

    /// Extra file or directory names excluded from the source copy
    pub exclude: Vec<String>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            base: "python:3.11-slim".to_string(),
            name: "berth-app".to_string(),
            workdir: "/app".to_string(),
            manifest: "requirements.txt".to_string(),
            source: ".".to_string(),
            exclude: vec![],
        }
    }
}

/// Dependency installer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Installer command; the manifest path is appended after `-r`
    pub installer: Vec<String>,

    /// Directory (inside the image) that locally staged packages go to
    pub site_dir: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            installer: vec![
                "pip".to_string(),
                "install".to_string(),
                "--no-cache-dir".to_string(),
            ],
            site_dir: "/usr/local/lib/berth-site".to_string(),
        }
    }
}

/// Runtime identity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// User name
    pub user: String,

    /// Group name
    pub group: String,

    /// Numeric user id (must not be 0)
    pub uid: u32,

    /// Numeric group id (must not be 0)
    pub gid: u32,

    /// Login shell; defaults to a non-interactive one
    pub shell: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user: "appuser".to_string(),
            group: "appuser".to_string(),
            uid: 10001,
            gid: 10001,
            shell: "/usr/sbin/nologin".to_string(),
        }
    }
}

/// Launch defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchSettings {
    /// Fixed entry point executable and its leading arguments
    pub executable: Vec<String>,

    /// Default entry file, relative to the working directory
    pub entry: String,

    /// Declared server port
    pub port: u16,

    /// Default bind address
    pub address: String,

    /// Whether the declared port is advisory or enforced
    pub port_policy: PortPolicy,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            executable: vec!["streamlit".to_string(), "run".to_string()],
            entry: "app.py".to_string(),
            port: 8501,
            address: "0.0.0.0".to_string(),
            port_policy: PortPolicy::Advisory,
        }
    }
}

/// Container runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Runtime CLI binary: "podman" or "docker"
    pub binary: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            binary: "podman".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[launch]"));
        assert!(toml.contains("port = 8501"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.launch.entry, "app.py");
        assert_eq!(config.launch.address, "0.0.0.0");
        assert_eq!(config.identity.uid, 10001);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [launch]
            port = 9000
            port_policy = "enforced"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.launch.port, 9000);
        assert_eq!(config.launch.port_policy, PortPolicy::Enforced);
        assert_eq!(config.image.workdir, "/app"); // default preserved
    }
}
