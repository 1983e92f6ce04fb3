//! Error types for berth
//!
//! All modules use `BerthResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for berth operations
pub type BerthResult<T> = Result<T, BerthError>;

/// Which lifecycle phase an error aborts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPhase {
    /// The image build aborts and no image is produced
    Build,
    /// The container exits before (or instead of) serving
    Run,
    /// Tool-level problems (config, CLI usage, IO outside a stage)
    Tool,
}

/// All errors that can occur in berth
#[derive(Error, Debug)]
pub enum BerthError {
    // Manifest / dependency errors
    #[error("Invalid manifest {path}, line {line}: {reason}")]
    ManifestInvalid {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Dependency resolution failed: {reason}")]
    DependencyResolution { reason: String },

    // Assembler errors
    #[error("Failed to copy {path} into the image: {source}")]
    AssembleCopy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Identity / privilege errors
    #[error("Invalid runtime identity: {0}")]
    IdentityInvalid(String),

    #[error("Runtime identity collides with existing {kind} entry: {entry}")]
    IdentityCollision { kind: String, entry: String },

    #[error("Failed to transfer ownership of {path} to {uid}:{gid}: {reason}")]
    OwnershipTransfer {
        path: PathBuf,
        uid: u32,
        gid: u32,
        reason: String,
    },

    #[error("Stage '{stage}' requires root but privileges were already dropped")]
    PrivilegeEscalation { stage: String },

    #[error("Failed to drop privileges: {0}")]
    PrivilegeDrop(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    // Image build errors
    #[error("Image build failed for {tag}: {output}")]
    ImageBuild { tag: String, output: String },

    #[error("Container runtime not found: {0}")]
    RuntimeNotFound(String),

    // Launch errors
    #[error("Entry file not found: {0}")]
    EntryNotFound(PathBuf),

    #[error("Invalid launch argument: {0}")]
    LaunchInvalid(String),

    #[error("Port {requested} does not match declared port {declared}")]
    PortMismatch { requested: u16, declared: u16 },

    #[error("Failed to exec {program}: {source}")]
    Exec {
        program: String,
        #[source]
        source: std::io::Error,
    },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl BerthError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Lifecycle phase this error aborts
    pub fn phase(&self) -> ErrorPhase {
        match self {
            Self::ManifestInvalid { .. }
            | Self::DependencyResolution { .. }
            | Self::AssembleCopy { .. }
            | Self::IdentityInvalid(_)
            | Self::IdentityCollision { .. }
            | Self::OwnershipTransfer { .. }
            | Self::PrivilegeEscalation { .. }
            | Self::InvalidTransition { .. }
            | Self::ImageBuild { .. } => ErrorPhase::Build,
            Self::EntryNotFound(_)
            | Self::LaunchInvalid(_)
            | Self::PortMismatch { .. }
            | Self::PrivilegeDrop(_)
            | Self::Exec { .. } => ErrorPhase::Run,
            _ => ErrorPhase::Tool,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::DependencyResolution { .. } => {
                Some("Check package names and version constraints in the manifest")
            }
            Self::IdentityCollision { .. } => {
                Some("Pick a different identity.user / identity.uid in berth.toml")
            }
            Self::OwnershipTransfer { .. } => {
                Some("Ownership transfer needs root; run under sudo or in a user namespace")
            }
            Self::PathNotFound(_) => {
                Some("Check image.source and image.manifest, or run `berth init`")
            }
            Self::RuntimeNotFound(_) => Some("Install podman or set runtime.binary = \"docker\""),
            Self::PortMismatch { .. } => {
                Some("Set launch.port_policy = \"advisory\" or rebuild with the new port")
            }
            _ => None,
        }
    }
}
