//! Immutable layered snapshots of the image filesystem
//!
//! Every build stage consumes the previous snapshot and yields a new one
//! with one more layer. A layer's cache key chains its parent's key with
//! the stage kind and the stage's own input digest, so a layer is reused
//! exactly when nothing at or below it changed.
//!
//! # Build states
//!
//! | State | Reached after |
//! |-------|---------------|
//! | pending | base image |
//! | dependencies-installed | resolve |
//! | source-assembled | assemble |
//! | privilege-dropped | privilege |
//! | ready | finish |

use crate::error::{BerthError, BerthResult};
use crate::layer::digest::{DigestBuilder, LayerDigest};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three build stages, in their only legal order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Resolve,
    Assemble,
    Privilege,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resolve => "resolve",
            Self::Assemble => "assemble",
            Self::Privilege => "privilege",
        };
        write!(f, "{}", name)
    }
}

/// Linear build state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildState {
    Pending,
    DependenciesInstalled,
    SourceAssembled,
    PrivilegeDropped,
    Ready,
}

impl BuildState {
    /// State reached by completing `stage` from `self`
    pub fn advance(self, stage: StageKind) -> BerthResult<Self> {
        match (self, stage) {
            (Self::Pending, StageKind::Resolve) => Ok(Self::DependenciesInstalled),
            (Self::DependenciesInstalled, StageKind::Assemble) => Ok(Self::SourceAssembled),
            (Self::SourceAssembled, StageKind::Privilege) => Ok(Self::PrivilegeDropped),
            (from, stage) => Err(BerthError::InvalidTransition {
                from: from.to_string(),
                to: format!("{} stage", stage),
            }),
        }
    }

    /// Mark the build complete; only legal once privileges are dropped
    pub fn finish(self) -> BerthResult<Self> {
        match self {
            Self::PrivilegeDropped => Ok(Self::Ready),
            from => Err(BerthError::InvalidTransition {
                from: from.to_string(),
                to: Self::Ready.to_string(),
            }),
        }
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::DependenciesInstalled => "dependencies-installed",
            Self::SourceAssembled => "source-assembled",
            Self::PrivilegeDropped => "privilege-dropped",
            Self::Ready => "ready",
        };
        write!(f, "{}", name)
    }
}

/// One content-addressed layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    /// Stage that produced the layer
    pub stage: StageKind,

    /// Digest of the stage's own inputs
    pub input: LayerDigest,

    /// Cache key: parent key + stage + input
    pub key: LayerDigest,

    /// Human-readable summary
    pub description: String,

    /// Whether the layer was reused instead of rebuilt
    #[serde(default)]
    pub cached: bool,
}

/// Immutable view of the image after some number of stages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    base: String,
    layers: Vec<Layer>,
    state: BuildState,
}

impl Snapshot {
    /// Snapshot of the bare base image
    pub fn base(image: impl Into<String>) -> Self {
        Self {
            base: image.into(),
            layers: Vec::new(),
            state: BuildState::Pending,
        }
    }

    pub fn base_image(&self) -> &str {
        &self.base
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    /// Layer produced by `stage`, if it has run
    pub fn layer(&self, stage: StageKind) -> Option<&Layer> {
        self.layers.iter().find(|l| l.stage == stage)
    }

    /// Whether the effective identity is already the runtime identity
    pub fn privileges_dropped(&self) -> bool {
        matches!(self.state, BuildState::PrivilegeDropped | BuildState::Ready)
    }

    /// Cache key of the topmost layer (or of the base image)
    pub fn head_key(&self) -> LayerDigest {
        match self.layers.last() {
            Some(layer) => layer.key.clone(),
            None => DigestBuilder::new().field("base").field(&self.base).finish(),
        }
    }

    /// Cache key a layer for `stage` with `input` would get on top of this snapshot
    pub fn child_key(&self, stage: StageKind, input: &LayerDigest) -> LayerDigest {
        DigestBuilder::new()
            .field(self.head_key().as_str())
            .field(stage.to_string())
            .field(input.as_str())
            .finish()
    }

    /// New snapshot with one more layer.
    ///
    /// Fails if the stage is out of order, or needs root after the
    /// privilege drop.
    pub fn push(
        &self,
        stage: StageKind,
        input: LayerDigest,
        description: impl Into<String>,
        requires_root: bool,
    ) -> BerthResult<Self> {
        if requires_root && self.privileges_dropped() {
            return Err(BerthError::PrivilegeEscalation {
                stage: stage.to_string(),
            });
        }

        let state = self.state.advance(stage)?;
        let key = self.child_key(stage, &input);

        let mut layers = self.layers.clone();
        layers.push(Layer {
            stage,
            input,
            key,
            description: description.into(),
            cached: false,
        });

        Ok(Self {
            base: self.base.clone(),
            layers,
            state,
        })
    }

    /// Same snapshot with the top layer flagged as reused
    pub fn mark_cached(mut self) -> Self {
        if let Some(layer) = self.layers.last_mut() {
            layer.cached = true;
        }
        self
    }

    /// Final snapshot in the `ready` state
    pub fn finish(&self) -> BerthResult<Self> {
        Ok(Self {
            state: self.state.finish()?,
            ..self.clone()
        })
    }
}
