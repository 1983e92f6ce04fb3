//! Layered image build
//!
//! An image is a base plus three content-addressed layers, produced in
//! a fixed order: dependencies, application source, runtime identity.
//! Dependencies come first so that editing application code never
//! invalidates the (slow) dependency layer.

pub mod digest;
pub mod install;
pub mod manifest;
pub mod pipeline;
pub mod record;
pub mod snapshot;
pub mod stages;
pub mod tree;

pub use digest::LayerDigest;
pub use install::{CommandInstaller, PackageInstaller};
pub use manifest::Manifest;
pub use pipeline::Pipeline;
pub use record::BuildRecord;
pub use snapshot::{BuildState, Layer, Snapshot, StageKind};
pub use stages::{BuildStage, StageContext};
pub use tree::SourceTree;
