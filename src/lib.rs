//! berth - container bootstrap for single-process data apps
//!
//! Builds an image in three cached layers (dependencies, application
//! source, non-root runtime identity) and starts exactly one foreground
//! server process whose exit status is the container's.

pub mod audit;
pub mod cli;
pub mod config;
pub mod dockerfile;
pub mod error;
pub mod identity;
pub mod image;
pub mod launch;
pub mod layer;
pub mod orchestration;
pub mod ui;

pub use error::{BerthError, BerthResult};
