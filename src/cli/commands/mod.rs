//! CLI command implementations

pub mod build;
pub mod completions;
pub mod config;
pub mod dockerfile;
pub mod init;
pub mod launch;
pub mod plan;
pub mod run;
pub mod stage;

pub use build::execute as build;
pub use completions::execute as completions;
pub use config::execute as config;
pub use dockerfile::execute as dockerfile;
pub use init::execute as init;
pub use launch::execute as launch;
pub use plan::execute as plan;
pub use run::execute as run;
pub use stage::execute as stage;
