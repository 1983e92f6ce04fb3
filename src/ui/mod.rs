//! Terminal output for berth commands
//!
//! Interactive terminals get `cliclack` log lines, spinners and an
//! `indicatif` build bar; CI and piped output fall back to plain
//! `[OK]`/`[WARN]` prefixed lines.
//!
//! # Example
//!
//! ```rust,ignore
//! use berth::ui::{self, UiContext, TaskSpinner};
//!
//! let ctx = UiContext::detect();
//! ui::intro(&ctx, "berth build");
//!
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Staging image root...");
//! spinner.stop("Image root ready");
//!
//! ui::step_ok_detail(&ctx, "Image built", "berth-app:0123456789ab");
//! ```

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{
    intro, key_value, outro_success, remark, section, step_error, step_info, step_ok,
    step_ok_detail, step_warn_hint,
};
pub use progress::{BuildProgress, TaskSpinner};
