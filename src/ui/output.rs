//! Status lines shared by all commands

use super::context::UiContext;
use console::{style, StyledObject};

#[derive(Debug, Clone, Copy)]
enum Level {
    Ok,
    Info,
    Warn,
    Fail,
}

impl Level {
    fn tag(self) -> StyledObject<&'static str> {
        match self {
            Level::Ok => style("[OK]").green(),
            Level::Info => style("[INFO]").cyan(),
            Level::Warn => style("[WARN]").yellow(),
            Level::Fail => style("[FAIL]").red(),
        }
    }
}

fn step(ctx: &UiContext, level: Level, message: &str) {
    if ctx.use_fancy_output() {
        let _ = match level {
            Level::Ok => cliclack::log::success(message),
            Level::Info => cliclack::log::info(message),
            Level::Warn => cliclack::log::warning(message),
            Level::Fail => cliclack::log::error(message),
        };
    } else {
        println!("  {} {}", level.tag(), message);
    }
}

/// Command banner
pub fn intro(ctx: &UiContext, title: &str) {
    if ctx.use_fancy_output() {
        cliclack::intro(style(title).cyan().bold()).ok();
    } else {
        println!("{}", style(title).cyan().bold());
    }
}

/// Closing line of a successful command
pub fn outro_success(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::outro(style(message).green().bold()).ok();
    } else {
        println!("{} {}", Level::Ok.tag(), message);
    }
}

/// Bold heading before a group of lines
pub fn section(ctx: &UiContext, title: &str) {
    println!();
    if ctx.use_fancy_output() {
        cliclack::log::info(style(title).bold()).ok();
    } else {
        println!("{}", style(title).bold());
    }
}

pub fn step_ok(ctx: &UiContext, message: &str) {
    step(ctx, Level::Ok, message);
}

/// Success line with a dimmed detail, e.g. a path or tag
pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    let detail = if ctx.use_fancy_output() {
        style(detail).dim().to_string()
    } else {
        detail.to_string()
    };
    step(ctx, Level::Ok, &format!("{} ({})", message, detail));
}

pub fn step_info(ctx: &UiContext, message: &str) {
    step(ctx, Level::Info, message);
}

/// Warning followed by what to do about it
pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    step(ctx, Level::Warn, &format!("{} - {}", message, hint));
}

pub fn step_error(ctx: &UiContext, message: &str) {
    step(ctx, Level::Fail, message);
}

/// Dimmed aside
pub fn remark(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::remark(message).ok();
    } else {
        println!("  {}", style(message).dim());
    }
}

/// Aligned `key: value` line
pub fn key_value(ctx: &UiContext, key: &str, value: &str) {
    if ctx.use_fancy_output() {
        println!("  {:<10} {}", style(key).dim(), value);
    } else {
        println!("  {:<10} {}", format!("{}:", key), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_output_does_not_panic() {
        let ctx = UiContext::non_interactive();
        intro(&ctx, "berth plan");
        section(&ctx, "Layers");
        key_value(&ctx, "base", "python:3.11-slim");
        step_ok_detail(&ctx, "Image built", "berth-app:0123456789ab");
        step_warn_hint(&ctx, "Port differs", "publish it explicitly");
        step_error(&ctx, "Stage failed");
        remark(&ctx, "nothing to do");
        outro_success(&ctx, "Done");
    }
}
