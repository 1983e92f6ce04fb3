//! Progress indicators with CI fallback

use super::context::UiContext;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Longest build line shown next to the progress bar
const MAX_MESSAGE_CHARS: usize = 60;

/// Spinner for a single long-running task
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
        }
    }

    /// Start the spinner; plain mode prints the message once
    pub fn start(&mut self, message: &str) {
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            println!("{} {}", style("...").dim(), message);
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        match self.spinner.take() {
            Some(spinner) => spinner.stop(message),
            None => println!("{} {}", style("[OK]").green(), message),
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        match self.spinner.take() {
            Some(spinner) => spinner.error(message),
            None => println!("{} {}", style("[FAIL]").red(), message),
        }
    }
}

/// Progress bar for container image builds.
///
/// Follows the `STEP N/M:` lines podman prints (and docker's classic
/// `Step N/M :`), showing an indicatif bar in interactive mode and the
/// step lines alone in CI.
pub struct BuildProgress {
    bar: Option<ProgressBar>,
}

impl BuildProgress {
    pub fn new(ctx: &UiContext, tag: &str) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new(0);
            let template = "  {spinner:.cyan} Building {prefix}  {bar:20.cyan/dim} {pos}/{len} {msg:.dim}  {elapsed:.dim}";
            let bar_style = ProgressStyle::default_bar()
                .template(template)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                .progress_chars("━╸─");
            bar.set_style(bar_style);
            bar.set_prefix(tag.to_string());
            bar.enable_steady_tick(Duration::from_millis(120));
            Some(bar)
        } else {
            println!("Building {}...", tag);
            None
        };
        Self { bar }
    }

    /// Feed one line of build output
    pub fn on_line(&self, line: String) {
        match (&self.bar, parse_step_line(&line)) {
            (Some(bar), Some((n, total, instruction))) => {
                bar.set_length(total);
                bar.set_position(n);
                bar.set_message(truncate(instruction));
            }
            (None, Some((n, total, instruction))) => {
                println!("  STEP {}/{}: {}", n, total, instruction);
            }
            (Some(bar), None) => {
                let trimmed = line.trim();
                if !trimmed.is_empty() && !is_build_noise(trimmed) {
                    bar.set_message(truncate(trimmed));
                }
            }
            (None, None) => {}
        }
    }

    /// Finish and clear the progress bar
    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(MAX_MESSAGE_CHARS - 3).collect();
    format!("{}...", head)
}

/// Runtime bookkeeping lines not worth showing
fn is_build_noise(line: &str) -> bool {
    line.starts_with("-->")
        || line.starts_with("---> ")
        || line.starts_with("Removing intermediate")
        || line.starts_with("COMMIT")
        || line.starts_with("Successfully tagged")
}

/// Parse `STEP N/M: INSTRUCTION` (podman) or `Step N/M : INSTRUCTION` (docker)
fn parse_step_line(line: &str) -> Option<(u64, u64, &str)> {
    let rest = line
        .strip_prefix("STEP ")
        .or_else(|| line.strip_prefix("Step "))?;
    let (counts, instruction) = rest.split_once(':')?;
    let (n, total) = counts.trim().split_once('/')?;
    Some((n.parse().ok()?, total.parse().ok()?, instruction.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spinner_non_interactive() {
        let ctx = UiContext::non_interactive();
        let mut spinner = TaskSpinner::new(&ctx);
        spinner.start("Staging...");
        spinner.stop("Done");
        spinner.start("Staging again...");
        spinner.stop_error("Failed");
    }

    #[test]
    fn parses_podman_step() {
        let (n, m, instr) = parse_step_line("STEP 4/12: RUN [\"pip\",\"install\"]").unwrap();
        assert_eq!((n, m), (4, 12));
        assert_eq!(instr, "RUN [\"pip\",\"install\"]");
    }

    #[test]
    fn parses_docker_step() {
        let (n, m, instr) = parse_step_line("Step 1/12 : FROM python:3.11-slim").unwrap();
        assert_eq!((n, m), (1, 12));
        assert_eq!(instr, "FROM python:3.11-slim");
    }

    #[test]
    fn ignores_other_lines() {
        assert!(parse_step_line("---> abc123def").is_none());
        assert!(parse_step_line("Collecting streamlit").is_none());
        assert!(parse_step_line("STEP x/y: FROM").is_none());
        assert!(parse_step_line("").is_none());
    }

    #[test]
    fn filters_runtime_noise() {
        assert!(is_build_noise("--> Using cache abc123"));
        assert!(is_build_noise("COMMIT berth-app:0123456789ab"));
        assert!(is_build_noise("Successfully tagged berth-app:0123456789ab"));
        assert!(!is_build_noise("Collecting streamlit"));
    }

    #[test]
    fn truncates_on_char_boundary() {
        let long = "é".repeat(100);
        let short = truncate(&long);
        assert_eq!(short.chars().count(), MAX_MESSAGE_CHARS);
        assert!(short.ends_with("..."));
        assert_eq!(truncate("pip install"), "pip install");
    }

    #[test]
    fn build_progress_non_interactive() {
        let ctx = UiContext::non_interactive();
        let progress = BuildProgress::new(&ctx, "berth-app:0123456789ab");
        progress.on_line("STEP 1/5: FROM python:3.11-slim".to_string());
        progress.on_line("--> abc123".to_string());
        progress.finish();
    }
}
